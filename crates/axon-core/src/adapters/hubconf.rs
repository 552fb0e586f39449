//! Weight-URL extraction from PyTorch Hub `hubconf.py` files.
//!
//! `hubconf.py` is free-form Python with no schema, so this is best effort:
//! a fixed, priority-ordered list of named patterns is applied to the raw
//! text and every hit is collected, de-duplicated in first-seen order. When no
//! pattern yields anything, a table of well-known torchvision checkpoints is
//! consulted.

use regex::Regex;
use std::sync::LazyLock;

/// Extraction patterns, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubconfPattern {
    /// `model_urls = { 'resnet50': 'https://...' }`
    ModelUrlsDict,
    /// `resnet50_url = 'https://...'`
    NamedUrlVariable,
    /// `class ResNet50_Weights(...): ... url='https://...'`
    WeightsClass,
    /// `def resnet50(...): ... load_state_dict_from_url('https://...')`
    LoadStateDictInFunction,
    /// Well-known checkpoint table.
    KnownCheckpoint,
}

static MODEL_URLS_DICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"model_urls\s*=\s*\{([^}]+)\}").expect("model_urls regex must compile")
});

static DICT_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"](\w+)['"]\s*:\s*['"](https?://[^'"]+)['"]"#)
        .expect("dict entry regex must compile")
});

static LOAD_STATE_DICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"load_state_dict_from_url\(\s*['"](https?://[^'"]+)['"]"#)
        .expect("load_state_dict regex must compile")
});

const KNOWN_CHECKPOINTS: &[(&str, &str)] = &[
    ("resnet18", "https://download.pytorch.org/models/resnet18-f37072fd.pth"),
    ("resnet34", "https://download.pytorch.org/models/resnet34-b627a593.pth"),
    ("resnet50", "https://download.pytorch.org/models/resnet50-0676ba61.pth"),
    ("resnet101", "https://download.pytorch.org/models/resnet101-63fe2227.pth"),
    ("resnet152", "https://download.pytorch.org/models/resnet152-394f9c45.pth"),
    ("alexnet", "https://download.pytorch.org/models/alexnet-owt-7be5be79.pth"),
    ("vgg16", "https://download.pytorch.org/models/vgg16-397923af.pth"),
    ("vgg19", "https://download.pytorch.org/models/vgg19-dcbb9e9d.pth"),
    ("mobilenet_v2", "https://download.pytorch.org/models/mobilenet_v2-7ebf99e0.pth"),
];

/// Names in the well-known checkpoint table.
pub fn known_models() -> impl Iterator<Item = &'static str> {
    KNOWN_CHECKPOINTS.iter().map(|(name, _)| *name)
}

/// Candidate weight URLs for `model`, tagged with the pattern that found them.
pub fn extract_tagged(content: &str, model: &str) -> Vec<(HubconfPattern, String)> {
    let mut hits: Vec<(HubconfPattern, String)> = Vec::new();
    let quoted = regex::escape(model);

    if let Some(dict) = MODEL_URLS_DICT.captures(content).and_then(|c| c.get(1)) {
        for entry in DICT_ENTRY.captures_iter(dict.as_str()) {
            let key = &entry[1];
            if key == model || model.contains(key) {
                hits.push((HubconfPattern::ModelUrlsDict, entry[2].to_string()));
            }
        }
    }

    if let Ok(named) = Regex::new(&format!(r#"{}_url\s*=\s*['"](https?://[^'"]+)['"]"#, quoted)) {
        for c in named.captures_iter(content) {
            hits.push((HubconfPattern::NamedUrlVariable, c[1].to_string()));
        }
    }

    if let Ok(weights) = Regex::new(&format!(
        r#"(?i)class\s+{}.*?Weights.*?url\s*=\s*['"](https?://[^'"]+)['"]"#,
        quoted
    )) {
        for c in weights.captures_iter(content) {
            hits.push((HubconfPattern::WeightsClass, c[1].to_string()));
        }
    }

    // Only URLs inside the body of `def <model>` count.
    if let Ok(function) = Regex::new(&format!(r"(?s)def\s+{}\b[^:]*:(.*?)(?:\ndef\s|\z)", quoted)) {
        for body in function.captures_iter(content) {
            for c in LOAD_STATE_DICT.captures_iter(&body[1]) {
                hits.push((HubconfPattern::LoadStateDictInFunction, c[1].to_string()));
            }
        }
    }

    if hits.is_empty() {
        let last_segment = model.rsplit('/').next().unwrap_or(model);
        if let Some((_, url)) = KNOWN_CHECKPOINTS
            .iter()
            .find(|(name, _)| *name == model || *name == last_segment)
        {
            hits.push((HubconfPattern::KnownCheckpoint, url.to_string()));
        }
    }

    let mut seen = std::collections::HashSet::new();
    hits.retain(|(_, url)| seen.insert(url.clone()));
    hits
}

/// De-duplicated candidate URLs for `model`, in priority order.
pub fn extract_urls(content: &str, model: &str) -> Vec<String> {
    extract_tagged(content, model)
        .into_iter()
        .map(|(_, url)| url)
        .collect()
}

/// File name of a weight URL with any query string removed.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUBCONF: &str = r#"
dependencies = ['torch']

model_urls = {
    'resnet18': 'https://download.pytorch.org/models/resnet18-5c106cde.pth',
    'resnet50': 'https://download.pytorch.org/models/resnet50-19c8e357.pth',
}

deeplab_url = "https://example.com/deeplab.pth"

def fcn(pretrained=False):
    model = build()
    state = load_state_dict_from_url('https://example.com/fcn.pth')
    return model

def other():
    return load_state_dict_from_url('https://example.com/other.pth')
"#;

    #[test]
    fn test_model_urls_dict() {
        let urls = extract_urls(HUBCONF, "resnet50");
        assert_eq!(
            urls,
            vec!["https://download.pytorch.org/models/resnet50-19c8e357.pth"]
        );
    }

    #[test]
    fn test_named_variable() {
        let tagged = extract_tagged(HUBCONF, "deeplab");
        assert_eq!(
            tagged,
            vec![(
                HubconfPattern::NamedUrlVariable,
                "https://example.com/deeplab.pth".to_string()
            )]
        );
    }

    #[test]
    fn test_load_state_dict_scoped_to_function() {
        assert_eq!(extract_urls(HUBCONF, "fcn"), vec!["https://example.com/fcn.pth"]);
    }

    #[test]
    fn test_weights_class() {
        let content = r#"class ResNet50_Weights(WeightsEnum): IMAGENET1K_V1 = Weights(url="https://x.org/r50.pth")"#;
        assert_eq!(extract_urls(content, "resnet50"), vec!["https://x.org/r50.pth"]);
    }

    #[test]
    fn test_known_fallback_and_dedup() {
        assert_eq!(
            extract_urls("", "vgg16"),
            vec!["https://download.pytorch.org/models/vgg16-397923af.pth"]
        );
        let dup = "a_url = 'https://x/a.pth'\na_url = 'https://x/a.pth'";
        assert_eq!(extract_urls(dup, "a").len(), 1);
        assert!(extract_urls("", "unknown_model").is_empty());
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://x/y/model.pth?dl=1"), "model.pth");
        assert_eq!(file_name_from_url("https://x/y/weights.pt"), "weights.pt");
    }
}
