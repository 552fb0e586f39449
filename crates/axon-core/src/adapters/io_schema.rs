//! Tensor schema inference from a Hugging Face `config.json`.
//!
//! Only `model_type` is consulted. Unknown types get a generic
//! `float32 [-1, -1]` input and output.

use crate::manifest::{Io, Preprocessing, TensorSpec};
use crate::Result;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Architecture families with a known tensor layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// BERT-style encoders with segment ids.
    Encoder,
    Gpt,
    T5,
    Vision,
    Unknown,
}

impl ModelFamily {
    pub fn from_model_type(model_type: &str) -> Self {
        match model_type.to_lowercase().as_str() {
            "bert" | "roberta" | "distilbert" | "albert" | "electra" => ModelFamily::Encoder,
            "gpt2" | "gpt" | "gpt-neo" | "gpt-j" => ModelFamily::Gpt,
            "t5" | "mt5" | "ul2" => ModelFamily::T5,
            "vit" | "deit" | "swin" => ModelFamily::Vision,
            _ => ModelFamily::Unknown,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigJson {
    #[serde(default)]
    model_type: Option<String>,
}

/// Parse `config.json` bytes and infer the I/O schema.
pub fn io_from_config_bytes(data: &[u8]) -> Result<Io> {
    let config: ConfigJson = serde_json::from_slice(data)?;
    let model_type = config.model_type.unwrap_or_else(|| "unknown".to_string());
    Ok(io_for_model_type(&model_type))
}

/// I/O schema for a `model_type` string.
pub fn io_for_model_type(model_type: &str) -> Io {
    let model_type = model_type.to_lowercase();
    Io {
        inputs: inputs_for(&model_type),
        outputs: outputs_for(&model_type),
    }
}

/// The schema used when nothing is known about the model.
pub fn generic_io() -> Io {
    Io {
        inputs: vec![TensorSpec::new("input", "float32", &[-1, -1])],
        outputs: vec![TensorSpec::new("output", "float32", &[-1, -1])],
    }
}

fn tokenized(name: &str, description: &str, tokenizer_type: &str) -> TensorSpec {
    TensorSpec::new(name, "int64", &[-1, -1])
        .with_description(description)
        .with_preprocessing(Preprocessing {
            kind: "tokenization".to_string(),
            tokenizer: Some(TOKENIZER_FILE.to_string()),
            tokenizer_type: Some(tokenizer_type.to_string()),
            config: BTreeMap::new(),
        })
}

fn text_inputs(tokenizer_type: &str, with_segments: bool) -> Vec<TensorSpec> {
    let mut inputs = vec![
        tokenized("input_ids", "Token IDs from tokenizer", tokenizer_type),
        tokenized("attention_mask", "Attention mask", tokenizer_type),
    ];
    if with_segments {
        inputs.push(tokenized(
            "token_type_ids",
            "Token type IDs (segment IDs)",
            tokenizer_type,
        ));
    }
    inputs
}

fn inputs_for(model_type: &str) -> Vec<TensorSpec> {
    match ModelFamily::from_model_type(model_type) {
        ModelFamily::Encoder => text_inputs(model_type, true),
        ModelFamily::Gpt => text_inputs("gpt2", false),
        ModelFamily::T5 => text_inputs("t5", false),
        ModelFamily::Vision => {
            let mut config = BTreeMap::new();
            config.insert("mean".to_string(), json!([0.485, 0.456, 0.406]));
            config.insert("std".to_string(), json!([0.229, 0.224, 0.225]));
            config.insert("resize".to_string(), json!(224));
            vec![TensorSpec::new("pixel_values", "float32", &[-1, 3, 224, 224])
                .with_description("Preprocessed image pixels")
                .with_preprocessing(Preprocessing {
                    kind: "normalization".to_string(),
                    tokenizer: None,
                    tokenizer_type: None,
                    config,
                })]
        }
        ModelFamily::Unknown => vec![
            TensorSpec::new("input", "float32", &[-1, -1]).with_description("Model input"),
        ],
    }
}

fn outputs_for(model_type: &str) -> Vec<TensorSpec> {
    // Only the base names of the GPT and T5 families get sequence logits.
    let sequence_logits = matches!(
        model_type,
        "bert" | "roberta" | "distilbert" | "albert" | "electra" | "gpt2" | "gpt" | "t5"
    );
    if sequence_logits {
        return vec![
            TensorSpec::new("logits", "float32", &[-1, -1, -1]).with_description("Model logits"),
        ];
    }
    if ModelFamily::from_model_type(model_type) == ModelFamily::Vision {
        return vec![TensorSpec::new("logits", "float32", &[-1, -1]).with_description("Class logits")];
    }
    vec![TensorSpec::new("output", "float32", &[-1, -1]).with_description("Model output")]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(specs: &[TensorSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_bert_family() {
        let io = io_from_config_bytes(br#"{"model_type": "bert", "hidden_size": 768}"#).unwrap();
        assert_eq!(
            names(&io.inputs),
            vec!["input_ids", "attention_mask", "token_type_ids"]
        );
        let pre = io.inputs[0].preprocessing.as_ref().unwrap();
        assert_eq!(pre.kind, "tokenization");
        assert_eq!(pre.tokenizer_type.as_deref(), Some("bert"));
        assert_eq!(io.outputs[0].shape, vec![-1, -1, -1]);
    }

    #[test]
    fn test_gpt_and_t5() {
        let io = io_for_model_type("gpt-neo");
        assert_eq!(names(&io.inputs), vec!["input_ids", "attention_mask"]);
        assert_eq!(
            io.inputs[0].preprocessing.as_ref().unwrap().tokenizer_type.as_deref(),
            Some("gpt2")
        );
        // gpt-neo is not one of the sequence-logit base names
        assert_eq!(io.outputs[0].name, "output");

        let io = io_for_model_type("T5");
        assert_eq!(
            io.inputs[1].preprocessing.as_ref().unwrap().tokenizer_type.as_deref(),
            Some("t5")
        );
        assert_eq!(io.outputs[0].name, "logits");
    }

    #[test]
    fn test_vision() {
        let io = io_for_model_type("vit");
        assert_eq!(io.inputs[0].shape, vec![-1, 3, 224, 224]);
        let pre = io.inputs[0].preprocessing.as_ref().unwrap();
        assert_eq!(pre.config["resize"], json!(224));
        assert_eq!(io.outputs[0].shape, vec![-1, -1]);
        assert_eq!(io.outputs[0].description.as_deref(), Some("Class logits"));
    }

    #[test]
    fn test_unknown_and_missing_type() {
        let io = io_from_config_bytes(b"{}").unwrap();
        assert_eq!(names(&io.inputs), vec!["input"]);
        assert_eq!(names(&io.outputs), vec!["output"]);
        assert!(io_from_config_bytes(b"not json").is_err());
    }
}
