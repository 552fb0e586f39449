//! Conversion script selection and local interpreter programs.
//!
//! The container image ships one script per source family under
//! `/axon/scripts`. Locally, the same three families are expressed as inline
//! Python programs that take `(model_path, output_path, model_id)` from argv.

use crate::config::ConversionConfig;
use crate::{AxonError, Result};
use std::path::{Path, PathBuf};

pub const HUGGINGFACE_SCRIPT: &str = "convert_huggingface.py";
pub const PYTORCH_SCRIPT: &str = "convert_pytorch.py";
pub const TENSORFLOW_SCRIPT: &str = "convert_tensorflow.py";

/// Container script for a model, namespace first, then framework.
pub fn container_script(namespace: &str, framework: &str) -> &'static str {
    match namespace.to_lowercase().as_str() {
        "hf" | "huggingface" => return HUGGINGFACE_SCRIPT,
        "pytorch" => return PYTORCH_SCRIPT,
        "tfhub" | "tensorflow" => return TENSORFLOW_SCRIPT,
        // ModelScope repositories load through transformers-style APIs.
        "ms" | "modelscope" => return HUGGINGFACE_SCRIPT,
        _ => {}
    }

    match framework.to_lowercase().as_str() {
        "pytorch" | "torch" => PYTORCH_SCRIPT,
        "tensorflow" | "tf" => TENSORFLOW_SCRIPT,
        _ => HUGGINGFACE_SCRIPT,
    }
}

/// Families of local conversion programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalScript {
    /// transformers `AutoModel` export.
    HuggingFace,
    /// Pickled `torch.nn.Module` export.
    Tensor,
    /// SavedModel export through tf2onnx.
    Graph,
}

impl LocalScript {
    /// Case-insensitive framework match.
    pub fn for_framework(framework: &str) -> Result<Self> {
        match framework.trim().to_lowercase().as_str() {
            "huggingface" | "transformers" => Ok(LocalScript::HuggingFace),
            "pytorch" | "torch" => Ok(LocalScript::Tensor),
            "tensorflow" | "tf" => Ok(LocalScript::Graph),
            _ => Err(AxonError::ConversionUnsupported {
                framework: framework.to_string(),
            }),
        }
    }

    fn program(&self) -> &'static str {
        match self {
            LocalScript::HuggingFace => HUGGINGFACE_PROGRAM,
            LocalScript::Tensor => TENSOR_PROGRAM,
            LocalScript::Graph => GRAPH_PROGRAM,
        }
    }

    /// Interpreter arguments for converting `model_dir` into `output_path`.
    pub fn args(&self, model_dir: &Path, output_path: &Path, model_id: &str) -> Vec<String> {
        let model_path = match self {
            LocalScript::Tensor => find_weights_file(model_dir).unwrap_or_else(|| model_dir.to_path_buf()),
            _ => model_dir.to_path_buf(),
        };
        vec![
            "-c".to_string(),
            self.program().to_string(),
            model_path.to_string_lossy().into_owned(),
            output_path.to_string_lossy().into_owned(),
            model_id.to_string(),
        ]
    }
}

/// Whether any conversion path exists for `framework`.
pub fn can_convert(framework: &str) -> bool {
    let lower = framework.trim().to_lowercase();
    lower == "onnx" || LocalScript::for_framework(&lower).is_ok()
}

/// First PyTorch checkpoint in `dir`, by name.
fn find_weights_file(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e, "pth" | "pt" | "bin"))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// `docker run` arguments with every path mapped under the container mount.
///
/// The model directory's parent is mounted, so `model_dir` and `output_path`
/// become absolute in-container paths. Relative paths would be read as hub
/// identifiers by the export tooling.
pub fn container_args(
    image: &str,
    script: &str,
    mount_source: &Path,
    model_rel: &str,
    output_rel: &str,
    model_id: &str,
) -> Vec<String> {
    let mount = ConversionConfig::CONTAINER_MOUNT;
    vec![
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{}:{}", mount_source.display(), mount),
        "-w".to_string(),
        mount.to_string(),
        image.to_string(),
        format!("{}/{}", ConversionConfig::CONTAINER_SCRIPTS_DIR, script),
        format!("{}/{}", mount, model_rel),
        format!("{}/{}", mount, output_rel),
        model_id.to_string(),
    ]
}

const HUGGINGFACE_PROGRAM: &str = r#"
import os
import sys
try:
    from transformers import AutoModel
    import torch
except ImportError as e:
    print('ERROR: Missing dependency:', e)
    print('Install with: pip install transformers torch')
    sys.exit(1)

model_path, output_path, model_id = sys.argv[1], sys.argv[2], sys.argv[3]
os.makedirs(os.path.dirname(output_path) or '.', exist_ok=True)
try:
    model = AutoModel.from_pretrained(model_path, local_files_only=True)
except Exception as e:
    print('Local load failed, trying hub:', e)
    model = AutoModel.from_pretrained(model_id)
model.eval()
config = model.config
seq_len = min(128, getattr(config, 'max_position_embeddings', 128))
vocab_size = getattr(config, 'vocab_size', 30522)
dummy_input = torch.randint(0, vocab_size, (1, seq_len))
torch.onnx.export(model, dummy_input, output_path,
    input_names=['input_ids'], output_names=['output'],
    dynamic_axes={'input_ids': {0: 'batch_size'}, 'output': {0: 'batch_size'}},
    opset_version=12, do_constant_folding=True)
print('SUCCESS')
"#;

const TENSOR_PROGRAM: &str = r#"
import os
import sys
try:
    import torch
except ImportError as e:
    print('ERROR: Missing dependency:', e)
    sys.exit(1)

model_path, output_path = sys.argv[1], sys.argv[2]
os.makedirs(os.path.dirname(output_path) or '.', exist_ok=True)
if os.path.isdir(model_path):
    print('ERROR: no checkpoint file found in', model_path)
    sys.exit(1)
model = torch.load(model_path, map_location='cpu', weights_only=False)
if not isinstance(model, torch.nn.Module):
    print('ERROR: checkpoint is a state dict, not a module')
    sys.exit(1)
model.eval()
torch.onnx.export(model, torch.randn(1, 3, 224, 224), output_path, opset_version=12)
print('SUCCESS')
"#;

const GRAPH_PROGRAM: &str = r#"
import os
import subprocess
import sys
import tarfile
import tempfile
try:
    import tf2onnx  # noqa: F401
except ImportError as e:
    print('ERROR: Missing dependency:', e)
    print('Install with: pip install tf2onnx tensorflow')
    sys.exit(1)

model_path, output_path = sys.argv[1], sys.argv[2]
source = model_path
archive = os.path.join(model_path, 'model.tar.gz')
if os.path.isfile(archive):
    source = tempfile.mkdtemp(prefix='axon-tf-')
    with tarfile.open(archive) as tar:
        tar.extractall(source)
sys.exit(subprocess.call([sys.executable, '-m', 'tf2onnx.convert',
    '--saved-model', source, '--output', output_path, '--opset', '13']))
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_namespace_takes_precedence() {
        assert_eq!(container_script("hf", "PyTorch"), HUGGINGFACE_SCRIPT);
        assert_eq!(container_script("pytorch", "transformers"), PYTORCH_SCRIPT);
        assert_eq!(container_script("tfhub", ""), TENSORFLOW_SCRIPT);
        assert_eq!(container_script("ms", "PyTorch"), HUGGINGFACE_SCRIPT);
    }

    #[test]
    fn test_framework_fallback() {
        assert_eq!(container_script("local", "Torch"), PYTORCH_SCRIPT);
        assert_eq!(container_script("local", "TF"), TENSORFLOW_SCRIPT);
        assert_eq!(container_script("local", "jax"), HUGGINGFACE_SCRIPT);
    }

    #[test]
    fn test_local_script_match() {
        assert_eq!(
            LocalScript::for_framework("Transformers").unwrap(),
            LocalScript::HuggingFace
        );
        assert_eq!(LocalScript::for_framework("PyTorch").unwrap(), LocalScript::Tensor);
        assert_eq!(LocalScript::for_framework("TensorFlow").unwrap(), LocalScript::Graph);
        assert!(matches!(
            LocalScript::for_framework("Replicate"),
            Err(AxonError::ConversionUnsupported { .. })
        ));
    }

    #[test]
    fn test_can_convert() {
        assert!(can_convert("ONNX"));
        assert!(can_convert("pytorch"));
        assert!(!can_convert(""));
        assert!(!can_convert("jax"));
    }

    #[test]
    fn test_tensor_args_pick_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("resnet18.pth"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("manifest.yaml"), b"x").unwrap();

        let out = temp_dir.path().join("model.onnx");
        let args = LocalScript::Tensor.args(temp_dir.path(), &out, "vision/resnet18");
        assert_eq!(args[0], "-c");
        assert!(args[2].ends_with("resnet18.pth"));
        assert_eq!(args[4], "vision/resnet18");
    }

    #[test]
    fn test_container_args_are_absolute() {
        let args = container_args(
            "image:tag",
            HUGGINGFACE_SCRIPT,
            Path::new("/cache/models/hf/bert"),
            "latest",
            "latest/model.onnx",
            "bert",
        );
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-v",
                "/cache/models/hf/bert:/axon/cache",
                "-w",
                "/axon/cache",
                "image:tag",
                "/axon/scripts/convert_huggingface.py",
                "/axon/cache/latest",
                "/axon/cache/latest/model.onnx",
                "bert",
            ]
        );
    }
}
