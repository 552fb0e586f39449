//! Model manifests: types, YAML documents, validation and format helpers.

mod document;
mod format;
mod types;
mod validate;

pub use document::{parse_bytes, parse_file, to_yaml_string, write_file};
pub use format::{
    apply_execution_format, detect_execution_format, is_execution_ready, update_with_checksum,
    ExecutionFormat,
};
pub use types::*;
pub use validate::{is_safe_relative_path, validate, validate_file_paths};
