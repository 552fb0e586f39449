//! ONNX conversion of cached models.
//!
//! [`Converter`] walks a fixed ladder of strategies (pre-converted download,
//! containerized conversion, local interpreter) and stops at the first that
//! yields a valid artifact. The result is classified as a single file or a
//! multi-component export, with a small JSON descriptor persisted for the
//! latter.
//!
//! # Module Organization
//!
//! - [`orchestrator`] - The strategy ladder
//! - [`process`] - Process-invocation seam over `tokio::process`
//! - [`classify`] - Single vs multi-component classification
//! - [`scripts`] - Conversion script selection and local programs
//! - [`validate`] - Size floor and header sanity checks

pub mod classify;
pub mod orchestrator;
pub mod process;
pub mod scripts;
mod types;
pub mod validate;

pub use classify::{classify, find_artifacts, read_descriptor};
pub use orchestrator::{preconverted_urls, Converter};
pub use process::{DynProcessRunner, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use scripts::{can_convert, container_script, LocalScript};
pub use types::{
    Architecture, ConversionOutcome, ConversionRequest, ConversionResult, ConversionStrategy,
    MultiComponentDescriptor,
};
pub use validate::validate_artifact;
