//! Axon Core - headless library for acquiring ML model artifacts.
//!
//! Given an identifier such as `hf/bert-base-uncased@latest`, the library
//! picks a repository adapter, builds a manifest, fetches the artifacts with
//! mirror fallback, packages and checksums them, installs them into a local
//! content cache, and converts non-executable formats to ONNX.
//!
//! # Example
//!
//! ```rust,ignore
//! use axon_core::{AxonConfig, CancellationToken, Installer, ModelIdentifier};
//!
//! #[tokio::main]
//! async fn main() -> axon_core::Result<()> {
//!     let config = AxonConfig::load()?;
//!     let installer = Installer::from_config(&config)?;
//!
//!     let id = ModelIdentifier::parse("hf/bert-base-uncased@latest")?;
//!     let report = installer.install(&id, None, &CancellationToken::new()).await?;
//!     println!("Installed {} at {}", report.identifier, report.path.display());
//!
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod atomic;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod conversion;
pub mod error;
pub mod hashing;
pub mod identifier;
pub mod install;
pub mod manifest;
pub mod network;
pub mod package;

// Re-export commonly used types
pub use adapters::{AdapterRegistry, DynAdapter, RepositoryAdapter, SearchResult};
pub use cache::{CacheManager, CachedModel, InstallMetadata};
pub use cancel::{CancellationToken, CancelledError};
pub use config::AxonConfig;
pub use conversion::{ConversionOutcome, ConversionResult, Converter};
pub use error::{AxonError, Result};
pub use hashing::FileDigest;
pub use identifier::ModelIdentifier;
pub use install::{InstallReport, Installer};
pub use manifest::{ExecutionFormat, Manifest};
