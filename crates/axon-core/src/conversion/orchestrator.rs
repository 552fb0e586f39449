//! The conversion ladder: pre-converted download, container, local interpreter.
//!
//! Each rung is best-effort. A miss or a broken rung is logged and the next
//! one is tried. Only the last rung can fail the conversion, and a missing
//! interpreter there is a skip rather than an error.

use super::classify::classify;
use super::process::{DynProcessRunner, TokioProcessRunner};
use super::scripts::{container_args, container_script, LocalScript};
use super::types::{ConversionOutcome, ConversionRequest, ConversionResult, ConversionStrategy};
use super::validate::validate_artifact;
use crate::cancel::CancellationToken;
use crate::config::{AdapterDefaults, ConversionConfig};
use crate::error::IoResultExt;
use crate::manifest::is_execution_ready;
use crate::network::{Downloader, HttpClient};
use crate::{AxonError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespaces whose hub sometimes hosts a ready ONNX export.
const PRECONVERTED_NAMESPACES: &[&str] = &["hf", "huggingface"];

/// Conventional ONNX locations for a Hugging Face repository.
pub fn preconverted_urls(base_url: &str, namespace: &str, model_id: &str) -> Vec<String> {
    if !PRECONVERTED_NAMESPACES.contains(&namespace) || model_id.is_empty() {
        return Vec::new();
    }
    let base = base_url.trim_end_matches('/');
    vec![
        format!("{}/{}/resolve/main/{}", base, model_id, ConversionConfig::ONNX_FILENAME),
        format!(
            "{}/{}/resolve/main/{}/{}",
            base,
            model_id,
            ConversionConfig::ONNX_SUBDIR,
            ConversionConfig::ONNX_FILENAME
        ),
    ]
}

/// Drives a cached model toward ONNX.
#[derive(Clone)]
pub struct Converter {
    runner: DynProcessRunner,
    downloader: Downloader,
    image: String,
    runtime: String,
    interpreter: String,
    preconverted_base: String,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("image", &self.image)
            .field("runtime", &self.runtime)
            .field("interpreter", &self.interpreter)
            .field("preconverted_base", &self.preconverted_base)
            .finish()
    }
}

impl Converter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            runner: Arc::new(TokioProcessRunner),
            downloader: Downloader::new(Arc::new(HttpClient::new()?)),
            image: ConversionConfig::converter_image(),
            runtime: ConversionConfig::CONTAINER_RUNTIME.to_string(),
            interpreter: ConversionConfig::LOCAL_INTERPRETER.to_string(),
            preconverted_base: AdapterDefaults::HUGGINGFACE_BASE.to_string(),
        })
    }

    pub fn with_runner(mut self, runner: DynProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_preconverted_base(mut self, base_url: impl Into<String>) -> Self {
        self.preconverted_base = base_url.into();
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Run the ladder for `request`.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome> {
        if request
            .execution_format
            .as_deref()
            .map(is_execution_ready)
            .unwrap_or(false)
        {
            debug!("{} is already execution-ready", request.model_id);
            return Ok(ConversionOutcome::NotNeeded);
        }

        if let Some(result) = self.try_preconverted(request, cancel).await? {
            return Ok(converted(ConversionStrategy::PreConverted, result));
        }
        if let Some(result) = self.try_container(request, cancel).await? {
            return Ok(converted(ConversionStrategy::Container, result));
        }
        self.try_local_interpreter(request, cancel).await
    }

    async fn try_preconverted(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<ConversionResult>> {
        let output = request.output_path();
        for url in preconverted_urls(&self.preconverted_base, &request.namespace, &request.model_id) {
            match self.downloader.download(&url, &output, None, cancel).await {
                Ok(bytes) => {
                    info!("Downloaded pre-converted ONNX from {} ({} bytes)", url, bytes);
                    match self.accept_output(request) {
                        Some(result) => return Ok(Some(result)),
                        None => {
                            let _ = tokio::fs::remove_file(&output).await;
                        }
                    }
                }
                Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
                Err(e) => debug!("No pre-converted ONNX at {}: {}", url, e),
            }
        }
        Ok(None)
    }

    /// Whether the container runtime answers `version`.
    pub async fn container_available(&self, cancel: &CancellationToken) -> Result<bool> {
        if self.runner.locate(&self.runtime).is_none() {
            return Ok(false);
        }
        match self
            .runner
            .run(&self.runtime, &["version".to_string()], cancel)
            .await
        {
            Ok(output) => Ok(output.success()),
            Err(AxonError::Cancelled) => Err(AxonError::Cancelled),
            Err(e) => {
                debug!("{} version failed: {}", self.runtime, e);
                Ok(false)
            }
        }
    }

    /// Make sure the converter image is present locally, pulling if needed.
    pub async fn ensure_image(&self, cancel: &CancellationToken) -> Result<()> {
        let listed = self
            .runner
            .run(
                &self.runtime,
                &["images".to_string(), "-q".to_string(), self.image.clone()],
                cancel,
            )
            .await?;
        if listed.success() && !listed.stdout.trim().is_empty() {
            return Ok(());
        }
        self.pull_image(cancel).await
    }

    async fn pull_image(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Pulling converter image {} (first use only)", self.image);
        let pulled = self
            .runner
            .run(&self.runtime, &["pull".to_string(), self.image.clone()], cancel)
            .await?;
        if pulled.success() {
            Ok(())
        } else {
            Err(AxonError::ConversionFailed {
                message: format!("Failed to pull {}: {}", self.image, pulled.combined().trim()),
            })
        }
    }

    async fn try_container(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<ConversionResult>> {
        if !self.container_available(cancel).await? {
            debug!("Container runtime unavailable, skipping container conversion");
            return Ok(None);
        }
        match self.ensure_image(cancel).await {
            Ok(()) => {}
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => {
                warn!("Converter image unavailable: {}, falling back", e);
                return Ok(None);
            }
        }

        let args = match self.container_invocation(request) {
            Ok(args) => args,
            Err(e) => {
                warn!("Cannot map {} into the container: {}", request.model_dir.display(), e);
                return Ok(None);
            }
        };

        info!(
            "Converting {} in container {} ({})",
            request.model_id,
            self.image,
            container_script(&request.namespace, &request.framework)
        );
        let mut output = match self.runner.run(&self.runtime, &args, cancel).await {
            Ok(output) => output,
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => {
                warn!("Container conversion could not start: {}, falling back", e);
                return Ok(None);
            }
        };
        if !output.success() && output.combined().contains("Unable to find image") {
            if let Err(e) = self.pull_image(cancel).await {
                if matches!(e, AxonError::Cancelled) {
                    return Err(e);
                }
                warn!("{}, falling back", e);
                return Ok(None);
            }
            output = match self.runner.run(&self.runtime, &args, cancel).await {
                Ok(output) => output,
                Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
                Err(e) => {
                    warn!("Container conversion retry could not start: {}, falling back", e);
                    return Ok(None);
                }
            };
        }
        if !output.success() {
            warn!(
                "Container conversion failed (exit {:?}): {}",
                output.code,
                output.combined().trim()
            );
            return Ok(None);
        }

        Ok(self.accept_output(request))
    }

    fn container_invocation(&self, request: &ConversionRequest) -> Result<Vec<String>> {
        let model_dir = std::fs::canonicalize(&request.model_dir).with_path(&request.model_dir)?;
        let (Some(mount_source), Some(dir_name)) = (model_dir.parent(), model_dir.file_name())
        else {
            return Err(AxonError::Validation {
                field: "model_dir".to_string(),
                message: format!("{} has no parent to mount", model_dir.display()),
            });
        };
        let model_rel = dir_name.to_string_lossy().into_owned();
        let output_rel = format!("{}/{}", model_rel, ConversionConfig::ONNX_FILENAME);

        Ok(container_args(
            &self.image,
            container_script(&request.namespace, &request.framework),
            mount_source,
            &model_rel,
            &output_rel,
            &request.model_id,
        ))
    }

    async fn try_local_interpreter(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome> {
        let Some(interpreter) = self.runner.locate(&self.interpreter) else {
            warn!(
                "{} not found, skipping ONNX conversion of {}",
                self.interpreter, request.model_id
            );
            return Ok(ConversionOutcome::Skipped {
                reason: format!(
                    "no container runtime or {} available for conversion",
                    self.interpreter
                ),
            });
        };

        let script = LocalScript::for_framework(&request.framework)?;
        let output_path = request.output_path();
        let args = script.args(&request.model_dir, &output_path, &request.model_id);
        info!(
            "Converting {} with local {} ({:?})",
            request.model_id,
            self.interpreter,
            script
        );

        let output = self
            .runner
            .run(&interpreter.to_string_lossy(), &args, cancel)
            .await?;
        if !output.success() {
            return Err(AxonError::ConversionFailed {
                message: format!(
                    "{} exited with {:?}: {}",
                    self.interpreter,
                    output.code,
                    output.combined().trim()
                ),
            });
        }

        let result = classify(&request.model_dir, &output_path)?;
        if !result.success {
            return Err(AxonError::ConversionFailed {
                message: format!(
                    "conversion reported success but produced no ONNX file: {}",
                    output.combined().trim()
                ),
            });
        }
        for file in &result.all_files {
            validate_artifact(file)?;
        }
        Ok(converted(ConversionStrategy::LocalInterpreter, result))
    }

    /// Classify and validate whatever a rung produced; `None` when unusable.
    fn accept_output(&self, request: &ConversionRequest) -> Option<ConversionResult> {
        let result = match classify(&request.model_dir, &request.output_path()) {
            Ok(result) if result.success => result,
            Ok(_) => {
                warn!("No ONNX output found in {}", request.model_dir.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to classify {}: {}", request.model_dir.display(), e);
                return None;
            }
        };
        for file in &result.all_files {
            if let Err(e) = validate_artifact(file) {
                warn!("Rejecting conversion output: {}", e);
                return None;
            }
        }
        Some(result)
    }
}

fn converted(strategy: ConversionStrategy, result: ConversionResult) -> ConversionOutcome {
    info!(
        "Conversion via {} produced {} file(s) ({})",
        strategy,
        result.all_files.len(),
        result.architecture
    );
    ConversionOutcome::Converted { strategy, result }
}
