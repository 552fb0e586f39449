//! Axon CLI - command-line front end for the model pipeline.
//!
//! Parses arguments, sets up logging, and hands each command to
//! `axon-core`. Ctrl-C cancels whatever is in flight.

use anyhow::{Context, Result};
use axon_core::network::ProgressCallback;
use axon_core::{
    AdapterRegistry, AxonConfig, CancellationToken, ConversionOutcome, Installer, ModelIdentifier,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "axon")]
#[command(about = "Acquire, verify, cache and convert ML models")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file (defaults to ~/.axon/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache root, overriding the configuration
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a model, e.g. `hf/bert-base-uncased@latest`
    Install {
        model: ModelIdentifier,
        /// Keep the downloaded format even when it is not execution-ready
        #[arg(long)]
        no_convert: bool,
    },
    /// Search every registered adapter
    Search { query: String },
    /// List installed models
    List,
    /// Show the cached manifest of an installed model
    Info { model: ModelIdentifier },
    /// Re-hash a cached package against its manifest
    Verify { model: ModelIdentifier },
    /// Convert an installed model to ONNX
    Convert { model: ModelIdentifier },
    /// Remove an installed model
    Remove { model: ModelIdentifier },
    /// Write the effective configuration to disk
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config_path = args.config.clone().unwrap_or_else(AxonConfig::default_path);
    let mut config = AxonConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    if let Some(dir) = args.cache_dir.clone() {
        config.cache_dir = dir;
    }
    debug!("Cache root: {}", config.cache_dir.display());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Install { model, no_convert } => {
            let mut installer = Installer::from_config(&config)?;
            if no_convert {
                installer = installer.without_conversion();
            }
            install(&installer, &model, &cancel).await
        }
        Command::Search { query } => search(&config, &query).await,
        Command::List => list(&config),
        Command::Info { model } => {
            let installer = Installer::from_config(&config)?;
            let manifest = installer.cache().load_manifest(&model)?;
            println!("{}", axon_core::manifest::to_yaml_string(&manifest)?);
            Ok(())
        }
        Command::Verify { model } => {
            let installer = Installer::from_config(&config)?;
            let digest = installer.cache().verify(&model)?;
            println!("{} OK ({} bytes, sha256 {})", model, digest.size, digest.sha256);
            Ok(())
        }
        Command::Convert { model } => {
            let installer = Installer::from_config(&config)?;
            let outcome = installer.convert_cached(&model, &cancel).await?;
            println!("{}: {}", model, outcome);
            Ok(())
        }
        Command::Remove { model } => {
            let installer = Installer::from_config(&config)?;
            if installer.cache().remove(&model)? {
                println!("Removed {}", model);
            } else {
                println!("{} is not installed", model);
            }
            Ok(())
        }
        Command::InitConfig => {
            config.save_to(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

fn init_logging(debug: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact();

    match EnvFilter::try_from_default_env() {
        Ok(filter) if !debug => builder.with_env_filter(filter).init(),
        _ => builder.with_max_level(log_level).init(),
    }
}

async fn install(installer: &Installer, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<()> {
    info!("Installing {}", id);

    let last_percent = AtomicU64::new(u64::MAX);
    let progress: &ProgressCallback = &move |done: u64, total: u64| {
        if total == 0 {
            return;
        }
        let percent = done * 100 / total;
        if last_percent.swap(percent / 10, Ordering::Relaxed) != percent / 10 {
            info!("Downloaded {}% ({}/{} bytes)", percent, done, total);
        }
    };

    let report = installer
        .install(id, Some(progress), cancel)
        .await
        .with_context(|| format!("installing {}", id))?;

    if report.already_installed {
        println!("{} is already installed at {}", report.identifier, report.path.display());
        return Ok(());
    }

    println!("Installed {} via {}", report.identifier, report.adapter);
    println!("  path:   {}", report.path.display());
    println!("  size:   {} bytes", report.size);
    println!("  sha256: {}", report.sha256);
    match &report.conversion {
        Some(outcome @ ConversionOutcome::Converted { result, .. }) => {
            println!("  onnx:   {}", outcome);
            if let Some(primary) = &result.primary_file {
                println!("          {}", primary.display());
            }
        }
        Some(outcome) => println!("  onnx:   {}", outcome),
        None => println!("  onnx:   not attempted"),
    }
    Ok(())
}

async fn search(config: &AxonConfig, query: &str) -> Result<()> {
    let registry = AdapterRegistry::with_defaults(config)?;
    let results = registry.search_all(query).await;
    if results.is_empty() {
        println!("No models found for '{}'", query);
        return Ok(());
    }
    for result in results {
        let version = if result.version.is_empty() {
            "latest"
        } else {
            result.version.as_str()
        };
        println!("{}/{}@{}", result.namespace, result.name, version);
        if !result.description.is_empty() {
            println!("    {}", result.description);
        }
    }
    Ok(())
}

fn list(config: &AxonConfig) -> Result<()> {
    let cache = axon_core::CacheManager::new(config.cache_dir.clone());
    let models = cache.list()?;
    if models.is_empty() {
        println!("No models installed in {}", cache.root().display());
        return Ok(());
    }
    for model in models {
        let size = cache.size(&model.identifier).unwrap_or(0);
        println!(
            "{}  {}  {} bytes",
            model.identifier,
            model.installed_at.format("%Y-%m-%d %H:%M"),
            size
        );
    }
    Ok(())
}
