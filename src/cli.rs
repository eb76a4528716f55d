//! Command-line interface for shot-lifter.
//!
//! Every subcommand reads the YAML config given by `--config`; upload flags
//! override the matching config values. The store client is always wrapped
//! in a [`ResilientStore`] so the CLI gets the same retry and breaker
//! behaviour as library users.

use crate::config::LifterConfig;
use crate::contract::ObjectStore;
use crate::lister::PaginatedLister;
use crate::load_config::{load_config, load_config_with};
use crate::local_fs::LocalFilesystem;
use crate::resilience::{ResiliencePolicy, ResilientStore};
use crate::store::S3Store;
use crate::synchronise::SyncEngine;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI for shot-lifter: lift screenshot trees into an object-storage bucket.
#[derive(Parser)]
#[clap(
    name = "shot-lifter",
    version,
    about = "Upload a directory of screenshot cells to an object-storage bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload every shot under the source directory, skipping existing keys
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Overrides upload.source_dir
        #[clap(long)]
        source_dir: Option<PathBuf>,
        /// Overrides upload.bucket and LIFTER_BUCKET
        #[clap(long)]
        bucket: Option<String>,
        /// Overrides upload.prefix
        #[clap(long)]
        prefix: Option<String>,
        /// Stop starting new uploads after this many seconds
        #[clap(long)]
        deadline_secs: Option<u64>,
        /// Exit non-zero if any file failed
        #[clap(long)]
        fail_on_error: bool,
    },
    /// List every key in the bucket, one per line
    List {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        prefix: Option<String>,
        #[clap(long, default_value_t = crate::lister::DEFAULT_MAX_KEYS)]
        max_keys: i32,
    },
    /// Create the configured bucket
    CreateBucket {
        #[clap(long)]
        config: PathBuf,
    },
    /// Delete the configured bucket
    DeleteBucket {
        #[clap(long)]
        config: PathBuf,
    },
    /// Download one object to a file, or to stdout
    Get {
        #[clap(long)]
        config: PathBuf,
        key: String,
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Delete one object
    Delete {
        #[clap(long)]
        config: PathBuf,
        key: String,
    },
}

async fn connect(config: &LifterConfig) -> ResilientStore<S3Store> {
    let policy = ResiliencePolicy::new(config.resilience.retry, config.resilience.breaker);
    ResilientStore::new(S3Store::connect(&config.store).await, Arc::new(policy))
}

/// Resolves on Ctrl-C or once `deadline` has passed, whichever comes first.
async fn shutdown_signal(deadline: Option<Duration>) {
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            future::pending::<()>().await;
        }
    };
    let expired = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = interrupted => tracing::warn!("Interrupted, stopping upload"),
        _ = expired => tracing::warn!("Deadline reached, stopping upload"),
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload {
            config,
            source_dir,
            bucket,
            prefix,
            deadline_secs,
            fail_on_error,
        } => {
            let mut config = load_config_with(config, bucket)?;
            if let Some(source_dir) = source_dir {
                config.upload.source_dir = source_dir;
            }
            if let Some(prefix) = prefix {
                config.upload.prefix = Some(prefix).filter(|p| !p.is_empty());
            }
            tracing::info!(command = "upload", "Starting upload");

            let store = connect(&config).await;
            let engine = SyncEngine::new(&store, &LocalFilesystem, config.upload.options());
            let report = engine
                .upload_until(
                    &config.upload.source_dir,
                    &config.upload.bucket,
                    config.upload.prefix.as_deref(),
                    shutdown_signal(deadline_secs.map(Duration::from_secs)),
                )
                .await
                .context("Upload aborted")?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            for failure in &report.failed {
                eprintln!("[FAILED] {}: {}", failure.path.display(), failure.message);
            }
            if fail_on_error && report.has_failures() {
                anyhow::bail!("{} of {} files failed", report.failed.len(), report.discovered);
            }
            Ok(())
        }
        Commands::List {
            config,
            prefix,
            max_keys,
        } => {
            let config = load_config(config)?;
            let store = connect(&config).await;
            let keys = PaginatedLister::new()
                .with_max_keys(max_keys)
                .list_all(&store, &config.upload.bucket, prefix.as_deref())
                .await
                .context("Listing failed")?;
            for key in keys {
                println!("{key}");
            }
            Ok(())
        }
        Commands::CreateBucket { config } => {
            let config = load_config(config)?;
            let store = connect(&config).await;
            store.create_bucket(&config.upload.bucket).await?;
            println!("Created bucket {}", config.upload.bucket);
            Ok(())
        }
        Commands::DeleteBucket { config } => {
            let config = load_config(config)?;
            let store = connect(&config).await;
            store.delete_bucket(&config.upload.bucket).await?;
            println!("Deleted bucket {}", config.upload.bucket);
            Ok(())
        }
        Commands::Get {
            config,
            key,
            output,
        } => {
            let config = load_config(config)?;
            let store = connect(&config).await;
            let bytes = store.get_object(&config.upload.bucket, &key).await?;
            match output {
                Some(path) => tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => std::io::stdout().write_all(&bytes)?,
            }
            Ok(())
        }
        Commands::Delete { config, key } => {
            let config = load_config(config)?;
            let store = connect(&config).await;
            store.delete_object(&config.upload.bucket, &key).await?;
            println!("Deleted {key}");
            Ok(())
        }
    }
}
