//! metasync -- storage-backend metadata synchronizer.
//!
//! `sync` mirrors each configured backend's buckets and objects into the
//! metadata store; `list` runs an aggregation pipeline over the stored
//! aggregates on behalf of a tenant or an administrator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use metasync::config::{Config, LoggingConfig};
use metasync::metadata::adapter;
use metasync::metadata::pipeline::Stage;
use metasync::metadata::tenant::CallContext;
use metasync::provider::aws::AwsProviderClient;
use metasync::MetadataService;

/// Command-line arguments for metasync.
#[derive(Parser, Debug)]
#[command(
    name = "metasync",
    version,
    about = "Storage-backend metadata synchronizer"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "metasync.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync metadata of every configured backend, or of one.
    Sync {
        /// Only sync the backend with this id.
        #[arg(long)]
        backend: Option<String>,

        /// Print Prometheus metrics after the run.
        #[arg(long, default_value_t = false)]
        print_metrics: bool,
    },
    /// Query stored metadata.
    List {
        /// JSON file holding the aggregation pipeline (an array of stages).
        #[arg(long)]
        pipeline: Option<PathBuf>,

        /// Tenant the query runs on behalf of.
        #[arg(long)]
        tenant: Option<String>,

        /// Run the query unscoped, across all tenants.
        #[arg(long, default_value_t = false)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = metasync::config::load_config(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    if config.observability.metrics {
        metasync::metrics::init_metrics()?;
        metasync::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store = adapter::global(&config.metadata).await?;
    let service = MetadataService::new(store, config.sync.clone());

    match cli.command {
        Command::Sync {
            backend,
            print_metrics,
        } => {
            run_sync(&config, &service, backend.as_deref()).await?;
            if print_metrics {
                match metasync::metrics::render() {
                    Some(text) => print!("{text}"),
                    None => error!("metrics are disabled in the configuration"),
                }
            }
        }
        Command::List {
            pipeline,
            tenant,
            admin,
        } => {
            let stages = match pipeline {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading pipeline {}", path.display()))?;
                    let value: serde_json::Value = serde_json::from_str(&raw)?;
                    Stage::parse_pipeline(&value)?
                }
                None => Vec::new(),
            };
            let ctx = if admin {
                Some(CallContext::admin())
            } else {
                tenant.map(CallContext::for_tenant)
            };

            let aggregates = service.list_metadata(stages, ctx.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&aggregates)?);
        }
    }

    Ok(())
}

/// Sync the selected backends one after another, stopping early on Ctrl+C.
async fn run_sync(
    config: &Config,
    service: &MetadataService,
    only: Option<&str>,
) -> anyhow::Result<()> {
    let backends: Vec<_> = match only {
        Some(id) => vec![config
            .backend(id)
            .ok_or_else(|| anyhow::anyhow!("no backend with id '{id}' in configuration"))?],
        None => config.backends.iter().collect(),
    };
    if backends.is_empty() {
        info!("No backends configured, nothing to sync");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    let mut failed = Vec::new();
    for backend in backends {
        if cancel.is_cancelled() {
            break;
        }
        let client = AwsProviderClient::new(backend).await;
        if let Err(e) = service
            .sync_metadata(&backend.identity(), Arc::new(client), &cancel)
            .await
        {
            failed.push(format!("{} ({})", backend.id, e.code()));
        }
    }

    if cancel.is_cancelled() {
        anyhow::bail!("sync interrupted");
    }
    if !failed.is_empty() {
        anyhow::bail!("sync failed for backend(s): {}", failed.join(", "));
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, cancelling sync");
        },
        _ = terminate => {
            info!("Received SIGTERM, cancelling sync");
        },
    }
}
