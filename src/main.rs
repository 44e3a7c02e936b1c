mod stream;

use clap::{Parser, Subcommand};
use kestrel_core::config;
use kestrel_filter::inference::{InferenceRequest, InferenceService};
use std::io::Read;
use tracing::info;
use tracing_subscriber::{reload, EnvFilter};

#[derive(Parser)]
#[command(
    name = "kestrel",
    version,
    about = "Adaptive Kalman estimator for CPU utilization forecasting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "kestrel.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print model metadata as JSON.
    Metadata,
    /// Run one batch inference request and print the response as JSON.
    Infer {
        /// Request file. Reads stdin when omitted.
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Serve JSONL requests from stdin, one response line per request.
    Stream,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise start at "info" and switch to the configured
    // level once the config is read.
    let env_filter = EnvFilter::try_from_default_env();
    let level_from_env = env_filter.is_ok();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter.unwrap_or_else(|_| EnvFilter::new("info")))
        .with_filter_reloading();
    let filter_handle = subscriber.reload_handle();
    subscriber.init();

    let cfg = config::load(&cli.config)?;
    apply_config_level(&filter_handle, level_from_env, &cfg.service.log_level)?;

    info!("config: {}", cli.config);
    let queue_capacity = cfg.boundary.queue_capacity;
    let mut service = InferenceService::new(cfg);

    match cli.command {
        Commands::Metadata => {
            println!("{}", serde_json::to_string_pretty(&service.metadata())?);
        }
        Commands::Infer { input } => {
            let raw = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("failed to read {path}: {e}"))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let request: InferenceRequest = serde_json::from_str(&raw)?;
            service.load()?;
            let response = service.infer(&request)?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Commands::Stream => {
            service.load()?;
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            let mut writer = tokio::io::stdout();
            let summary = stream::run(service, reader, &mut writer, queue_capacity).await?;
            if summary.failed > 0 {
                info!("{} of {} requests failed", summary.failed, summary.processed + summary.failed);
            }
        }
    }

    Ok(())
}

/// Switch the log filter to `service.log_level` unless RUST_LOG chose it.
fn apply_config_level<S>(
    handle: &reload::Handle<EnvFilter, S>,
    level_from_env: bool,
    level: &str,
) -> anyhow::Result<()> {
    if !level_from_env {
        handle.reload(EnvFilter::new(level))?;
    }
    Ok(())
}
