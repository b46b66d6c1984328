//! murmurd: murmur relay daemon
//!
//! Usage:
//!   murmurd [--config murmur.toml] [--listen 0.0.0.0:8088]

use anyhow::Result;
use clap::{Parser, ValueEnum};
use murmur_core::MurmurConfig;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "murmurd", version, about = "murmur zero-knowledge chat relay")]
struct Cli {
    /// Path to murmur.toml configuration file
    #[arg(long, short = 'c', env = "MURMUR_CONFIG", default_value = "murmur.toml")]
    config: PathBuf,

    /// Listen address (overrides relay.listen)
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MURMUR_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "MURMUR_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "murmurd starting"
    );

    let mut config = load_config(&cli.config).await?;
    if let Some(listen) = cli.listen {
        config.relay.listen = listen;
    }

    murmurd::run(config.relay).await
}

async fn load_config(path: &Path) -> Result<MurmurConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        MurmurConfig::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(MurmurConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("MURMUR_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
