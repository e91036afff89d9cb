use crate::services::upload_service::DEFAULT_PROGRESS_INTERVAL_MS;
use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub downloads_dir: String,
    pub progress_interval_ms: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Streaming file-upload server with realtime progress")]
pub struct Args {
    /// Host to bind to (overrides FILEDROP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEDROP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded files are stored (overrides FILEDROP_DOWNLOADS_DIR)
    #[arg(long)]
    pub downloads_dir: Option<String>,

    /// Minimum milliseconds between progress events (overrides FILEDROP_PROGRESS_INTERVAL_MS)
    #[arg(long)]
    pub progress_interval_ms: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILEDROP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("FILEDROP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILEDROP_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILEDROP_PORT"),
        };
        let env_downloads =
            env::var("FILEDROP_DOWNLOADS_DIR").unwrap_or_else(|_| "./downloads".into());
        let env_interval = match env::var("FILEDROP_PROGRESS_INTERVAL_MS") {
            Ok(value) => value.parse::<u64>().with_context(|| {
                format!("parsing FILEDROP_PROGRESS_INTERVAL_MS value `{}`", value)
            })?,
            Err(env::VarError::NotPresent) => DEFAULT_PROGRESS_INTERVAL_MS,
            Err(err) => return Err(err).context("reading FILEDROP_PROGRESS_INTERVAL_MS"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            downloads_dir: args.downloads_dir.unwrap_or(env_downloads),
            progress_interval_ms: args.progress_interval_ms.unwrap_or(env_interval),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
