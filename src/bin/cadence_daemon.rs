//! Headless background controller.
//!
//! Runs the alarm scheduler and signal dispatcher against logging
//! collaborators until Ctrl+C. All tracing output goes to stderr.

use cadence::control::HeadlessCollaborators;
use cadence::{CadenceConfig, daemon};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Background alarm scheduling and control-signal dispatch.
#[derive(Parser)]
#[command(name = "cadence-daemon", version, about)]
struct Cli {
    /// Path to TOML configuration file (default: platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start as an unregistered session; timers stay deferred until
    /// registration completes (see `--register-after`).
    #[arg(long)]
    unregistered: bool,

    /// With `--unregistered`, complete registration after this many seconds.
    /// Without it the session stays unregistered for the whole run.
    #[arg(long, value_name = "SECS", requires = "unregistered")]
    register_after: Option<u64>,

    /// JSON file with an array of survey definitions served to survey checks.
    #[arg(long)]
    surveys: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(CadenceConfig::default_config_path);
    let config = CadenceConfig::load_or_default(&config_path)?;
    info!(config = %config_path.display(), "cadence-daemon starting");

    let headless = HeadlessCollaborators::new(!cli.unregistered);
    if let Some(path) = cli.surveys {
        headless.surveys.set_documents(load_survey_documents(&path)?);
    }

    let registration = Arc::new(Notify::new());
    if let Some(secs) = cli.register_after {
        let session = Arc::clone(&headless.session);
        let registration = Arc::clone(&registration);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("completing session registration");
            session.set_registered(true);
            registration.notify_one();
        });
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    daemon::run(config, headless.collaborators(), registration, cancel)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "cadence-daemon exited with error");
            anyhow::anyhow!("cadence-daemon failed: {e}")
        })?;

    info!("cadence-daemon shut down cleanly");
    Ok(())
}

/// Each array element becomes one raw survey document.
fn load_survey_documents(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&text)?;
    Ok(values.iter().map(serde_json::Value::to_string).collect())
}
