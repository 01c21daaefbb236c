use crate::runtime::DockerRuntime;
use crate::updater::DockerUpdater;
use anyhow::Context;
use std::env;
use tracing::{info, warn};
use tracing_subscriber;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod error;
mod image_reference;
mod model;
mod mounts;
mod runtime;
mod secret_string;
mod updater;
mod wait;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting lighthouse-updater {}", env!("CARGO_PKG_VERSION"));

    let config_path =
        env::var("CONFIG_PATH").unwrap_or_else(|_| "/config/config.yaml".to_string());
    let config = config::load_config(&config_path)?;

    let updates_path = env::args()
        .nth(1)
        .or_else(|| env::var("UPDATES_PATH").ok())
        .context("No updates file given, pass it as first argument or set UPDATES_PATH")?;
    let updates = config::load_updates(&updates_path)?;

    let updater = DockerUpdater::new(DockerRuntime::connect()?, config)
        .context("Invalid updater configuration")?;
    updater.runtime().log_server_version().await?;

    tokio::select! {
        result = updater.rebuild_containers(&updates) => {
            let report = result.context("Rebuild failed")?;
            if !report.is_clean() {
                warn!("Rebuild completed with warnings, see above");
            }
            info!(
                "Rebuild finished: pulled {:?}, failed pulls {:?}, updater {:?} exited with {:?}",
                report.pulled_images, report.failed_pulls, report.updater_container, report.exit_code
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning rebuild");
            anyhow::bail!("Rebuild interrupted");
        }
    }

    Ok(())
}
