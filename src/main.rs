use log::info;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sitewatch::Engine;
use sitewatch::config::{self, Config};

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(config::default_path, PathBuf::from);
    let config = Config::load(&config_path).expect("Failed to load configuration");

    info!("Watching {} targets", config.targets.len());
    info!("Check interval: {} seconds", config.config.check_interval_secs);
    info!("Request timeout: {} seconds", config.config.request_timeout_secs);

    let interval = Duration::from_secs(config.config.check_interval_secs);
    let engine = Engine::from_config(config)
        .await
        .expect("Failed to build engine");

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            signal_token.cancel();
        }
    });

    sitewatch::worker::run_scheduler(engine, interval, token).await;
}
