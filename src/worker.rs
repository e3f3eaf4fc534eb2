use log::info;
use std::time::Duration;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::Engine;

/// Runs polling cycles at a fixed interval until cancelled.
///
/// # Behavior
///
/// - Runs one full polling cycle (checks, then notification drain)
/// - Sleeps for `interval` before the next cycle
/// - Stops promptly when `token` is cancelled, including mid-sleep
pub async fn run_scheduler(engine: Engine, interval: Duration, token: CancellationToken) {
    loop {
        // Check if we should shutdown before starting a new cycle
        if token.is_cancelled() {
            info!("Shutdown requested, stopping watcher");
            break;
        }

        info!("Starting polling cycle...");
        engine.run_polling_cycle().await;

        // Interruptible sleep
        select! {
            () = sleep(interval) => {},
            () = token.cancelled() => {
                info!("Shutdown requested during sleep");
                break;
            }
        }
    }

    info!("Site watching stopped gracefully");
}
