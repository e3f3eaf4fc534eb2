//! Watches configured web pages for the disappearance of expected content
//! and delivers alerts through a messaging channel, with time-bounded
//! re-alert suppression and an at-least-once persistent notification queue.

use log::error;
use std::sync::Arc;
use std::time::Duration;

pub mod checker;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod messenger;
pub mod retry;
pub mod sqlite;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use crate::checker::SiteChecker;
use crate::config::{Config, StoreConfig};
use crate::error::Error;
use crate::executor::NotificationExecutor;
use crate::fetch::HttpFetcher;
use crate::messenger::DiscordMessenger;
use crate::retry::RetryPolicy;
use crate::sqlite::SqliteStore;
use crate::store::{MemoryStore, NotificationQueue, SuspensionStore};

/// The check-and-notify engine: one instance holds the fan-out checker and
/// the queue-draining executor, sharing one persistent store.
pub struct Engine {
    checker: SiteChecker,
    executor: NotificationExecutor,
}

impl Engine {
    pub fn new(checker: SiteChecker, executor: NotificationExecutor) -> Engine {
        Engine { checker, executor }
    }

    /// Wires the engine from configuration: store backend, HTTP fetcher, and
    /// Discord webhook messenger.
    pub async fn from_config(config: Config) -> Result<Engine, Error> {
        let (suspensions, queue): (Arc<dyn SuspensionStore>, Arc<dyn NotificationQueue>) =
            match &config.store {
                StoreConfig::Sqlite { path } => {
                    let store = Arc::new(SqliteStore::connect(path).await?);
                    (store.clone(), store)
                }
                StoreConfig::Memory => {
                    let store = Arc::new(MemoryStore::new());
                    (store.clone(), store)
                }
            };

        let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
            config.config.request_timeout_secs,
        ))?);

        let webhook_url = config
            .config
            .webhook_url
            .clone()
            .ok_or_else(|| Error::Config("webhook_url is not configured".to_string()))?;
        let messenger = Arc::new(DiscordMessenger::new(webhook_url));

        let default_suspension = Duration::from_secs(config.config.suspension_secs);
        let checker = SiteChecker::new(
            config.targets,
            config.contacts,
            default_suspension,
            RetryPolicy::default(),
            fetcher,
            suspensions,
            queue.clone(),
        );
        let executor = NotificationExecutor::new(queue, messenger, RetryPolicy::default());

        Ok(Engine::new(checker, executor))
    }

    /// One full polling cycle: suspension load and concurrent checks, then a
    /// drain of the notification queue. The two phases run sequentially; a
    /// failure in either is logged and never escapes the cycle.
    pub async fn run_polling_cycle(&self) {
        if let Err(err) = self.checker.run().await {
            error!("Site check run failed: {err}");
        }
        if let Err(err) = self.executor.run().await {
            error!("Notification drain failed: {err}");
        }
    }
}
