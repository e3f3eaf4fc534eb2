use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Write as _, fs};
use url::Url;

use crate::config::{Contact, WatchKind, WatchTarget, WatchUrl};
use crate::error::Error;
use crate::fetch::Fetcher;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::store::{NotificationQueue, SuspensionEntry, SuspensionStore};

/// Result of evaluating one watch condition against a fetched body.
enum CheckOutcome {
    /// The expected value is still present; nothing to do.
    Clear,
    /// The condition fired; carries the alert description and the body for
    /// optional archival.
    Fired { description: String, body: String },
}

/// Runs the fan-out phase of a polling cycle: every un-suspended
/// (target, URL) pair is fetched and evaluated concurrently, firing
/// notifications and suspensions into the store.
pub struct SiteChecker {
    targets: Vec<WatchTarget>,
    contacts: HashMap<String, Contact>,
    default_suspension: Duration,
    retry: RetryPolicy,
    fetcher: Arc<dyn Fetcher>,
    suspensions: Arc<dyn SuspensionStore>,
    queue: Arc<dyn NotificationQueue>,
}

impl SiteChecker {
    pub fn new(
        targets: Vec<WatchTarget>,
        contacts: HashMap<String, Contact>,
        default_suspension: Duration,
        retry: RetryPolicy,
        fetcher: Arc<dyn Fetcher>,
        suspensions: Arc<dyn SuspensionStore>,
        queue: Arc<dyn NotificationQueue>,
    ) -> SiteChecker {
        SiteChecker {
            targets,
            contacts,
            default_suspension,
            retry,
            fetcher,
            suspensions,
            queue,
        }
    }

    /// One fan-out run. Suspension decisions are made against a single
    /// snapshot taken here; suspensions created by fired checks within this
    /// run do not suppress sibling checks. Every check failure is contained
    /// to its own (target, URL) pair.
    pub async fn run(&self) -> Result<(), Error> {
        let suspended = self.suspensions.load_active().await?;
        debug!("Loaded {} active suspensions", suspended.len());

        let mut checks = Vec::new();
        for target in &self.targets {
            debug!("Checking target {} ({} urls)", target.name, target.urls.len());
            if target.contacts.is_empty() {
                warn!("No contacts configured for watch '{}'", target.name);
            }
            for watch in &target.urls {
                if suspended.is_suspended(&target.name, &watch.url, &watch.value, watch.kind) {
                    debug!("Watch '{}' on {} is suspended, not checking", target.name, watch.url);
                } else {
                    checks.push(self.check_url(target, watch));
                }
            }
        }

        futures::future::join_all(checks).await;
        Ok(())
    }

    /// Checks a single watch URL; never propagates an error to siblings.
    async fn check_url(&self, target: &WatchTarget, watch: &WatchUrl) {
        info!(
            "Checking site {} for '{}' ({})",
            watch.url,
            watch.value,
            watch.kind.as_str()
        );
        let outcome = retry_with_backoff(&self.retry, "site fetch", Error::is_fetch_retryable, || {
            self.check_once(watch)
        })
        .await;

        match outcome {
            Ok(CheckOutcome::Fired { description, body }) => {
                info!("Site {}: {}. Notifying", watch.url, description);
                if let Some(log_dir) = &target.log_dir {
                    // archival is best-effort and never blocks notification
                    if let Err(err) = archive_body(log_dir, &watch.url, &body) {
                        error!("Failed to archive content of {}: {err}", watch.url);
                    }
                }
                self.notify(target, watch, &description).await;
            }
            Ok(CheckOutcome::Clear) => debug!("Site {}: no need to notify", watch.url),
            Err(err) => error!("Error checking {}: {err}", watch.url),
        }
    }

    /// One fetch-and-evaluate attempt, re-run under the retry policy.
    async fn check_once(&self, watch: &WatchUrl) -> Result<CheckOutcome, Error> {
        let response = self.fetcher.fetch(&watch.url).await?;

        // 4xx pages are still evaluated against the watched value (the page
        // showing an error page is exactly the kind of change being watched
        // for); only other error statuses fail the fetch.
        if !(400..=499).contains(&response.status) && response.status >= 400 {
            return Err(Error::HttpStatus(response.status));
        }

        match watch.kind {
            WatchKind::Text => {
                if response.body.is_empty() {
                    // an empty body suggests bot protection, not a genuine
                    // content change; retrying beats a false alert
                    return Err(Error::EmptyBody);
                }
                if response.body.contains(&watch.value) {
                    Ok(CheckOutcome::Clear)
                } else {
                    Ok(CheckOutcome::Fired {
                        description: format!(
                            "Message '{}' is not in the site's text anymore",
                            watch.value
                        ),
                        body: response.body,
                    })
                }
            }
        }
    }

    /// Enqueues one notification per contact, then records a suspension for
    /// the fired tuple. Neither a failed enqueue nor a failed suspension
    /// aborts the rest.
    async fn notify(&self, target: &WatchTarget, watch: &WatchUrl, description: &str) {
        let mut message = format!(
            "{}: Site {}: {} since {}",
            target.name,
            watch.url,
            description,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(comment) = &watch.comment {
            let _ = write!(message, " ({comment})");
        }

        for contact in &target.contacts {
            let Some(known) = self.contacts.get(contact) else {
                warn!(
                    "Contact '{contact}' of target '{}' is not configured, skipping",
                    target.name
                );
                continue;
            };
            if let Err(err) = self.queue.add(&known.id, &message).await {
                error!(
                    "Failed to enqueue notification for '{contact}' of '{}': {err}",
                    target.name
                );
            }
        }

        if let Err(err) = self.suspend(target, watch).await {
            error!(
                "Failed to suspend watch {} {}: {err}",
                target.name, watch.url
            );
        }
    }

    async fn suspend(&self, target: &WatchTarget, watch: &WatchUrl) -> Result<(), Error> {
        let duration = target
            .suspension_secs
            .map_or(self.default_suspension, Duration::from_secs);
        self.suspensions
            .suspend(SuspensionEntry {
                target: target.name.clone(),
                url: watch.url.as_str().to_string(),
                value: watch.value.clone(),
                watch_kind: watch.kind.as_str().to_string(),
                suspended_until: Utc::now() + duration,
            })
            .await
    }
}

/// Writes the fetched body to a uniquely named file under `log_dir`, prefixed
/// with a one-line comment recording the source URL.
fn archive_body(log_dir: &Path, url: &Url, body: &str) -> Result<(), Error> {
    fs::create_dir_all(log_dir)?;
    let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
    let mut path = log_dir.join(format!("{stamp}.log"));
    let mut n = 0u32;
    while path.exists() {
        n += 1;
        path = log_dir.join(format!("{stamp}-{n}.log"));
    }
    fs::write(&path, format!("<!-- FROM {url} -->\n\n{body}"))?;
    Ok(())
}
