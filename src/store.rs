use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use url::Url;

use crate::config::WatchKind;
use crate::error::Error;

/// One queued outbound message awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub chat_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted "don't re-alert" fact for one watch tuple.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SuspensionEntry {
    pub target: String,
    pub url: String,
    pub value: String,
    pub watch_kind: String,
    pub suspended_until: DateTime<Utc>,
}

/// Immutable snapshot of the active suspensions at the start of one polling
/// run. Suspensions created during the run are deliberately not visible
/// through it; suspension decisions are made against a run-start snapshot.
pub struct SuspensionChecker {
    keys: HashSet<(String, String, String, String)>,
}

impl SuspensionChecker {
    pub fn new(entries: Vec<SuspensionEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| (entry.target, entry.url, entry.value, entry.watch_kind))
            .collect();
        SuspensionChecker { keys }
    }

    /// Exact tuple match; the URL is compared in its normalized string form.
    pub fn is_suspended(&self, target: &str, url: &Url, value: &str, kind: WatchKind) -> bool {
        self.keys.contains(&(
            target.to_string(),
            url.as_str().to_string(),
            value.to_string(),
            kind.as_str().to_string(),
        ))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Persistent set of time-bounded alert suppressions.
#[async_trait]
pub trait SuspensionStore: Send + Sync {
    /// Sweeps entries whose expiry is at or before now, then snapshots the
    /// rest. The sweep and the read observe one consistent state.
    async fn load_active(&self) -> Result<SuspensionChecker, Error>;

    /// Persists a suspension, replacing any existing entry with the same
    /// (target, url, value, kind) tuple so duplicate rows never accumulate.
    async fn suspend(&self, entry: SuspensionEntry) -> Result<(), Error>;
}

/// Persistent FIFO queue of pending notifications, ordered by creation time
/// (ties broken by id, stable within one snapshot).
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Persists a notification and returns its store-assigned id.
    async fn add(&self, chat_id: &str, message: &str) -> Result<i64, Error>;

    /// The oldest pending notification, or with `after` set, the oldest one
    /// strictly after that notification in queue order. `after` lets the
    /// executor step past a notification whose delivery failed without
    /// deleting it.
    async fn next_oldest(&self, after: Option<&Notification>)
    -> Result<Option<Notification>, Error>;

    /// Removes by id. Deleting an already-removed notification is a no-op.
    async fn delete(&self, notification: &Notification) -> Result<(), Error>;
}

/// In-memory store, selected by `type = "memory"`. Useful for trial runs
/// without persistence across invocations, and as the test double.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    notifications: Vec<Notification>,
    suspensions: Vec<SuspensionEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

fn queue_key(notification: &Notification) -> (DateTime<Utc>, i64) {
    (notification.created_at, notification.id)
}

#[async_trait]
impl SuspensionStore for MemoryStore {
    async fn load_active(&self) -> Result<SuspensionChecker, Error> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        inner.suspensions.retain(|entry| entry.suspended_until > now);
        Ok(SuspensionChecker::new(inner.suspensions.clone()))
    }

    async fn suspend(&self, entry: SuspensionEntry) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.suspensions.retain(|existing| {
            (
                &existing.target,
                &existing.url,
                &existing.value,
                &existing.watch_kind,
            ) != (&entry.target, &entry.url, &entry.value, &entry.watch_kind)
        });
        inner.suspensions.push(entry);
        Ok(())
    }
}

#[async_trait]
impl NotificationQueue for MemoryStore {
    async fn add(&self, chat_id: &str, message: &str) -> Result<i64, Error> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.notifications.push(Notification {
            id,
            chat_id: chat_id.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn next_oldest(
        &self,
        after: Option<&Notification>,
    ) -> Result<Option<Notification>, Error> {
        let inner = self.inner.lock();
        let cursor = after.map(queue_key);
        Ok(inner
            .notifications
            .iter()
            .filter(|n| cursor.is_none_or(|c| queue_key(n) > c))
            .min_by_key(|n| queue_key(n))
            .cloned())
    }

    async fn delete(&self, notification: &Notification) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.notifications.retain(|n| n.id != notification.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(target: &str, until: DateTime<Utc>) -> SuspensionEntry {
        SuspensionEntry {
            target: target.to_string(),
            url: "https://example.org/".to_string(),
            value: "Error 404".to_string(),
            watch_kind: "text".to_string(),
            suspended_until: until,
        }
    }

    #[tokio::test]
    async fn test_checker_requires_all_four_fields() {
        let store = MemoryStore::new();
        store
            .suspend(entry("blog", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();
        let checker = store.load_active().await.unwrap();
        let url = Url::parse("https://example.org/").unwrap();
        let other_url = Url::parse("https://example.org/other").unwrap();

        assert!(checker.is_suspended("blog", &url, "Error 404", WatchKind::Text));
        assert!(!checker.is_suspended("news", &url, "Error 404", WatchKind::Text));
        assert!(!checker.is_suspended("blog", &other_url, "Error 404", WatchKind::Text));
        assert!(!checker.is_suspended("blog", &url, "Error 500", WatchKind::Text));
    }

    #[tokio::test]
    async fn test_load_active_sweeps_expired_entries() {
        let store = MemoryStore::new();
        store
            .suspend(entry("expired", Utc::now() - Duration::minutes(5)))
            .await
            .unwrap();
        store
            .suspend(entry("active", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let checker = store.load_active().await.unwrap();
        let url = Url::parse("https://example.org/").unwrap();
        assert_eq!(checker.len(), 1);
        assert!(!checker.is_suspended("expired", &url, "Error 404", WatchKind::Text));
        assert!(checker.is_suspended("active", &url, "Error 404", WatchKind::Text));
    }

    #[tokio::test]
    async fn test_suspend_replaces_same_tuple() {
        let store = MemoryStore::new();
        store
            .suspend(entry("blog", Utc::now() + Duration::minutes(5)))
            .await
            .unwrap();
        store
            .suspend(entry("blog", Utc::now() + Duration::hours(2)))
            .await
            .unwrap();

        let checker = store.load_active().await.unwrap();
        assert_eq!(checker.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_is_fifo_with_cursor() {
        let store = MemoryStore::new();
        store.add("1", "first").await.unwrap();
        store.add("2", "second").await.unwrap();
        store.add("3", "third").await.unwrap();

        let first = store.next_oldest(None).await.unwrap().unwrap();
        assert_eq!(first.message, "first");

        let second = store.next_oldest(Some(&first)).await.unwrap().unwrap();
        assert_eq!(second.message, "second");

        let third = store.next_oldest(Some(&second)).await.unwrap().unwrap();
        assert_eq!(third.message, "third");

        assert!(store.next_oldest(Some(&third)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.add("1", "only").await.unwrap();
        let notification = store.next_oldest(None).await.unwrap().unwrap();

        store.delete(&notification).await.unwrap();
        assert!(store.next_oldest(None).await.unwrap().is_none());
        // deleting again must not fail
        store.delete(&notification).await.unwrap();
    }
}
