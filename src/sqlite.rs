use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::store::{
    Notification, NotificationQueue, SuspensionChecker, SuspensionEntry, SuspensionStore,
};

/// SQLite-backed store, selected by `type = "sqlite"`. Owns both persisted
/// collections: the suspension set and the notification queue.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `path` and ensures the
    /// schema exists.
    pub async fn connect(path: &Path) -> Result<SqliteStore, Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = SqliteStore { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS site_watch_suspensions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                url TEXT NOT NULL,
                value TEXT NOT NULL,
                watch_kind TEXT NOT NULL,
                suspended_until TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (target, url, value, watch_kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SuspensionStore for SqliteStore {
    async fn load_active(&self) -> Result<SuspensionChecker, Error> {
        // Sweep and snapshot in one transaction so no returned entry can
        // already be expired.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM site_watch_suspensions WHERE suspended_until <= ?")
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        let entries = sqlx::query_as::<_, SuspensionEntry>(
            "SELECT target, url, value, watch_kind, suspended_until FROM site_watch_suspensions",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(SuspensionChecker::new(entries))
    }

    async fn suspend(&self, entry: SuspensionEntry) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO site_watch_suspensions
                (target, url, value, watch_kind, suspended_until, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (target, url, value, watch_kind)
            DO UPDATE SET suspended_until = excluded.suspended_until
            "#,
        )
        .bind(&entry.target)
        .bind(&entry.url)
        .bind(&entry.value)
        .bind(&entry.watch_kind)
        .bind(entry.suspended_until)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationQueue for SqliteStore {
    async fn add(&self, chat_id: &str, message: &str) -> Result<i64, Error> {
        let result =
            sqlx::query("INSERT INTO notifications (chat_id, message, created_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(message)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    async fn next_oldest(
        &self,
        after: Option<&Notification>,
    ) -> Result<Option<Notification>, Error> {
        let notification = match after {
            None => {
                sqlx::query_as::<_, Notification>(
                    "SELECT id, chat_id, message, created_at FROM notifications \
                     ORDER BY created_at, id LIMIT 1",
                )
                .fetch_optional(&self.pool)
                .await?
            }
            Some(prev) => {
                sqlx::query_as::<_, Notification>(
                    "SELECT id, chat_id, message, created_at FROM notifications \
                     WHERE created_at > ? OR (created_at = ? AND id > ?) \
                     ORDER BY created_at, id LIMIT 1",
                )
                .bind(prev.created_at)
                .bind(prev.created_at)
                .bind(prev.id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(notification)
    }

    async fn delete(&self, notification: &Notification) -> Result<(), Error> {
        sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(notification.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
