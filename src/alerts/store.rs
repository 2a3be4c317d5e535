//! Durable alert storage.
//!
//! The engine only depends on [`AlertStore`]; [`SqliteAlertStore`] is the
//! bundled implementation. Deactivation is a conditional update so that
//! two writers racing on the same row cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use super::model::{AlertCondition, AlertId, AlertKind, Direction, NewAlert, OwnerId};
use crate::error::{AlertWatchError, Result};
use crate::notify::Locale;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    Deactivated,
    /// The row was already inactive or no longer exists.
    Conflict,
}

/// Where a user's notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub push_token: Option<String>,
    pub locale: Locale,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<AlertCondition>>;

    async fn get(&self, id: AlertId) -> Result<Option<AlertCondition>>;

    /// Set inactive and stamp `triggered_at`, only if currently active.
    async fn deactivate(&self, id: AlertId, triggered_at: DateTime<Utc>) -> Result<Deactivation>;

    async fn create(&self, alert: NewAlert) -> Result<AlertCondition>;

    async fn delete(&self, id: AlertId) -> Result<bool>;

    /// Manual toggle. Returns the updated row, or `None` if it doesn't exist.
    async fn set_active(&self, id: AlertId, active: bool) -> Result<Option<AlertCondition>>;

    async fn recipient(&self, owner: OwnerId) -> Result<Option<Recipient>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    fcm_token TEXT,
    locale TEXT NOT NULL DEFAULT 'ko'
);
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    symbol TEXT NOT NULL DEFAULT 'BTC',
    threshold REAL NOT NULL,
    direction TEXT NOT NULL,
    interval TEXT,
    currency TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    triggered_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_active ON alerts(is_active);
";

const SELECT_ALERT: &str = "SELECT id, user_id, type, symbol, threshold, direction, interval, \
     currency, is_active, created_at, updated_at, triggered_at FROM alerts";

/// Column values as stored, before kind validation.
struct AlertRow {
    id: AlertId,
    owner_id: OwnerId,
    kind: String,
    symbol: String,
    threshold: f64,
    direction: String,
    interval: Option<String>,
    currency: Option<String>,
    active: bool,
    created_at: String,
    updated_at: String,
    triggered_at: Option<String>,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            kind: row.get(2)?,
            symbol: row.get(3)?,
            threshold: row.get(4)?,
            direction: row.get(5)?,
            interval: row.get(6)?,
            currency: row.get(7)?,
            active: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            triggered_at: row.get(11)?,
        })
    }

    fn into_condition(self) -> Result<AlertCondition> {
        Ok(AlertCondition {
            id: self.id,
            owner_id: self.owner_id,
            kind: AlertKind::from_parts(
                &self.kind,
                self.interval.as_deref(),
                self.currency.as_deref(),
            )?,
            symbol: self.symbol,
            threshold: self.threshold,
            direction: Direction::parse(&self.direction)?,
            active: self.active,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            triggered_at: self.triggered_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AlertWatchError::Parse(format!("invalid timestamp '{}': {}", raw, e)))
}

fn fetch_one(conn: &Connection, id: AlertId) -> Result<Option<AlertCondition>> {
    let row = conn
        .query_row(&format!("{} WHERE id = ?1", SELECT_ALERT), params![id], AlertRow::from_row)
        .optional()?;
    row.map(AlertRow::into_condition).transpose()
}

pub struct SqliteAlertStore {
    pool: DbPool,
}

impl SqliteAlertStore {
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(4).build(manager)?;
        Self::bootstrap(pool)
    }

    /// A private in-memory database. The pool holds a single connection so
    /// every caller sees the same data.
    pub fn in_memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())?;
        Self::bootstrap(pool)
    }

    fn bootstrap(pool: DbPool) -> Result<Self> {
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }

    /// Insert or replace a user's push token and locale.
    pub async fn upsert_user(&self, id: OwnerId, fcm_token: Option<&str>, locale: Locale) -> Result<()> {
        let token = fcm_token.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, fcm_token, locale) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET fcm_token = excluded.fcm_token, locale = excluded.locale",
                params![id, token, locale.as_str()],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    async fn list_active(&self) -> Result<Vec<AlertCondition>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE is_active = 1 ORDER BY id", SELECT_ALERT))?;
            let rows = stmt
                .query_map([], AlertRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut conditions = Vec::with_capacity(rows.len());
            for row in rows {
                let id = row.id;
                match row.into_condition() {
                    Ok(condition) => conditions.push(condition),
                    Err(e) => warn!("Skipping malformed alert {}: {}", id, e),
                }
            }
            Ok(conditions)
        })
        .await
    }

    async fn get(&self, id: AlertId) -> Result<Option<AlertCondition>> {
        self.with_conn(move |conn| fetch_one(conn, id)).await
    }

    async fn deactivate(&self, id: AlertId, triggered_at: DateTime<Utc>) -> Result<Deactivation> {
        let stamp = triggered_at.to_rfc3339();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE alerts SET is_active = 0, triggered_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND is_active = 1",
                params![id, stamp],
            )?;
            if changed == 1 {
                debug!("Alert {} deactivated", id);
                Ok(Deactivation::Deactivated)
            } else {
                Ok(Deactivation::Conflict)
            }
        })
        .await
    }

    async fn create(&self, alert: NewAlert) -> Result<AlertCondition> {
        alert.validate()?;
        self.with_conn(move |conn| {
            let (kind, interval, currency) = alert.kind.to_parts();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO alerts (user_id, type, symbol, threshold, direction, interval, currency,
                                     is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                params![
                    alert.owner_id,
                    kind,
                    alert.symbol,
                    alert.threshold,
                    alert.direction.as_str(),
                    interval,
                    currency,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            fetch_one(conn, id)?
                .ok_or_else(|| AlertWatchError::Parse(format!("alert {} missing after insert", id)))
        })
        .await
    }

    async fn delete(&self, id: AlertId) -> Result<bool> {
        self.with_conn(move |conn| Ok(conn.execute("DELETE FROM alerts WHERE id = ?1", params![id])? == 1))
            .await
    }

    async fn set_active(&self, id: AlertId, active: bool) -> Result<Option<AlertCondition>> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE alerts SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, active, now],
            )?;
            fetch_one(conn, id)
        })
        .await
    }

    async fn recipient(&self, owner: OwnerId) -> Result<Option<Recipient>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT fcm_token, locale FROM users WHERE id = ?1",
                    params![owner],
                    |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?;
            Ok(row.map(|(token, locale)| Recipient {
                push_token: token.filter(|t| !t.is_empty()),
                locale: Locale::parse(locale.as_deref()),
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Currency, RsiInterval};

    fn price_alert(threshold: f64) -> NewAlert {
        NewAlert::new(7, AlertKind::Price { currency: Currency::Krw }, threshold, Direction::Above)
    }

    #[tokio::test]
    async fn create_and_list_active() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let created = store.create(price_alert(50_000_000.0)).await.unwrap();
        store
            .create(NewAlert::new(7, AlertKind::Rsi { interval: RsiInterval::H1 }, 70.0, Direction::Above))
            .await
            .unwrap();

        assert!(created.active);
        assert_eq!(created.kind, AlertKind::Price { currency: Currency::Krw });
        assert_eq!(store.list_active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deactivate_only_wins_once() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let alert = store.create(price_alert(1.0)).await.unwrap();
        let now = Utc::now();

        assert_eq!(store.deactivate(alert.id, now).await.unwrap(), Deactivation::Deactivated);
        assert_eq!(store.deactivate(alert.id, now).await.unwrap(), Deactivation::Conflict);
        assert_eq!(store.deactivate(9999, now).await.unwrap(), Deactivation::Conflict);

        let stored = store.get(alert.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert!(stored.triggered_at.is_some());
        assert!(store.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_and_delete() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let alert = store.create(price_alert(2.0)).await.unwrap();

        let off = store.set_active(alert.id, false).await.unwrap().unwrap();
        assert!(!off.active);
        let on = store.set_active(alert.id, true).await.unwrap().unwrap();
        assert!(on.active);

        assert!(store.delete(alert.id).await.unwrap());
        assert!(!store.delete(alert.id).await.unwrap());
        assert!(store.set_active(alert.id, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_alert() {
        let store = SqliteAlertStore::in_memory().unwrap();
        let bad = NewAlert::new(1, AlertKind::Rsi { interval: RsiInterval::M15 }, 150.0, Direction::Below);
        assert!(store.create(bad).await.is_err());
    }

    #[tokio::test]
    async fn recipient_carries_token_and_locale() {
        let store = SqliteAlertStore::in_memory().unwrap();
        store.upsert_user(7, Some("device-token"), Locale::En).await.unwrap();
        store.upsert_user(8, None, Locale::Ko).await.unwrap();

        let seven = store.recipient(7).await.unwrap().unwrap();
        assert_eq!(seven.push_token.as_deref(), Some("device-token"));
        assert_eq!(seven.locale, Locale::En);

        assert_eq!(store.recipient(8).await.unwrap().unwrap().push_token, None);
        assert!(store.recipient(9).await.unwrap().is_none());
    }
}
