//! Durable event store with SQLite backend.
//!
//! The store is the source of truth across restarts: events are inserted as
//! `pending` the moment a timer or reminder is requested, flipped to
//! `completed` exactly once, and never deleted. The contacts table backs the
//! call-initiation tool's best-effort name lookup.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE events (
//!     id INTEGER PRIMARY KEY,
//!     kind TEXT NOT NULL,          -- 'timer', 'notification'
//!     status TEXT NOT NULL,        -- 'pending', 'completed'
//!     due_at INTEGER NOT NULL,     -- unix timestamp
//!     payload TEXT,                -- notification text, NULL for timers
//!     created_at INTEGER NOT NULL
//! );
//!
//! CREATE TABLE contacts (
//!     id INTEGER PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     phone_number TEXT NOT NULL
//! );
//! ```

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{EventKind, EventStatus, ScheduledEvent};

/// Errors surfaced by the durable store.
///
/// Kept typed so boot code can distinguish "store unreachable" (fatal) from
/// a malformed row (skip and log).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open event store at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("event store query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("event row {id} carries invalid {field}: {value}")]
    InvalidRow {
        id: i64,
        field: &'static str,
        value: String,
    },
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A phone-book entry, consulted read-only by the call tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
}

/// SQLite-backed store for scheduled events and contacts.
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    /// Open or create the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(db_path).map_err(|source| StoreError::Open {
            path: db_path.to_path_buf(),
            source,
        })?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                due_at INTEGER NOT NULL,
                payload TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                phone_number TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_status ON events(status);
            CREATE INDEX IF NOT EXISTS idx_events_due ON events(due_at);
            "#,
        )?;
        Ok(())
    }

    /// Persist a new pending event; returns its identifier.
    pub async fn insert_event(
        &self,
        kind: EventKind,
        due_at: DateTime<Utc>,
        payload: Option<&str>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (kind, status, due_at, payload, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                kind.as_str(),
                EventStatus::Pending.as_str(),
                due_at.timestamp(),
                payload,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All events still marked pending, oldest deadline first.
    pub async fn pending_events(&self) -> Result<Vec<ScheduledEvent>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, kind, due_at, payload FROM events \
             WHERE status = ?1 ORDER BY due_at",
        )?;

        let rows = stmt.query_map(params![EventStatus::Pending.as_str()], |row| {
            let id: i64 = row.get(0)?;
            let kind: String = row.get(1)?;
            let due_at: i64 = row.get(2)?;
            let payload: Option<String> = row.get(3)?;
            Ok((id, kind, due_at, payload))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, kind_str, due_at, payload) = row?;
            let kind = EventKind::from_str(&kind_str).ok_or(StoreError::InvalidRow {
                id,
                field: "kind",
                value: kind_str,
            })?;
            let due_at =
                Utc.timestamp_opt(due_at, 0)
                    .single()
                    .ok_or_else(|| StoreError::InvalidRow {
                        id,
                        field: "due_at",
                        value: due_at.to_string(),
                    })?;
            events.push(ScheduledEvent {
                id,
                kind,
                due_at,
                payload,
            });
        }

        Ok(events)
    }

    /// Flip an event to completed. Idempotent at the SQL level; callers
    /// guarantee the single-delivery side.
    pub async fn mark_completed(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE events SET status = ?1 WHERE id = ?2",
            params![EventStatus::Completed.as_str(), id],
        )?;
        Ok(())
    }

    /// Fetch a single event's status (used by recovery tests and tooling).
    pub async fn event_status(&self, id: i64) -> Result<Option<EventStatus>, StoreError> {
        let conn = self.conn.lock().await;
        let status: Option<String> = conn
            .query_row("SELECT status FROM events WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        match status {
            None => Ok(None),
            Some(s) => EventStatus::from_str(&s)
                .map(Some)
                .ok_or(StoreError::InvalidRow {
                    id,
                    field: "status",
                    value: s,
                }),
        }
    }

    /// Add a contact (seeding and tests).
    pub async fn add_contact(&self, name: &str, phone_number: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO contacts (name, phone_number) VALUES (?1, ?2)",
            params![name, phone_number],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Case-insensitive substring match on contact name; first row wins on
    /// multiple hits.
    ///
    /// Case folding happens here rather than in SQL: SQLite's `lower()` is
    /// ASCII-only and contact names are mostly Cyrillic.
    pub async fn find_contact(&self, name: &str) -> Result<Option<Contact>, StoreError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, name, phone_number FROM contacts ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Contact {
                id: row.get(0)?,
                name: row.get(1)?,
                phone_number: row.get(2)?,
            })
        })?;

        for contact in rows {
            let contact = contact?;
            if contact.name.to_lowercase().contains(&needle) {
                return Ok(Some(contact));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn insert_and_list_pending() {
        let temp = TempDir::new().unwrap();
        let store = EventStore::open(&temp.path().join("events.db")).unwrap();

        let due = Utc::now() + Duration::minutes(5);
        let id = store
            .insert_event(EventKind::Notification, due, Some("выключить плиту"))
            .await
            .unwrap();
        assert!(id > 0);

        let pending = store.pending_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].kind, EventKind::Notification);
        assert_eq!(pending[0].payload.as_deref(), Some("выключить плиту"));
        // Sub-second precision is intentionally dropped in storage.
        assert_eq!(pending[0].due_at.timestamp(), due.timestamp());
    }

    #[tokio::test]
    async fn completed_events_leave_the_pending_set() {
        let store = EventStore::open_in_memory().unwrap();
        let id = store
            .insert_event(EventKind::Timer, Utc::now(), None)
            .await
            .unwrap();

        store.mark_completed(id).await.unwrap();

        assert!(store.pending_events().await.unwrap().is_empty());
        assert_eq!(
            store.event_status(id).await.unwrap(),
            Some(EventStatus::Completed)
        );
    }

    #[tokio::test]
    async fn events_are_never_deleted() {
        let store = EventStore::open_in_memory().unwrap();
        let id = store
            .insert_event(EventKind::Timer, Utc::now(), None)
            .await
            .unwrap();
        store.mark_completed(id).await.unwrap();

        // The row survives completion.
        assert!(store.event_status(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn contact_lookup_is_substring_and_case_insensitive() {
        let store = EventStore::open_in_memory().unwrap();
        store.add_contact("Мама", "+79001234567").await.unwrap();
        store.add_contact("Марина", "+79007654321").await.unwrap();

        let hit = store.find_contact("мама").await.unwrap().unwrap();
        assert_eq!(hit.name, "Мама");

        // Substring hit.
        let hit = store.find_contact("арин").await.unwrap().unwrap();
        assert_eq!(hit.name, "Марина");

        assert!(store.find_contact("Петя").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ambiguous_contact_match_is_stable() {
        let store = EventStore::open_in_memory().unwrap();
        store.add_contact("Маша", "111").await.unwrap();
        store.add_contact("МашаРабота", "222").await.unwrap();

        // First row wins, and repeatedly so.
        let first = store.find_contact("Маша").await.unwrap().unwrap();
        let second = store.find_contact("Маша").await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.phone_number, "111");
    }
}
