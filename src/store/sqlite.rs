//! SQLite-backed reminder store
//!
//! A single connection behind a mutex gives single-writer ordering; every
//! call runs on the blocking pool so async callers never wait on disk I/O.

use super::{ReminderRepository, StateChange};
use crate::model::{Reminder, ReminderState, RepeatOption};
use crate::{MessageLaterError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reminders (
    id             TEXT PRIMARY KEY NOT NULL,
    contact_name   TEXT NOT NULL,
    contact_number TEXT NOT NULL,
    message        TEXT NOT NULL,
    scheduled_at   INTEGER NOT NULL,
    triggered_at   INTEGER NOT NULL,
    sent_at        INTEGER,
    repeat_rule    TEXT,
    state          TEXT NOT NULL,
    retry_count    INTEGER NOT NULL DEFAULT 0,
    created_at     INTEGER NOT NULL,
    updated_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reminders_state ON reminders(state);
";

const COLUMNS: &str = "id, contact_name, contact_number, message, scheduled_at, triggered_at, \
     sent_at, repeat_rule, state, retry_count, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteReminderStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReminderStore {
    /// Open (or create) the database file and bootstrap the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened reminder database at {:?}", path);
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| MessageLaterError::Persistence("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| MessageLaterError::Persistence(format!("storage task failed: {e}")))?
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
        let repeat_rule: Option<String> = row.get(7)?;
        let repeat_rule = match repeat_rule {
            Some(text) => Some(
                text.parse::<RepeatOption>()
                    .map_err(|e| conversion_error(7, e))?,
            ),
            None => None,
        };
        let state: String = row.get(8)?;
        let state = state
            .parse::<ReminderState>()
            .map_err(|e| conversion_error(8, e))?;
        let retry_count: i64 = row.get(9)?;
        let retry_count = u32::try_from(retry_count)
            .map_err(|_| conversion_error(9, format!("retry_count out of range: {retry_count}")))?;

        Ok(Reminder {
            id: row.get(0)?,
            contact_name: row.get(1)?,
            contact_number: row.get(2)?,
            message: row.get(3)?,
            scheduled_at: row.get(4)?,
            triggered_at: row.get(5)?,
            sent_at: row.get(6)?,
            repeat_rule,
            state,
            retry_count,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn select(conn: &Connection, where_clause: &str) -> Result<Vec<Reminder>> {
        let sql = format!("SELECT {COLUMNS} FROM reminders {where_clause} ORDER BY scheduled_at ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::map_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[async_trait]
impl ReminderRepository for SqliteReminderStore {
    async fn get_all(&self) -> Result<Vec<Reminder>> {
        self.with_conn(|conn| Self::select(conn, "")).await
    }

    async fn get_active_reminders(&self) -> Result<Vec<Reminder>> {
        self.with_conn(|conn| {
            Self::select(conn, "WHERE state IN ('SCHEDULED', 'PENDING')")
        })
        .await
    }

    async fn get_reminder_by_id(&self, id: &str) -> Result<Option<Reminder>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], Self::map_row).optional()?)
        })
        .await
    }

    async fn insert(&self, reminder: &Reminder) -> Result<()> {
        if reminder.state == ReminderState::Draft {
            return Err(MessageLaterError::Persistence(format!(
                "refusing to persist draft reminder {}",
                reminder.id
            )));
        }
        let r = reminder.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reminders (
                    id, contact_name, contact_number, message, scheduled_at, triggered_at,
                    sent_at, repeat_rule, state, retry_count, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    r.id,
                    r.contact_name,
                    r.contact_number,
                    r.message,
                    r.scheduled_at,
                    r.triggered_at,
                    r.sent_at,
                    r.repeat_rule.map(|rule| rule.as_str()),
                    r.state.as_str(),
                    i64::from(r.retry_count),
                    r.created_at,
                    r.updated_at,
                ],
            )?;
            if inserted == 0 {
                return Err(MessageLaterError::DuplicateReminder(r.id));
            }
            debug!("Inserted reminder {} ({})", r.id, r.state);
            Ok(())
        })
        .await
    }

    async fn update_reminder_state(&self, id: &str, change: StateChange) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE reminders
                 SET state = ?1,
                     triggered_at = ?2,
                     sent_at = COALESCE(?3, sent_at),
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    change.state.as_str(),
                    change.triggered_at,
                    change.sent_at,
                    change.updated_at,
                    id
                ],
            )?;
            tx.commit()?;
            Ok(updated > 0)
        })
        .await
    }

    async fn delete_reminder(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }
}
