//! Persisted reminder store
//!
//! The repository trait is the only way reminder rows are read or written.
//! Reads never mutate; `update_reminder_state` touches the four lifecycle
//! columns and nothing else.

mod sqlite;

pub use sqlite::SqliteReminderStore;

use crate::model::{Reminder, ReminderState};
use crate::Result;
use async_trait::async_trait;

/// Partial update applied by `update_reminder_state`.
///
/// `sent_at: None` leaves the stored value untouched, so a recorded send time
/// can never be cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub state: ReminderState,
    pub triggered_at: i64,
    pub sent_at: Option<i64>,
    pub updated_at: i64,
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Every stored reminder, soonest first
    async fn get_all(&self) -> Result<Vec<Reminder>>;

    /// Reminders in `SCHEDULED` or `PENDING`, soonest first
    async fn get_active_reminders(&self) -> Result<Vec<Reminder>>;

    async fn get_reminder_by_id(&self, id: &str) -> Result<Option<Reminder>>;

    /// Insert a new row. Fails with `DuplicateReminder` if the id exists.
    async fn insert(&self, reminder: &Reminder) -> Result<()>;

    /// Atomically apply a state change. Returns false if no row has `id`.
    async fn update_reminder_state(&self, id: &str, change: StateChange) -> Result<bool>;

    /// Delete a row. Returns false if no row has `id`.
    async fn delete_reminder(&self, id: &str) -> Result<bool>;
}
