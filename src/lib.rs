//! MessageLater - delayed message reminders
//!
//! Schedules one-shot reminders to contacts and drives each reminder through
//! its lifecycle:
//! - Persist the reminder and register a wake-capable alarm
//! - Present a notification when the alarm fires
//! - Record the user's outcome (sent via the messaging app, or dismissed)
//! - Re-establish alarms after a restart

pub mod clock;
pub mod compose;
pub mod config;
pub mod contacts;
pub mod context;
pub mod daemon;
pub mod gateway;
pub mod lifecycle;
pub mod model;
pub mod permissions;
pub mod recovery;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compose::{CreateReminderSession, FieldErrors, FormEvent, ReminderForm, UiEffect};
pub use context::{AppContext, UserAction};
pub use gateway::{AlarmBackend, AlarmPayload, Notification, ScheduleRefusal, SchedulingGateway};
pub use lifecycle::ReminderLifecycle;
pub use model::{LifecycleEvent, Reminder, ReminderState, RepeatOption};
pub use permissions::{Permission, PermissionProvider, PermissionStatus};
pub use recovery::{BootRecovery, RecoveryReport};
pub use store::{ReminderRepository, SqliteReminderStore};

use std::path::PathBuf;
use std::time::Duration;

/// Default maximum message length accepted by the create form
pub const DEFAULT_MESSAGE_MAX_LEN: usize = 500;

/// Configuration for MessageLater
#[derive(Debug, Clone)]
pub struct MessageLaterConfig {
    /// Directory holding the database, config and contacts files
    pub home: PathBuf,

    /// Path to the SQLite reminder database
    pub database_file: PathBuf,

    /// Path to the JSON contacts file used by the desktop directory
    pub contacts_file: PathBuf,

    /// Upper bound for one boot recovery sweep
    pub boot_budget: Duration,

    /// How often the daemon re-runs the recovery sweep
    pub resync_interval: Duration,

    /// Whether the companion messaging app is considered installed
    pub messaging_app_installed: bool,

    /// Whether the host allows exact alarms
    pub exact_alarms_allowed: bool,

    /// Permissions the desktop host treats as granted
    pub granted_permissions: Vec<Permission>,

    /// Maximum message length accepted by the create form
    pub message_max_len: usize,
}

impl MessageLaterConfig {
    pub fn new(home: PathBuf) -> Self {
        let database_file = home.join("reminders.db");
        let contacts_file = home.join("contacts.json");
        Self {
            home,
            database_file,
            contacts_file,
            boot_budget: Duration::from_secs(10),
            resync_interval: Duration::from_secs(60),
            messaging_app_installed: true,
            exact_alarms_allowed: true,
            granted_permissions: vec![Permission::Contacts, Permission::Notifications],
            message_max_len: DEFAULT_MESSAGE_MAX_LEN,
        }
    }

    pub fn with_database_file(mut self, path: PathBuf) -> Self {
        self.database_file = path;
        self
    }

    pub fn with_contacts_file(mut self, path: PathBuf) -> Self {
        self.contacts_file = path;
        self
    }

    pub fn with_boot_budget(mut self, budget: Duration) -> Self {
        self.boot_budget = budget;
        self
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn with_messaging_app_installed(mut self, installed: bool) -> Self {
        self.messaging_app_installed = installed;
        self
    }

    pub fn with_exact_alarms_allowed(mut self, allowed: bool) -> Self {
        self.exact_alarms_allowed = allowed;
        self
    }

    pub fn with_granted_permissions(mut self, granted: Vec<Permission>) -> Self {
        self.granted_permissions = granted;
        self
    }

    pub fn with_message_max_len(mut self, max_len: usize) -> Self {
        self.message_max_len = max_len;
        self
    }
}

/// Result type for MessageLater operations
pub type Result<T> = std::result::Result<T, MessageLaterError>;

/// Errors that can occur in MessageLater
#[derive(Debug, thiserror::Error)]
pub enum MessageLaterError {
    #[error("Invalid input: {0}")]
    Validation(FieldErrors),

    #[error("Permission denied: {0}")]
    PermissionDenied(Permission),

    #[error("Scheduling denied: {0}")]
    SchedulingDenied(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Platform security error: {0}")]
    PlatformSecurity(String),

    #[error("Invalid transition for reminder {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ReminderState,
        to: ReminderState,
    },

    #[error("Reminder not found: {0}")]
    NotFound(String),

    #[error("Reminder already exists: {0}")]
    DuplicateReminder(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for MessageLaterError {
    fn from(err: rusqlite::Error) -> Self {
        MessageLaterError::Persistence(err.to_string())
    }
}

impl From<gateway::PlatformError> for MessageLaterError {
    fn from(err: gateway::PlatformError) -> Self {
        MessageLaterError::PlatformSecurity(err.to_string())
    }
}
