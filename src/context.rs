//! Process-wide application context
//!
//! Host entry points (alarm fired, notification actions, restart) are invoked
//! with nothing but an id or payload. They look the context up here. The host
//! installs it once at startup.

use crate::clock::Clock;
use crate::compose::{CreateReminderSession, UiEffect};
use crate::contacts::{ContactDirectory, FileContactDirectory};
use crate::gateway::{AlarmBackend, AlarmPayload, SchedulingGateway};
use crate::lifecycle::ReminderLifecycle;
use crate::model::Reminder;
use crate::permissions::{PermissionProvider, StaticPermissions};
use crate::recovery::{BootRecovery, RecoveryReport};
use crate::store::{ReminderRepository, SqliteReminderStore};
use crate::{MessageLaterConfig, MessageLaterError, Result};
use chrono::Local;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

static CONTEXT: OnceLock<Arc<AppContext>> = OnceLock::new();

/// A user action on a presented notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Body tapped
    Tapped(String),
    /// "Open messaging app" pressed
    OpenMessagingApp(String),
    /// Swiped away
    Dismissed(String),
}

impl UserAction {
    pub fn id(&self) -> &str {
        match self {
            Self::Tapped(id) | Self::OpenMessagingApp(id) | Self::Dismissed(id) => id,
        }
    }
}

impl FromStr for UserAction {
    type Err = MessageLaterError;

    /// Parse `tap <id>`, `open <id>` or `dismiss <id>`
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(verb), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MessageLaterError::InvalidAction(format!(
                "expected '<tap|open|dismiss> <id>', got '{}'",
                s.trim()
            )));
        };
        let id = id.to_string();
        match verb.to_lowercase().as_str() {
            "tap" => Ok(Self::Tapped(id)),
            "open" => Ok(Self::OpenMessagingApp(id)),
            "dismiss" => Ok(Self::Dismissed(id)),
            other => Err(MessageLaterError::InvalidAction(format!(
                "unknown action '{}'",
                other
            ))),
        }
    }
}

/// Everything the entry points need, wired once
pub struct AppContext {
    pub config: MessageLaterConfig,
    pub lifecycle: Arc<ReminderLifecycle>,
    pub recovery: Arc<BootRecovery>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub contacts: Arc<dyn ContactDirectory>,
}

impl AppContext {
    /// Wire the desktop host: SQLite store at the configured path, static
    /// permissions and the JSON contact directory
    pub fn open(
        config: MessageLaterConfig,
        backend: Arc<dyn AlarmBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let repository = Arc::new(SqliteReminderStore::open(&config.database_file)?);
        let permissions = Arc::new(StaticPermissions::new(
            config.granted_permissions.iter().copied(),
        ));
        let contacts = Arc::new(FileContactDirectory::new(config.contacts_file.clone()));
        Ok(Self::from_parts(
            config,
            repository,
            backend,
            clock,
            permissions,
            contacts,
        ))
    }

    pub fn from_parts(
        config: MessageLaterConfig,
        repository: Arc<dyn ReminderRepository>,
        backend: Arc<dyn AlarmBackend>,
        clock: Arc<dyn Clock>,
        permissions: Arc<dyn PermissionProvider>,
        contacts: Arc<dyn ContactDirectory>,
    ) -> Self {
        let gateway = SchedulingGateway::new(backend, clock.clone());
        let lifecycle = Arc::new(ReminderLifecycle::new(
            repository.clone(),
            gateway.clone(),
            clock.clone(),
        ));
        let recovery = Arc::new(BootRecovery::new(
            repository,
            gateway,
            clock,
            config.boot_budget,
        ));
        Self {
            config,
            lifecycle,
            recovery,
            permissions,
            contacts,
        }
    }

    /// Start a create-reminder form in the local timezone
    pub fn create_session(&self) -> (CreateReminderSession, mpsc::UnboundedReceiver<UiEffect>) {
        CreateReminderSession::new(
            self.lifecycle.clone(),
            self.permissions.clone(),
            self.contacts.clone(),
            Local,
            self.config.message_max_len,
        )
    }

    pub async fn handle_alarm(&self, payload: &AlarmPayload) -> Option<Reminder> {
        self.bounded("alarm", self.lifecycle.on_alarm_fired(payload))
            .await
            .flatten()
    }

    pub async fn handle_action(&self, action: &UserAction) -> Option<Reminder> {
        let lifecycle = &self.lifecycle;
        let work = async move {
            match action {
                UserAction::Tapped(id) => lifecycle.on_notification_tapped(id).await,
                UserAction::OpenMessagingApp(id) => {
                    lifecycle.on_open_messaging_app(id).await
                }
                UserAction::Dismissed(id) => lifecycle.on_notification_dismissed(id).await,
            }
        };
        self.bounded("notification action", work).await.flatten()
    }

    pub async fn handle_boot(&self) -> RecoveryReport {
        self.recovery.sweep().await
    }

    async fn bounded<T>(&self, what: &str, work: impl Future<Output = T>) -> Option<T> {
        match tokio::time::timeout(self.config.boot_budget, work).await {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("{} handler exceeded {:?}", what, self.config.boot_budget);
                None
            }
        }
    }
}

/// Install the process-wide context. Only the first call wins.
pub fn install(context: Arc<AppContext>) -> Result<()> {
    CONTEXT
        .set(context)
        .map_err(|_| MessageLaterError::Config("application context already installed".to_string()))?;
    info!("Application context installed");
    Ok(())
}

pub fn installed() -> Option<Arc<AppContext>> {
    CONTEXT.get().cloned()
}

/// Host entry point: an alarm reached its fire time
pub async fn on_alarm(payload: &AlarmPayload) -> Option<Reminder> {
    let Some(context) = installed() else {
        error!("Alarm for {} before the context was installed", payload.id);
        return None;
    };
    context.handle_alarm(payload).await
}

/// Host entry point: the user acted on a notification
pub async fn on_notification_action(action: &UserAction) -> Option<Reminder> {
    let Some(context) = installed() else {
        error!(
            "Notification action for {} before the context was installed",
            action.id()
        );
        return None;
    };
    context.handle_action(action).await
}

/// Host entry point: the process restarted
pub async fn on_boot_completed() -> Option<RecoveryReport> {
    let Some(context) = installed() else {
        error!("Restart signal before the context was installed");
        return None;
    };
    Some(context.handle_boot().await)
}
