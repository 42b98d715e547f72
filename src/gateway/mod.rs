//! Scheduling gateway
//!
//! Bridges reminders and the host's one-shot alarm and notification
//! facilities. The host side is the `AlarmBackend` capability; two backends
//! ship with the crate:
//! - `TokioAlarmBackend`: in-process timers for the long-running daemon
//! - `ManualAlarmBackend`: records registrations and fires on demand

mod deeplink;
mod manual;
mod timer;

pub use deeplink::{messaging_app_link, normalize_phone_number};
pub use manual::ManualAlarmBackend;
pub use timer::{BackendEvent, TokioAlarmBackend};

use crate::clock::Clock;
use crate::model::Reminder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything the host needs to present a reminder when its alarm fires.
/// Travels with the alarm so firing never depends on a store read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fires_at_millis: i64,
    pub contact_number: Option<String>,
    pub message_body: Option<String>,
}

impl AlarmPayload {
    pub fn for_reminder(reminder: &Reminder, title: impl Into<String>) -> Self {
        Self {
            id: reminder.id.clone(),
            title: title.into(),
            body: reminder.message.clone(),
            fires_at_millis: reminder.fires_at_millis(),
            contact_number: Some(reminder.contact_number.clone()),
            message_body: Some(reminder.message.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationAction {
    /// Deep link into the messaging app with the message pre-filled
    OpenMessagingApp { url: String },
}

/// A user-visible notification for a fired reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub action: Option<NotificationAction>,
}

/// Failures reported by the host alarm/notification services
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("security exception: {0}")]
    SecurityDenied(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Host alarm and notification services.
///
/// `set_exact_alarm` must wake the host at `fires_at_millis` and hand the
/// payload back through the backend's fire path. It replaces an earlier
/// registration for the same id and leaves that registration armed when it
/// fails. Cancel calls are no-ops when nothing is registered.
pub trait AlarmBackend: Send + Sync {
    fn can_schedule_exact(&self) -> bool;

    fn set_exact_alarm(&self, payload: AlarmPayload) -> Result<(), PlatformError>;

    fn cancel_alarm(&self, id: &str);

    fn post_notification(&self, notification: Notification) -> Result<(), PlatformError>;

    fn cancel_notification(&self, id: &str);

    fn is_messaging_app_installed(&self) -> bool;

    fn open_url(&self, url: &str) -> Result<(), PlatformError>;
}

/// Why an alarm was not registered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleRefusal {
    #[error("reminder time must be in the future")]
    NotInFuture,

    #[error("exact alarms are not permitted")]
    ExactAlarmsDenied,

    #[error("alarm service refused the reminder: {0}")]
    Platform(#[from] PlatformError),
}

#[derive(Clone)]
pub struct SchedulingGateway {
    backend: Arc<dyn AlarmBackend>,
    clock: Arc<dyn Clock>,
}

impl SchedulingGateway {
    pub fn new(backend: Arc<dyn AlarmBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn backend(&self) -> Arc<dyn AlarmBackend> {
        self.backend.clone()
    }

    /// Register the alarm for `payload.id`, replacing any earlier one.
    ///
    /// Returns false with no side effect when the fire time is not strictly
    /// in the future or the host refuses exact alarms.
    pub fn schedule(&self, payload: AlarmPayload) -> bool {
        self.try_schedule(payload).is_ok()
    }

    /// Like `schedule`, but reports why the alarm was refused.
    ///
    /// A refused replacement keeps the alarm that was already registered.
    pub fn try_schedule(&self, payload: AlarmPayload) -> Result<(), ScheduleRefusal> {
        let now = self.clock.now_millis();
        if payload.fires_at_millis <= now {
            warn!("Cannot schedule reminder in the past (ID: {})", payload.id);
            return Err(ScheduleRefusal::NotInFuture);
        }

        if !self.backend.can_schedule_exact() {
            warn!("Exact alarm scheduling not allowed (ID: {})", payload.id);
            return Err(ScheduleRefusal::ExactAlarmsDenied);
        }

        let id = payload.id.clone();
        match self.backend.set_exact_alarm(payload) {
            Ok(()) => {
                debug!("Alarm scheduled (ID: {})", id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to schedule alarm (ID: {}): {}", id, e);
                Err(e.into())
            }
        }
    }

    /// Remove the pending alarm and any presented notification for `id`
    pub fn cancel(&self, id: &str) {
        self.backend.cancel_alarm(id);
        self.backend.cancel_notification(id);
        debug!("Alarm and notification cancelled (ID: {})", id);
    }

    /// Present the notification for a fired alarm. Returns whether it was shown.
    pub fn fire(&self, payload: &AlarmPayload) -> bool {
        let action = payload
            .contact_number
            .as_deref()
            .filter(|number| !number.trim().is_empty())
            .filter(|_| self.backend.is_messaging_app_installed())
            .and_then(|number| messaging_app_link(number, payload.message_body.as_deref()))
            .map(|url| NotificationAction::OpenMessagingApp { url });

        let notification = Notification {
            id: payload.id.clone(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            action,
        };

        match self.backend.post_notification(notification) {
            Ok(()) => {
                info!("Notification shown (ID: {})", payload.id);
                true
            }
            Err(e) => {
                error!("Failed to show notification (ID: {}): {}", payload.id, e);
                false
            }
        }
    }

    /// Remove a presented notification without touching alarms
    pub fn dismiss_notification(&self, id: &str) {
        self.backend.cancel_notification(id);
    }

    /// Hand a deep link to the host. Returns whether the host accepted it.
    pub fn open_link(&self, url: &str) -> bool {
        match self.backend.open_url(url) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to open messaging app link: {}", e);
                false
            }
        }
    }
}
