//! Reminder lifecycle controller
//!
//! Owns every state transition. The entry points invoked by the host outside
//! direct user interaction (`on_alarm_fired`, `on_notification_*`,
//! `on_open_messaging_app`) never return errors: failures are logged and the
//! call completes. UI-triggered operations (`create`, `delete`) propagate
//! errors to the caller.

use crate::clock::Clock;
use crate::gateway::{messaging_app_link, AlarmPayload, SchedulingGateway};
use crate::model::{LifecycleEvent, Reminder, ReminderState};
use crate::store::{ReminderRepository, StateChange};
use crate::{MessageLaterError, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ReminderLifecycle {
    repository: Arc<dyn ReminderRepository>,
    gateway: SchedulingGateway,
    clock: Arc<dyn Clock>,
}

impl ReminderLifecycle {
    pub fn new(
        repository: Arc<dyn ReminderRepository>,
        gateway: SchedulingGateway,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            gateway,
            clock,
        }
    }

    pub fn repository(&self) -> Arc<dyn ReminderRepository> {
        self.repository.clone()
    }

    pub fn gateway(&self) -> &SchedulingGateway {
        &self.gateway
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Promote a draft to `SCHEDULED`: register its alarm, then persist it.
    ///
    /// Nothing is stored when the alarm is refused. If the insert fails the
    /// freshly registered alarm is cancelled again.
    pub async fn create(&self, draft: Reminder) -> Result<Reminder> {
        if draft.state != ReminderState::Draft {
            return Err(MessageLaterError::InvalidTransition {
                id: draft.id,
                from: draft.state,
                to: ReminderState::Scheduled,
            });
        }

        // Scheduling would replace the live alarm of an existing reminder
        if self.repository.get_reminder_by_id(&draft.id).await?.is_some() {
            return Err(MessageLaterError::DuplicateReminder(draft.id));
        }

        let payload = AlarmPayload::for_reminder(&draft, draft.contact_name.clone());
        if let Err(refusal) = self.gateway.try_schedule(payload) {
            return Err(MessageLaterError::SchedulingDenied(refusal.to_string()));
        }

        let reminder = Reminder {
            state: ReminderState::Scheduled,
            updated_at: self.clock.now_secs(),
            ..draft
        };

        if let Err(e) = self.repository.insert(&reminder).await {
            self.gateway.cancel(&reminder.id);
            return Err(e);
        }

        info!(
            "Scheduled reminder {} for {} at {}",
            reminder.id, reminder.contact_name, reminder.scheduled_at
        );
        Ok(reminder)
    }

    /// Remove a reminder: cancel its alarm and notification, delete the row
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.gateway.cancel(id);
        if !self.repository.delete_reminder(id).await? {
            return Err(MessageLaterError::NotFound(id.to_string()));
        }
        info!("Deleted reminder {}", id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        self.repository.get_reminder_by_id(id).await
    }

    pub async fn list_all(&self) -> Result<Vec<Reminder>> {
        self.repository.get_all().await
    }

    pub async fn list_active(&self) -> Result<Vec<Reminder>> {
        self.repository.get_active_reminders().await
    }

    /// Alarm fired: show the notification, then move to `PENDING`.
    ///
    /// The notification does not depend on the write. A failed or rejected
    /// write (the reminder is not `SCHEDULED`) is logged and left for a later
    /// reconciliation.
    pub async fn on_alarm_fired(&self, payload: &AlarmPayload) -> Option<Reminder> {
        debug!("Alarm fired (ID: {})", payload.id);
        self.gateway.fire(payload);

        match self.transition(&payload.id, LifecycleEvent::Fired).await {
            Ok(reminder) => Some(reminder),
            Err(e) => {
                error!(
                    "Notification shown but reminder {} was not marked pending: {}",
                    payload.id, e
                );
                None
            }
        }
    }

    /// Notification body tapped: touch the pending record, clear the
    /// notification. Does not count as sent and only applies to `PENDING`.
    pub async fn on_notification_tapped(&self, id: &str) -> Option<Reminder> {
        let result = self.transition(id, LifecycleEvent::Tapped).await;
        self.gateway.dismiss_notification(id);
        self.log_outcome(id, "tap", result)
    }

    /// Notification swiped away: the reminder is cancelled
    pub async fn on_notification_dismissed(&self, id: &str) -> Option<Reminder> {
        let result = self.transition(id, LifecycleEvent::Dismissed).await;
        // A dismissed SCHEDULED reminder must not fire later
        self.gateway.cancel(id);
        self.log_outcome(id, "dismiss", result)
    }

    /// "Open messaging app" action: mark `SENT` and issue the deep link.
    ///
    /// The link is opened whenever the reminder exists, even if the state
    /// write is rejected, so the user always lands in the messaging app.
    pub async fn on_open_messaging_app(&self, id: &str) -> Option<Reminder> {
        self.gateway.dismiss_notification(id);

        let current = match self.repository.get_reminder_by_id(id).await {
            Ok(Some(reminder)) => Some(reminder),
            Ok(None) => {
                warn!("Open messaging app for unknown reminder {}", id);
                None
            }
            Err(e) => {
                error!("Failed to load reminder {}: {}", id, e);
                None
            }
        };

        let result = self.transition(id, LifecycleEvent::OpenedMessagingApp).await;
        if let Ok(ref sent) = result {
            if current.as_ref().map(|r| r.state) == Some(ReminderState::Scheduled) {
                self.gateway.cancel(&sent.id);
            }
        }

        if let Some(reminder) = current {
            match messaging_app_link(&reminder.contact_number, Some(&reminder.message)) {
                Some(url) => {
                    self.gateway.open_link(&url);
                }
                None => warn!("Reminder {} has no dialable number", id),
            }
        }

        self.log_outcome(id, "open messaging app", result)
    }

    fn log_outcome(&self, id: &str, action: &str, result: Result<Reminder>) -> Option<Reminder> {
        match result {
            Ok(reminder) => {
                info!("Reminder {} is now {} after {}", id, reminder.state, action);
                Some(reminder)
            }
            Err(e) => {
                error!("Failed to handle {} for reminder {}: {}", action, id, e);
                None
            }
        }
    }

    /// Validate `event` against the stored state and apply its transition
    async fn transition(&self, id: &str, event: LifecycleEvent) -> Result<Reminder> {
        let current = self
            .repository
            .get_reminder_by_id(id)
            .await?
            .ok_or_else(|| MessageLaterError::NotFound(id.to_string()))?;

        let to = event.target();
        if !event.accepts(current.state) {
            return Err(MessageLaterError::InvalidTransition {
                id: id.to_string(),
                from: current.state,
                to,
            });
        }

        let now = self.clock.now_secs();
        let change = match event {
            // touch: keep the fire time
            LifecycleEvent::Tapped => StateChange {
                state: to,
                triggered_at: current.triggered_at,
                sent_at: None,
                updated_at: now,
            },
            LifecycleEvent::OpenedMessagingApp => StateChange {
                state: to,
                triggered_at: current.triggered_at,
                sent_at: Some(now),
                updated_at: now,
            },
            LifecycleEvent::Fired | LifecycleEvent::Dismissed => StateChange {
                state: to,
                triggered_at: now,
                sent_at: None,
                updated_at: now,
            },
        };

        if !self.repository.update_reminder_state(id, change).await? {
            return Err(MessageLaterError::NotFound(id.to_string()));
        }

        Ok(Reminder {
            state: change.state,
            triggered_at: change.triggered_at,
            sent_at: change.sent_at.or(current.sent_at),
            updated_at: change.updated_at,
            ..current
        })
    }
}
