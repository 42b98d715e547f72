//! Create-reminder flow
//!
//! The form lives in a `watch` channel so any view can render the latest
//! state. One-shot effects (toasts, haptics, navigation) go out on an mpsc
//! channel and are consumed exactly once.

use crate::clock::Clock;
use crate::contacts::{Contact, ContactDirectory};
use crate::lifecycle::ReminderLifecycle;
use crate::model::{Reminder, RepeatOption};
use crate::permissions::{ensure_permission, Permission, PermissionProvider};
use crate::{MessageLaterError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Per-field validation messages; `None` means the field is fine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub contact: Option<String>,
    pub message: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.contact.is_none() && self.message.is_none() && self.date.is_none() && self.time.is_none()
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = [&self.contact, &self.message, &self.date, &self.time]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderForm {
    pub contact_name: String,
    pub contact_number: String,
    pub message: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub repeat: RepeatOption,
    pub errors: FieldErrors,
    pub is_loading: bool,
}

impl ReminderForm {
    /// Check every field. `today` is the local calendar date.
    pub fn validate(&self, today: NaiveDate, max_len: usize) -> FieldErrors {
        let mut errors = FieldErrors::default();

        if self.contact_name.trim().is_empty() || self.contact_number.trim().is_empty() {
            errors.contact = Some("Please select a contact".to_string());
        }

        if self.message.trim().is_empty() {
            errors.message = Some("Please enter a message".to_string());
        } else if self.message.chars().count() > max_len {
            errors.message = Some("Message too long".to_string());
        }

        match self.date {
            None => errors.date = Some("Please select a date".to_string()),
            Some(date) if date < today => {
                errors.date = Some("Date cannot be in the past".to_string())
            }
            Some(_) => {}
        }

        if self.time.is_none() {
            errors.time = Some("Please select a time".to_string());
        }

        errors
    }

    /// Local date and time as epoch seconds in `tz`.
    ///
    /// An ambiguous wall time resolves to the earlier instant; a wall time
    /// skipped by a clock change has no instant.
    pub fn scheduled_at<Tz: TimeZone>(&self, tz: &Tz) -> Option<i64> {
        let local = self.date?.and_time(self.time?);
        local
            .and_local_timezone(tz.clone())
            .earliest()
            .map(|dt| dt.timestamp())
    }

    fn repeat_rule(&self) -> Option<RepeatOption> {
        (self.repeat != RepeatOption::None).then_some(self.repeat)
    }
}

/// User input to the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    MessageChanged(String),
    ContactSelected(Contact),
    ContactCleared,
    DateSelected(NaiveDate),
    TimeSelected(NaiveTime),
    RepeatSelected(RepeatOption),
    ClearErrors,
}

/// One-shot effects for the host view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    ShowSuccess(String),
    ShowError(String),
    HapticError,
    HapticSuccess,
    NavigateBack,
}

pub struct CreateReminderSession<Tz: TimeZone = Local> {
    lifecycle: Arc<ReminderLifecycle>,
    permissions: Arc<dyn PermissionProvider>,
    contacts: Arc<dyn ContactDirectory>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    max_len: usize,
    state: watch::Sender<ReminderForm>,
    effects: mpsc::UnboundedSender<UiEffect>,
}

impl<Tz: TimeZone> CreateReminderSession<Tz> {
    pub fn new(
        lifecycle: Arc<ReminderLifecycle>,
        permissions: Arc<dyn PermissionProvider>,
        contacts: Arc<dyn ContactDirectory>,
        timezone: Tz,
        max_len: usize,
    ) -> (Self, mpsc::UnboundedReceiver<UiEffect>) {
        let (state, _) = watch::channel(ReminderForm::default());
        let (effects, rx) = mpsc::unbounded_channel();
        let clock = lifecycle.clock();
        let session = Self {
            lifecycle,
            permissions,
            contacts,
            clock,
            timezone,
            max_len,
            state,
            effects,
        };
        (session, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<ReminderForm> {
        self.state.subscribe()
    }

    /// Snapshot of the current form
    pub fn form(&self) -> ReminderForm {
        self.state.borrow().clone()
    }

    pub fn on_event(&self, event: FormEvent) {
        self.state.send_modify(|form| match event {
            FormEvent::MessageChanged(message) => {
                form.message = message;
                form.errors.message = None;
            }
            FormEvent::ContactSelected(contact) => {
                form.contact_number = contact.primary_number().unwrap_or_default().to_string();
                form.contact_name = contact.name;
                form.errors.contact = None;
            }
            FormEvent::ContactCleared => {
                form.contact_name.clear();
                form.contact_number.clear();
            }
            FormEvent::DateSelected(date) => {
                form.date = Some(date);
                form.errors.date = None;
            }
            FormEvent::TimeSelected(time) => {
                form.time = Some(time);
                form.errors.time = None;
            }
            FormEvent::RepeatSelected(repeat) => form.repeat = repeat,
            FormEvent::ClearErrors => form.errors = FieldErrors::default(),
        });
    }

    /// Search the contact directory, asking for access first
    pub async fn pick_contacts(&self, query: &str) -> Result<Vec<Contact>> {
        if let Err(e) = ensure_permission(self.permissions.as_ref(), Permission::Contacts).await {
            self.emit(UiEffect::ShowError("Contact Permission Denied".to_string()));
            return Err(e);
        }
        self.contacts.search(query).await
    }

    /// Validate the form and create the reminder.
    ///
    /// On any failure the form keeps its contents so the user can correct it.
    pub async fn submit(&self) -> Result<Reminder> {
        if let Err(e) =
            ensure_permission(self.permissions.as_ref(), Permission::Notifications).await
        {
            self.emit(UiEffect::ShowError(
                "Notification Permission Denied".to_string(),
            ));
            return Err(e);
        }

        let form = self.form();
        let errors = form.validate(self.today(), self.max_len);
        if !errors.is_empty() {
            debug!("Form rejected: {}", errors);
            self.state.send_modify(|f| f.errors = errors.clone());
            self.emit(UiEffect::HapticError);
            return Err(MessageLaterError::Validation(errors));
        }

        let Some(scheduled_at) = form.scheduled_at(&self.timezone) else {
            let errors = FieldErrors {
                time: Some("Time does not exist on that date".to_string()),
                ..FieldErrors::default()
            };
            self.state.send_modify(|f| f.errors = errors.clone());
            self.emit(UiEffect::HapticError);
            return Err(MessageLaterError::Validation(errors));
        };

        self.state.send_modify(|f| {
            f.is_loading = true;
            f.errors = FieldErrors::default();
        });

        let draft = Reminder::draft(
            form.contact_name.trim(),
            form.contact_number.trim(),
            form.message.trim(),
            scheduled_at,
            form.repeat_rule(),
            self.clock.now_secs(),
        );
        let result = self.lifecycle.create(draft).await;
        self.state.send_modify(|f| f.is_loading = false);

        match &result {
            Ok(_) => {
                self.emit(UiEffect::HapticSuccess);
                self.emit(UiEffect::ShowSuccess("Reminder scheduled!".to_string()));
                self.emit(UiEffect::NavigateBack);
            }
            Err(e) => {
                warn!("Failed to create reminder: {}", e);
                self.emit(UiEffect::ShowError(e.to_string()));
            }
        }
        result
    }

    fn today(&self) -> NaiveDate {
        DateTime::from_timestamp(self.clock.now_secs(), 0)
            .unwrap_or_default()
            .with_timezone(&self.timezone)
            .date_naive()
    }

    fn emit(&self, effect: UiEffect) {
        if self.effects.send(effect).is_err() {
            debug!("UI effect dropped, no receiver");
        }
    }
}
