//! Backend that records alarm registrations instead of arming timers.
//!
//! Used by the one-shot CLI commands (the daemon re-arms persisted reminders
//! when it starts) and by tests, which fire alarms explicitly.

use super::{AlarmBackend, AlarmPayload, Notification, PlatformError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct ManualAlarmBackend {
    alarms: Mutex<HashMap<String, AlarmPayload>>,
    notifications: Mutex<HashMap<String, Notification>>,
    opened_urls: Mutex<Vec<String>>,
    next_failure: Mutex<Option<PlatformError>>,
    exact_alarms_allowed: AtomicBool,
    messaging_app_installed: AtomicBool,
}

impl ManualAlarmBackend {
    pub fn new() -> Self {
        Self {
            alarms: Mutex::new(HashMap::new()),
            notifications: Mutex::new(HashMap::new()),
            opened_urls: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
            exact_alarms_allowed: AtomicBool::new(true),
            messaging_app_installed: AtomicBool::new(true),
        }
    }

    pub fn set_exact_alarms_allowed(&self, allowed: bool) {
        self.exact_alarms_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn set_messaging_app_installed(&self, installed: bool) {
        self.messaging_app_installed.store(installed, Ordering::SeqCst);
    }

    /// Make the next host call (alarm or notification) fail with `err`
    pub fn fail_next_alarm(&self, err: PlatformError) {
        *lock(&self.next_failure) = Some(err);
    }

    /// Registered alarms, soonest first
    pub fn registered_alarms(&self) -> Vec<AlarmPayload> {
        let mut alarms: Vec<AlarmPayload> = lock(&self.alarms).values().cloned().collect();
        alarms.sort_by_key(|a| a.fires_at_millis);
        alarms
    }

    /// Remove and return every alarm due at `now_millis`, soonest first
    pub fn take_due(&self, now_millis: i64) -> Vec<AlarmPayload> {
        let mut alarms = lock(&self.alarms);
        let due_ids: Vec<String> = alarms
            .values()
            .filter(|a| a.fires_at_millis <= now_millis)
            .map(|a| a.id.clone())
            .collect();
        let mut due: Vec<AlarmPayload> = due_ids
            .iter()
            .filter_map(|id| alarms.remove(id))
            .collect();
        due.sort_by_key(|a| a.fires_at_millis);
        due
    }

    pub fn presented_notification(&self, id: &str) -> Option<Notification> {
        lock(&self.notifications).get(id).cloned()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        lock(&self.opened_urls).clone()
    }

    fn take_failure(&self) -> Option<PlatformError> {
        lock(&self.next_failure).take()
    }
}

impl Default for ManualAlarmBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AlarmBackend for ManualAlarmBackend {
    fn can_schedule_exact(&self) -> bool {
        self.exact_alarms_allowed.load(Ordering::SeqCst)
    }

    fn set_exact_alarm(&self, payload: AlarmPayload) -> Result<(), PlatformError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        debug!("Recorded alarm (ID: {}) at {}", payload.id, payload.fires_at_millis);
        lock(&self.alarms).insert(payload.id.clone(), payload);
        Ok(())
    }

    fn cancel_alarm(&self, id: &str) {
        lock(&self.alarms).remove(id);
    }

    fn post_notification(&self, notification: Notification) -> Result<(), PlatformError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        lock(&self.notifications).insert(notification.id.clone(), notification);
        Ok(())
    }

    fn cancel_notification(&self, id: &str) {
        lock(&self.notifications).remove(id);
    }

    fn is_messaging_app_installed(&self) -> bool {
        self.messaging_app_installed.load(Ordering::SeqCst)
    }

    fn open_url(&self, url: &str) -> Result<(), PlatformError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        lock(&self.opened_urls).push(url.to_string());
        Ok(())
    }
}
