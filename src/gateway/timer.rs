//! In-process alarm backend built on tokio timers.
//!
//! Each registered alarm is a sleeping task. When it wakes it hands the
//! payload to the event channel, where the daemon dispatches it to the fire
//! entry point. Presented notifications and opened links go through the same
//! channel so the host can render them.

use super::{AlarmBackend, AlarmPayload, Notification, PlatformError};
use crate::clock::Clock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Host-side events produced by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// An alarm reached its fire time
    Fired(AlarmPayload),
    /// A notification became visible
    Presented(Notification),
    /// A visible notification was removed
    Withdrawn(String),
    /// A deep link was handed to the host
    LinkOpened(String),
}

struct ArmedAlarm {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct TokioAlarmBackend {
    runtime: Handle,
    clock: Arc<dyn Clock>,
    alarms: Arc<Mutex<HashMap<String, ArmedAlarm>>>,
    presented: Mutex<HashMap<String, Notification>>,
    events: mpsc::UnboundedSender<BackendEvent>,
    generation: AtomicU64,
    exact_alarms_allowed: bool,
    messaging_app_installed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TokioAlarmBackend {
    /// Create a backend bound to the current tokio runtime
    pub fn new(
        clock: Arc<dyn Clock>,
        exact_alarms_allowed: bool,
        messaging_app_installed: bool,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BackendEvent>), PlatformError> {
        let runtime = Handle::try_current()
            .map_err(|e| PlatformError::Unavailable(format!("no async runtime: {e}")))?;
        let (events, rx) = mpsc::unbounded_channel();
        let backend = Self {
            runtime,
            clock,
            alarms: Arc::new(Mutex::new(HashMap::new())),
            presented: Mutex::new(HashMap::new()),
            events,
            generation: AtomicU64::new(0),
            exact_alarms_allowed,
            messaging_app_installed,
        };
        Ok((backend, rx))
    }

    /// Number of alarms currently armed
    pub fn armed_count(&self) -> usize {
        lock(&self.alarms).len()
    }

    /// Ids of the notifications currently visible
    pub fn presented_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.presented).keys().cloned().collect();
        ids.sort();
        ids
    }

    fn emit(&self, event: BackendEvent) {
        if self.events.send(event).is_err() {
            debug!("Backend event dropped, no receiver");
        }
    }
}

impl AlarmBackend for TokioAlarmBackend {
    fn can_schedule_exact(&self) -> bool {
        self.exact_alarms_allowed
    }

    fn set_exact_alarm(&self, payload: AlarmPayload) -> Result<(), PlatformError> {
        let delay_ms = payload.fires_at_millis - self.clock.now_millis();
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let id = payload.id.clone();

        // Hold the map while spawning so a zero-delay task cannot look for
        // its entry before it is inserted.
        let mut alarms = lock(&self.alarms);
        let task = {
            let alarms = self.alarms.clone();
            let events = self.events.clone();
            let id = id.clone();
            self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let still_armed = {
                    let mut alarms = lock(&alarms);
                    match alarms.get(&id) {
                        Some(armed) if armed.generation == generation => {
                            alarms.remove(&id);
                            true
                        }
                        _ => false,
                    }
                };
                if still_armed {
                    debug!("Alarm woke (ID: {})", id);
                    let _ = events.send(BackendEvent::Fired(payload));
                }
            })
        };
        if let Some(previous) = alarms.insert(id.clone(), ArmedAlarm { generation, task }) {
            previous.task.abort();
        }
        debug!("Armed alarm (ID: {}) in {:?}", id, delay);
        Ok(())
    }

    fn cancel_alarm(&self, id: &str) {
        if let Some(armed) = lock(&self.alarms).remove(id) {
            armed.task.abort();
            debug!("Disarmed alarm (ID: {})", id);
        }
    }

    fn post_notification(&self, notification: Notification) -> Result<(), PlatformError> {
        lock(&self.presented).insert(notification.id.clone(), notification.clone());
        self.emit(BackendEvent::Presented(notification));
        Ok(())
    }

    fn cancel_notification(&self, id: &str) {
        if lock(&self.presented).remove(id).is_some() {
            self.emit(BackendEvent::Withdrawn(id.to_string()));
        }
    }

    fn is_messaging_app_installed(&self) -> bool {
        self.messaging_app_installed
    }

    fn open_url(&self, url: &str) -> Result<(), PlatformError> {
        info!("Opening messaging app: {}", url);
        self.emit(BackendEvent::LinkOpened(url.to_string()));
        Ok(())
    }
}

impl Drop for TokioAlarmBackend {
    fn drop(&mut self) {
        for (_, armed) in lock(&self.alarms).drain() {
            armed.task.abort();
        }
    }
}
