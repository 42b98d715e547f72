//! Integration tests for MessageLater

use messagelater::context::{self, AppContext, UserAction};
use messagelater::gateway::{BackendEvent, ManualAlarmBackend, TokioAlarmBackend};
use messagelater::store::StateChange;
use messagelater::{
    AlarmPayload, Clock, ManualClock, MessageLaterConfig, MessageLaterError,
    Reminder, ReminderRepository, ReminderState, RepeatOption, SchedulingGateway,
    SqliteReminderStore, SystemClock,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;

struct Host {
    _home: TempDir,
    clock: ManualClock,
    backend: Arc<ManualAlarmBackend>,
    app: AppContext,
}

fn host() -> Host {
    let home = TempDir::new().unwrap();
    let clock = ManualClock::at_secs(NOW);
    let backend = Arc::new(ManualAlarmBackend::new());
    let config = MessageLaterConfig::new(home.path().to_path_buf());
    let app = AppContext::open(config, backend.clone(), Arc::new(clock.clone())).unwrap();
    Host {
        _home: home,
        clock,
        backend,
        app,
    }
}

impl Host {
    async fn create_in(&self, secs: i64) -> Reminder {
        let draft = Reminder::draft(
            "Ana",
            "+1 (555) 0100",
            "call mum",
            NOW + secs,
            None,
            self.clock.now_secs(),
        );
        self.app.lifecycle.create(draft).await.unwrap()
    }

    /// Advance to `at` and deliver every alarm that came due
    async fn fire_due(&self, at: i64) -> Vec<Option<Reminder>> {
        self.clock.set_secs(at);
        let mut results = Vec::new();
        for payload in self.backend.take_due(self.clock.now_millis()) {
            results.push(self.app.handle_alarm(&payload).await);
        }
        results
    }

    async fn stored(&self, id: &str) -> Reminder {
        self.app.lifecycle.get(id).await.unwrap().unwrap()
    }
}

/// A stored reminder reads back field for field, across reopening the file
#[tokio::test]
async fn test_persist_and_read_back() {
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("reminders.db");

    let mut reminder = Reminder::draft(
        "Ana",
        "+1 555 0100",
        "happy birthday",
        NOW + 3600,
        Some(RepeatOption::Yearly),
        NOW,
    );
    reminder.state = ReminderState::Scheduled;
    reminder.retry_count = 2;

    {
        let store = SqliteReminderStore::open(&db).unwrap();
        store.insert(&reminder).await.unwrap();
    }

    let store = SqliteReminderStore::open(&db).unwrap();
    let loaded = store.get_reminder_by_id(&reminder.id).await.unwrap().unwrap();
    assert_eq!(loaded, reminder);
}

/// Scheduling in the past is refused and nothing is written
#[tokio::test]
async fn test_schedule_in_past_is_refused() {
    let h = host();
    let clock: Arc<dyn Clock> = Arc::new(h.clock.clone());
    let gateway = SchedulingGateway::new(h.backend.clone(), clock);
    let payload = AlarmPayload {
        id: "past".to_string(),
        title: "Ana".to_string(),
        body: "hi".to_string(),
        fires_at_millis: NOW * 1000,
        contact_number: None,
        message_body: None,
    };
    assert!(!gateway.schedule(payload));

    let draft = Reminder::draft("Ana", "+1 555 0100", "hi", NOW, None, NOW);
    let err = h.app.lifecycle.create(draft).await.unwrap_err();
    assert!(matches!(err, MessageLaterError::SchedulingDenied(_)));
    assert!(h.app.lifecycle.list_all().await.unwrap().is_empty());
    assert!(h.backend.registered_alarms().is_empty());
}

/// Cancelling twice is harmless
#[tokio::test]
async fn test_cancel_twice_is_noop() {
    let h = host();
    let reminder = h.create_in(60).await;
    let gateway = h.app.lifecycle.gateway();

    gateway.cancel(&reminder.id);
    gateway.cancel(&reminder.id);

    assert!(h.backend.registered_alarms().is_empty());
    assert_eq!(h.stored(&reminder.id).await.state, ReminderState::Scheduled);
}

/// Create, then fire: SCHEDULED -> PENDING with triggered_at at fire time
#[tokio::test]
async fn test_scenario_create_and_fire() {
    let h = host();
    let reminder = h.create_in(60).await;
    assert_eq!(reminder.state, ReminderState::Scheduled);
    assert_eq!(h.stored(&reminder.id).await, reminder);

    let results = h.fire_due(NOW + 60).await;
    assert_eq!(results.len(), 1);

    let pending = h.stored(&reminder.id).await;
    assert_eq!(pending.state, ReminderState::Pending);
    assert_eq!(pending.triggered_at, NOW + 60);

    let notification = h.backend.presented_notification(&reminder.id).unwrap();
    assert_eq!(notification.title, "Ana");
    assert_eq!(notification.body, "call mum");
    assert!(notification.action.is_some());
}

/// Opening the messaging app from PENDING sends exactly once
#[tokio::test]
async fn test_scenario_open_messaging_app() {
    let h = host();
    let reminder = h.create_in(60).await;
    h.fire_due(NOW + 60).await;

    h.clock.set_secs(NOW + 75);
    let sent = h
        .app
        .handle_action(&UserAction::OpenMessagingApp(reminder.id.clone()))
        .await
        .unwrap();
    assert_eq!(sent.state, ReminderState::Sent);
    assert_eq!(sent.sent_at, Some(NOW + 75));
    assert!(h.backend.presented_notification(&reminder.id).is_none());
    assert_eq!(
        h.backend.opened_urls(),
        vec!["https://wa.me/15550100?text=call+mum".to_string()]
    );

    // A second open does not move sent_at
    h.clock.set_secs(NOW + 90);
    assert!(h
        .app
        .handle_action(&UserAction::OpenMessagingApp(reminder.id.clone()))
        .await
        .is_none());
    assert_eq!(h.stored(&reminder.id).await.sent_at, Some(NOW + 75));
}

/// Dismissing a PENDING notification cancels the reminder
#[tokio::test]
async fn test_scenario_dismiss() {
    let h = host();
    let reminder = h.create_in(60).await;
    h.fire_due(NOW + 60).await;

    h.clock.set_secs(NOW + 80);
    let cancelled = h
        .app
        .handle_action(&UserAction::Dismissed(reminder.id.clone()))
        .await
        .unwrap();
    assert_eq!(cancelled.state, ReminderState::Cancelled);
    assert_eq!(cancelled.triggered_at, NOW + 80);
    assert_eq!(cancelled.sent_at, None);
}

/// Restart sweep re-arms only future reminders and changes no state
#[tokio::test]
async fn test_scenario_boot_sweep() {
    let h = host();
    let future = h.create_in(3600).await;
    let soon = h.create_in(60).await;

    // Restart: the host forgot every alarm, and the clock has moved past `soon`
    let h = Host {
        backend: Arc::new(ManualAlarmBackend::new()),
        ..h
    };
    let config = MessageLaterConfig::new(h._home.path().to_path_buf());
    let app = AppContext::open(config, h.backend.clone(), Arc::new(h.clock.clone())).unwrap();
    h.clock.set_secs(NOW + 120);

    let before = app.lifecycle.list_all().await.unwrap();
    let report = app.handle_boot().await;
    let after = app.lifecycle.list_all().await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.rescheduled, 1);
    assert_eq!(report.failed, 0);
    assert!(!report.timed_out);
    assert_eq!(before, after);

    let alarms = h.backend.registered_alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].id, future.id);
    assert_eq!(alarms[0].title, "Reminder: Ana");
    assert_eq!(
        app.lifecycle.get(&soon.id).await.unwrap().unwrap().state,
        ReminderState::Scheduled
    );
}

/// A duplicate insert fails and leaves exactly one row
#[tokio::test]
async fn test_scenario_duplicate_insert() {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteReminderStore::open(temp_dir.path().join("reminders.db")).unwrap();

    let mut reminder = Reminder::draft("Ana", "+1 555 0100", "hi", NOW + 60, None, NOW);
    reminder.state = ReminderState::Scheduled;
    store.insert(&reminder).await.unwrap();

    let mut copy = reminder.clone();
    copy.message = "different".to_string();
    let err = store.insert(&copy).await.unwrap_err();
    assert!(matches!(err, MessageLaterError::DuplicateReminder(_)));

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].message, "hi");
}

/// SENT is terminal: fire, tap and dismiss are all rejected
#[tokio::test]
async fn test_invalid_transitions_are_rejected() {
    let h = host();
    let reminder = h.create_in(60).await;
    h.fire_due(NOW + 60).await;
    h.app
        .handle_action(&UserAction::OpenMessagingApp(reminder.id.clone()))
        .await
        .unwrap();

    let payload = AlarmPayload::for_reminder(&reminder, "Ana");
    assert!(h.app.handle_alarm(&payload).await.is_none());
    assert!(h
        .app
        .handle_action(&UserAction::Tapped(reminder.id.clone()))
        .await
        .is_none());
    assert!(h
        .app
        .handle_action(&UserAction::Dismissed(reminder.id.clone()))
        .await
        .is_none());
    assert_eq!(h.stored(&reminder.id).await.state, ReminderState::Sent);

    // The store itself does not police transitions; the controller does
    let repository = h.app.lifecycle.repository();
    let changed = repository
        .update_reminder_state(
            "missing",
            StateChange {
                state: ReminderState::Pending,
                triggered_at: NOW,
                sent_at: None,
                updated_at: NOW,
            },
        )
        .await
        .unwrap();
    assert!(!changed);
}

/// A tap before the alarm fired is rejected and does not stand in for the fire
#[tokio::test]
async fn test_tap_before_fire_does_not_mark_pending() {
    let h = host();
    let reminder = h.create_in(60).await;

    h.clock.set_secs(NOW + 10);
    assert!(h
        .app
        .handle_action(&UserAction::Tapped(reminder.id.clone()))
        .await
        .is_none());
    let stored = h.stored(&reminder.id).await;
    assert_eq!(stored.state, ReminderState::Scheduled);
    assert_eq!(stored.triggered_at, NOW);
    assert_eq!(stored.updated_at, NOW);

    let fired = h.fire_due(NOW + 60).await;
    assert_eq!(fired.len(), 1);
    let pending = fired[0].clone().unwrap();
    assert_eq!(pending.state, ReminderState::Pending);
    assert_eq!(pending.triggered_at, NOW + 60);
}

/// Each host event is only accepted from the states it belongs to
#[tokio::test]
async fn test_wrong_event_for_state_is_rejected() {
    let h = host();
    let reminder = h.create_in(60).await;
    let payload = AlarmPayload::for_reminder(&reminder, "Ana");
    h.fire_due(NOW + 60).await;

    // A second delivery of the same alarm does not restart the pending period
    h.clock.set_secs(NOW + 120);
    assert!(h.app.handle_alarm(&payload).await.is_none());
    let stored = h.stored(&reminder.id).await;
    assert_eq!(stored.state, ReminderState::Pending);
    assert_eq!(stored.triggered_at, NOW + 60);

    let cancelled = h
        .app
        .handle_action(&UserAction::Dismissed(reminder.id.clone()))
        .await
        .unwrap();
    assert_eq!(cancelled.state, ReminderState::Cancelled);

    for action in [
        UserAction::Tapped(reminder.id.clone()),
        UserAction::OpenMessagingApp(reminder.id.clone()),
        UserAction::Dismissed(reminder.id.clone()),
    ] {
        assert!(h.app.handle_action(&action).await.is_none());
    }
    assert!(h.app.handle_alarm(&payload).await.is_none());

    let stored = h.stored(&reminder.id).await;
    assert_eq!(stored.state, ReminderState::Cancelled);
    assert_eq!(stored.sent_at, None);
}

/// Delete removes the row and disarms the alarm
#[tokio::test]
async fn test_delete_scheduled_reminder() {
    let h = host();
    let reminder = h.create_in(60).await;

    h.app.lifecycle.delete(&reminder.id).await.unwrap();
    assert!(h.app.lifecycle.get(&reminder.id).await.unwrap().is_none());
    assert!(h.backend.registered_alarms().is_empty());

    let err = h.app.lifecycle.delete(&reminder.id).await.unwrap_err();
    assert!(matches!(err, MessageLaterError::NotFound(_)));
}

/// Entry points reach the installed process-wide context
#[tokio::test]
async fn test_installed_context_entry_points() {
    let h = host();
    let reminder = h.create_in(60).await;
    let app = Arc::new(h.app);
    context::install(app.clone()).unwrap();
    assert!(context::install(app.clone()).is_err());

    h.clock.set_secs(NOW + 60);
    let payload = h.backend.take_due(h.clock.now_millis()).remove(0);
    let pending = context::on_alarm(&payload).await.unwrap();
    assert_eq!(pending.state, ReminderState::Pending);

    let tapped = context::on_notification_action(&UserAction::Tapped(reminder.id.clone()))
        .await
        .unwrap();
    assert_eq!(tapped.state, ReminderState::Pending);
    assert_eq!(tapped.sent_at, None);

    let report = context::on_boot_completed().await.unwrap();
    assert_eq!(report.candidates, 0);
}

/// Real timers: a reminder a second out fires through the tokio backend
#[tokio::test]
async fn test_tokio_backend_end_to_end() {
    let home = TempDir::new().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (backend, mut events) = TokioAlarmBackend::new(clock.clone(), true, true).unwrap();
    let backend = Arc::new(backend);
    let config = MessageLaterConfig::new(home.path().to_path_buf());
    let app = AppContext::open(config, backend.clone(), clock.clone()).unwrap();

    let now = clock.now_secs();
    let draft = Reminder::draft("Ana", "+1 555 0100", "hi", now + 1, None, now);
    let reminder = app.lifecycle.create(draft).await.unwrap();
    assert_eq!(backend.armed_count(), 1);

    let payload = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("alarm in time")
            .expect("channel open");
        if let BackendEvent::Fired(payload) = event {
            break payload;
        }
    };
    assert_eq!(payload.id, reminder.id);

    let pending = app.handle_alarm(&payload).await.unwrap();
    assert_eq!(pending.state, ReminderState::Pending);
    assert_eq!(backend.presented_ids(), vec![reminder.id.clone()]);

    app.handle_action(&UserAction::Dismissed(reminder.id.clone()))
        .await
        .unwrap();
    assert!(backend.presented_ids().is_empty());
    assert_eq!(backend.armed_count(), 0);
}
