//! Long-running host loop
//!
//! Runs a recovery sweep on start, then dispatches backend events, user
//! actions typed by the operator and periodic resync sweeps until shutdown.

use crate::context::{AppContext, UserAction};
use crate::gateway::{BackendEvent, Notification, NotificationAction};
use crate::recovery::RecoveryReport;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Daemon {
    context: Arc<AppContext>,
}

impl Daemon {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Queued events and input lines are handled before shutdown is observed.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<BackendEvent>,
        mut input: mpsc::Receiver<String>,
        output: mpsc::UnboundedSender<String>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let report = self.context.handle_boot().await;
        send(&output, describe_report(&report));

        let interval = self.context.config.resync_interval;
        let mut resync = time::interval_at(Instant::now() + interval, interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                Some(event) = events.recv() => self.on_backend_event(event, &output).await,
                Some(line) = input.recv() => self.on_input(&line, &output).await,
                _ = resync.tick() => {
                    debug!("Periodic resync");
                    self.context.handle_boot().await;
                }
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn on_backend_event(&self, event: BackendEvent, output: &mpsc::UnboundedSender<String>) {
        match event {
            BackendEvent::Fired(payload) => {
                if self.context.handle_alarm(&payload).await.is_none() {
                    warn!("Fired alarm {} left no pending reminder", payload.id);
                }
            }
            BackendEvent::Presented(notification) => {
                send(output, describe_notification(&notification))
            }
            BackendEvent::Withdrawn(id) => send(output, format!("[cleared] {}", id)),
            BackendEvent::LinkOpened(url) => send(output, format!("[open] {}", url)),
        }
    }

    async fn on_input(&self, line: &str, output: &mpsc::UnboundedSender<String>) {
        if line.trim().is_empty() {
            return;
        }
        let action = match line.parse::<UserAction>() {
            Ok(action) => action,
            Err(e) => {
                send(output, e.to_string());
                return;
            }
        };
        match self.context.handle_action(&action).await {
            Some(reminder) => send(output, format!("{} is now {}", reminder.id, reminder.state)),
            None => send(output, format!("{} unchanged", action.id())),
        }
    }
}

fn send(output: &mpsc::UnboundedSender<String>, line: String) {
    if output.send(line).is_err() {
        debug!("Output line dropped, no receiver");
    }
}

pub fn describe_report(report: &RecoveryReport) -> String {
    let mut line = format!(
        "Rescheduled {} of {} reminders ({} failed)",
        report.rescheduled, report.candidates, report.failed
    );
    if report.timed_out {
        line.push_str(", stopped at time budget");
    }
    line
}

fn describe_notification(notification: &Notification) -> String {
    let mut line = format!(
        "[notification {}] {}: {}",
        notification.id, notification.title, notification.body
    );
    if let Some(NotificationAction::OpenMessagingApp { url }) = &notification.action {
        line.push_str(&format!(" ({})", url));
    }
    line
}
