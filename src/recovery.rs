//! Boot recovery sweep
//!
//! A restart drops every registered alarm. The sweep re-arms active
//! reminders whose fire time is still ahead. It never changes a reminder's
//! state and always finishes within its budget.

use crate::clock::Clock;
use crate::gateway::{AlarmPayload, SchedulingGateway};
use crate::store::ReminderRepository;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tally of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Active reminders with a future fire time
    pub candidates: usize,
    pub rescheduled: usize,
    pub failed: usize,
    /// True when the budget ran out before every candidate was handled
    pub timed_out: bool,
}

pub struct BootRecovery {
    repository: Arc<dyn ReminderRepository>,
    gateway: SchedulingGateway,
    clock: Arc<dyn Clock>,
    budget: Duration,
}

impl BootRecovery {
    pub fn new(
        repository: Arc<dyn ReminderRepository>,
        gateway: SchedulingGateway,
        clock: Arc<dyn Clock>,
        budget: Duration,
    ) -> Self {
        Self {
            repository,
            gateway,
            clock,
            budget,
        }
    }

    /// Run the sweep. Errors are logged, never returned.
    pub async fn sweep(&self) -> RecoveryReport {
        info!("Restart detected, rescheduling pending reminders...");
        let mut report = RecoveryReport::default();

        match tokio::time::timeout(self.budget, self.reschedule_all(&mut report)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error fetching reminders for recovery: {}", e),
            Err(_) => {
                report.timed_out = true;
                warn!("Recovery sweep exceeded its {:?} budget", self.budget);
            }
        }

        info!(
            "Rescheduled {} reminders, {} failed",
            report.rescheduled, report.failed
        );
        report
    }

    async fn reschedule_all(&self, report: &mut RecoveryReport) -> Result<()> {
        let now = self.clock.now_secs();
        let candidates: Vec<_> = self
            .repository
            .get_active_reminders()
            .await?
            .into_iter()
            .filter(|r| r.state.is_active() && r.scheduled_at > now)
            .collect();

        report.candidates = candidates.len();
        debug!("Found {} pending reminders to reschedule", candidates.len());

        for reminder in candidates {
            let title = format!("Reminder: {}", reminder.contact_name);
            if self.gateway.schedule(AlarmPayload::for_reminder(&reminder, title)) {
                report.rescheduled += 1;
            } else {
                report.failed += 1;
                warn!("Failed to reschedule reminder (ID: {})", reminder.id);
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}
