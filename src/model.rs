//! Reminder records and their lifecycle states

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How often a reminder repeats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepeatOption {
    #[default]
    None,
    Monthly,
    Yearly,
}

impl RepeatOption {
    /// Name stored in the `repeat_rule` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }
}

impl std::fmt::Display for RepeatOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RepeatOption {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(format!("unknown repeat rule: {other}")),
        }
    }
}

/// Lifecycle state of a reminder.
///
/// `Draft` only exists in memory while a reminder is being created. `Sent`,
/// `Missed` and `Cancelled` are terminal. Nothing transitions into `Missed`
/// yet; it is kept so stored rows carrying it still load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReminderState {
    Draft,
    Scheduled,
    Pending,
    Sent,
    Missed,
    Cancelled,
}

impl ReminderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Missed => "MISSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether the reminder still has a live alarm or notification
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Missed | Self::Cancelled)
    }

    /// Transition table owned by the lifecycle controller.
    ///
    /// `Pending -> Pending` is the notification-tap touch.
    pub fn can_transition_to(&self, next: ReminderState) -> bool {
        use ReminderState::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Scheduled, Pending)
                | (Pending, Pending)
                | (Pending, Sent)
                | (Scheduled, Sent)
                | (Pending, Cancelled)
                | (Scheduled, Cancelled)
        )
    }
}

impl std::fmt::Display for ReminderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host events that move a stored reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The alarm reached its fire time
    Fired,
    /// The notification body was tapped
    Tapped,
    /// "Open messaging app" was pressed
    OpenedMessagingApp,
    /// The notification was swiped away
    Dismissed,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fired => "fire",
            Self::Tapped => "tap",
            Self::OpenedMessagingApp => "open messaging app",
            Self::Dismissed => "dismiss",
        }
    }

    /// State the event leads to
    pub fn target(&self) -> ReminderState {
        match self {
            Self::Fired | Self::Tapped => ReminderState::Pending,
            Self::OpenedMessagingApp => ReminderState::Sent,
            Self::Dismissed => ReminderState::Cancelled,
        }
    }

    /// Whether the event may act on a reminder in `from`.
    ///
    /// A fire only moves a SCHEDULED reminder and a tap only touches a
    /// PENDING one.
    pub fn accepts(&self, from: ReminderState) -> bool {
        use ReminderState::*;
        let allowed = match self {
            Self::Fired => from == Scheduled,
            Self::Tapped => from == Pending,
            Self::OpenedMessagingApp | Self::Dismissed => matches!(from, Scheduled | Pending),
        };
        allowed && from.can_transition_to(self.target())
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReminderState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "SCHEDULED" => Ok(Self::Scheduled),
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "MISSED" => Ok(Self::Missed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown reminder state: {other}")),
        }
    }
}

/// A scheduled message intent tied to a contact.
///
/// All timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub contact_name: String,
    pub contact_number: String,
    pub message: String,
    pub scheduled_at: i64,
    pub triggered_at: i64,
    pub sent_at: Option<i64>,
    pub repeat_rule: Option<RepeatOption>,
    pub state: ReminderState,
    pub retry_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Reminder {
    /// Build an in-memory draft with a fresh id
    pub fn draft(
        contact_name: impl Into<String>,
        contact_number: impl Into<String>,
        message: impl Into<String>,
        scheduled_at: i64,
        repeat_rule: Option<RepeatOption>,
        now: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            contact_name: contact_name.into(),
            contact_number: contact_number.into(),
            message: message.into(),
            scheduled_at,
            triggered_at: now,
            sent_at: None,
            repeat_rule,
            state: ReminderState::Draft,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Target fire time in epoch milliseconds, as the alarm layer expects
    pub fn fires_at_millis(&self) -> i64 {
        self.scheduled_at.saturating_mul(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_roundtrip() {
        for state in [
            ReminderState::Draft,
            ReminderState::Scheduled,
            ReminderState::Pending,
            ReminderState::Sent,
            ReminderState::Missed,
            ReminderState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<ReminderState>().unwrap(), state);
        }
        assert!("LOST".parse::<ReminderState>().is_err());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        use ReminderState::*;
        let all = [Draft, Scheduled, Pending, Sent, Missed, Cancelled];
        for from in [Sent, Missed, Cancelled] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        use ReminderState::*;
        assert!(Draft.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Scheduled.can_transition_to(Scheduled));
        assert!(!Pending.can_transition_to(Scheduled));
        assert!(!Draft.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Missed));
    }

    #[test]
    fn test_events_check_source_state() {
        use LifecycleEvent::*;
        use ReminderState::*;
        let all = [Draft, Scheduled, Pending, Sent, Missed, Cancelled];
        let expected = [
            (Fired, vec![Scheduled]),
            (Tapped, vec![Pending]),
            (OpenedMessagingApp, vec![Scheduled, Pending]),
            (Dismissed, vec![Scheduled, Pending]),
        ];
        for (event, sources) in expected {
            for from in all {
                assert_eq!(
                    event.accepts(from),
                    sources.contains(&from),
                    "{event} from {from}"
                );
            }
        }
    }

    #[test]
    fn test_repeat_option_parse() {
        assert_eq!("monthly".parse::<RepeatOption>().unwrap(), RepeatOption::Monthly);
        assert_eq!(RepeatOption::Yearly.to_string(), "YEARLY");
        assert!("WEEKLY".parse::<RepeatOption>().is_err());
    }

    #[test]
    fn test_draft_defaults() {
        let r = Reminder::draft("Ana", "+15550001", "hi", 2_000, None, 1_000);
        assert_eq!(r.state, ReminderState::Draft);
        assert_eq!(r.retry_count, 0);
        assert_eq!(r.sent_at, None);
        assert_eq!(r.fires_at_millis(), 2_000_000);
        assert!(!r.id.is_empty());
    }
}
