//! Session State
//!
//! Status machine and the UI-visible snapshot of one scan or recovery session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session started yet
    #[default]
    Idle,
    /// Host acknowledged `start` and is working (scanning or recovering)
    Running,
    /// Host acknowledged `pause`
    Paused,
    /// Host reported completion
    Completed,
    /// Host acknowledged `cancel`
    Cancelled,
    /// Start failed or the host reported an error
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl SessionStatus {
    /// Session is in flight on the host
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Session is finished; only a new `start` leaves this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    /// Edges of the lifecycle:
    /// `idle -> running <-> paused -> {completed | cancelled | error}`,
    /// with `completed` and `error` reachable from anywhere (host events).
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (_, Completed) | (_, Error) => true,
            (Idle, Running) | (Paused, Running) => true,
            (Running, Paused) => true,
            (Running, Cancelled) | (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

/// Point-in-time copy of a session, handed to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot<P, I> {
    pub session_id: Option<SessionId>,
    pub status: SessionStatus,
    pub progress: P,
    /// Discovered items in arrival order
    pub items: Vec<I>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl<P: Default, I> Default for SessionSnapshot<P, I> {
    fn default() -> Self {
        Self {
            session_id: None,
            status: SessionStatus::Idle,
            progress: P::default(),
            items: Vec::new(),
            error: None,
            started_at: None,
            last_activity: None,
        }
    }
}

impl<P, I> SessionSnapshot<P, I> {
    /// Seconds between start and the last host activity
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.last_activity) {
            (Some(start), Some(last)) => Some((last - start).num_seconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    #[test]
    fn test_forward_edges() {
        assert!(Idle.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Cancelled));
        assert!(Paused.can_transition_to(Cancelled));
    }

    #[test]
    fn test_host_events_reach_any_state() {
        for from in [Idle, Running, Paused, Completed, Cancelled, Error] {
            assert!(from.can_transition_to(Completed));
            assert!(from.can_transition_to(Error));
        }
    }

    #[test]
    fn test_illegal_edges() {
        assert!(!Idle.can_transition_to(Paused));
        assert!(!Idle.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Paused));
        assert!(!Running.can_transition_to(Idle));
    }

    #[test]
    fn test_status_classes() {
        assert!(Running.is_active() && Paused.is_active());
        assert!(!Idle.is_active());
        assert!(Completed.is_terminal() && Cancelled.is_terminal() && Error.is_terminal());
        assert_eq!(Paused.to_string(), "paused");
    }
}
