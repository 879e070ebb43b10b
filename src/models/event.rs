//! Notification events derived from a schedule diff.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Screening, ScreeningStatus};

/// Kind of schedule change an event reports.
///
/// The string form is the event-type dimension of the notification ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewScreening,
    StatusChange,
}

impl EventKind {
    /// Stable ledger/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewScreening => "new_screening",
            EventKind::StatusChange => "status_change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification-worthy change, derived from a diff.
///
/// Events are ephemeral; only the (key, kind, sent-at) ledger row of a
/// delivered event is ever persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEvent {
    /// What changed
    pub kind: EventKind,

    /// The screening involved (current side for status changes)
    pub screening: Screening,

    /// Previous status, present for status changes only
    pub previous_status: Option<ScreeningStatus>,

    /// When the change was detected
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(EventKind::NewScreening.as_str(), "new_screening");
        assert_eq!(EventKind::StatusChange.as_str(), "status_change");
    }

    #[test]
    fn test_kind_serde_matches_ledger_strings() {
        let json = serde_json::to_string(&EventKind::StatusChange).unwrap();
        assert_eq!(json, "\"status_change\"");
    }
}
