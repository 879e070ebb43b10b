//! Diff calculation between two schedule captures.
//!
//! Computes the difference between the previous and current screening lists
//! to identify new screenings and booking-status transitions for
//! notification dispatch.
//!
//! Screenings present previously but absent now are deliberately not
//! reported: a vanished showing produces no event.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{EventKind, ScheduleEvent, Screening};

/// Result of diffing two screening lists.
#[derive(Debug, Clone, Default)]
pub struct ScheduleDiff {
    /// Screenings whose key is new, in current-list order
    pub added: Vec<Screening>,

    /// Screenings present on both sides whose status differs
    pub status_changed: Vec<StatusTransition>,
}

/// A booking-status transition for one screening key.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    /// The screening as observed now
    pub current: Screening,

    /// The screening as observed in the previous capture
    pub previous: Screening,
}

impl ScheduleDiff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.status_changed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.status_changed.len()
    }
}

/// Calculate the diff between the previous and current screening lists.
///
/// With a `date_filter`, both lists are first restricted to that calendar
/// day. Keying is by [`Screening::key`]; on a key collision within one list
/// the last occurrence wins. Output order follows the current list's
/// insertion order and carries no further guarantee.
pub fn diff_schedules(
    previous: &[Screening],
    current: &[Screening],
    date_filter: Option<NaiveDate>,
) -> ScheduleDiff {
    let previous_map = key_map(previous, date_filter);
    let (current_map, current_order) = ordered_key_map(current, date_filter);

    let mut diff = ScheduleDiff::default();

    for key in &current_order {
        let screening = current_map[key.as_str()];
        match previous_map.get(key.as_str()).copied() {
            None => diff.added.push(screening.clone()),
            Some(prev) if prev.status != screening.status => {
                diff.status_changed.push(StatusTransition {
                    current: screening.clone(),
                    previous: prev.clone(),
                });
            }
            Some(_) => {}
        }
    }

    diff
}

/// Derive notification events from a diff. Purely a mapping step.
pub fn create_events(diff: &ScheduleDiff, detected_at: DateTime<Utc>) -> Vec<ScheduleEvent> {
    let mut events = Vec::with_capacity(diff.change_count());

    for screening in &diff.added {
        events.push(ScheduleEvent {
            kind: EventKind::NewScreening,
            screening: screening.clone(),
            previous_status: None,
            detected_at,
        });
    }

    for transition in &diff.status_changed {
        events.push(ScheduleEvent {
            kind: EventKind::StatusChange,
            screening: transition.current.clone(),
            previous_status: Some(transition.previous.status),
            detected_at,
        });
    }

    events
}

fn key_map(
    screenings: &[Screening],
    date_filter: Option<NaiveDate>,
) -> HashMap<String, &Screening> {
    screenings
        .iter()
        .filter(|s| date_filter.is_none_or(|d| s.date == d))
        .map(|s| (s.key(), s))
        .collect()
}

/// Key map plus first-occurrence key order, so iteration stays deterministic
/// while the last occurrence still wins on collision.
fn ordered_key_map(
    screenings: &[Screening],
    date_filter: Option<NaiveDate>,
) -> (HashMap<String, &Screening>, Vec<String>) {
    let mut map: HashMap<String, &Screening> = HashMap::new();
    let mut order = Vec::new();

    for screening in screenings
        .iter()
        .filter(|s| date_filter.is_none_or(|d| s.date == d))
    {
        let key = screening.key();
        if map.insert(key.clone(), screening).is_none() {
            order.push(key);
        }
    }

    (map, order)
}
