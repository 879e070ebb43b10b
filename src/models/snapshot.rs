//! Schedule snapshots and their checksum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::Screening;

/// An immutable, timestamped capture of the full schedule at one cycle.
///
/// Snapshots are appended to the snapshot log once per monitoring cycle and
/// never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the schedule was captured
    pub captured_at: DateTime<Utc>,

    /// Checksum over the set of screening keys present
    pub checksum: String,

    /// The screenings observed, in scrape order
    pub screenings: Vec<Screening>,
}

impl Snapshot {
    /// Capture a schedule into a snapshot, computing its checksum.
    pub fn capture(screenings: Vec<Screening>, captured_at: DateTime<Utc>) -> Self {
        let checksum = schedule_checksum(&screenings);
        Self {
            captured_at,
            checksum,
            screenings,
        }
    }
}

/// Checksum over a schedule: SHA-256 of the sorted screening keys joined
/// with `||`.
///
/// Order-independent; changes exactly when the key set changes. Supports
/// cheap equality auditing of the snapshot log but is never used to
/// short-circuit diffing.
pub fn schedule_checksum(screenings: &[Screening]) -> String {
    let mut keys: Vec<String> = screenings.iter().map(Screening::key).collect();
    keys.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(keys.join("||").as_bytes());
    hex::encode(hasher.finalize())
}
