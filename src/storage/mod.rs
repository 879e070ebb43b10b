//! Persistence for the snapshot log and the notification ledger.
//!
//! Two logical stores back the monitor:
//! - the snapshot log, an append-only history of full schedule captures
//! - the notification ledger, enforcing at-most-one delivery per
//!   (screening key, event type) pair for the lifetime of the store

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{EventKind, Snapshot};

// Re-export for convenience
pub use sqlite::SqliteStore;

/// Trait for monitor persistence backends.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Append a snapshot to the log. Always inserts, never updates.
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Load the most recently appended snapshot, ordered by capture time.
    ///
    /// Returns `None` if the log has never been written; the first cycle
    /// treats that as "previous = empty schedule".
    async fn last_snapshot(&self) -> Result<Option<Snapshot>>;

    /// Whether a notification for (key, kind) has already been sent.
    async fn was_sent(&self, screening_key: &str, kind: EventKind) -> Result<bool>;

    /// Record a notification as sent. Insert-if-absent; repeated marks for
    /// the same (key, kind) are no-ops.
    async fn mark_sent(
        &self,
        screening_key: &str,
        kind: EventKind,
        sent_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Release the backend's resources. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
