//! Notification dispatch.
//!
//! The monitor talks to the delivery channel through the [`Notifier`] trait;
//! the concrete transport is a webhook POST.

pub mod webhook;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ScheduleEvent;

// Re-export for convenience
pub use webhook::WebhookNotifier;

/// Trait for notification channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one schedule-change notification.
    async fn send(&self, event: &ScheduleEvent) -> Result<()>;

    /// Deliver a monitoring-error notification.
    ///
    /// Callers treat this as best-effort: a failure here is logged by the
    /// orchestrator, never re-raised.
    async fn send_error(&self, message: &str) -> Result<()>;
}
