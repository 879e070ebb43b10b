//! Webhook notification implementation.
//!
//! Sends formatted messages to an incoming-webhook URL as a JSON
//! `{"text": ...}` payload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{EventKind, NotifierConfig, ScheduleEvent, ScreeningStatus};
use crate::notify::Notifier;

/// Notifier posting to an incoming webhook.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier from configuration.
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        if config.webhook_url.trim().is_empty() {
            return Err(AppError::config("notifier.webhook_url is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::config(format!("Failed to build webhook client: {e}")))?;

        Ok(Self {
            url: config.webhook_url.clone(),
            client,
        })
    }

    async fn post_text(&self, text: String) -> Result<()> {
        let payload = serde_json::json!({ "text": text });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(AppError::delivery)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::delivery(format!(
                "webhook returned {status}"
            )));
        }
        Ok(())
    }

    /// Format a schedule event as a human-readable message.
    fn format_message(event: &ScheduleEvent) -> String {
        let screening = &event.screening;
        let title = match event.kind {
            EventKind::NewScreening => "🎬 New screening scheduled!",
            EventKind::StatusChange => "🔄 Screening status changed",
        };

        let mut text = format!("{title}\n");
        text.push_str(&format!("Movie: {}\n", screening.movie_title));
        text.push_str(&format!("Theater: {}\n", screening.theater));
        text.push_str(&format!("📅 Date: {}\n", screening.date));
        text.push_str(&format!("🕐 Time: {}\n", screening.time.format("%H:%M")));

        if let Some(previous) = event.previous_status {
            text.push_str(&format!(
                "Status: {} → {}\n",
                status_label(previous),
                status_label(screening.status)
            ));
        } else {
            text.push_str(&format!("Status: {}\n", status_label(screening.status)));
        }

        if let Some(screen_type) = &screening.screen_type {
            text.push_str(&format!("Format: {screen_type}\n"));
        }
        if let Some(url) = &screening.booking_url {
            text.push_str(&format!("Booking: {url}\n"));
        }

        text.push_str(&format!(
            "Detected at: {}",
            event.detected_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        text
    }
}

fn status_label(status: ScreeningStatus) -> &'static str {
    match status {
        ScreeningStatus::Available => "✅ bookable",
        ScreeningStatus::SoldOut => "❌ sold out",
        ScreeningStatus::ComingSoon => "⏰ on sale soon",
        ScreeningStatus::Unknown => "❓ unknown",
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &ScheduleEvent) -> Result<()> {
        self.post_text(Self::format_message(event)).await
    }

    async fn send_error(&self, message: &str) -> Result<()> {
        self.post_text(format!("🚨 Schedule monitoring error\n\n{message}"))
            .await
    }
}
