// src/services/mod.rs

//! External schedule sources.
//!
//! The monitor core is polymorphic over [`ScheduleSource`] and assumes
//! nothing about how the screening list was produced; the HTTP scraper is
//! one implementation of that contract.

pub mod schedule;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::Screening;

// Re-export for convenience
pub use schedule::HttpScheduleScraper;

/// Source of the currently published screening schedule.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Fetch the current schedule for a movie.
    ///
    /// `date_hint` names the caller's primary date of interest; sources may
    /// use it to fill gaps in the page markup but must still return every
    /// date they observe. Any failure here fails the whole monitoring cycle.
    async fn fetch_schedule(
        &self,
        target_movie: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<Screening>>;
}
