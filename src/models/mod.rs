// src/models/mod.rs

//! Domain models for the monitor application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod screening;
mod snapshot;

// Re-export all public types
pub use config::{
    Config, MonitorConfig, NotifierConfig, ScheduleSelectors, ScraperConfig, StatusRule,
    TheaterPage,
};
pub use event::{EventKind, ScheduleEvent};
pub use screening::{Screening, ScreeningStatus};
pub use snapshot::{Snapshot, schedule_checksum};
