//! Screening data structure and its identity key.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Booking status of a screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Available,
    SoldOut,
    ComingSoon,
    Unknown,
}

impl ScreeningStatus {
    /// Stable wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningStatus::Available => "available",
            ScreeningStatus::SoldOut => "sold_out",
            ScreeningStatus::ComingSoon => "coming_soon",
            ScreeningStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScreeningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bookable showing of a movie at a theater.
///
/// The triple (movie title, theater, starting timestamp) is the identity of
/// a screening and must be unique within any single schedule snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screening {
    /// Movie title
    pub movie_title: String,

    /// Theater name
    pub theater: String,

    /// Calendar day of the showing
    pub date: NaiveDate,

    /// Local wall-clock time of the showing
    pub time: NaiveTime,

    /// Full starting timestamp with UTC offset
    pub starts_at: DateTime<FixedOffset>,

    /// Booking page URL, when the schedule links one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,

    /// Booking status
    pub status: ScreeningStatus,

    /// Screen or format label (e.g. "IMAX", "4DX")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_type: Option<String>,
}

impl Screening {
    /// Stable identity key derived from (movie title, theater, timestamp).
    ///
    /// Field values are escaped before joining so that a `|` inside a title
    /// or theater name cannot collide two distinct screenings onto one key.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            escape_field(&self.movie_title),
            escape_field(&self.theater),
            self.starts_at.to_rfc3339()
        )
    }
}

fn escape_field(field: &str) -> String {
    field.replace('\\', r"\\").replace('|', r"\|")
}
