//! Application configuration structures.

use std::fs;
use std::path::Path;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ScreeningStatus;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Monitoring target and cadence
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// HTTP and schedule-extraction settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Notification channel settings
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.target_movie.trim().is_empty() {
            return Err(AppError::validation("monitor.target_movie is empty"));
        }
        if self.monitor.check_interval_minutes == 0 {
            return Err(AppError::validation(
                "monitor.check_interval_minutes must be > 0",
            ));
        }
        if self.monitor.database_path.trim().is_empty() {
            return Err(AppError::validation("monitor.database_path is empty"));
        }
        if self.scraper.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraper.user_agent is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.scraper.max_concurrent == 0 {
            return Err(AppError::validation("scraper.max_concurrent must be > 0"));
        }
        if self.scraper.theaters.is_empty() {
            return Err(AppError::validation("No theater pages defined"));
        }
        for theater in &self.scraper.theaters {
            url::Url::parse(&theater.url)?;
        }
        self.scraper.utc_offset()?;
        if self.notifier.webhook_url.trim().is_empty() {
            return Err(AppError::validation("notifier.webhook_url is empty"));
        }
        url::Url::parse(&self.notifier.webhook_url)?;
        Ok(())
    }
}

/// Monitoring target and cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Movie title to watch for
    #[serde(default = "defaults::target_movie")]
    pub target_movie: String,

    /// Primary date of interest. Informational only; every date the
    /// schedule publishes is monitored.
    #[serde(default)]
    pub target_date: Option<NaiveDate>,

    /// Minutes between schedule checks in continuous mode
    #[serde(default = "defaults::check_interval")]
    pub check_interval_minutes: u64,

    /// Path of the SQLite database holding snapshots and the ledger
    #[serde(default = "defaults::database_path")]
    pub database_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_movie: defaults::target_movie(),
            target_date: None,
            check_interval_minutes: defaults::check_interval(),
            database_path: defaults::database_path(),
        }
    }
}

/// HTTP client and schedule extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent page fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// UTC offset of the theaters' local time, e.g. "+09:00"
    #[serde(default = "defaults::utc_offset")]
    pub utc_offset: String,

    /// Theater schedule pages to fetch
    #[serde(default = "defaults::default_theaters")]
    pub theaters: Vec<TheaterPage>,

    /// CSS selectors for schedule extraction
    #[serde(default)]
    pub selectors: ScheduleSelectors,

    /// Keyword rules mapping status text to a booking status
    #[serde(default = "defaults::default_status_rules")]
    pub status_rules: Vec<StatusRule>,
}

impl ScraperConfig {
    /// Parse the configured UTC offset into a `FixedOffset`.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| {
            AppError::config(format!(
                "scraper.utc_offset '{}' is not a valid ±HH:MM offset",
                self.utc_offset
            ))
        })
    }

    /// Map raw status text onto a booking status using the keyword rules.
    ///
    /// A showtime listed without any matching rule is treated as bookable,
    /// which is how the upstream schedule pages present availability.
    pub fn classify_status(&self, text: &str) -> ScreeningStatus {
        let lowered = text.to_lowercase();
        for rule in &self.status_rules {
            if lowered.contains(&rule.contains.to_lowercase()) {
                return rule.status;
            }
        }
        ScreeningStatus::Available
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            utc_offset: defaults::utc_offset(),
            theaters: defaults::default_theaters(),
            selectors: ScheduleSelectors::default(),
            status_rules: defaults::default_status_rules(),
        }
    }
}

fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => (1, value),
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifierConfig {
    /// Incoming webhook URL for notifications
    #[serde(default)]
    pub webhook_url: String,
}

/// One theater schedule page to monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheaterPage {
    /// Theater name as it should appear in screening identities
    pub name: String,

    /// URL of the schedule page
    pub url: String,
}

/// CSS selectors for extracting screenings from a schedule page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSelectors {
    /// Selector for one showtime row
    #[serde(default = "defaults::row_selector")]
    pub row_selector: String,

    /// Selector for the showtime text within a row
    #[serde(default = "defaults::time_selector")]
    pub time_selector: String,

    /// Selector for the movie title within a row, when the page mixes movies
    #[serde(default)]
    pub title_selector: Option<String>,

    /// Selector for status text within a row
    #[serde(default)]
    pub status_selector: Option<String>,

    /// Page-level selector for the screen/format label
    #[serde(default = "defaults::screen_type_selector")]
    pub screen_type_selector: Option<String>,

    /// Row attribute carrying the calendar day (YYYY-MM-DD)
    #[serde(default = "defaults::date_attr")]
    pub date_attr: String,

    /// Row attribute carrying the booking link
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,
}

impl Default for ScheduleSelectors {
    fn default() -> Self {
        Self {
            row_selector: defaults::row_selector(),
            time_selector: defaults::time_selector(),
            title_selector: None,
            status_selector: None,
            screen_type_selector: defaults::screen_type_selector(),
            date_attr: defaults::date_attr(),
            link_attr: defaults::link_attr(),
        }
    }
}

/// Maps status text containing a keyword to a booking status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRule {
    /// Case-insensitive substring to look for
    pub contains: String,

    /// Status to assign on match
    pub status: ScreeningStatus,
}

mod defaults {
    use super::{ScreeningStatus, StatusRule, TheaterPage};

    // Monitor defaults
    pub fn target_movie() -> String {
        "Avatar: Fire and Ash".into()
    }
    pub fn check_interval() -> u64 {
        2
    }
    pub fn database_path() -> String {
        "screenings.db".into()
    }

    // Scraper defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; marquee/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn utc_offset() -> String {
        "+09:00".into()
    }

    pub fn default_theaters() -> Vec<TheaterPage> {
        vec![TheaterPage {
            name: "CGV Yongsan I'Park Mall IMAX".to_string(),
            url: "https://www.imax.com/ko/kr/theatre/cgv-yongsan-i-park-mall-imax".to_string(),
        }]
    }

    pub fn default_status_rules() -> Vec<StatusRule> {
        vec![
            StatusRule {
                contains: "sold out".to_string(),
                status: ScreeningStatus::SoldOut,
            },
            StatusRule {
                contains: "매진".to_string(),
                status: ScreeningStatus::SoldOut,
            },
            StatusRule {
                contains: "coming soon".to_string(),
                status: ScreeningStatus::ComingSoon,
            },
            StatusRule {
                contains: "예매 예정".to_string(),
                status: ScreeningStatus::ComingSoon,
            },
        ]
    }

    // Selector defaults, matching the IMAX theater pages
    pub fn row_selector() -> String {
        ".showtime-tabs_showtime__LW8QL".into()
    }
    pub fn time_selector() -> String {
        ".showtime-tabs_time__McuGP".into()
    }
    pub fn screen_type_selector() -> Option<String> {
        Some(".movie-variant-label_movieVariantLabel__zacJr".into())
    }
    pub fn date_attr() -> String {
        "data-date".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }
}
