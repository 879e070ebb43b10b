// src/services/schedule.rs

//! HTTP schedule scraper service.
//!
//! Fetches theater schedule pages and extracts screenings using configured
//! CSS selectors. Individual rows that fail to parse are logged and
//! skipped; a page that cannot be fetched fails the whole scrape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{ScraperConfig, Screening, TheaterPage};
use crate::services::ScheduleSource;
use crate::utils::resolve;

/// Service scraping screenings from theater schedule pages.
pub struct HttpScheduleScraper {
    config: Arc<ScraperConfig>,
    client: Client,
    showtime_pattern: Regex,
}

impl HttpScheduleScraper {
    /// Create a new scraper with the given configuration.
    pub fn new(config: Arc<ScraperConfig>) -> Result<Self> {
        let client = crate::utils::http::create_async_client(&config)?;
        // Matches "19:30", "4:30 PM" and the Korean "오후 4:30" forms
        let showtime_pattern = Regex::new(r"(?i)(오전|오후|AM|PM)?\s*(\d{1,2}):(\d{2})\s*(AM|PM)?")
            .map_err(|e| AppError::config(format!("Invalid showtime pattern: {e}")))?;

        Ok(Self {
            config,
            client,
            showtime_pattern,
        })
    }

    /// Fetch and parse a single theater page.
    async fn fetch_theater(
        &self,
        theater: &TheaterPage,
        target_movie: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<Screening>> {
        let response = self
            .client
            .get(&theater.url)
            .send()
            .await
            .map_err(|e| AppError::scrape(&theater.url, e))?
            .error_for_status()
            .map_err(|e| AppError::scrape(&theater.url, e))?;
        let html = response
            .text()
            .await
            .map_err(|e| AppError::scrape(&theater.url, e))?;

        self.parse_schedule(&html, theater, target_movie, date_hint)
    }

    /// Fetch a theater page and tag the result with its source theater name.
    async fn fetch_theater_labeled(
        &self,
        theater: &TheaterPage,
        target_movie: &str,
        date_hint: Option<NaiveDate>,
    ) -> (String, Result<Vec<Screening>>) {
        let result = self.fetch_theater(theater, target_movie, date_hint).await;
        (theater.name.clone(), result)
    }

    /// Extract screenings from a schedule page.
    fn parse_schedule(
        &self,
        html: &str,
        theater: &TheaterPage,
        target_movie: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<Screening>> {
        let selectors = &self.config.selectors;
        let document = Html::parse_document(html);

        let row_sel = parse_selector(&selectors.row_selector)?;
        let time_sel = parse_selector(&selectors.time_selector)?;
        let title_sel = selectors
            .title_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;
        let status_sel = selectors
            .status_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;

        // The format label sits at page level on the pages we scrape
        let screen_type = selectors
            .screen_type_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?
            .and_then(|sel| document.select(&sel).next().map(element_text));

        let offset = self.config.utc_offset()?;
        let target_lower = target_movie.to_lowercase();
        let mut screenings = Vec::new();

        for row in document.select(&row_sel) {
            let movie_title = match &title_sel {
                Some(sel) => {
                    let Some(title) = row.select(sel).next().map(element_text) else {
                        continue;
                    };
                    if !title.to_lowercase().contains(&target_lower) {
                        continue;
                    }
                    title
                }
                None => target_movie.to_string(),
            };

            let Some(time_text) = row.select(&time_sel).next().map(element_text) else {
                log::warn!("Showtime row without time text on {}", theater.url);
                continue;
            };
            let Some(time) = self.parse_showtime(&time_text) else {
                log::warn!("Unparseable showtime '{}' on {}", time_text, theater.url);
                continue;
            };

            let date = row
                .value()
                .attr(&selectors.date_attr)
                .and_then(|raw| raw.parse::<NaiveDate>().ok())
                .or(date_hint);
            let Some(date) = date else {
                log::warn!(
                    "Showtime row without '{}' attribute and no date hint on {}",
                    selectors.date_attr,
                    theater.url
                );
                continue;
            };

            let starts_at = date
                .and_time(time)
                .and_local_timezone(offset)
                .single()
                .ok_or_else(|| {
                    AppError::validation(format!("Ambiguous local time {date} {time}"))
                })?;

            // A listed showtime is bookable unless a status badge says otherwise
            let status = match &status_sel {
                Some(sel) => match row.select(sel).next().map(element_text) {
                    Some(text) => self.config.classify_status(&text),
                    None => self.config.classify_status(""),
                },
                None => self.config.classify_status(""),
            };

            let booking_url = row
                .value()
                .attr(&selectors.link_attr)
                .and_then(|href| resolve(&theater.url, href));

            screenings.push(Screening {
                movie_title,
                theater: theater.name.clone(),
                date,
                time,
                starts_at,
                booking_url,
                status,
                screen_type: screen_type.clone(),
            });
        }

        Ok(screenings)
    }

    /// Parse a showtime text into a wall-clock time.
    ///
    /// Accepts 24-hour "19:30" as well as 12-hour forms with an English or
    /// Korean period marker ("4:30 PM", "오후 4:30").
    fn parse_showtime(&self, text: &str) -> Option<chrono::NaiveTime> {
        let captures = self.showtime_pattern.captures(text)?;
        let period = captures
            .get(1)
            .or_else(|| captures.get(4))
            .map(|m| m.as_str().to_uppercase());
        let mut hour: u32 = captures.get(2)?.as_str().parse().ok()?;
        let minute: u32 = captures.get(3)?.as_str().parse().ok()?;

        match period.as_deref() {
            Some("PM") | Some("오후") if hour != 12 => hour += 12,
            Some("AM") | Some("오전") if hour == 12 => hour = 0,
            _ => {}
        }

        chrono::NaiveTime::from_hms_opt(hour, minute, 0)
    }
}

#[async_trait]
impl ScheduleSource for HttpScheduleScraper {
    async fn fetch_schedule(
        &self,
        target_movie: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<Screening>> {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let concurrency = self.config.max_concurrent.max(1);

        let mut page_stream = stream::iter(self.config.theaters.clone())
            .map(|theater| async move {
                self.fetch_theater_labeled(&theater, target_movie, date_hint)
                    .await
            })
            .buffer_unordered(concurrency);

        let mut screenings = Vec::new();
        while let Some((theater_name, result)) = page_stream.next().await {
            let page_screenings = result?;
            log::info!(
                "{}: {} screenings found",
                theater_name,
                page_screenings.len()
            );
            screenings.extend(page_screenings);

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(screenings)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, e))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScheduleSelectors, ScreeningStatus};

    fn test_config() -> ScraperConfig {
        ScraperConfig {
            selectors: ScheduleSelectors {
                row_selector: "a.showtime".into(),
                time_selector: ".time".into(),
                title_selector: None,
                status_selector: Some(".badge".into()),
                screen_type_selector: Some(".variant".into()),
                date_attr: "data-date".into(),
                link_attr: "href".into(),
            },
            ..ScraperConfig::default()
        }
    }

    fn test_theater() -> TheaterPage {
        TheaterPage {
            name: "Grand Cinema".to_string(),
            url: "https://example.com/theatre/grand".to_string(),
        }
    }

    fn scraper_with(config: ScraperConfig) -> HttpScheduleScraper {
        HttpScheduleScraper::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn test_parse_schedule_extracts_rows() {
        let html = r#"
            <div class="variant">IMAX 3D</div>
            <a class="showtime" data-date="2026-01-20" href="/book/1">
                <span class="time">오후 7:30</span>
            </a>
            <a class="showtime" data-date="2026-01-21" href="/book/2">
                <span class="time">10:00</span>
                <span class="badge">매진</span>
            </a>
        "#;

        let scraper = scraper_with(test_config());
        let screenings = scraper
            .parse_schedule(html, &test_theater(), "Dune", None)
            .unwrap();

        assert_eq!(screenings.len(), 2);

        let first = &screenings[0];
        assert_eq!(first.movie_title, "Dune");
        assert_eq!(first.theater, "Grand Cinema");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 1, 20).unwrap());
        assert_eq!(first.time.format("%H:%M").to_string(), "19:30");
        assert_eq!(first.starts_at.to_rfc3339(), "2026-01-20T19:30:00+09:00");
        assert_eq!(
            first.booking_url.as_deref(),
            Some("https://example.com/book/1")
        );
        assert_eq!(first.status, ScreeningStatus::Available);
        assert_eq!(first.screen_type.as_deref(), Some("IMAX 3D"));

        let second = &screenings[1];
        assert_eq!(second.status, ScreeningStatus::SoldOut);
    }

    #[test]
    fn test_parse_schedule_skips_rows_without_time() {
        let html = r#"
            <a class="showtime" data-date="2026-01-20" href="/book/1"></a>
            <a class="showtime" data-date="2026-01-20" href="/book/2">
                <span class="time">14:00</span>
            </a>
        "#;

        let scraper = scraper_with(test_config());
        let screenings = scraper
            .parse_schedule(html, &test_theater(), "Dune", None)
            .unwrap();
        assert_eq!(screenings.len(), 1);
    }

    #[test]
    fn test_parse_schedule_uses_date_hint_when_attr_missing() {
        let html = r#"
            <a class="showtime" href="/book/1"><span class="time">14:00</span></a>
        "#;

        let scraper = scraper_with(test_config());
        let hint = NaiveDate::from_ymd_opt(2026, 1, 25).unwrap();

        let screenings = scraper
            .parse_schedule(html, &test_theater(), "Dune", Some(hint))
            .unwrap();
        assert_eq!(screenings.len(), 1);
        assert_eq!(screenings[0].date, hint);

        // No attribute and no hint: the row is dropped
        let screenings = scraper
            .parse_schedule(html, &test_theater(), "Dune", None)
            .unwrap();
        assert!(screenings.is_empty());
    }

    #[test]
    fn test_parse_schedule_filters_by_title_when_configured() {
        let mut config = test_config();
        config.selectors.title_selector = Some(".title".into());

        let html = r#"
            <a class="showtime" data-date="2026-01-20" href="/book/1">
                <span class="title">Dune: Part Three</span>
                <span class="time">14:00</span>
            </a>
            <a class="showtime" data-date="2026-01-20" href="/book/2">
                <span class="title">Some Other Movie</span>
                <span class="time">16:00</span>
            </a>
        "#;

        let scraper = scraper_with(config);
        let screenings = scraper
            .parse_schedule(html, &test_theater(), "dune", None)
            .unwrap();
        assert_eq!(screenings.len(), 1);
        assert_eq!(screenings[0].movie_title, "Dune: Part Three");
    }

    #[test]
    fn test_parse_showtime_forms() {
        let scraper = scraper_with(test_config());
        let time = |s: &str| scraper.parse_showtime(s).unwrap().format("%H:%M").to_string();

        assert_eq!(time("19:30"), "19:30");
        assert_eq!(time("4:30 PM"), "16:30");
        assert_eq!(time("12:15 AM"), "00:15");
        assert_eq!(time("12:00 PM"), "12:00");
        assert_eq!(time("오후 4:30"), "16:30");
        assert_eq!(time("오전 12:05"), "00:05");
        assert!(scraper.parse_showtime("soon").is_none());
    }
}
