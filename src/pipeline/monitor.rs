// src/pipeline/monitor.rs

//! Monitor orchestrator.
//!
//! Drives one monitoring cycle: fetch the current schedule, diff it against
//! the last snapshot, derive events, deliver the ones the ledger has not
//! seen, and append a new snapshot.

use chrono::{NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{MonitorConfig, Snapshot};
use crate::notify::Notifier;
use crate::pipeline::diff::{create_events, diff_schedules};
use crate::services::ScheduleSource;
use crate::storage::MonitorStore;

/// Lifecycle state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Uninitialized,
    Initialized,
    Checking,
    Idle,
    Closed,
}

/// Counters describing one completed cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    /// Screenings in the fetched schedule
    pub fetched: usize,
    /// New screenings in the diff
    pub added: usize,
    /// Status transitions in the diff
    pub status_changed: usize,
    /// Notifications delivered this cycle
    pub sent: usize,
    /// Events skipped because the ledger already recorded them
    pub skipped: usize,
}

/// Orchestrator tying the schedule source, the stores and the notifier
/// together.
///
/// Cycles take `&mut self`; callers run them strictly one after another, so
/// a cycle never observes a half-processed predecessor.
pub struct ScheduleMonitor {
    source: Box<dyn ScheduleSource>,
    store: Box<dyn MonitorStore>,
    notifier: Box<dyn Notifier>,
    target_movie: String,
    target_date: Option<NaiveDate>,
    state: MonitorState,
}

impl ScheduleMonitor {
    /// Create a monitor in the `Uninitialized` state.
    pub fn new(
        source: Box<dyn ScheduleSource>,
        store: Box<dyn MonitorStore>,
        notifier: Box<dyn Notifier>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            target_movie: config.target_movie.clone(),
            target_date: config.target_date,
            state: MonitorState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Move the monitor into service.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != MonitorState::Uninitialized {
            return Err(AppError::state(format!(
                "Monitor cannot be initialized from {:?}",
                self.state
            )));
        }
        self.state = MonitorState::Initialized;
        log::info!(
            "Schedule monitor initialized for \"{}\" (all dates monitored{})",
            self.target_movie,
            match self.target_date {
                Some(date) => format!(", primary focus: {date}"),
                None => String::new(),
            }
        );
        Ok(())
    }

    /// Run one monitoring cycle.
    ///
    /// On failure the snapshot append is skipped, so the next cycle diffs
    /// against the same last-known-good snapshot; a best-effort error
    /// notification is sent and the failure is re-raised.
    pub async fn check_schedule(&mut self) -> Result<CycleSummary> {
        match self.state {
            MonitorState::Uninitialized => {
                return Err(AppError::state("Monitor is not initialized"));
            }
            MonitorState::Closed => {
                return Err(AppError::state("Monitor is closed"));
            }
            _ => {}
        }

        self.state = MonitorState::Checking;
        let result = self.run_cycle().await;
        self.state = MonitorState::Idle;

        if let Err(error) = &result {
            log::error!("Schedule check failed: {error}");
            // Best-effort; a failure of the error channel is only logged
            if let Err(notify_error) = self.notifier.send_error(&error.to_string()).await {
                log::warn!("Failed to send error notification: {notify_error}");
            }
        }

        result
    }

    async fn run_cycle(&self) -> Result<CycleSummary> {
        log::info!("Checking schedule for \"{}\"", self.target_movie);

        let current = self
            .source
            .fetch_schedule(&self.target_movie, self.target_date)
            .await?;
        log::info!("Found {} screenings", current.len());

        let last_snapshot = self.store.last_snapshot().await?;
        let previous = last_snapshot
            .map(|snapshot| snapshot.screenings)
            .unwrap_or_default();

        // Every published date is diffed; the target date is informational
        let diff = diff_schedules(&previous, &current, None);
        log::info!(
            "Diff: {} added, {} status changed",
            diff.added.len(),
            diff.status_changed.len()
        );

        let events = create_events(&diff, Utc::now());

        let mut summary = CycleSummary {
            fetched: current.len(),
            added: diff.added.len(),
            status_changed: diff.status_changed.len(),
            ..CycleSummary::default()
        };

        // Strict check -> send -> mark per event. A crash between send and
        // mark is the one window that can duplicate a delivery.
        for event in &events {
            let key = event.screening.key();
            if self.store.was_sent(&key, event.kind).await? {
                log::debug!("Notification already sent for {} {}", event.kind, key);
                summary.skipped += 1;
                continue;
            }

            self.notifier.send(event).await?;
            self.store.mark_sent(&key, event.kind, Utc::now()).await?;
            log::info!("Notification sent for {} {}", event.kind, key);
            summary.sent += 1;
        }

        // The snapshot log grows every cycle, also when nothing changed
        let snapshot = Snapshot::capture(current, Utc::now());
        self.store.save_snapshot(&snapshot).await?;

        log::info!("Schedule check completed");
        Ok(summary)
    }

    /// Release resources and leave the monitor unusable.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == MonitorState::Closed {
            return Ok(());
        }
        self.store.close().await?;
        self.state = MonitorState::Closed;
        log::info!("Schedule monitor closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};

    use super::*;
    use crate::models::{EventKind, ScheduleEvent, Screening, ScreeningStatus};
    use crate::storage::SqliteStore;

    /// Schedule source driven by an explicitly injected sequence of cycle
    /// results, one per `fetch_schedule` call.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        cycles: Arc<Mutex<VecDeque<Result<Vec<Screening>>>>>,
    }

    impl ScriptedSource {
        fn push(&self, cycle: Result<Vec<Screening>>) {
            self.cycles.lock().unwrap().push_back(cycle);
        }
    }

    #[async_trait]
    impl ScheduleSource for ScriptedSource {
        async fn fetch_schedule(
            &self,
            _target_movie: &str,
            _date_hint: Option<NaiveDate>,
        ) -> Result<Vec<Screening>> {
            self.cycles
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct NotifierInner {
        sent: Mutex<Vec<(EventKind, String)>>,
        errors: Mutex<Vec<String>>,
        fail_sends: AtomicBool,
        fail_error_sends: AtomicBool,
    }

    /// Notifier recording every delivery instead of performing one.
    #[derive(Clone, Default)]
    struct RecordingNotifier {
        inner: Arc<NotifierInner>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(EventKind, String)> {
            self.inner.sent.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.inner.errors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, event: &ScheduleEvent) -> Result<()> {
            if self.inner.fail_sends.load(Ordering::SeqCst) {
                return Err(AppError::delivery("webhook unreachable"));
            }
            self.inner
                .sent
                .lock()
                .unwrap()
                .push((event.kind, event.screening.key()));
            Ok(())
        }

        async fn send_error(&self, message: &str) -> Result<()> {
            if self.inner.fail_error_sends.load(Ordering::SeqCst) {
                return Err(AppError::delivery("error channel unreachable"));
            }
            self.inner.errors.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn make_screening(hour: u32, status: ScreeningStatus) -> Screening {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let starts_at = offset.with_ymd_and_hms(2026, 1, 20, hour, 0, 0).unwrap();
        Screening {
            movie_title: "Dune".to_string(),
            theater: "Grand Cinema".to_string(),
            date: starts_at.date_naive(),
            time: starts_at.time(),
            starts_at,
            booking_url: None,
            status,
            screen_type: None,
        }
    }

    async fn make_monitor() -> (ScheduleMonitor, ScriptedSource, RecordingNotifier, SqliteStore)
    {
        let source = ScriptedSource::default();
        let notifier = RecordingNotifier::default();
        let store = SqliteStore::open_in_memory().await.unwrap();
        let monitor = ScheduleMonitor::new(
            Box::new(source.clone()),
            Box::new(store.clone()),
            Box::new(notifier.clone()),
            &MonitorConfig::default(),
        );
        (monitor, source, notifier, store)
    }

    #[tokio::test]
    async fn test_check_requires_initialization() {
        let (mut monitor, _source, _notifier, _store) = make_monitor().await;
        assert_eq!(monitor.state(), MonitorState::Uninitialized);
        assert!(monitor.check_schedule().await.is_err());
    }

    #[tokio::test]
    async fn test_check_rejected_after_close() {
        let (mut monitor, _source, _notifier, _store) = make_monitor().await;
        monitor.initialize().unwrap();
        monitor.close().await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Closed);
        assert!(monitor.check_schedule().await.is_err());
    }

    #[tokio::test]
    async fn test_first_cycle_notifies_every_screening() {
        let (mut monitor, source, notifier, _store) = make_monitor().await;
        monitor.initialize().unwrap();

        source.push(Ok(vec![
            make_screening(10, ScreeningStatus::Available),
            make_screening(14, ScreeningStatus::Available),
        ]));

        let summary = monitor.check_schedule().await.unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.skipped, 0);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(kind, _)| *kind == EventKind::NewScreening));
    }

    #[tokio::test]
    async fn test_identical_cycles_send_nothing_twice() {
        let (mut monitor, source, notifier, _store) = make_monitor().await;
        monitor.initialize().unwrap();

        let schedule = vec![
            make_screening(10, ScreeningStatus::Available),
            make_screening(14, ScreeningStatus::Available),
        ];
        source.push(Ok(schedule.clone()));
        source.push(Ok(schedule));

        let first = monitor.check_schedule().await.unwrap();
        assert_eq!(first.sent, 2);

        // Second cycle diffs against the snapshot the first one appended
        let second = monitor.check_schedule().await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.status_changed, 0);
        assert_eq!(second.sent, 0);
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_status_change_notified_with_previous_status() {
        let (mut monitor, source, notifier, _store) = make_monitor().await;
        monitor.initialize().unwrap();

        source.push(Ok(vec![make_screening(10, ScreeningStatus::Available)]));
        source.push(Ok(vec![make_screening(10, ScreeningStatus::SoldOut)]));

        monitor.check_schedule().await.unwrap();
        let summary = monitor.check_schedule().await.unwrap();
        assert_eq!(summary.status_changed, 1);
        assert_eq!(summary.sent, 1);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, EventKind::StatusChange);
        // Same key, different event kind
        assert_eq!(sent[0].1, sent[1].1);
    }

    #[tokio::test]
    async fn test_scrape_failure_keeps_last_snapshot() {
        let (mut monitor, source, notifier, store) = make_monitor().await;
        monitor.initialize().unwrap();

        source.push(Ok(vec![make_screening(10, ScreeningStatus::Available)]));
        source.push(Err(AppError::scrape("https://example.com", "timed out")));
        source.push(Ok(vec![
            make_screening(10, ScreeningStatus::Available),
            make_screening(14, ScreeningStatus::Available),
        ]));

        monitor.check_schedule().await.unwrap();
        let good_snapshot = store.last_snapshot().await.unwrap().unwrap();

        // Failed cycle: no snapshot appended, error notification sent
        assert!(monitor.check_schedule().await.is_err());
        let after_failure = store.last_snapshot().await.unwrap().unwrap();
        assert_eq!(after_failure, good_snapshot);
        assert_eq!(notifier.errors().len(), 1);

        // Next cycle diffs against the pre-failure snapshot: one new showing
        let summary = monitor.check_schedule().await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn test_send_failure_aborts_cycle_before_snapshot() {
        let (mut monitor, source, notifier, store) = make_monitor().await;
        monitor.initialize().unwrap();

        notifier.inner.fail_sends.store(true, Ordering::SeqCst);
        source.push(Ok(vec![make_screening(10, ScreeningStatus::Available)]));

        let result = monitor.check_schedule().await;
        assert!(matches!(result, Err(AppError::Delivery(_))));

        // Nothing marked, nothing snapshotted: the event is re-offered next
        // cycle because the diff still reports it
        assert!(store.last_snapshot().await.unwrap().is_none());
        let key = make_screening(10, ScreeningStatus::Available).key();
        assert!(!store.was_sent(&key, EventKind::NewScreening).await.unwrap());

        notifier.inner.fail_sends.store(false, Ordering::SeqCst);
        source.push(Ok(vec![make_screening(10, ScreeningStatus::Available)]));
        let summary = monitor.check_schedule().await.unwrap();
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn test_error_notification_failure_is_swallowed() {
        let (mut monitor, source, notifier, _store) = make_monitor().await;
        monitor.initialize().unwrap();

        notifier.inner.fail_error_sends.store(true, Ordering::SeqCst);
        source.push(Err(AppError::scrape("https://example.com", "boom")));

        // The cycle error surfaces; the error-channel failure does not
        let result = monitor.check_schedule().await;
        assert!(matches!(result, Err(AppError::Scrape { .. })));
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn test_snapshot_appended_when_diff_is_empty() {
        let (mut monitor, source, _notifier, store) = make_monitor().await;
        monitor.initialize().unwrap();

        source.push(Ok(vec![]));
        monitor.check_schedule().await.unwrap();

        // An empty schedule still produces a snapshot row
        let snapshot = store.last_snapshot().await.unwrap().unwrap();
        assert!(snapshot.screenings.is_empty());
    }
}
