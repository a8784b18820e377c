//! Dashboard metrics: backend summary merged with locally derived numbers.
//!
//! Backend totals are cached with a TTL. A fresh cache is served as is, a
//! stale one is refreshed, and when the backend cannot be reached the stale
//! copy is used. With nothing cached, totals come from local history.
//! Completion rate and streak are always computed locally.

use crate::history::{compute_streak, HistoryTracker};
use crate::store::{read_locked, write_json_atomic};
use crate::{ProgramDayId, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Totals reported by the backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendSummary {
    pub total_workouts: u32,
    pub total_minutes: u32,
    #[serde(default)]
    pub active_programs: u32,
}

/// Where a summary is fetched from
pub trait SummarySource {
    fn fetch_summary(&self) -> Result<BackendSummary>;
}

/// Which data the backend totals came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricsSource {
    /// Fetched just now
    Live,
    /// Served from a cache within its TTL
    Cached,
    /// Backend unreachable; cache past its TTL
    Stale,
    /// No backend data at all; totals from local history
    LocalOnly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DashboardMetrics {
    pub total_workouts: u32,
    pub total_minutes: u32,
    pub active_programs: Option<u32>,
    /// Completed share of scheduled program days, 0.0..=1.0
    pub completion_rate: f64,
    pub current_streak: u32,
    pub source: MetricsSource,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSummary {
    summary: BackendSummary,
    fetched_at: DateTime<Utc>,
}

/// Share of scheduled program days that appear in history
pub fn completion_rate(history: &HistoryTracker, scheduled: &[ProgramDayId]) -> f64 {
    let scheduled: BTreeSet<ProgramDayId> = scheduled.iter().copied().collect();
    if scheduled.is_empty() {
        return 0.0;
    }
    let done = scheduled
        .iter()
        .filter(|id| history.is_day_completed(**id))
        .count();
    done as f64 / scheduled.len() as f64
}

/// TTL cache over the backend summary, optionally persisted to disk
#[derive(Debug)]
pub struct MetricsCache {
    path: Option<PathBuf>,
    ttl: Duration,
    entry: Option<CachedSummary>,
}

impl MetricsCache {
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            path: None,
            ttl,
            entry: None,
        }
    }

    /// Open a file-backed cache; a missing or corrupt file starts empty
    pub fn load(path: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let path = path.into();
        let entry = match read_locked(&path)? {
            None => None,
            Some(contents) => match serde_json::from_str::<CachedSummary>(&contents) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable dashboard cache {:?}: {}", path, e);
                    None
                }
            },
        };
        Ok(Self {
            path: Some(path),
            ttl,
            entry,
        })
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.entry
            .as_ref()
            .map_or(false, |e| now - e.fetched_at <= self.ttl)
    }

    fn store(&mut self, summary: BackendSummary, now: DateTime<Utc>) {
        let entry = CachedSummary {
            summary,
            fetched_at: now,
        };
        if let Some(path) = &self.path {
            if let Err(e) = write_json_atomic(path, &entry) {
                tracing::warn!("Failed to persist dashboard cache {:?}: {}", path, e);
            }
        }
        self.entry = Some(entry);
    }

    /// Resolve the backend half of the dashboard
    fn resolve(
        &mut self,
        source: Option<&dyn SummarySource>,
        now: DateTime<Utc>,
    ) -> Option<(BackendSummary, MetricsSource)> {
        if self.is_fresh(now) {
            return self
                .entry
                .as_ref()
                .map(|e| (e.summary.clone(), MetricsSource::Cached));
        }

        if let Some(source) = source {
            match source.fetch_summary() {
                Ok(summary) => {
                    self.store(summary.clone(), now);
                    return Some((summary, MetricsSource::Live));
                }
                Err(e) => tracing::warn!("Dashboard summary unavailable: {}", e),
            }
        }

        self.entry
            .as_ref()
            .map(|e| (e.summary.clone(), MetricsSource::Stale))
    }

    /// Build dashboard metrics for `now`
    pub fn metrics(
        &mut self,
        source: Option<&dyn SummarySource>,
        history: &HistoryTracker,
        scheduled: &[ProgramDayId],
        now: DateTime<Utc>,
    ) -> DashboardMetrics {
        let completion_rate = completion_rate(history, scheduled);
        let current_streak = compute_streak(history.records(), now.date_naive());

        match self.resolve(source, now) {
            Some((summary, source)) => DashboardMetrics {
                total_workouts: summary.total_workouts,
                total_minutes: summary.total_minutes,
                active_programs: Some(summary.active_programs),
                completion_rate,
                current_streak,
                source,
            },
            None => {
                let stats = history.stats(now.date_naive());
                DashboardMetrics {
                    total_workouts: stats.total_workouts,
                    total_minutes: stats.total_minutes,
                    active_programs: None,
                    completion_rate,
                    current_streak,
                    source: MetricsSource::LocalOnly,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::TimeZone;
    use std::cell::Cell;

    struct FakeSource {
        summary: BackendSummary,
        fail: Cell<bool>,
        calls: Cell<u32>,
    }

    impl FakeSource {
        fn new(total_workouts: u32) -> Self {
            Self {
                summary: BackendSummary {
                    total_workouts,
                    total_minutes: total_workouts * 50,
                    active_programs: 2,
                },
                fail: Cell::new(false),
                calls: Cell::new(0),
            }
        }
    }

    impl SummarySource for FakeSource {
        fn fetch_summary(&self) -> Result<BackendSummary> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                return Err(Error::Submission("backend responded with status 503".into()));
            }
            Ok(self.summary.clone())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap()
    }

    fn history_with(dir: &std::path::Path, days: &[(ProgramDayId, i64)]) -> HistoryTracker {
        let mut history = HistoryTracker::load(dir, now().date_naive()).unwrap();
        for &(day, days_ago) in days {
            history
                .record_completion(day, "Day", 3, 30, now() - Duration::days(days_ago))
                .unwrap();
        }
        history
    }

    #[test]
    fn test_completion_rate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = history_with(temp_dir.path(), &[(1, 0), (2, 1), (9, 2)]);

        assert_eq!(completion_rate(&history, &[]), 0.0);
        assert!((completion_rate(&history, &[1, 2, 3, 4]) - 0.5).abs() < 1e-9);
        assert!((completion_rate(&history, &[1, 1, 2]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_live_then_cached_within_ttl() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = history_with(temp_dir.path(), &[(1, 0), (2, 1)]);
        let source = FakeSource::new(40);
        let mut cache = MetricsCache::in_memory(Duration::minutes(5));

        let first = cache.metrics(Some(&source), &history, &[1, 2], now());
        assert_eq!(first.source, MetricsSource::Live);
        assert_eq!(first.total_workouts, 40);
        assert_eq!(first.active_programs, Some(2));
        assert_eq!(first.current_streak, 2);
        assert!((first.completion_rate - 1.0).abs() < 1e-9);

        let second = cache.metrics(Some(&source), &history, &[1, 2], now() + Duration::minutes(4));
        assert_eq!(second.source, MetricsSource::Cached);
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn test_expired_cache_refetches() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = history_with(temp_dir.path(), &[]);
        let source = FakeSource::new(10);
        let mut cache = MetricsCache::in_memory(Duration::minutes(5));

        cache.metrics(Some(&source), &history, &[], now());
        let later = cache.metrics(Some(&source), &history, &[], now() + Duration::minutes(6));
        assert_eq!(later.source, MetricsSource::Live);
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn test_falls_back_to_stale_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = history_with(temp_dir.path(), &[]);
        let source = FakeSource::new(10);
        let mut cache = MetricsCache::in_memory(Duration::minutes(5));

        cache.metrics(Some(&source), &history, &[], now());
        source.fail.set(true);
        let metrics = cache.metrics(Some(&source), &history, &[], now() + Duration::hours(1));
        assert_eq!(metrics.source, MetricsSource::Stale);
        assert_eq!(metrics.total_workouts, 10);
    }

    #[test]
    fn test_local_only_without_backend() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = history_with(temp_dir.path(), &[(1, 0), (1, 3)]);
        let mut cache = MetricsCache::in_memory(Duration::minutes(5));

        let metrics = cache.metrics(None, &history, &[1, 2], now());
        assert_eq!(metrics.source, MetricsSource::LocalOnly);
        assert_eq!(metrics.total_workouts, 2);
        assert_eq!(metrics.total_minutes, 60);
        assert_eq!(metrics.active_programs, None);
        assert_eq!(metrics.current_streak, 1);
        assert!((metrics.completion_rate - 0.5).abs() < 1e-9);

        let failing = FakeSource::new(0);
        failing.fail.set(true);
        let metrics = cache.metrics(Some(&failing), &history, &[], now());
        assert_eq!(metrics.source, MetricsSource::LocalOnly);
    }

    #[test]
    fn test_cache_persists_across_loads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = history_with(&temp_dir.path().join("history"), &[]);
        let path = temp_dir.path().join("dashboard_cache.json");
        let source = FakeSource::new(7);

        let mut cache = MetricsCache::load(&path, Duration::minutes(5)).unwrap();
        cache.metrics(Some(&source), &history, &[], now());

        let mut reopened = MetricsCache::load(&path, Duration::minutes(5)).unwrap();
        assert!(reopened.is_fresh(now() + Duration::minutes(1)));
        let metrics = reopened.metrics(None, &history, &[], now() + Duration::minutes(1));
        assert_eq!(metrics.source, MetricsSource::Cached);
        assert_eq!(metrics.total_workouts, 7);
    }

    #[test]
    fn test_corrupt_cache_file_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dashboard_cache.json");
        std::fs::write(&path, "nope").unwrap();

        let cache = MetricsCache::load(&path, Duration::minutes(5)).unwrap();
        assert!(!cache.is_fresh(now()));
    }
}
