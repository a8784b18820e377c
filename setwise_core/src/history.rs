//! Completed-workout history and streak tracking.
//!
//! Records are kept newest-first in `workout_history.json`; the derived
//! streak is written alongside to `workout_streak.json` after every change
//! and is never edited on its own. Writers serialize on an exclusive lock of
//! `workout_history.lock` and merge with the file on disk, so concurrent
//! processes never drop each other's records.

use crate::store::{read_locked, write_json_atomic};
use crate::{CompletedWorkoutRecord, Error, ProgramDayId, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use fs2::FileExt;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const HISTORY_FILE: &str = "workout_history.json";
const STREAK_FILE: &str = "workout_streak.json";
const LOCK_FILE: &str = "workout_history.lock";

/// Count consecutive calendar days with at least one workout.
///
/// Days are UTC dates. The run must reach today or yesterday; older
/// history on its own yields 0.
pub fn compute_streak(records: &[CompletedWorkoutRecord], today: NaiveDate) -> u32 {
    let dates = unique_dates_desc(records);
    let Some(&latest) = dates.first() else {
        return 0;
    };

    let yesterday = today - Duration::days(1);
    if latest != today && latest != yesterday {
        return 0;
    }

    let mut streak = 1;
    let mut previous = latest;
    for &date in &dates[1..] {
        if previous - date != Duration::days(1) {
            break;
        }
        streak += 1;
        previous = date;
    }
    streak
}

/// Longest run of consecutive days anywhere in the history
pub fn longest_streak(records: &[CompletedWorkoutRecord]) -> u32 {
    let dates = unique_dates_desc(records);
    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for date in dates {
        run = match previous {
            Some(p) if p - date == Duration::days(1) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(date);
    }
    best
}

fn unique_dates_desc(records: &[CompletedWorkoutRecord]) -> Vec<NaiveDate> {
    let dates: BTreeSet<NaiveDate> = records
        .iter()
        .map(|r| r.completed_at.date_naive())
        .collect();
    dates.into_iter().rev().collect()
}

/// Aggregate numbers over the whole history
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryStats {
    pub total_workouts: u32,
    pub total_minutes: u32,
    pub average_minutes: f64,
    pub workouts_last_7_days: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Persistent list of completed workouts
#[derive(Debug)]
pub struct HistoryTracker {
    dir: PathBuf,
    records: Vec<CompletedWorkoutRecord>,
    streak: u32,
    /// Calendar day the streak is measured against; only moves forward
    as_of: NaiveDate,
}

impl HistoryTracker {
    /// Load history from `dir`.
    ///
    /// A missing file means empty history. A corrupt file is logged and
    /// treated as empty rather than failing the caller.
    pub fn load(dir: impl Into<PathBuf>, today: NaiveDate) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(HISTORY_FILE);

        let mut records = read_records(&path)?;
        sort_newest_first(&mut records);

        let streak = compute_streak(&records, today);
        tracing::debug!(
            "Loaded {} history records from {:?}, streak {}",
            records.len(),
            path,
            streak
        );

        Ok(Self {
            dir,
            records,
            streak,
            as_of: today,
        })
    }

    pub fn records(&self) -> &[CompletedWorkoutRecord] {
        &self.records
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn streak_path(&self) -> PathBuf {
        self.dir.join(STREAK_FILE)
    }

    /// Add a finished workout and persist.
    ///
    /// A record with the same program day and timestamp as an existing one
    /// is a duplicate and is ignored. Returns whether a record was added.
    pub fn record_completion(
        &mut self,
        program_day_id: ProgramDayId,
        name: &str,
        exercise_count: u32,
        duration_minutes: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let lock = self.lock()?;
        let on_disk = read_records(&self.history_path())?;
        self.merge(on_disk);

        let duplicate = self
            .records
            .iter()
            .any(|r| r.program_day_id == program_day_id && r.completed_at == completed_at);
        if duplicate {
            tracing::info!(
                "History already has day {} at {}, skipping",
                program_day_id,
                completed_at.to_rfc3339()
            );
            lock.unlock()?;
            return Ok(false);
        }

        self.records.insert(
            0,
            CompletedWorkoutRecord {
                program_day_id,
                name: name.to_string(),
                exercise_count,
                completed_at,
                duration_minutes,
            },
        );
        sort_newest_first(&mut self.records);
        self.as_of = self.as_of.max(completed_at.date_naive());
        self.streak = compute_streak(&self.records, self.as_of);
        self.persist()?;
        lock.unlock()?;

        tracing::info!(
            "Recorded day {} ({} min), streak now {}",
            program_day_id,
            duration_minutes,
            self.streak
        );
        Ok(true)
    }

    pub fn is_day_completed(&self, program_day_id: ProgramDayId) -> bool {
        self.records.iter().any(|r| r.program_day_id == program_day_id)
    }

    pub fn stats(&self, today: NaiveDate) -> HistoryStats {
        let total_workouts = self.records.len() as u32;
        let total_minutes: u32 = self.records.iter().map(|r| r.duration_minutes).sum();
        let week_start = today - Duration::days(6);
        let workouts_last_7_days = self
            .records
            .iter()
            .filter(|r| {
                let date = r.completed_at.date_naive();
                date >= week_start && date <= today
            })
            .count() as u32;

        HistoryStats {
            total_workouts,
            total_minutes,
            average_minutes: if total_workouts == 0 {
                0.0
            } else {
                total_minutes as f64 / total_workouts as f64
            },
            workouts_last_7_days,
            current_streak: compute_streak(&self.records, today),
            longest_streak: longest_streak(&self.records),
        }
    }

    /// Take the writer lock, creating the history directory if needed
    fn lock(&self) -> Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Fold in records another process wrote since this tracker loaded
    fn merge(&mut self, on_disk: Vec<CompletedWorkoutRecord>) {
        let before = self.records.len();
        for record in on_disk {
            let known = self.records.iter().any(|r| {
                r.program_day_id == record.program_day_id && r.completed_at == record.completed_at
            });
            if !known {
                self.records.push(record);
            }
        }
        if self.records.len() != before {
            tracing::debug!(
                "Merged {} records written by another process",
                self.records.len() - before
            );
            sort_newest_first(&mut self.records);
        }
    }

    fn persist(&self) -> Result<()> {
        write_json_atomic(&self.history_path(), &self.records)?;
        write_json_atomic(&self.streak_path(), &self.streak)?;
        Ok(())
    }

    /// Write every record to a CSV file, replacing any previous export.
    ///
    /// Rows go to a temp file next to the target, which is synced and then
    /// renamed over it; a failed export leaves the previous file intact.
    pub fn export_csv(&self, csv_path: &Path) -> Result<usize> {
        let parent = match csv_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(true)
                .from_writer(temp.as_file());
            for record in &self.records {
                writer.serialize(CsvRow::from(record))?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(csv_path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Exported {} records to {:?}", self.records.len(), csv_path);
        Ok(self.records.len())
    }
}

/// Parse the history file; a corrupt file is logged and read as empty
fn read_records(path: &Path) -> Result<Vec<CompletedWorkoutRecord>> {
    let Some(contents) = read_locked(path)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<CompletedWorkoutRecord>>(&contents) {
        Ok(records) => Ok(records),
        Err(e) => {
            tracing::warn!("Failed to parse history {:?}: {}. Starting empty.", path, e);
            Ok(Vec::new())
        }
    }
}

fn sort_newest_first(records: &mut [CompletedWorkoutRecord]) {
    records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
}

/// A row in the CSV export
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CsvRow {
    program_day_id: ProgramDayId,
    name: String,
    exercise_count: u32,
    completed_at: String,
    duration_minutes: u32,
}

impl From<&CompletedWorkoutRecord> for CsvRow {
    fn from(record: &CompletedWorkoutRecord) -> Self {
        CsvRow {
            program_day_id: record.program_day_id,
            name: record.name.clone(),
            exercise_count: record.exercise_count,
            completed_at: record.completed_at.to_rfc3339(),
            duration_minutes: record.duration_minutes,
        }
    }
}
