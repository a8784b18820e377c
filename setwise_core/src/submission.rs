//! Workout log submission.
//!
//! Turns the live session into the backend payload, clamps its duration,
//! sends it through a `LogSubmitter`, and on acknowledgment records the
//! workout into history and clears the session.

use crate::clock::Clock;
use crate::history::HistoryTracker;
use crate::session::SessionManager;
use crate::{Error, ExerciseId, ProgramDayId, Result, WorkoutSession};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_DURATION_MINUTES: u32 = 1;
pub const MAX_DURATION_MINUTES: u32 = 600;

/// Body of the workout-log write
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutLogPayload {
    pub program_day_id: ProgramDayId,
    /// ISO-8601, UTC
    pub completed_at: String,
    pub duration_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub exercises_logged_json: String,
}

/// One exercise inside `exercisesLoggedJson`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggedExercise {
    pub exercise_id: ExerciseId,
    pub sets: Vec<LoggedSet>,
    pub duration_seconds: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggedSet {
    pub index: u32,
    pub reps: u32,
    pub completed: bool,
}

/// Transport for the finished log
pub trait LogSubmitter {
    fn submit(&self, payload: &WorkoutLogPayload) -> Result<()>;
}

/// Force a duration into the accepted range
///
/// Negative elapsed time (clock skew) clamps to the minimum like any other
/// short workout.
pub fn clamp_duration_minutes(elapsed_ms: i64) -> u32 {
    let minutes = elapsed_ms.div_euclid(60_000);
    minutes.clamp(MIN_DURATION_MINUTES as i64, MAX_DURATION_MINUTES as i64) as u32
}

/// Serialize the per-exercise logs into the opaque JSON string
pub fn serialize_exercises(session: &WorkoutSession) -> Result<String> {
    let logged: Vec<LoggedExercise> = session
        .exercises
        .iter()
        .map(|exercise| LoggedExercise {
            exercise_id: exercise.exercise_id,
            sets: exercise
                .sets
                .iter()
                .map(|set| LoggedSet {
                    index: set.index,
                    reps: set.reps_completed,
                    completed: set.completed,
                })
                .collect(),
            duration_seconds: exercise.duration_seconds,
        })
        .collect();
    Ok(serde_json::to_string(&logged)?)
}

/// Build the payload for a session finished at `now`
pub fn build_payload(
    session: &WorkoutSession,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<WorkoutLogPayload> {
    let elapsed_ms = (now - session.started_at).num_milliseconds();
    let duration_minutes = clamp_duration_minutes(elapsed_ms);
    if elapsed_ms.div_euclid(60_000) != duration_minutes as i64 {
        tracing::debug!(
            "Clamped duration of session {} from {}ms to {} min",
            session.attempt_id,
            elapsed_ms,
            duration_minutes
        );
    }

    Ok(WorkoutLogPayload {
        program_day_id: session.program_day_id,
        completed_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        duration_minutes,
        notes: notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        exercises_logged_json: serialize_exercises(session)?,
    })
}

impl<C: Clock> SessionManager<C> {
    /// Build and send the workout log for the live session.
    ///
    /// The session is left untouched; see `finalize` for the post-submit
    /// bookkeeping.
    pub fn submit_workout_log<S: LogSubmitter + ?Sized>(
        &self,
        submitter: &S,
        notes: Option<&str>,
    ) -> Result<WorkoutLogPayload> {
        let session = self.session().ok_or(Error::NoActiveSession)?;
        let payload = build_payload(session, notes, self.clock().now())?;

        tracing::info!(
            "Submitting session {} for day {} ({} min)",
            session.attempt_id,
            payload.program_day_id,
            payload.duration_minutes
        );
        submitter.submit(&payload)?;
        Ok(payload)
    }

    /// Submit, then record history and clear the session.
    ///
    /// History is written only after the backend acknowledges the log, and
    /// the session is cleared only once history is on disk. On any failure
    /// the session and its snapshot stay so the caller can retry; history
    /// dedupes on day and timestamp, so recording the same payload twice
    /// does not double count.
    pub fn finalize<S: LogSubmitter + ?Sized>(
        &mut self,
        submitter: &S,
        history: &mut HistoryTracker,
        notes: Option<&str>,
    ) -> Result<WorkoutLogPayload> {
        let payload = match self.submit_workout_log(submitter, notes) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Workout log submission failed, keeping session: {}", e);
                return Err(e);
            }
        };

        let session = self.session().ok_or(Error::NoActiveSession)?;
        let completed_at = DateTime::parse_from_rfc3339(&payload.completed_at)
            .map_err(|e| Error::Other(format!("Invalid completion time: {}", e)))?
            .with_timezone(&Utc);

        if let Err(e) = history.record_completion(
            session.program_day_id,
            &session.program_day_name,
            session.exercises.len() as u32,
            payload.duration_minutes,
            completed_at,
        ) {
            tracing::warn!("Workout log accepted but history write failed, keeping session: {}", e);
            return Err(e);
        }

        self.clear_submitted()?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SessionStore;
    use crate::{ExerciseDefinition, ProgramDay};
    use chrono::{Duration, TimeZone};
    use std::cell::RefCell;

    /// Records every payload; optionally fails
    #[derive(Default)]
    struct RecordingSubmitter {
        sent: RefCell<Vec<WorkoutLogPayload>>,
        fail: bool,
    }

    impl LogSubmitter for RecordingSubmitter {
        fn submit(&self, payload: &WorkoutLogPayload) -> Result<()> {
            if self.fail {
                return Err(Error::Submission("connection reset".into()));
            }
            self.sent.borrow_mut().push(payload.clone());
            Ok(())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 7, 0, 0).unwrap()
    }

    fn day(n_exercises: u32, sets: u32) -> ProgramDay {
        ProgramDay {
            id: 12,
            name: "Upper".into(),
            exercises: (1..=n_exercises)
                .map(|id| ExerciseDefinition {
                    exercise_id: id,
                    name: format!("Exercise {}", id),
                    sets,
                    reps: "6-10".into(),
                    rest_seconds: 60,
                })
                .collect(),
        }
    }

    fn run_everything(mgr: &mut SessionManager<ManualClock>, n: u32, k: u32) -> u32 {
        let mut total = 0;
        for ex in 1..=n {
            for set in 1..=k {
                let reps = 6 + (ex + set) % 5;
                mgr.log_set_completion(ex, set, reps).unwrap();
                total += reps;
            }
            mgr.complete_exercise(ex, 90).unwrap();
        }
        total
    }

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(clamp_duration_minutes(0), 1);
        assert_eq!(clamp_duration_minutes(59_999), 1);
        assert_eq!(clamp_duration_minutes(-120_000), 1);
        assert_eq!(clamp_duration_minutes(45 * 60_000 + 30_000), 45);
        assert_eq!(clamp_duration_minutes(5 * 60 * 60_000), 300);
        assert_eq!(clamp_duration_minutes(11 * 60 * 60_000), 600);
    }

    #[test]
    fn test_duration_clamped_for_instant_and_long_sessions() {
        let submitter = RecordingSubmitter::default();

        let mut mgr = SessionManager::new(ManualClock::new(start()));
        mgr.initialize(&day(1, 1), false).unwrap();
        let payload = mgr.submit_workout_log(&submitter, None).unwrap();
        assert_eq!(payload.duration_minutes, 1);

        mgr.clock().advance(Duration::hours(5));
        let payload = mgr.submit_workout_log(&submitter, None).unwrap();
        assert_eq!(payload.duration_minutes, 300);

        mgr.clock().advance(Duration::hours(6));
        let payload = mgr.submit_workout_log(&submitter, None).unwrap();
        assert_eq!(payload.duration_minutes, 600);
    }

    #[test]
    fn test_submit_without_session() {
        let mgr = SessionManager::new(ManualClock::new(start()));
        let err = mgr
            .submit_workout_log(&RecordingSubmitter::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));
    }

    #[test]
    fn test_payload_shape() {
        let submitter = RecordingSubmitter::default();
        let mut mgr = SessionManager::new(ManualClock::new(start()));
        mgr.initialize(&day(1, 2), false).unwrap();
        mgr.log_set_completion(1, 1, 8).unwrap();
        mgr.clock().advance(Duration::minutes(42));

        mgr.submit_workout_log(&submitter, Some("  felt strong "))
            .unwrap();
        let sent = submitter.sent.borrow();
        let json = serde_json::to_value(&sent[0]).unwrap();

        assert_eq!(json["programDayId"], 12);
        assert_eq!(json["durationMinutes"], 42);
        assert_eq!(json["notes"], "felt strong");
        assert_eq!(json["completedAt"], "2024-06-12T07:42:00.000Z");

        let logged: Vec<serde_json::Value> =
            serde_json::from_str(json["exercisesLoggedJson"].as_str().unwrap()).unwrap();
        assert_eq!(
            logged[0]["sets"][0],
            serde_json::json!({"index": 1, "reps": 8, "completed": true})
        );
        assert_eq!(logged[0]["sets"][1]["completed"], false);
    }

    #[test]
    fn test_blank_notes_omitted() {
        let submitter = RecordingSubmitter::default();
        let mut mgr = SessionManager::new(ManualClock::new(start()));
        mgr.initialize(&day(1, 1), false).unwrap();

        let payload = mgr.submit_workout_log(&submitter, Some("   ")).unwrap();
        assert_eq!(payload.notes, None);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn test_round_trip_all_sets() {
        let (n, k) = (4, 3);
        let mut mgr = SessionManager::new(ManualClock::new(start()));
        mgr.initialize(&day(n, k), false).unwrap();
        let recorded_reps = run_everything(&mut mgr, n, k);
        assert!(mgr.all_completed());

        let blob = serialize_exercises(mgr.session().unwrap()).unwrap();
        let logged: Vec<LoggedExercise> = serde_json::from_str(&blob).unwrap();

        assert_eq!(logged.len(), n as usize);
        for exercise in &logged {
            assert_eq!(exercise.sets.len(), k as usize);
            assert!(exercise.sets.iter().all(|s| s.completed));
        }
        let summed: u32 = logged
            .iter()
            .flat_map(|e| e.sets.iter())
            .map(|s| s.reps)
            .sum();
        assert_eq!(summed, recorded_reps);
    }

    #[test]
    fn test_finalize_records_history_and_clears_session() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp_dir.path().join("sessions"));
        let mut history =
            HistoryTracker::load(temp_dir.path().join("history"), start().date_naive()).unwrap();
        let submitter = RecordingSubmitter::default();

        let mut mgr = SessionManager::new(ManualClock::new(start())).with_store(store.clone());
        mgr.initialize(&day(2, 2), false).unwrap();
        run_everything(&mut mgr, 2, 2);
        mgr.save().unwrap();
        mgr.clock().advance(Duration::minutes(35));

        let payload = mgr.finalize(&submitter, &mut history, None).unwrap();

        assert!(!mgr.has_session());
        assert!(store.load(12).unwrap().is_none());
        assert_eq!(history.records().len(), 1);
        let record = &history.records()[0];
        assert_eq!(record.program_day_id, 12);
        assert_eq!(record.name, "Upper");
        assert_eq!(record.exercise_count, 2);
        assert_eq!(record.duration_minutes, payload.duration_minutes);
        assert_eq!(record.completed_at, start() + Duration::minutes(35));
        assert_eq!(history.streak(), 1);
    }

    #[test]
    fn test_failed_submission_keeps_session_and_skips_history() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut history = HistoryTracker::load(temp_dir.path(), start().date_naive()).unwrap();
        let submitter = RecordingSubmitter {
            fail: true,
            ..Default::default()
        };

        let mut mgr = SessionManager::new(ManualClock::new(start()));
        mgr.initialize(&day(1, 1), false).unwrap();

        let err = mgr.finalize(&submitter, &mut history, None).unwrap_err();
        assert!(matches!(err, Error::Submission(_)));
        assert!(mgr.has_session());
        assert!(history.records().is_empty());
        assert_eq!(history.streak(), 0);
    }

    #[test]
    fn test_history_failure_keeps_session_and_snapshot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp_dir.path().join("sessions"));
        let history_dir = temp_dir.path().join("history");
        let mut history = HistoryTracker::load(&history_dir, start().date_naive()).unwrap();
        // A plain file where the history directory should be
        std::fs::write(&history_dir, "not a directory").unwrap();
        let submitter = RecordingSubmitter::default();

        let mut mgr = SessionManager::new(ManualClock::new(start())).with_store(store.clone());
        mgr.initialize(&day(1, 1), false).unwrap();
        run_everything(&mut mgr, 1, 1);
        mgr.save().unwrap();

        let err = mgr.finalize(&submitter, &mut history, None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(submitter.sent.borrow().len(), 1);
        assert!(mgr.has_session());
        assert!(store.load(12).unwrap().is_some());

        // Once history is writable again the retry goes through
        std::fs::remove_file(&history_dir).unwrap();
        mgr.finalize(&submitter, &mut history, None).unwrap();
        assert!(!mgr.has_session());
        assert!(store.load(12).unwrap().is_none());
        let reloaded = HistoryTracker::load(&history_dir, start().date_naive()).unwrap();
        assert_eq!(reloaded.records().len(), 1);
    }
}
