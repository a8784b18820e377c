//! Workout session management.
//!
//! `WorkoutSession` holds the per-exercise set logs and the completed set;
//! `SessionManager` owns at most one live session, stamps it with its clock
//! and snapshots it through an optional `SessionStore`.

use crate::clock::{Clock, SystemClock};
use crate::store::SessionStore;
use crate::{
    Error, ExerciseDefinition, ExerciseId, ExerciseLog, ProgramDay, ProgramDayId, Result,
    SetLog, WorkoutSession,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

impl WorkoutSession {
    /// Build a fresh session with one empty `SetLog` per scheduled set
    pub fn new(
        program_day_id: ProgramDayId,
        program_day_name: impl Into<String>,
        exercises: &[ExerciseDefinition],
        started_at: DateTime<Utc>,
    ) -> Self {
        let exercises = exercises
            .iter()
            .map(|def| ExerciseLog {
                exercise_id: def.exercise_id,
                sets: (1..=def.sets)
                    .map(|index| SetLog {
                        index,
                        target_rep_range: def.reps.clone(),
                        reps_completed: 0,
                        completed: false,
                        completed_at: None,
                    })
                    .collect(),
                duration_seconds: 0,
                completed: false,
            })
            .collect();

        Self {
            attempt_id: Uuid::new_v4(),
            program_day_id,
            program_day_name: program_day_name.into(),
            started_at,
            exercises,
            completed_exercise_ids: BTreeSet::new(),
        }
    }

    pub fn exercise(&self, exercise_id: ExerciseId) -> Option<&ExerciseLog> {
        self.exercises.iter().find(|e| e.exercise_id == exercise_id)
    }

    fn position(&self, exercise_id: ExerciseId) -> Option<usize> {
        self.exercises
            .iter()
            .position(|e| e.exercise_id == exercise_id)
    }

    /// Mark one set as done.
    ///
    /// Unknown exercises, out-of-range indices and already-logged sets are
    /// left untouched. Returns whether a set was updated.
    pub fn log_set_completion(
        &mut self,
        exercise_id: ExerciseId,
        set_index: u32,
        reps: u32,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(exercise) = self
            .exercises
            .iter_mut()
            .find(|e| e.exercise_id == exercise_id)
        else {
            tracing::debug!("log_set_completion: exercise {} not in session", exercise_id);
            return false;
        };

        let Some(set) = exercise.sets.iter_mut().find(|s| s.index == set_index) else {
            tracing::debug!(
                "log_set_completion: exercise {} has no set {}",
                exercise_id,
                set_index
            );
            return false;
        };

        if set.completed {
            tracing::warn!(
                "Set {} of exercise {} already logged, keeping original",
                set_index,
                exercise_id
            );
            return false;
        }

        set.reps_completed = reps;
        set.completed = true;
        set.completed_at = Some(at);
        true
    }

    /// Record the exercise duration and add it to the completed set
    pub fn complete_exercise(&mut self, exercise_id: ExerciseId, duration_seconds: u64) {
        let Some(exercise) = self
            .exercises
            .iter_mut()
            .find(|e| e.exercise_id == exercise_id)
        else {
            tracing::debug!("complete_exercise: exercise {} not in session", exercise_id);
            return;
        };

        exercise.duration_seconds = duration_seconds;
        exercise.completed = true;
        self.completed_exercise_ids.insert(exercise_id);
    }

    /// An exercise is locked while its predecessor in list order is incomplete
    pub fn is_locked(&self, exercise_id: ExerciseId) -> bool {
        match self.position(exercise_id) {
            Some(0) | None => false,
            Some(pos) => {
                let previous = self.exercises[pos - 1].exercise_id;
                !self.completed_exercise_ids.contains(&previous)
            }
        }
    }

    pub fn is_completed(&self, exercise_id: ExerciseId) -> bool {
        self.completed_exercise_ids.contains(&exercise_id)
    }

    pub fn all_completed(&self) -> bool {
        self.exercises
            .iter()
            .all(|e| self.completed_exercise_ids.contains(&e.exercise_id))
    }

    /// First exercise that is not yet completed, in list order
    pub fn next_exercise(&self) -> Option<&ExerciseLog> {
        self.exercises.iter().find(|e| !self.is_completed(e.exercise_id))
    }
}

/// Owner of the live workout session.
///
/// One manager is constructed per driver; it holds at most one session and
/// refuses to replace it unless the caller confirms the discard.
pub struct SessionManager<C: Clock = SystemClock> {
    clock: C,
    session: Option<WorkoutSession>,
    store: Option<SessionStore>,
}

impl SessionManager<SystemClock> {
    pub fn with_system_clock() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> SessionManager<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            session: None,
            store: None,
        }
    }

    /// Attach a snapshot store used by `save`, `restore` and `cancel`
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn session(&self) -> Option<&WorkoutSession> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn session_mut(&mut self) -> Result<&mut WorkoutSession> {
        self.session.as_mut().ok_or(Error::NoActiveSession)
    }

    /// Start a new session for a program day.
    ///
    /// Fails with `SessionInProgress` if a session is live and
    /// `discard_previous` is false.
    pub fn initialize(&mut self, day: &ProgramDay, discard_previous: bool) -> Result<&WorkoutSession> {
        self.check_replaceable(discard_previous)?;

        let session = WorkoutSession::new(day.id, day.name.clone(), &day.exercises, self.clock.now());
        tracing::info!(
            "Started session {} for day {} ({} exercises)",
            session.attempt_id,
            day.id,
            day.exercises.len()
        );
        Ok(self.session.insert(session))
    }

    /// Restore a previously saved session for a day, if a snapshot exists
    pub fn restore(
        &mut self,
        program_day_id: ProgramDayId,
        discard_previous: bool,
    ) -> Result<Option<&WorkoutSession>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(saved) = store.load(program_day_id)? else {
            return Ok(None);
        };

        self.check_replaceable(discard_previous)?;
        tracing::info!(
            "Restored session {} for day {} ({} of {} exercises complete)",
            saved.attempt_id,
            program_day_id,
            saved.completed_exercise_ids.len(),
            saved.exercises.len()
        );
        Ok(Some(self.session.insert(saved)))
    }

    fn check_replaceable(&self, discard_previous: bool) -> Result<()> {
        match &self.session {
            Some(live) if !discard_previous => Err(Error::SessionInProgress(live.program_day_id)),
            Some(live) => {
                tracing::warn!(
                    "Discarding unsubmitted session {} for day {}",
                    live.attempt_id,
                    live.program_day_id
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Snapshot the live session to the store
    pub fn save(&self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;
        match &self.store {
            Some(store) => store.save(session),
            None => Ok(()),
        }
    }

    pub fn log_set_completion(
        &mut self,
        exercise_id: ExerciseId,
        set_index: u32,
        reps: u32,
    ) -> Result<bool> {
        let now = self.clock.now();
        let session = unlocked(self.session_mut()?, exercise_id)?;
        Ok(session.log_set_completion(exercise_id, set_index, reps, now))
    }

    pub fn complete_exercise(&mut self, exercise_id: ExerciseId, duration_seconds: u64) -> Result<()> {
        let session = unlocked(self.session_mut()?, exercise_id)?;
        session.complete_exercise(exercise_id, duration_seconds);
        tracing::info!(
            "Exercise {} complete after {}s ({}/{})",
            exercise_id,
            duration_seconds,
            session.completed_exercise_ids.len(),
            session.exercises.len()
        );
        Ok(())
    }

    pub fn is_locked(&self, exercise_id: ExerciseId) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.is_locked(exercise_id))
    }

    pub fn is_completed(&self, exercise_id: ExerciseId) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.is_completed(exercise_id))
    }

    pub fn all_completed(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.all_completed())
    }

    /// Whole seconds since the session started; 0 without a session
    pub fn elapsed_seconds(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| {
            let elapsed = self.clock.now() - s.started_at;
            elapsed.num_seconds().max(0) as u64
        })
    }

    /// Discard the live session and its snapshot
    pub fn cancel(&mut self) -> Result<Option<WorkoutSession>> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        if let Some(store) = &self.store {
            store.remove(session.program_day_id)?;
        }
        tracing::info!(
            "Cancelled session {} for day {}",
            session.attempt_id,
            session.program_day_id
        );
        Ok(Some(session))
    }

    /// Drop the session after a successful submission
    pub(crate) fn clear_submitted(&mut self) -> Result<Option<WorkoutSession>> {
        let session = self.session.take();
        if let (Some(session), Some(store)) = (&session, &self.store) {
            store.remove(session.program_day_id)?;
        }
        Ok(session)
    }
}

/// Mutations on an exercise are refused while its predecessor is open
fn unlocked(session: &mut WorkoutSession, exercise_id: ExerciseId) -> Result<&mut WorkoutSession> {
    if session.is_locked(exercise_id) {
        return Err(Error::ExerciseLocked(exercise_id));
    }
    Ok(session)
}
