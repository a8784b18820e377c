//! Per-exercise execution state machine.
//!
//! Phases: `SelectReps` → `Executing` → `Resting` → `SelectReps` for the
//! next set, or `Completed` after the last one. Time is driven by the caller
//! through `tick()`, one call per elapsed second; only one countdown is
//! active at a time and starting a new one replaces the old.

use crate::clock::Clock;
use crate::reps::RepOptions;
use crate::session::SessionManager;
use crate::{Error, ExerciseDefinition, ExerciseId, Result, WorkoutSession};

/// How long the completion notice stays visible
pub const COMPLETION_NOTICE_SECONDS: u32 = 3;

/// Work-time heuristic: half a second per rep, rounded up
pub fn execution_seconds(reps: u32) -> u32 {
    reps.div_ceil(2)
}

/// Current phase of an exercise
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    SelectReps,
    Executing { reps: u32, timer_expired: bool },
    Resting,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerPurpose {
    Work,
    Rest,
}

#[derive(Clone, Debug)]
struct Countdown {
    generation: u64,
    purpose: TimerPurpose,
    remaining: u32,
}

/// Something observable that happened during a tick or action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Work countdown hit zero; the set can now be saved
    WorkTimerExpired,
    /// Rest finished; waiting for the next rep selection
    RestFinished { next_set: u32 },
    /// A set was logged into the session
    SetSaved { set_index: u32, reps: u32 },
    /// Last set saved; the exercise is complete
    ExerciseCompleted { duration_seconds: u64 },
    /// The completion notice timed out
    NoticeDismissed,
}

/// Drives one exercise from rep selection to completion
#[derive(Clone, Debug)]
pub struct ExerciseRunner {
    exercise_id: ExerciseId,
    total_sets: u32,
    rest_seconds: u32,
    options: RepOptions,
    set_index: u32,
    phase: Phase,
    timer: Option<Countdown>,
    generation: u64,
    notice_remaining: Option<u32>,
}

impl ExerciseRunner {
    pub fn new(def: &ExerciseDefinition) -> Self {
        Self {
            exercise_id: def.exercise_id,
            total_sets: def.sets,
            rest_seconds: def.rest_seconds,
            options: RepOptions::parse(&def.reps),
            set_index: 1,
            phase: Phase::SelectReps,
            timer: None,
            generation: 0,
            notice_remaining: None,
        }
    }

    /// Rebuild a runner from the session after a remount.
    ///
    /// A completed exercise comes back as `Completed`; otherwise the runner
    /// waits for reps on the first set not yet logged.
    pub fn resume(def: &ExerciseDefinition, session: &WorkoutSession) -> Self {
        let mut runner = Self::new(def);
        if session.is_completed(def.exercise_id) {
            runner.phase = Phase::Completed;
            return runner;
        }
        if let Some(log) = session.exercise(def.exercise_id) {
            let next = log
                .sets
                .iter()
                .find(|s| !s.completed)
                .map_or(runner.total_sets, |s| s.index);
            runner.set_index = next.max(1);
        }
        runner
    }

    pub fn exercise_id(&self) -> ExerciseId {
        self.exercise_id
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// 1-based index of the set being worked
    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    pub fn total_sets(&self) -> u32 {
        self.total_sets
    }

    pub fn rep_options(&self) -> &RepOptions {
        &self.options
    }

    /// Seconds left on the active countdown, if any
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.timer.as_ref().map(|t| t.remaining)
    }

    /// Whether the completion notice is currently showing
    pub fn notice_visible(&self) -> bool {
        self.notice_remaining.is_some()
    }

    /// Whether "save set" is currently allowed
    pub fn can_save(&self) -> bool {
        matches!(
            self.phase,
            Phase::Executing {
                timer_expired: true,
                ..
            }
        )
    }

    fn start_timer(&mut self, purpose: TimerPurpose, seconds: u32) {
        self.generation += 1;
        if let Some(old) = self.timer.take() {
            tracing::trace!("Replacing {:?} timer #{}", old.purpose, old.generation);
        }
        self.timer = Some(Countdown {
            generation: self.generation,
            purpose,
            remaining: seconds,
        });
        tracing::debug!(
            "Exercise {}: {:?} timer #{} started for {}s",
            self.exercise_id,
            purpose,
            self.generation,
            seconds
        );
    }

    /// Choose reps for the current set and start the work countdown
    pub fn select_reps(&mut self, reps: u32) -> Result<()> {
        if self.phase != Phase::SelectReps {
            return Err(Error::InvalidTransition(format!(
                "cannot select reps while {:?}",
                self.phase
            )));
        }
        if let RepOptions::Malformed(spec) = &self.options {
            return Err(Error::MalformedRepSpecification(spec.clone()));
        }
        if !self.options.contains(reps) {
            return Err(Error::InvalidTransition(format!(
                "{} reps is not an option for exercise {}",
                reps, self.exercise_id
            )));
        }

        let seconds = execution_seconds(reps);
        self.phase = Phase::Executing {
            reps,
            timer_expired: seconds == 0,
        };
        if seconds > 0 {
            self.start_timer(TimerPurpose::Work, seconds);
        } else {
            self.timer = None;
        }
        Ok(())
    }

    /// Force the active countdown to expire.
    ///
    /// Skipping work unlocks "save set"; skipping rest moves to the next set.
    /// Anything else is a no-op.
    pub fn skip(&mut self) -> Option<ExecutionEvent> {
        match self.phase {
            Phase::Executing {
                timer_expired: false,
                ..
            } => Some(self.expire_work()),
            Phase::Resting => Some(self.finish_rest()),
            _ => None,
        }
    }

    /// Advance one second
    pub fn tick(&mut self) -> Option<ExecutionEvent> {
        if let Some(left) = self.notice_remaining.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                self.notice_remaining = None;
                return Some(ExecutionEvent::NoticeDismissed);
            }
        }

        let timer = self.timer.as_mut()?;
        timer.remaining = timer.remaining.saturating_sub(1);
        if timer.remaining > 0 {
            return None;
        }

        let purpose = timer.purpose;
        match purpose {
            TimerPurpose::Work => Some(self.expire_work()),
            TimerPurpose::Rest => Some(self.finish_rest()),
        }
    }

    /// Run `tick()` up to `seconds` times, collecting events
    pub fn advance(&mut self, seconds: u32) -> Vec<ExecutionEvent> {
        (0..seconds).filter_map(|_| self.tick()).collect()
    }

    /// Stop any running countdown; used when the view goes away
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            tracing::debug!(
                "Exercise {}: cancelled {:?} timer #{}",
                self.exercise_id,
                timer.purpose,
                timer.generation
            );
        }
        self.notice_remaining = None;
    }

    fn expire_work(&mut self) -> ExecutionEvent {
        self.timer = None;
        if let Phase::Executing { timer_expired, .. } = &mut self.phase {
            *timer_expired = true;
        }
        ExecutionEvent::WorkTimerExpired
    }

    fn finish_rest(&mut self) -> ExecutionEvent {
        self.timer = None;
        self.set_index += 1;
        self.phase = Phase::SelectReps;
        ExecutionEvent::RestFinished {
            next_set: self.set_index,
        }
    }

    /// Log the current set into the session.
    ///
    /// Only allowed once the work countdown has expired and the exercise is
    /// unlocked. The last set completes the exercise with the total elapsed
    /// session time.
    pub fn save_set<C: Clock>(
        &mut self,
        manager: &mut SessionManager<C>,
    ) -> Result<Vec<ExecutionEvent>> {
        let reps = match self.phase {
            Phase::Executing {
                reps,
                timer_expired: true,
            } => reps,
            Phase::Executing { .. } => {
                return Err(Error::InvalidTransition(
                    "work timer still running".into(),
                ))
            }
            _ => {
                return Err(Error::InvalidTransition(format!(
                    "cannot save a set while {:?}",
                    self.phase
                )))
            }
        };

        if manager.is_locked(self.exercise_id) {
            return Err(Error::ExerciseLocked(self.exercise_id));
        }
        if !manager.log_set_completion(self.exercise_id, self.set_index, reps)? {
            return Err(Error::InvalidTransition(format!(
                "set {} of exercise {} is already logged or does not exist",
                self.set_index, self.exercise_id
            )));
        }
        let mut events = vec![ExecutionEvent::SetSaved {
            set_index: self.set_index,
            reps,
        }];

        if self.set_index >= self.total_sets {
            let duration_seconds = manager.elapsed_seconds();
            manager.complete_exercise(self.exercise_id, duration_seconds)?;
            self.timer = None;
            self.phase = Phase::Completed;
            self.notice_remaining = Some(COMPLETION_NOTICE_SECONDS);
            events.push(ExecutionEvent::ExerciseCompleted { duration_seconds });
        } else if self.rest_seconds == 0 {
            events.push(self.finish_rest());
        } else {
            self.phase = Phase::Resting;
            self.start_timer(TimerPurpose::Rest, self.rest_seconds);
        }

        Ok(events)
    }
}
