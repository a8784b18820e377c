//! Core domain types for the Setwise workout engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Program-day and exercise definitions supplied by the host application
//! - The in-progress workout session and its per-set logs
//! - Completed workout records kept by the history tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type ProgramDayId = u32;
pub type ExerciseId = u32;

// ============================================================================
// Definitions (inputs from the host application)
// ============================================================================

/// One scheduled exercise within a program day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDefinition {
    pub exercise_id: ExerciseId,
    #[serde(default)]
    pub name: String,
    pub sets: u32,
    /// Target reps, either a bare count ("10") or a range ("8-12")
    pub reps: String,
    #[serde(default)]
    pub rest_seconds: u32,
}

/// A program day: the ordered list of exercises for one workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDay {
    pub id: ProgramDayId,
    pub name: String,
    pub exercises: Vec<ExerciseDefinition>,
}

// ============================================================================
// Session Types
// ============================================================================

/// A single set within an exercise log.
///
/// Once `completed` is set the entry is never modified again.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetLog {
    /// 1-based position of the set
    pub index: u32,
    pub target_rep_range: String,
    pub reps_completed: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-exercise progress inside a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseLog {
    pub exercise_id: ExerciseId,
    pub sets: Vec<SetLog>,
    pub duration_seconds: u64,
    pub completed: bool,
}

impl ExerciseLog {
    /// Number of sets already logged
    pub fn completed_sets(&self) -> usize {
        self.sets.iter().filter(|s| s.completed).count()
    }

    /// Sum of reps over all logged sets
    pub fn total_reps(&self) -> u32 {
        self.sets
            .iter()
            .filter(|s| s.completed)
            .map(|s| s.reps_completed)
            .sum()
    }
}

/// One attempt at executing every exercise of a program day.
///
/// This is the single serializable representation of an in-progress workout;
/// it is what the session store snapshots and restores.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub attempt_id: Uuid,
    pub program_day_id: ProgramDayId,
    #[serde(default)]
    pub program_day_name: String,
    pub started_at: DateTime<Utc>,
    pub exercises: Vec<ExerciseLog>,
    pub completed_exercise_ids: BTreeSet<ExerciseId>,
}

// ============================================================================
// History Types
// ============================================================================

/// A finished workout, kept independently of any session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedWorkoutRecord {
    pub program_day_id: ProgramDayId,
    pub name: String,
    pub exercise_count: u32,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: u32,
}
