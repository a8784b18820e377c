#![forbid(unsafe_code)]

//! Core workout execution engine for Setwise.
//!
//! This crate provides:
//! - Domain types (program days, sessions, set logs, history records)
//! - Session management with completion-order locking
//! - The per-exercise execution state machine
//! - History, streak and dashboard metrics
//! - Workout log submission with duration clamping
//! - Persistence (session snapshots, history, metrics cache)

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod reps;
pub mod store;
pub mod session;
pub mod execution;
pub mod history;
pub mod submission;
pub mod dashboard;
pub mod api;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use reps::RepOptions;
pub use store::SessionStore;
pub use session::SessionManager;
pub use execution::{ExecutionEvent, ExerciseRunner, Phase};
pub use history::{compute_streak, HistoryStats, HistoryTracker};
pub use submission::{LogSubmitter, WorkoutLogPayload};
pub use dashboard::{DashboardMetrics, MetricsCache, MetricsSource, SummarySource};
pub use api::ApiClient;
