use chrono::Utc;
use clap::{Parser, Subcommand};
use setwise_core::dashboard::MetricsCache;
use setwise_core::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "setwise")]
#[command(about = "Guided workout sessions with set timers and streaks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a fresh session for a program day
    Start {
        /// Program day definition (JSON)
        day: PathBuf,

        /// Discard an unsubmitted session for the same day
        #[arg(long)]
        force: bool,
    },

    /// Work through a program day, resuming any saved session
    Run {
        /// Program day definition (JSON)
        day: PathBuf,

        /// Notes attached to the submitted log
        #[arg(long)]
        notes: Option<String>,

        /// Dry run - execute and save the session without submitting
        #[arg(long)]
        dry_run: bool,

        /// Auto-complete (for testing) - pick the top rep option and skip timers
        #[arg(long)]
        auto: bool,
    },

    /// Show progress of a saved session, or list saved sessions
    Status {
        day_id: Option<ProgramDayId>,
    },

    /// Submit a finished saved session (retry after a failed submit)
    Submit {
        day_id: ProgramDayId,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Discard a saved session
    Cancel {
        day_id: ProgramDayId,
    },

    /// Show completed workouts, streak and totals
    History {
        /// Also export the history to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show dashboard metrics
    Dashboard {
        /// Scheduled program day ids, for the completion rate
        #[arg(long, value_delimiter = ',')]
        scheduled: Vec<ProgramDayId>,
    },
}

struct Paths {
    sessions: PathBuf,
    history: PathBuf,
    dashboard_cache: PathBuf,
}

fn main() -> Result<()> {
    // Initialize logging
    setwise_core::logging::init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    if let Some(url) = cli.api_url {
        config.api.base_url = Some(url);
    }
    config.validate()?;

    let paths = Paths {
        sessions: config.data.sessions_dir(),
        history: config.data.history_dir(),
        dashboard_cache: config.data.data_dir.join("dashboard_cache.json"),
    };

    match cli.command {
        Commands::Start { day, force } => cmd_start(&paths, &day, force),
        Commands::Run {
            day,
            notes,
            dry_run,
            auto,
        } => cmd_run(&paths, &config, &day, notes.as_deref(), dry_run, auto),
        Commands::Status { day_id } => cmd_status(&paths, day_id),
        Commands::Submit { day_id, notes } => {
            cmd_submit(&paths, &config, day_id, notes.as_deref())
        }
        Commands::Cancel { day_id } => cmd_cancel(&paths, day_id),
        Commands::History { export } => cmd_history(&paths, export.as_deref()),
        Commands::Dashboard { scheduled } => cmd_dashboard(&paths, &config, &scheduled),
    }
}

fn load_day(path: &Path) -> Result<ProgramDay> {
    let contents = std::fs::read_to_string(path)?;
    let day: ProgramDay = serde_json::from_str(&contents)?;
    if day.exercises.is_empty() {
        return Err(Error::Config(format!(
            "program day {} has no exercises",
            day.id
        )));
    }
    Ok(day)
}

fn manager(paths: &Paths) -> SessionManager {
    SessionManager::with_system_clock().with_store(SessionStore::new(&paths.sessions))
}

fn cmd_start(paths: &Paths, day_path: &Path, force: bool) -> Result<()> {
    let day = load_day(day_path)?;
    let mut mgr = manager(paths);

    if mgr.restore(day.id, false)?.is_some() && !force {
        return Err(Error::SessionInProgress(day.id));
    }
    mgr.initialize(&day, true)?;
    mgr.save()?;

    println!("✓ Started {} ({} exercises)", day.name, day.exercises.len());
    Ok(())
}

fn cmd_run(
    paths: &Paths,
    config: &Config,
    day_path: &Path,
    notes: Option<&str>,
    dry_run: bool,
    auto: bool,
) -> Result<()> {
    let day = load_day(day_path)?;
    let mut mgr = manager(paths);

    if mgr.restore(day.id, false)?.is_some() {
        println!("Resuming saved session for {}", day.name);
    } else {
        mgr.initialize(&day, false)?;
        mgr.save()?;
    }

    let tick = Duration::from_millis(config.workout.tick_millis);
    for def in &day.exercises {
        if mgr.is_locked(def.exercise_id) {
            // List order guarantees the predecessor ran first
            return Err(Error::ExerciseLocked(def.exercise_id));
        }
        let session = mgr.session().ok_or(Error::NoActiveSession)?;
        let mut runner = ExerciseRunner::resume(def, session);
        if *runner.phase() == Phase::Completed {
            continue;
        }
        run_exercise(&mut mgr, &mut runner, def, tick, auto)?;
    }

    println!("\n✓ All exercises complete");

    if dry_run {
        println!("\n[Dry run - session saved, not submitted]");
        return Ok(());
    }

    submit_session(paths, config, &mut mgr, notes)
}

fn run_exercise(
    mgr: &mut SessionManager,
    runner: &mut ExerciseRunner,
    def: &ExerciseDefinition,
    tick: Duration,
    auto: bool,
) -> Result<()> {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", display_name(def));
    println!("╰─────────────────────────────────────────╯");

    while *runner.phase() != Phase::Completed {
        match runner.phase().clone() {
            Phase::SelectReps => {
                println!(
                    "\n  Set {}/{} · target {}",
                    runner.set_index(),
                    runner.total_sets(),
                    def.reps
                );
                let reps = if auto {
                    runner
                        .rep_options()
                        .max()
                        .ok_or_else(|| Error::MalformedRepSpecification(def.reps.clone()))?
                } else {
                    prompt_reps(runner.rep_options())?
                };
                runner.select_reps(reps)?;
            }
            Phase::Executing { reps, .. } => {
                println!("  → {} reps", reps);
                if auto {
                    runner.skip();
                } else {
                    count_down(runner, tick);
                    prompt_line("  Press Enter to save the set")?;
                }
                for event in runner.save_set(mgr)? {
                    report(&event);
                }
                mgr.save()?;
            }
            Phase::Resting => {
                if auto || prompt_line("  Resting - Enter to start, 's' + Enter to skip")? == "s" {
                    runner.skip();
                } else {
                    count_down(runner, tick);
                }
            }
            Phase::Completed => {}
        }
    }

    runner.cancel();
    Ok(())
}

fn count_down(runner: &mut ExerciseRunner, tick: Duration) {
    while let Some(left) = runner.remaining_seconds() {
        print!("\r  {:>3}s ", left);
        let _ = io::stdout().flush();
        std::thread::sleep(tick);
        if let Some(event) = runner.tick() {
            println!();
            report(&event);
        }
    }
}

fn report(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::WorkTimerExpired => println!("  Time!"),
        ExecutionEvent::RestFinished { next_set } => println!("  Rest over, set {} next", next_set),
        ExecutionEvent::SetSaved { set_index, reps } => {
            println!("  ✓ Set {} saved ({} reps)", set_index, reps)
        }
        ExecutionEvent::ExerciseCompleted { duration_seconds } => {
            println!("  ✓ Exercise complete ({}s into the session)", duration_seconds)
        }
        ExecutionEvent::NoticeDismissed => {}
    }
}

fn display_name(def: &ExerciseDefinition) -> String {
    if def.name.is_empty() {
        format!("Exercise {}", def.exercise_id)
    } else {
        def.name.clone()
    }
}

fn prompt_line(message: &str) -> Result<String> {
    println!("{}", message);
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase())
}

fn prompt_reps(options: &RepOptions) -> Result<u32> {
    let choices = match options {
        RepOptions::Choices(choices) => choices,
        RepOptions::Malformed(spec) => return Err(Error::MalformedRepSpecification(spec.clone())),
    };
    let listed: Vec<String> = choices.iter().map(u32::to_string).collect();

    loop {
        let input = prompt_line(&format!("  Reps? [{}]", listed.join(" ")))?;
        match input.parse::<u32>() {
            Ok(reps) if options.contains(reps) => return Ok(reps),
            _ => println!("  Pick one of: {}", listed.join(", ")),
        }
    }
}

fn submit_session(
    paths: &Paths,
    config: &Config,
    mgr: &mut SessionManager,
    notes: Option<&str>,
) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let mut history = HistoryTracker::load(&paths.history, Utc::now().date_naive())?;

    match mgr.finalize(&client, &mut history, notes) {
        Ok(payload) => {
            println!(
                "\n✓ Workout logged ({} min). Streak: {} day(s)",
                payload.duration_minutes,
                history.streak()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\nSubmission failed; session kept. Retry with `setwise submit <day-id>`.");
            Err(e)
        }
    }
}

fn cmd_status(paths: &Paths, day_id: Option<ProgramDayId>) -> Result<()> {
    let Some(day_id) = day_id else {
        let days = SessionStore::new(&paths.sessions).saved_days()?;
        if days.is_empty() {
            println!("No saved sessions");
        } else {
            let listed: Vec<String> = days.iter().map(|d| format!("day {}", d)).collect();
            println!("Saved sessions: {}", listed.join(", "));
        }
        return Ok(());
    };

    let mut mgr = manager(paths);
    let Some(session) = mgr.restore(day_id, false)? else {
        println!("No saved session for day {}", day_id);
        return Ok(());
    };

    println!("Day {} · {}", session.program_day_id, session.program_day_name);
    println!("Started {}", session.started_at.to_rfc3339());
    for exercise in &session.exercises {
        let state = if session.is_completed(exercise.exercise_id) {
            "done"
        } else if session.is_locked(exercise.exercise_id) {
            "locked"
        } else {
            "open"
        };
        println!(
            "  #{:<4} {:<6} {}/{} sets",
            exercise.exercise_id,
            state,
            exercise.completed_sets(),
            exercise.sets.len()
        );
    }
    if session.all_completed() {
        println!("All exercises complete - ready to submit");
    }
    Ok(())
}

fn cmd_submit(
    paths: &Paths,
    config: &Config,
    day_id: ProgramDayId,
    notes: Option<&str>,
) -> Result<()> {
    let mut mgr = manager(paths);
    if mgr.restore(day_id, false)?.is_none() {
        return Err(Error::NoActiveSession);
    }
    if !mgr.all_completed() {
        return Err(Error::Other(format!(
            "session for day {} still has unfinished exercises",
            day_id
        )));
    }
    submit_session(paths, config, &mut mgr, notes)
}

fn cmd_cancel(paths: &Paths, day_id: ProgramDayId) -> Result<()> {
    let mut mgr = manager(paths);
    mgr.restore(day_id, false)?;
    match mgr.cancel()? {
        Some(_) => println!("✓ Discarded session for day {}", day_id),
        None => println!("No saved session for day {}", day_id),
    }
    Ok(())
}

fn cmd_history(paths: &Paths, export: Option<&Path>) -> Result<()> {
    let today = Utc::now().date_naive();
    let history = HistoryTracker::load(&paths.history, today)?;
    let stats = history.stats(today);

    for record in history.records() {
        println!(
            "  {}  day {:<4} {:<20} {:>3} min  {} exercises",
            record.completed_at.format("%Y-%m-%d %H:%M"),
            record.program_day_id,
            record.name,
            record.duration_minutes,
            record.exercise_count
        );
    }
    println!();
    println!("Workouts: {}", stats.total_workouts);
    println!("Minutes: {}", stats.total_minutes);
    println!("Last 7 days: {}", stats.workouts_last_7_days);
    println!("Streak: {} (longest {})", stats.current_streak, stats.longest_streak);

    if let Some(path) = export {
        let count = history.export_csv(path)?;
        println!("✓ Exported {} records to {}", count, path.display());
    }
    Ok(())
}

fn cmd_dashboard(paths: &Paths, config: &Config, scheduled: &[ProgramDayId]) -> Result<()> {
    let now = Utc::now();
    let history = HistoryTracker::load(&paths.history, now.date_naive())?;
    let ttl = chrono::Duration::seconds(config.dashboard.cache_ttl_secs as i64);
    let mut cache = MetricsCache::load(&paths.dashboard_cache, ttl)?;

    let client = match ApiClient::new(&config.api) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::debug!("Dashboard running without backend: {}", e);
            None
        }
    };
    let source = client.as_ref().map(|c| c as &dyn SummarySource);
    let metrics = cache.metrics(source, &history, scheduled, now);

    println!("Workouts: {}", metrics.total_workouts);
    println!("Minutes: {}", metrics.total_minutes);
    if let Some(programs) = metrics.active_programs {
        println!("Active programs: {}", programs);
    }
    println!("Completion rate: {:.0}%", metrics.completion_rate * 100.0);
    println!("Streak: {}", metrics.current_streak);
    println!("Source: {:?}", metrics.source);
    Ok(())
}
