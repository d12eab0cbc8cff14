use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use studyplan_core::config::StudyplanConfig;
use studyplan_scheduler::{
    Interval, Planner, PlannerError, PlannerOptions, Priority, ScheduleWindow, SqliteTaskStore,
    Task, TaskKind, TaskStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod time;

type SqlitePlanner = Planner<SqliteTaskStore>;

#[derive(Parser, Debug)]
#[command(name = "studyplan", version, about = "Study planner scheduling engine")]
struct Cli {
    /// Config file (default: $STUDYPLAN_CONFIG or ~/.studyplan/studyplan.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// SQLite database file, overrides `database.path`
    #[arg(long, global = true)]
    db: Option<String>,

    /// User whose calendar is read and changed
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a task
    Add {
        title: String,
        /// exam, assignment or revision
        #[arg(long, default_value = "assignment")]
        kind: TaskKind,
        /// low, medium, high or urgent
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        deadline: Option<String>,
        /// Estimated effort in hours
        #[arg(long, default_value_t = 1.0)]
        hours: f64,
        #[arg(long, default_value = "pending")]
        status: TaskStatus,
    },

    /// List all tasks of the user
    List,

    /// Put a task on a chosen slot
    Schedule {
        task_id: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    /// Remove a task from the calendar
    Unschedule { task_id: String },

    /// Show tasks overlapping a proposed slot
    Conflicts {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Task to leave out of the check
        #[arg(long)]
        exclude: Option<String>,
    },

    /// First free slot of the given length
    Slot {
        #[arg(long)]
        hours: f64,
        #[arg(long)]
        from: Option<String>,
        /// Search this many days (default: configured horizon)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Place every open unscheduled task, or a single one
    Auto {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        days: Option<i64>,
        /// Only this task; a failure is reported as an error
        #[arg(long)]
        task: Option<String>,
    },

    /// Move missed tasks that are still due
    Reschedule {
        #[arg(long)]
        from: Option<String>,
    },

    /// Report every overlapping pair on the calendar
    Audit {
        #[arg(long)]
        from: Option<String>,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Weekly hours against the overload threshold
    Overload {
        /// Any instant in the week is fine (default: this week)
        #[arg(long)]
        week: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Tasks of one day, by start time then priority
    Day {
        /// Any instant on the day (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Tasks of one week grouped by day
    Week {
        #[arg(long)]
        week: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<&'a [Task]>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyplan=info,studyplan_scheduler=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // explicit path > STUDYPLAN_CONFIG env > ~/.studyplan/studyplan.toml
    let config_path = cli.config.or_else(|| std::env::var("STUDYPLAN_CONFIG").ok());
    let mut config = StudyplanConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        StudyplanConfig::default()
    });
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let options = PlannerOptions::from_config(&config.planner).context("invalid planner config")?;
    let tz = options.work_hours.timezone();

    config.database.ensure_parent_dir()?;
    info!(path = %config.database.path, "opening SQLite database");
    let store = SqliteTaskStore::open(&config.database.path)?;
    let planner = Arc::new(Planner::new(store, options));
    let user = cli.user;

    match cli.command {
        Command::Add {
            title,
            kind,
            priority,
            deadline,
            hours,
            status,
        } => {
            let mut task = Task::new(&user, title)
                .with_kind(kind)
                .with_priority(priority)
                .with_status(status)
                .with_estimated_hours(hours);
            if let Some(d) = deadline {
                task = task.with_deadline(time::parse_instant(&d, tz)?);
            }
            print_json(&planner.add_task(task)?)
        }

        Command::List => print_json(&planner.list_tasks(&user)?),

        Command::Schedule {
            task_id,
            start,
            end,
        } => {
            let interval = parse_interval(&start, &end, tz)?;
            print_json(&planner.schedule_task(&user, &task_id, interval)?)
        }

        Command::Unschedule { task_id } => {
            let task = planner.unschedule_task(&user, &task_id)?;
            print_json(&serde_json::json!({ "success": true, "task": task }))
        }

        Command::Conflicts {
            start,
            end,
            exclude,
        } => {
            let interval = parse_interval(&start, &end, tz)?;
            print_json(&planner.check_conflicts(&user, &interval, exclude.as_deref())?)
        }

        Command::Slot { hours, from, days } => {
            let window = window(&planner, from, days, tz)?;
            let slot = planner.find_slot(&user, window.start, window.end, hours, None)?;
            print_json(&slot)
        }

        Command::Auto { from, days, task } => {
            let window = window(&planner, from, days, tz)?;
            match task {
                Some(task_id) => {
                    print_json(&planner.auto_schedule_one(&user, &task_id, window)?)
                }
                None => {
                    let outcome = run_batch(Arc::clone(&planner), move |p, cancel| {
                        p.auto_schedule_pending(&user, window, cancel)
                    })
                    .await?;
                    print_json(&outcome)
                }
            }
        }

        Command::Reschedule { from } => {
            let from = instant_or_now(from, tz)?;
            let moved = run_batch(Arc::clone(&planner), move |p, cancel| {
                p.reschedule_missed(&user, from, cancel)
            })
            .await?;
            print_json(&moved)
        }

        Command::Audit { from, days } => {
            let from = instant_or_now(from, tz)?;
            print_json(&planner.detect_conflicts(&user, from, days)?)
        }

        Command::Overload { week, threshold } => {
            let week_start = time::start_of_week(instant_or_now(week, tz)?, tz)?;
            print_json(&planner.detect_overload(&user, week_start, threshold)?)
        }

        Command::Day { date } => {
            let date = planner.options().work_hours.local_date(instant_or_now(date, tz)?);
            print_json(&planner.day_view(&user, date)?)
        }

        Command::Week { week } => {
            let week_start = time::start_of_week(instant_or_now(week, tz)?, tz)?;
            print_json(&planner.week_view(&user, week_start)?)
        }
    }
}

/// Run a batch on a blocking thread; Ctrl-C stops it after the task in flight.
async fn run_batch<T, F>(planner: Arc<SqlitePlanner>, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&SqlitePlanner, &CancellationToken) -> studyplan_scheduler::Result<T>
        + Send
        + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || job(&planner, &token));

    tokio::select! {
        res = &mut handle => Ok(res??),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, finishing the current task");
            cancel.cancel();
            Ok(handle.await??)
        }
    }
}

fn window(
    planner: &SqlitePlanner,
    from: Option<String>,
    days: Option<i64>,
    tz: Tz,
) -> Result<ScheduleWindow> {
    let start = instant_or_now(from, tz)?;
    let window = match days {
        Some(days) => ScheduleWindow::days_ahead(start, days)?,
        None => planner.default_window(start)?,
    };
    Ok(window)
}

fn instant_or_now(input: Option<String>, tz: Tz) -> Result<DateTime<Utc>> {
    match input {
        Some(s) => time::parse_instant(&s, tz),
        None => Ok(Utc::now()),
    }
}

fn parse_interval(start: &str, end: &str, tz: Tz) -> Result<Interval> {
    let start = time::parse_instant(start, tz)?;
    let end = time::parse_instant(end, tz)?;
    Ok(Interval::new(start, end)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Planner errors go to stdout as JSON, like successful results; anything
/// else is an operator problem and goes to stderr.
fn report_error(e: &anyhow::Error) {
    let Some(planner_err) = e
        .downcast_ref::<PlannerError>()
        .filter(|pe| !pe.is_infrastructure())
    else {
        eprintln!("error: {e:#}");
        return;
    };
    let conflicts = match planner_err {
        PlannerError::Conflict { conflicts } => Some(conflicts.as_slice()),
        _ => None,
    };
    let body = ErrorBody {
        error: planner_err.code(),
        status: planner_err.status_code(),
        message: planner_err.to_string(),
        conflicts,
    };
    match serde_json::to_string_pretty(&body) {
        Ok(json) => println!("{json}"),
        Err(_) => eprintln!("error: {planner_err}"),
    }
}
