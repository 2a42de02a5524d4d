//! Command implementations for the CLI.
//!
//! Each handler loads what it needs from the [`Database`], drives the engine,
//! and saves. Lifecycle changes only ever go through `Database::transition`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde::Serialize;

use std::path::Path;

use shopclock::clock::{Clock, SystemClock};
use shopclock::config::Config;
use shopclock::db::*;
use shopclock::fields::*;
use shopclock::lifecycle::{TaskEngine, Transition};
use shopclock::metrics::{self, ReportQuery, ReportWindow};
use shopclock::task::Task;

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new pending task.
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Project name.
        #[arg(long)]
        project: Option<String>,
        /// Machine the work runs on.
        #[arg(long)]
        machine: Option<String>,
        /// Operator to assign (defaults to --operator).
        #[arg(long)]
        assign: Option<String>,
        /// Planned duration in minutes.
        #[arg(long)]
        expected_minutes: Option<u32>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", "in Nd" or "in Nw".
        #[arg(long)]
        due: Option<String>,
    },

    /// Assign a task to an operator.
    Assign {
        id: u64,
        /// Operator taking the task.
        to: String,
    },

    /// Move a task's due date and count it as rescheduled.
    Reschedule { id: u64, due: String },

    /// Start a pending task.
    Start { id: u64 },

    /// Put an in-progress task on hold.
    Hold {
        id: u64,
        /// Why the work is paused.
        #[arg(long)]
        reason: String,
    },

    /// Resume a task that is on hold.
    Resume { id: u64 },

    /// Complete an in-progress task.
    Complete { id: u64 },

    /// Deny a pending task.
    Deny {
        id: u64,
        #[arg(long)]
        reason: String,
    },

    /// Force-close a task (admin only).
    End { id: u64 },

    /// List tasks with optional filters.
    List {
        /// Include terminal tasks.
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum)]
        status: Option<Status>,
        /// Only tasks assigned to this operator.
        #[arg(long = "for")]
        for_operator: Option<String>,
        #[arg(long)]
        machine: Option<String>,
        #[arg(long, value_enum, default_value_t = SortKey::Id)]
        sort: SortKey,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show a task with its hold history.
    View { id: u64 },

    /// Performance snapshot for a month (or a whole year).
    Report {
        #[command(flatten)]
        period: Period,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        json: bool,
    },

    /// Active time per day over a month.
    Daily {
        #[command(flatten)]
        period: Period,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        json: bool,
    },

    /// Active time per month over a year.
    Monthly {
        #[arg(long)]
        year: Option<i32>,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        json: bool,
    },

    /// One snapshot per operator or machine.
    Breakdown {
        #[command(flatten)]
        period: Period,
        #[arg(long, value_enum, default_value_t = GroupBy::Operator)]
        by: GroupBy,
        #[arg(long)]
        json: bool,
    },

    /// Check every stored task against the lifecycle invariants.
    Check,

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct Period {
    /// Year (defaults to the current year).
    #[arg(long)]
    pub year: Option<i32>,
    /// Month 1-12 (defaults to the current month; `report` with --year alone covers the year).
    #[arg(long)]
    pub month: Option<u32>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Only tasks assigned to this operator.
    #[arg(long = "for", conflicts_with = "machine")]
    pub for_operator: Option<String>,
    /// Only tasks on this machine.
    #[arg(long)]
    pub machine: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> ReportScope {
        match (&self.for_operator, &self.machine) {
            (Some(op), _) => ReportScope::Operator(op.clone()),
            (None, Some(m)) => ReportScope::Machine(m.clone()),
            (None, None) => ReportScope::All,
        }
    }
}

impl Period {
    /// Month window, or the whole year when only a year was given and
    /// `allow_year` is set.
    fn window(&self, now: DateTime<Utc>, allow_year: bool) -> Result<ReportWindow> {
        let year = self.year.unwrap_or_else(|| now.year());
        let window = match self.month {
            None if allow_year && self.year.is_some() => ReportWindow::year(year),
            month => ReportWindow::month(year, month.unwrap_or_else(|| now.month())),
        };
        window.with_context(|| format!("invalid period {year}/{}", self.month.unwrap_or(0)))
    }
}

/// Shared state for handlers that touch the database.
pub struct Session<'a> {
    pub db: Database,
    pub db_path: &'a Path,
    pub engine: TaskEngine<SystemClock>,
    pub config: &'a Config,
}

impl Session<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.engine.clock().now()
    }

    fn task(&self, id: u64) -> Result<&Task> {
        self.db.get(id).with_context(|| format!("task {id} not found"))
    }

    fn save(&mut self) -> Result<()> {
        self.db.save(self.db_path).context("failed to save task database")
    }
}

pub fn run(command: Commands, session: &mut Session<'_>) -> Result<()> {
    match command {
        Commands::Add { title, desc, project, machine, assign, expected_minutes, due } => {
            cmd_add(session, title, desc, project, machine, assign, expected_minutes, due)
        }
        Commands::Assign { id, to } => cmd_assign(session, id, to),
        Commands::Reschedule { id, due } => cmd_reschedule(session, id, due),
        Commands::Start { id } => cmd_transition(session, id, Transition::Start),
        Commands::Hold { id, reason } => cmd_transition(session, id, Transition::Hold { reason }),
        Commands::Resume { id } => cmd_transition(session, id, Transition::Resume),
        Commands::Complete { id } => cmd_transition(session, id, Transition::Complete),
        Commands::Deny { id, reason } => cmd_transition(session, id, Transition::Deny { reason }),
        Commands::End { id } => {
            let capability = session.config.capability;
            cmd_transition(session, id, Transition::End { capability })
        }
        Commands::List { all, status, for_operator, machine, sort, limit } => {
            cmd_list(session, all, status, for_operator, machine, sort, limit)
        }
        Commands::View { id } => cmd_view(session, id),
        Commands::Report { period, scope, json } => cmd_report(session, period, scope, json),
        Commands::Daily { period, scope, json } => cmd_daily(session, period, scope, json),
        Commands::Monthly { year, scope, json } => cmd_monthly(session, year, scope, json),
        Commands::Breakdown { period, by, json } => cmd_breakdown(session, period, by, json),
        Commands::Check => cmd_check(session),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Add a new task to the database.
#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    session: &mut Session<'_>,
    title: String,
    desc: Option<String>,
    project: Option<String>,
    machine: Option<String>,
    assign: Option<String>,
    expected_minutes: Option<u32>,
    due: Option<String>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title cannot be empty");
    }
    let now = session.now();
    let due = match due {
        Some(s) => Some(parse_due_input(&s, now.date_naive()).with_context(|| {
            format!(
                "unrecognised due date '{s}'; use YYYY-MM-DD, 'today', 'tomorrow', 'in Nd' or 'in Nw'"
            )
        })?),
        None => None,
    };

    let id = session.db.next_id();
    let mut task = Task::new(id, title.trim(), now);
    task.description = desc.filter(|d| !d.trim().is_empty());
    task.project = non_blank(project);
    task.machine = non_blank(machine);
    task.assigned_to = non_blank(assign).or_else(|| session.config.operator.clone());
    task.expected_completion_time = expected_minutes;
    task.due = due;

    session.db.tasks.push(task);
    session.save()?;
    println!("Added task {id}");
    Ok(())
}

/// Assign a task to an operator.
pub fn cmd_assign(session: &mut Session<'_>, id: u64, operator: String) -> Result<()> {
    let operator = non_blank(Some(operator)).context("operator cannot be empty")?;
    session.db.reassign(id, &operator)?;
    session.save()?;
    println!("Assigned task {id} to {operator}");
    Ok(())
}

/// Move the due date. Only an actual change counts as a reschedule.
pub fn cmd_reschedule(session: &mut Session<'_>, id: u64, due: String) -> Result<()> {
    let today = session.now().date_naive();
    let new_due = parse_due_input(&due, today)
        .with_context(|| format!("unrecognised due date '{due}'"))?;
    if !session.db.reschedule(id, new_due)? {
        println!("Task {id} is already due {new_due}");
        return Ok(());
    }
    session.save()?;
    println!("Task {id} now due {new_due}");
    Ok(())
}

/// Apply one lifecycle transition and persist it.
pub fn cmd_transition(session: &mut Session<'_>, id: u64, transition: Transition) -> Result<()> {
    let engine = &session.engine;
    let task = session.db.transition(engine, id, &transition)?;
    let line = format!(
        "Task {id} is now {} (active {}, held {})",
        task.status,
        format_duration(task.total_duration_seconds),
        format_duration(task.total_held_seconds)
    );
    session.save()?;
    println!("{line}");
    Ok(())
}

/// List tasks with optional filtering and sorting.
pub fn cmd_list(
    session: &Session<'_>,
    all: bool,
    status: Option<Status>,
    operator: Option<String>,
    machine: Option<String>,
    sort: SortKey,
    limit: Option<usize>,
) -> Result<()> {
    let now = session.now();
    let mut filtered: Vec<&Task> = session
        .db
        .tasks
        .iter()
        .filter(|t| all || status.is_some() || !t.status.is_terminal())
        .filter(|t| status.map_or(true, |s| t.status == s))
        .filter(|t| operator.as_deref().map_or(true, |o| t.assigned_to.as_deref() == Some(o)))
        .filter(|t| machine.as_deref().map_or(true, |m| t.machine.as_deref() == Some(m)))
        .collect();

    match sort {
        SortKey::Id => filtered.sort_by_key(|t| t.id),
        SortKey::Due => filtered.sort_by_key(|t| (t.due.unwrap_or(chrono::NaiveDate::MAX), t.id)),
        SortKey::Duration => filtered.sort_by_key(|t| (std::cmp::Reverse(t.active_seconds_at(now)), t.id)),
    }
    if let Some(n) = limit {
        filtered.truncate(n);
    }
    print_table(&filtered, now);
    Ok(())
}

/// Show a task's timing and hold history.
pub fn cmd_view(session: &Session<'_>, id: u64) -> Result<()> {
    let now = session.now();
    let task = session.task(id)?;
    let stamp = |t: Option<DateTime<Utc>>| t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
    let or_dash = |s: &Option<String>| s.clone().unwrap_or_else(|| "-".into());

    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Status:       {}", task.status);
    println!("Operator:     {}", or_dash(&task.assigned_to));
    println!("Machine:      {}", or_dash(&task.machine));
    println!("Project:      {}", or_dash(&task.project));
    println!("Due:          {}", task.due.map(|d| d.to_string()).unwrap_or_else(|| "-".into()));
    println!("Rescheduled:  {}", task.reschedule_count);
    println!(
        "Expected:     {}",
        task.expected_completion_time.map(|m| format!("{m} min")).unwrap_or_else(|| "-".into())
    );
    println!("Created:      {}", task.created_at.to_rfc3339());
    println!("Started:      {}", stamp(task.started_at));
    println!("Completed:    {}", stamp(task.completed_at));
    println!("Closed:       {}", stamp(task.closed_at));
    if let Some(reason) = &task.denial_reason {
        println!("Denied for:   {reason}");
    }
    println!("Active:       {}", format_duration(task.active_seconds_at(now)));
    println!("Held:         {}", format_duration(task.held_seconds_at(now)));
    println!("Description:\n{}\n", task.description.as_deref().unwrap_or("-"));

    if task.holds.is_empty() {
        println!("Holds: -");
    } else {
        println!("Holds:");
        for hold in &task.holds {
            println!(
                "  {} -> {}  {:>10}  {}",
                hold.start.to_rfc3339(),
                stamp(hold.end),
                format_duration(hold.duration_at(now)),
                hold.reason
            );
        }
    }
    Ok(())
}

pub fn cmd_report(
    session: &Session<'_>,
    period: Period,
    scope: ScopeArgs,
    json: bool,
) -> Result<()> {
    let now = session.now();
    let query = ReportQuery::new(period.window(now, true)?, scope.scope());
    let snapshot = metrics::aggregate(&session.db.tasks, &query, now);
    if json {
        return print_json(&snapshot);
    }
    println!("Tasks:            {}", snapshot.total_tasks);
    println!("Completed:        {}", snapshot.completed_tasks);
    println!("On hold:          {}", snapshot.on_hold_tasks);
    println!("Rescheduled:      {}", snapshot.rescheduled_tasks);
    println!("Avg per task:     {}", format_duration(snapshot.avg_time_per_task_seconds.round() as i64));
    println!("Working time:     {}", format_duration(snapshot.total_working_duration_seconds));
    println!("Completion:       {:.2}%", snapshot.completion_percentage);
    Ok(())
}

pub fn cmd_daily(
    session: &Session<'_>,
    period: Period,
    scope: ScopeArgs,
    json: bool,
) -> Result<()> {
    let now = session.now();
    let query = ReportQuery::new(period.window(now, false)?, scope.scope());
    let series = metrics::daily_series(&session.db.tasks, &query, now);
    if json {
        return print_json(&series);
    }
    println!("{:<12} {:>10}", "Date", "Active");
    for point in series {
        println!("{:<12} {:>10}", point.date, format_duration(point.duration_seconds));
    }
    Ok(())
}

pub fn cmd_monthly(
    session: &Session<'_>,
    year: Option<i32>,
    scope: ScopeArgs,
    json: bool,
) -> Result<()> {
    let now = session.now();
    let year = year.unwrap_or_else(|| now.year());
    let series = metrics::monthly_series(&session.db.tasks, year, scope.scope(), now);
    if json {
        return print_json(&series);
    }
    println!("{:<8} {:>10}", "Month", "Active");
    for point in series {
        println!("{}-{:02}  {:>10}", point.year, point.month, format_duration(point.duration_seconds));
    }
    Ok(())
}

pub fn cmd_breakdown(session: &Session<'_>, period: Period, by: GroupBy, json: bool) -> Result<()> {
    let now = session.now();
    let window = period.window(now, true)?;
    let report = metrics::breakdown(&session.db.tasks, &window, by, now);
    if json {
        return print_json(&report);
    }
    let label = match by {
        GroupBy::Operator => "Operator",
        GroupBy::Machine => "Machine",
    };
    println!("{:<16} {:>6} {:>6} {:>8} {:>10} {:>8}", label, "Tasks", "Done", "On hold", "Working", "Compl.");
    for (key, s) in report {
        println!(
            "{:<16} {:>6} {:>6} {:>8} {:>10} {:>7.2}%",
            truncate(&key, 16),
            s.total_tasks,
            s.completed_tasks,
            s.on_hold_tasks,
            format_duration(s.total_working_duration_seconds),
            s.completion_percentage
        );
    }
    Ok(())
}

/// Report every task that breaks an invariant. Fails if any do.
pub fn cmd_check(session: &Session<'_>) -> Result<()> {
    let problems = session.db.verify();
    if problems.is_empty() {
        println!("{} task(s) consistent", session.db.tasks.len());
        return Ok(());
    }
    for p in &problems {
        eprintln!("{p}");
    }
    bail!("{} inconsistent task(s)", problems.len())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
