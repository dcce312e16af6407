//! tempo: plan your day from the command line.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempo_core::time::{local_date, parse_tz, weekday_name};
use tempo_core::{
    Clock, DayPlan, Priority, ReallocationResult, Reminder, ReminderScheduler, SystemClock, Task, TaskPlanner,
    TaskStatus, WeekPlan, WorkloadPredictor,
};
use tempo_plugins::builtin::weather;
use tempo_plugins::{builtin_plugins, BuiltinDeps, PluginLoader, PluginRegistry, PromptEnhancer};
use tracing::{debug, info, warn};

mod calendar;
mod config;
mod state;
mod store;

use config::{load_config, save_config, Config};
use store::{JsonEventSource, TaskStore};

#[derive(Parser, Debug)]
#[command(
    name = "tempo",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TEMPO_BUILD_SHA"), ")"),
    about = "Workload-aware task planning"
)]
struct Cli {
    /// Log level: trace, debug, info, warn, error (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default ~/.tempo/config.toml
    InitConfig,

    /// Add a task
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,

        /// Due date: YYYY-MM-DD (end of that local day) or RFC 3339
        #[arg(long)]
        due: Option<String>,
    },

    /// Mark a task done
    Done { id: String },

    /// List tasks (open ones unless --all)
    List {
        #[arg(long)]
        all: bool,
    },

    /// Time-boxed plan for one day (default: today)
    PlanDay {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Plans for today and the next six days
    PlanWeek,

    /// Suggest moving tasks off overloaded days
    Rebalance,

    /// Estimated minutes for a task
    Estimate { id: String },

    /// Best upcoming slot for a task
    SuggestTime { id: String },

    /// Reminders for tasks coming due now
    Reminders {
        /// Also show reminders held back by quiet hours
        #[arg(long)]
        all: bool,
    },

    /// Manage plugins
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },

    /// Substitute {{pluginId:path}} markers in a prompt
    Prompt {
        text: String,

        /// Extra context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },

    /// Export a day plan as ICS
    ExportIcs {
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum PluginsCommand {
    /// List registered plugins
    List,
    /// Enable a plugin (persisted in config)
    Enable { id: String },
    /// Disable a plugin (persisted in config)
    Disable { id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    High,
    Medium,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::High => Priority::High,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::Low => Priority::Low,
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{s}', defaulting to INFO");
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| anyhow::anyhow!("init logging: {e}"))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

/// Everything a command needs, resolved from config and the store.
struct App {
    cfg: Config,
    tz: Tz,
    clock: Arc<dyn Clock>,
    store: TaskStore,
}

impl App {
    fn load(cfg: Config) -> Result<Self> {
        let tz = parse_tz(&cfg.planner.timezone)?;
        Ok(Self {
            cfg,
            tz,
            clock: Arc::new(SystemClock),
            store: TaskStore::load()?,
        })
    }

    fn user(&self) -> &str {
        &self.cfg.planner.user
    }

    fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.tz)
    }

    async fn planner(&self) -> Result<TaskPlanner> {
        let source = Arc::new(self.store.source(self.user())?);
        let predictor = WorkloadPredictor::new(source.clone(), self.clock.clone(), self.tz)
            .with_history_limit(self.cfg.planner.history_limit);
        let mut planner = TaskPlanner::with_predictor(predictor, source.clone(), source, self.clock.clone());
        planner.initialize(self.user()).await;
        Ok(planner)
    }

    fn registry(&self) -> Result<Arc<PluginRegistry>> {
        let events = JsonEventSource::load()?.map(|s| Arc::new(s) as Arc<dyn tempo_plugins::builtin::EventSource>);
        let deps = BuiltinDeps {
            tasks: Arc::new(self.store.source(self.user())?),
            events,
            clock: self.clock.clone(),
            tz: self.tz,
            weather_api_key: self.cfg.plugins.weather_api_key(),
        };

        let registry = Arc::new(PluginRegistry::new());
        PluginLoader::new().load(&registry, builtin_plugins(deps));

        for id in &self.cfg.plugins.disabled {
            if !registry.disable_plugin(id) {
                warn!(plugin = %id, "Disabled plugin in config is not registered");
            }
        }

        if let Some(location) = &self.cfg.plugins.weather_location {
            let mut patch = Map::new();
            patch.insert("location".into(), json!(location));
            if let Err(e) = registry.update_plugin_config(weather::ID, patch) {
                warn!(error = %e, "Ignoring configured weather location");
            }
        }

        Ok(registry)
    }

    fn task(&self, id: &str) -> Result<&Task> {
        self.store.find(id).with_context(|| format!("no task with id {id}"))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `YYYY-MM-DD` means the end of that local day.
fn parse_due(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid due date '{s}'"))?;
    let local = date.and_hms_opt(23, 59, 0).context("invalid time")?;
    let dt = tz
        .from_local_datetime(&local)
        .earliest()
        .with_context(|| format!("{s} 23:59 does not exist in {tz}"))?;
    Ok(dt.with_timezone(&Utc))
}

fn print_day(date: NaiveDate, day: &DayPlan, tz: Tz) {
    let kind = if day.is_work_day { "work day" } else { "day off" };
    println!("## {} {} ({kind})", weekday_name(date), date);

    if let Some(err) = &day.error {
        println!("  error: {err}");
        return;
    }
    if let Some(msg) = &day.message {
        println!("  {msg}");
    }
    for e in &day.plan {
        println!(
            "  {}-{}  [{:<6}] {} ({}, {} min)",
            e.start_time.with_timezone(&tz).format("%H:%M"),
            e.end_time.with_timezone(&tz).format("%H:%M"),
            e.priority.as_str(),
            e.title,
            e.task_id,
            e.duration_minutes
        );
    }
    println!("  total: {} min", day.total_minutes());
}

fn print_week(week: &WeekPlan, tz: Tz) {
    for d in &week.week_plans {
        print_day(d.date, &d.day, tz);
        println!();
    }
}

fn print_rebalance(r: &ReallocationResult) {
    println!("## Workload");
    for d in &r.workload_analysis {
        let marker = if d.is_work_day { "" } else { " (day off)" };
        println!(
            "  {} {:<9} {:>2} tasks {:>4} min{marker}",
            d.date, d.day_of_week, d.task_count, d.total_minutes
        );
    }
    println!();

    if let Some(msg) = &r.message {
        println!("{msg}");
    }
    for s in &r.suggestions {
        println!(
            "- move {} ({}, {} min) from {} to {}: {}",
            s.task_title, s.task_id, s.duration_minutes, s.source_date, s.target_date, s.reason
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config()?;
    setup_logging(cli.log_level.as_deref(), cfg.logging.level.as_deref())?;

    match cli.command {
        Command::InitConfig => config::init_config()?,

        Command::Add {
            title,
            description,
            priority,
            due,
        } => {
            let tz = parse_tz(&cfg.planner.timezone)?;
            let mut store = TaskStore::load()?;
            let mut task = Task::new(store.next_id(), title).with_priority(priority.into());
            if let Some(d) = description {
                task = task.with_description(d);
            }
            if let Some(d) = due {
                task = task.with_due_date(parse_due(&d, tz)?);
            }
            info!(task_id = %task.id, "Task added");
            println!("Added {}: {}", task.id, task.title);
            store.add(task);
            store.save()?;
        }

        Command::Done { id } => {
            let mut store = TaskStore::load()?;
            let title = store.complete(&id, Utc::now())?.title.clone();
            store.save()?;
            println!("Done {id}: {title}");
        }

        Command::List { all } => {
            let store = TaskStore::load()?;
            let tasks: Vec<&Task> = store
                .tasks()
                .iter()
                .filter(|t| all || t.status != TaskStatus::Done)
                .collect();
            if cli.json {
                print_json(&tasks)?;
            } else {
                for t in tasks {
                    let due = t.due_date.map(|d| format!(" due {}", d.format("%Y-%m-%d %H:%M"))).unwrap_or_default();
                    println!("{:<5} [{:<6}] {:?} {}{due}", t.id, t.priority.as_str(), t.status, t.title);
                }
            }
        }

        Command::PlanDay { date } => {
            let app = App::load(cfg)?;
            let date = date.unwrap_or_else(|| app.today());
            let plan = app.planner().await?.plan_day(app.user(), date).await;
            if cli.json {
                print_json(&plan)?;
            } else {
                print_day(date, &plan, app.tz);
            }
            if !plan.success {
                bail!("planning failed");
            }
        }

        Command::PlanWeek => {
            let app = App::load(cfg)?;
            let week = app.planner().await?.generate_week_plan(app.user()).await;
            if cli.json {
                print_json(&week)?;
            } else {
                print_week(&week, app.tz);
            }
        }

        Command::Rebalance => {
            let app = App::load(cfg)?;
            let result = app.planner().await?.suggest_task_reallocation(app.user()).await;
            if cli.json {
                print_json(&result)?;
            } else {
                print_rebalance(&result);
            }
        }

        Command::Estimate { id } => {
            let app = App::load(cfg)?;
            let planner = app.planner().await?;
            let task = app.task(&id)?;
            let minutes = planner.predictor().predict_task_completion_time(task);
            if cli.json {
                print_json(&json!({"taskId": id, "estimatedMinutes": minutes}))?;
            } else {
                println!("{} ({}): about {minutes} min", task.title, task.id);
            }
        }

        Command::SuggestTime { id } => {
            let app = App::load(cfg)?;
            let planner = app.planner().await?;
            let task = app.task(&id)?;
            let suggestion = planner.predictor().suggest_optimal_time(app.user(), task).await;
            if cli.json {
                print_json(&suggestion)?;
            } else {
                match suggestion.as_ref().and_then(|s| s.suggested_time.map(|t| (s, t))) {
                    Some((s, t)) => println!(
                        "{}: {} for {} min (score {:.0})",
                        task.title,
                        t.with_timezone(&app.tz).format("%a %Y-%m-%d %H:%M"),
                        s.estimated_duration,
                        s.score
                    ),
                    None => println!("{}: not enough history to suggest a time", task.title),
                }
            }
        }

        Command::Reminders { all } => {
            let app = App::load(cfg)?;
            let source = Arc::new(app.store.source(app.user())?);
            let scheduler = ReminderScheduler::new(source, app.clock.clone(), app.tz)
                .with_quiet_hours(app.cfg.reminders.quiet_hours);
            let (deliver, held): (Vec<Reminder>, Vec<Reminder>) = scheduler
                .check_due_tasks(app.user())
                .await?
                .into_iter()
                .partition(|r| scheduler.should_notify(r));

            if cli.json {
                print_json(&json!({"deliver": deliver, "held": held}))?;
            } else {
                if deliver.is_empty() && held.is_empty() {
                    println!("No reminders due.");
                }
                for r in &deliver {
                    println!("- {}: {} ({})", r.title, r.body, r.task_id);
                }
                if all {
                    for r in &held {
                        println!("- [quiet hours] {}: {} ({})", r.title, r.body, r.task_id);
                    }
                } else if !held.is_empty() {
                    println!("{} held for quiet hours (--all to show)", held.len());
                }
            }
        }

        Command::Plugins { command } => {
            let app = App::load(cfg.clone())?;
            let registry = app.registry()?;
            match command {
                PluginsCommand::List => {
                    let plugins = registry.get_all_plugins();
                    if cli.json {
                        print_json(&plugins)?;
                    } else {
                        for p in plugins {
                            let state = if p.enabled { "enabled" } else { "disabled" };
                            let hooks: Vec<String> = p.hooks.iter().map(ToString::to_string).collect();
                            println!("{:<16} {:<8} {} [{}]", p.id, state, p.name, hooks.join(", "));
                        }
                    }
                }
                PluginsCommand::Enable { id } | PluginsCommand::Disable { id }
                    if registry.get_plugin(&id).is_none() =>
                {
                    bail!("unknown plugin: {id}");
                }
                PluginsCommand::Enable { id } => {
                    cfg.plugins.set_disabled(&id, false);
                    save_config(&cfg)?;
                    println!("Enabled {id}");
                }
                PluginsCommand::Disable { id } => {
                    cfg.plugins.set_disabled(&id, true);
                    save_config(&cfg)?;
                    println!("Disabled {id}");
                }
            }
        }

        Command::Prompt { text, context } => {
            let app = App::load(cfg)?;
            let mut ctx: Value = match context {
                Some(raw) => serde_json::from_str(&raw).context("parse --context")?,
                None => json!({}),
            };
            let Some(obj) = ctx.as_object_mut() else {
                bail!("--context must be a JSON object");
            };
            obj.entry("userId").or_insert_with(|| json!(app.user()));

            let enhancer = PromptEnhancer::new(app.registry()?, app.clock.clone());
            let out = enhancer.enhance_prompt(&text, &ctx).await;
            println!("{out}");
        }

        Command::ExportIcs { date, out } => {
            let app = App::load(cfg)?;
            let date = date.unwrap_or_else(|| app.today());
            let plan = app.planner().await?.plan_day(app.user(), date).await;
            if !plan.success {
                bail!("planning failed: {}", plan.error.unwrap_or_default());
            }
            let ics = calendar::plan_to_ics(&plan.plan, app.clock.now());
            match out {
                Some(path) => {
                    std::fs::write(&path, ics).with_context(|| format!("write {}", path.display()))?;
                    println!("Wrote {} events to {}", plan.plan.len(), path.display());
                }
                None => print!("{ics}"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_date_only_means_end_of_local_day() {
        let tz: Tz = "America/Chicago".parse().unwrap();
        let due = parse_due("2026-02-23", tz).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2026, 2, 24, 5, 59, 0).unwrap());
    }

    #[test]
    fn test_due_accepts_rfc3339() {
        let due = parse_due("2026-02-23T10:00:00+01:00", chrono_tz::UTC).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0).unwrap());
        assert!(parse_due("next tuesday", chrono_tz::UTC).is_err());
    }

    #[test]
    fn test_cli_parses_plan_day_with_date() {
        let cli = Cli::try_parse_from(["tempo", "--json", "plan-day", "--date", "2026-02-23"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::PlanDay { date: Some(d) } if d == NaiveDate::from_ymd_opt(2026, 2, 23).unwrap()
        ));
    }
}
