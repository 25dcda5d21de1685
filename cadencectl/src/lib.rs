use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_core::{
    load_engine_config, load_snapshot, BlockProgress, Clock, ConfigError, DisplayEvent,
    EngineConfig, FixedClock, ProgressMetrics, Projection, ProjectionEngine, ProjectionSlot,
    SessionResolution, SnapshotError, SystemClock,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_CONFIG_PATH: &str = "configs/cadence.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("refresh for {0} was superseded before it could be read")]
    NothingPublished(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Cadence plan/actual projection tool", long_about = None)]
pub struct Cli {
    /// Path to cadence.toml
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Treat this date as today instead of the system clock
    #[arg(long)]
    pub today: Option<NaiveDate>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log filter, overrides RUST_LOG (e.g. `debug` or `engine.reconcile=debug`)
    #[arg(long)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lists calendar events for a program snapshot
    Calendar(CalendarArgs),
    /// Shows program and active-block progress
    Metrics(SnapshotArgs),
    /// Shows how each session was reconciled against the plan
    Sessions(SnapshotArgs),
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Snapshot JSON file
    pub snapshot: PathBuf,
}

#[derive(Args, Debug)]
pub struct CalendarArgs {
    /// Snapshot JSON file
    pub snapshot: PathBuf,
    /// First day of the window (inclusive)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day of the window (inclusive)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

/// Installs the stderr subscriber. An explicit filter wins over `RUST_LOG`.
pub fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|err| AppError::InvalidInput(format!("log level {directives:?}: {err}")))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Calendar(args) => {
            let view = context.calendar(args)?;
            render(&view, cli.format)?;
        }
        Commands::Metrics(args) => {
            let report = context.metrics(&args.snapshot)?;
            render(&report, cli.format)?;
        }
        Commands::Sessions(args) => {
            let audit = context.sessions(&args.snapshot)?;
            render(&audit, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    engine: ProjectionEngine,
    slot: ProjectionSlot,
    today: Option<NaiveDate>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(&cli.config)?;
        Ok(Self {
            engine: ProjectionEngine::new(config),
            slot: ProjectionSlot::new(),
            today: cli.today,
        })
    }

    fn clock(&self) -> Box<dyn Clock> {
        let calendar = &self.engine.config().calendar;
        match self.today {
            Some(today) => Box::new(FixedClock::new(today, calendar.offset())),
            None => Box::new(SystemClock::from_config(calendar)),
        }
    }

    /// Loads the snapshot, recomputes, and returns whatever the slot now holds.
    fn refresh(&self, snapshot_path: &Path) -> Result<Arc<Projection>> {
        let snapshot = load_snapshot(snapshot_path)?;
        let ticket = self.slot.begin();
        let clock = self.clock();
        let projection = self.engine.recompute(&snapshot, clock.as_ref());
        if !self.slot.publish(ticket, projection) {
            debug!(generation = ticket.generation(), "refresh superseded");
        }
        self.slot
            .current()
            .ok_or_else(|| AppError::NothingPublished(snapshot_path.display().to_string()))
    }

    fn calendar(&self, args: &CalendarArgs) -> Result<CalendarView> {
        if let (Some(from), Some(to)) = (args.from, args.to) {
            if to < from {
                return Err(AppError::InvalidInput(format!(
                    "window ends ({to}) before it starts ({from})"
                )));
            }
        }
        let projection = self.refresh(&args.snapshot)?;
        let events: Vec<DisplayEvent> = projection
            .events
            .iter()
            .filter(|event| event.overlaps(args.from, args.to))
            .cloned()
            .collect();
        info!(
            program_id = %projection.program_id,
            shown = events.len(),
            total = projection.events.len(),
            "calendar rendered"
        );
        Ok(CalendarView {
            program_id: projection.program_id.clone(),
            from: args.from,
            to: args.to,
            events,
        })
    }

    fn metrics(&self, snapshot_path: &Path) -> Result<MetricsReport> {
        let projection = self.refresh(snapshot_path)?;
        Ok(MetricsReport {
            program_id: projection.program_id.clone(),
            generated_for: projection.generated_for,
            program: projection.program.clone(),
            active_block: projection.active_block.clone(),
        })
    }

    fn sessions(&self, snapshot_path: &Path) -> Result<SessionAudit> {
        let projection = self.refresh(snapshot_path)?;
        Ok(SessionAudit {
            program_id: projection.program_id.clone(),
            rows: projection.resolutions.clone(),
        })
    }
}

/// The default path is optional; an explicitly named file must exist.
fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }
    Ok(load_engine_config(path)?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalendarView {
    program_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<NaiveDate>,
    events: Vec<DisplayEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsReport {
    program_id: String,
    generated_for: NaiveDate,
    program: ProgressMetrics,
    active_block: Option<BlockProgress>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionAudit {
    program_id: String,
    rows: Vec<SessionResolution>,
}

impl DisplayFallback for CalendarView {
    fn display(&self) -> String {
        if self.events.is_empty() {
            return "No events".to_string();
        }
        let mut lines = Vec::new();
        for event in &self.events {
            let when = match event.end_date {
                Some(end) => format!("{}..{}", event.date, end),
                None => event.date.to_string(),
            };
            let mark = if event.completed { "x" } else { " " };
            lines.push(format!(
                "{when} [{mark}] {kind}: {title}",
                kind = event.kind.as_str(),
                title = event.title
            ));
        }
        lines.join("\n")
    }
}

fn metrics_lines(lines: &mut Vec<String>, metrics: &ProgressMetrics) {
    lines.push(format!(
        "  - Sessions: {} completed / {} scheduled ({} logged, {} planned occurrences)",
        metrics.completed_sessions,
        metrics.scheduled_sessions,
        metrics.logged_sessions,
        metrics.planned_occurrences
    ));
    lines.push(format!(
        "  - Duration: {}",
        format_duration(metrics.total_duration_seconds)
    ));
    lines.push(format!(
        "  - Goals: {}/{}",
        metrics.goals_met, metrics.total_goals
    ));
    lines.push(format!("  - Days remaining: {}", metrics.days_remaining));
}

impl DisplayFallback for MetricsReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Program {} (as of {})",
            self.program_id, self.generated_for
        )];
        metrics_lines(&mut lines, &self.program);
        match &self.active_block {
            Some(block) => {
                lines.push(format!("Active block: {} ({})", block.block_name, block.block_id));
                metrics_lines(&mut lines, &block.metrics);
            }
            None => lines.push("Active block: none".to_string()),
        }
        lines.join("\n")
    }
}

impl DisplayFallback for SessionAudit {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No sessions".to_string();
        }
        let mut lines = Vec::new();
        for row in &self.rows {
            let date = row
                .date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "undated".to_string());
            let linked = row.resolved_day_id.as_deref().unwrap_or("-");
            lines.push(format!(
                "{id} | {name} | {date} | {resolution} | day={linked}",
                id = row.session_id,
                name = row.session_name,
                resolution = row.resolution,
            ));
        }
        lines.join("\n")
    }
}

fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
}
