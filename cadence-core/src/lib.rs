pub mod clock;
pub mod config;
pub mod error;
pub mod plan;
pub mod snapshot;
#[cfg(test)]
mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_engine_config, CalendarSection, EngineConfig, PaletteSection};
pub use error::{ConfigError, Result, SnapshotError, SnapshotResult};
pub use plan::{
    Block, BlockProgress, CalendarProjector, Day, DayGroup, DayGroupKey, DisplayEvent, EventKind, Goal,
    GoalArena, GoalClosure, PlanIndex, Program, Projection, ProjectionEngine, ProjectionSlot,
    ProgressMetrics, ReconciledIndex, RefreshTicket, Resolution, Session, SessionResolution,
    Template,
};
pub use snapshot::{load_snapshot, ProgramSnapshot};
