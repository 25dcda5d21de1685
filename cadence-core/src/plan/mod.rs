pub mod calendar;
pub mod engine;
pub mod expand;
pub mod goals;
pub mod index;
pub mod metrics;
pub mod models;
pub mod publish;
pub mod reconcile;

pub use calendar::{CalendarProjector, DisplayEvent, EventKind};
pub use engine::{Projection, ProjectionEngine};
pub use expand::{expand_day, normalize_date, parse_weekday};
pub use goals::{program_closure, resolve_closure, GoalClosure};
pub use index::{DayGroup, DayGroupKey, MatchedSession, PlanIndex, PlannedDay, TemplateBucket};
pub use metrics::{active_block, block_metrics, program_metrics, BlockProgress, ProgressMetrics};
pub use models::{
    Block, Day, Goal, GoalArena, Program, Resolution, Session, SessionResolution, Template,
};
pub use publish::{ProjectionSlot, RefreshTicket};
pub use reconcile::{reconcile, resolve_day_id, ReconciledIndex, UnlinkedSession};
