use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::snapshot::ProgramSnapshot;

use super::calendar::{CalendarProjector, DisplayEvent};
use super::goals::program_closure;
use super::index::PlanIndex;
use super::metrics::{active_block, block_metrics, program_metrics, BlockProgress, ProgressMetrics};
use super::models::SessionResolution;
use super::reconcile::{reconcile, ReconciledIndex};

/// Everything one refresh produces, built in full before anyone sees it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub program_id: String,
    pub generated_for: NaiveDate,
    pub events: Vec<DisplayEvent>,
    pub program: ProgressMetrics,
    pub active_block: Option<BlockProgress>,
    pub resolutions: Vec<SessionResolution>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectionEngine {
    config: EngineConfig,
}

impl ProjectionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the plan index and folds the snapshot's sessions into it.
    pub fn reconcile(&self, snapshot: &ProgramSnapshot, clock: &dyn Clock) -> ReconciledIndex {
        reconcile(
            PlanIndex::build(&snapshot.program),
            &snapshot.sessions,
            clock,
        )
    }

    /// Full pipeline: plan index, reconciliation, calendar events and metrics.
    pub fn recompute(&self, snapshot: &ProgramSnapshot, clock: &dyn Clock) -> Projection {
        let today = clock.today();
        let program = &snapshot.program;
        let index = self.reconcile(snapshot, clock);
        let closure = program_closure(program, &snapshot.goals);

        let events = CalendarProjector::new(&self.config.palette).project(
            program,
            &index,
            &snapshot.goals,
            &closure,
            clock,
        );
        let program_progress = program_metrics(
            program,
            &index,
            &snapshot.sessions,
            &snapshot.goals,
            &closure,
            today,
        );
        let active = active_block(program, today).map(|block| {
            block_metrics(
                block,
                &index,
                &snapshot.sessions,
                &snapshot.goals,
                &closure,
                today,
            )
        });

        info!(
            target: "engine",
            program_id = %program.id,
            %today,
            groups = index.plan.len(),
            events = events.len(),
            unlinked = index.unlinked.len(),
            goals = closure.len(),
            active_block = active.as_ref().map(|block| block.block_id.as_str()).unwrap_or("-"),
            "projection recomputed"
        );

        Projection {
            program_id: program.id.clone(),
            generated_for: today,
            events,
            program: program_progress,
            active_block: active,
            resolutions: index.resolutions,
        }
    }
}
