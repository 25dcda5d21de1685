use chrono::NaiveDate;
use serde::Serialize;

use super::expand::expand_day;
use super::goals::{resolve_closure, GoalClosure};
use super::models::{Block, Day, Goal, GoalArena, Program, Resolution, Session};
use super::reconcile::ReconciledIndex;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    pub completed_sessions: usize,
    pub scheduled_sessions: usize,
    pub total_duration_seconds: i64,
    pub goals_met: usize,
    pub total_goals: usize,
    pub days_remaining: i64,
    /// Sessions linked to a plan day, completed or not.
    pub logged_sessions: usize,
    /// Template slots over every expanded date.
    pub planned_occurrences: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockProgress {
    pub block_id: String,
    pub block_name: String,
    #[serde(flatten)]
    pub metrics: ProgressMetrics,
}

/// Block whose range contains `today`; earlier blocks win.
pub fn active_block(program: &Program, today: NaiveDate) -> Option<&Block> {
    program.blocks.iter().find(|block| block.contains(today))
}

pub fn program_metrics(
    program: &Program,
    index: &ReconciledIndex,
    sessions: &[Session],
    arena: &GoalArena,
    closure: &GoalClosure,
    today: NaiveDate,
) -> ProgressMetrics {
    let linked: Vec<&Session> = linked_sessions(index, sessions)
        .map(|(session, _)| session)
        .collect();
    let mut metrics = session_totals(&linked);
    metrics.scheduled_sessions = program.days().map(|(_, day)| day.distinct_templates().len()).sum();
    metrics.planned_occurrences = program
        .days()
        .map(|(block, day)| occurrences(block, day))
        .sum();
    let (met, total) = goal_tally(closure.goals(arena));
    metrics.goals_met = met;
    metrics.total_goals = total;
    metrics.days_remaining = days_until(program.end_date, today);
    metrics
}

/// Metrics for `block`, counting only sessions linked to days the block owns.
pub fn block_metrics(
    block: &Block,
    index: &ReconciledIndex,
    sessions: &[Session],
    arena: &GoalArena,
    program_closure: &GoalClosure,
    today: NaiveDate,
) -> BlockProgress {
    let owned: Vec<&Session> = linked_sessions(index, sessions)
        .filter(|(_, block_id)| *block_id == block.id)
        .map(|(session, _)| session)
        .collect();
    let mut metrics = session_totals(&owned);
    metrics.scheduled_sessions = block
        .days
        .iter()
        .map(|day| day.distinct_templates().len())
        .sum();
    metrics.planned_occurrences = block.days.iter().map(|day| occurrences(block, day)).sum();

    let (met, total) = if block.goal_ids.is_empty() {
        goal_tally(program_closure.goals(arena).filter(|goal| {
            goal.deadline
                .map(|deadline| block.contains(deadline))
                .unwrap_or(false)
        }))
    } else {
        let closure = resolve_closure(arena, block.goal_ids.iter().map(String::as_str));
        goal_tally(closure.goals(arena))
    };
    metrics.goals_met = met;
    metrics.total_goals = total;
    metrics.days_remaining = days_until(block.end_date, today);

    BlockProgress {
        block_id: block.id.clone(),
        block_name: block.name.clone(),
        metrics,
    }
}

/// Sessions reconciled by day id, paired with the id of the block owning that day.
/// `index.resolutions` holds one entry per session, in input order.
fn linked_sessions<'a>(
    index: &'a ReconciledIndex,
    sessions: &'a [Session],
) -> impl Iterator<Item = (&'a Session, &'a str)> + 'a {
    sessions
        .iter()
        .zip(&index.resolutions)
        .filter_map(move |(session, entry)| match &entry.resolution {
            Resolution::LinkedById { day_id } => index
                .plan
                .planned_day(day_id)
                .map(|planned| (session, planned.block.id.as_str())),
            _ => None,
        })
}

fn session_totals(sessions: &[&Session]) -> ProgressMetrics {
    ProgressMetrics {
        completed_sessions: sessions.iter().filter(|session| session.completed).count(),
        total_duration_seconds: sessions
            .iter()
            .map(|session| session.total_duration_seconds.max(0))
            .sum(),
        logged_sessions: sessions.len(),
        ..ProgressMetrics::default()
    }
}

fn occurrences(block: &Block, day: &Day) -> usize {
    expand_day(day, block.range()).len() * day.distinct_templates().len()
}

fn goal_tally<'a>(goals: impl Iterator<Item = &'a Goal>) -> (usize, usize) {
    goals.fold((0, 0), |(met, total), goal| {
        (met + usize::from(goal.completed), total + 1)
    })
}

fn days_until(end: Option<NaiveDate>, today: NaiveDate) -> i64 {
    end.map(|end| (end - today).num_days().max(0))
        .unwrap_or(0)
}
