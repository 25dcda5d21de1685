use chrono::NaiveDate;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::PaletteSection;

use super::goals::GoalClosure;
use super::index::{DayGroup, TemplateBucket};
use super::models::{Block, Goal, GoalArena, Program};
use super::reconcile::{ReconciledIndex, UnlinkedSession};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DayGroup,
    Template,
    UnlinkedSession,
    GoalDeadline,
    BlockBackground,
}

impl EventKind {
    /// Fixed render order of each event family.
    pub fn sort_order(self) -> u8 {
        match self {
            EventKind::DayGroup => 0,
            EventKind::Template => 1,
            EventKind::UnlinkedSession => 2,
            EventKind::GoalDeadline => 3,
            EventKind::BlockBackground => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DayGroup => "day_group",
            EventKind::Template => "template",
            EventKind::UnlinkedSession => "unlinked_session",
            EventKind::GoalDeadline => "goal_deadline",
            EventKind::BlockBackground => "block_background",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent {
    /// Derived from source keys only, so it survives a refresh unchanged.
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub background_color: String,
    pub text_color: String,
    pub kind: EventKind,
    pub completed: bool,
    pub match_count: usize,
    pub sort_order: u8,
}

impl DisplayEvent {
    /// Whether the event touches the inclusive window [from, to].
    pub fn overlaps(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
        let last = self.end_date.unwrap_or(self.date);
        from.map_or(true, |from| last >= from) && to.map_or(true, |to| self.date <= to)
    }
}

pub struct CalendarProjector<'a> {
    palette: &'a PaletteSection,
}

impl<'a> CalendarProjector<'a> {
    pub fn new(palette: &'a PaletteSection) -> Self {
        Self { palette }
    }

    pub fn project(
        &self,
        program: &Program,
        index: &ReconciledIndex,
        arena: &GoalArena,
        closure: &GoalClosure,
        clock: &dyn Clock,
    ) -> Vec<DisplayEvent> {
        let mut events = Vec::new();
        for group in index.groups() {
            events.push(self.day_group_event(group));
            events.extend(
                group
                    .buckets
                    .values()
                    .map(|bucket| self.bucket_event(group, bucket)),
            );
        }
        events.extend(
            index
                .unlinked
                .iter()
                .filter_map(|entry| self.unlinked_event(entry)),
        );
        events.extend(
            closure
                .goals(arena)
                .filter_map(|goal| self.goal_event(goal, clock)),
        );
        events.extend(
            program
                .blocks
                .iter()
                .filter_map(|block| self.block_event(block)),
        );

        events.sort_by(|a, b| {
            (a.date, a.sort_order, a.id.as_str()).cmp(&(b.date, b.sort_order, b.id.as_str()))
        });
        events
    }

    fn day_group_event(&self, group: &DayGroup) -> DisplayEvent {
        let completed = group.is_complete();
        let state = if completed { "complete" } else { "planned" };
        DisplayEvent {
            id: format!("day:{}:{}", group.date, group.name),
            title: format!("{} · {}", group.name, state),
            date: group.date,
            end_date: None,
            background_color: self.plan_color(completed, group.color.as_deref()),
            text_color: self.palette.text.clone(),
            kind: EventKind::DayGroup,
            completed,
            match_count: group.completed_buckets(),
            sort_order: EventKind::DayGroup.sort_order(),
        }
    }

    fn bucket_event(&self, group: &DayGroup, bucket: &TemplateBucket) -> DisplayEvent {
        let completed = bucket.is_complete();
        let title = match bucket.match_count() {
            0 => bucket.name.clone(),
            count => format!("{} ×{}", bucket.name, count),
        };
        DisplayEvent {
            id: format!("template:{}:{}:{}", group.date, group.name, bucket.name),
            title,
            date: group.date,
            end_date: None,
            background_color: self.plan_color(completed, group.color.as_deref()),
            text_color: self.palette.text.clone(),
            kind: EventKind::Template,
            completed,
            match_count: bucket.match_count(),
            sort_order: EventKind::Template.sort_order(),
        }
    }

    fn unlinked_event(&self, entry: &UnlinkedSession) -> Option<DisplayEvent> {
        let date = entry.date?;
        Some(DisplayEvent {
            id: format!("session:{}", entry.session.session_id),
            title: entry.session.name.clone(),
            date,
            end_date: None,
            background_color: self.palette.unlinked.clone(),
            text_color: self.palette.text.clone(),
            kind: EventKind::UnlinkedSession,
            completed: entry.session.completed,
            match_count: 0,
            sort_order: EventKind::UnlinkedSession.sort_order(),
        })
    }

    /// Completed goals sit on their completion date when known, others on the deadline.
    fn goal_event(&self, goal: &Goal, clock: &dyn Clock) -> Option<DisplayEvent> {
        let date = if goal.completed {
            goal.completed_at
                .map(|instant| clock.date_of(instant))
                .or(goal.deadline)?
        } else {
            goal.deadline?
        };
        let background = if goal.completed {
            &self.palette.goal_completed
        } else {
            &self.palette.goal
        };
        Some(DisplayEvent {
            id: format!("goal:{}", goal.id),
            title: goal.name.clone(),
            date,
            end_date: None,
            background_color: background.clone(),
            text_color: self.palette.text.clone(),
            kind: EventKind::GoalDeadline,
            completed: goal.completed,
            match_count: 0,
            sort_order: EventKind::GoalDeadline.sort_order(),
        })
    }

    fn block_event(&self, block: &Block) -> Option<DisplayEvent> {
        let (start, end) = block.range()?;
        Some(DisplayEvent {
            id: format!("block:{}", block.id),
            title: block.name.clone(),
            date: start,
            end_date: Some(end),
            background_color: block
                .color
                .clone()
                .unwrap_or_else(|| self.palette.block_default.clone()),
            text_color: self.palette.band_text.clone(),
            kind: EventKind::BlockBackground,
            completed: false,
            match_count: 0,
            sort_order: EventKind::BlockBackground.sort_order(),
        })
    }

    fn plan_color(&self, completed: bool, block_color: Option<&str>) -> String {
        if completed {
            self.palette.completed.clone()
        } else {
            block_color
                .map(str::to_string)
                .unwrap_or_else(|| self.palette.planned.clone())
        }
    }
}
