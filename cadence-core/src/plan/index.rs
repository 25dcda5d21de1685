use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::expand::expand_day;
use super::models::{Block, Day, Program, Session, Template};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DayGroupKey {
    pub date: NaiveDate,
    pub name: String,
}

impl DayGroupKey {
    pub fn new(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
        }
    }
}

/// A session as it was attached to a group or bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedSession {
    pub session_id: String,
    pub name: String,
    pub completed: bool,
    pub total_duration_seconds: i64,
}

impl From<&Session> for MatchedSession {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            name: session.name.clone(),
            completed: session.completed,
            total_duration_seconds: session.total_duration_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateBucket {
    pub name: String,
    pub templates: Vec<Template>,
    pub sessions: Vec<MatchedSession>,
}

impl TemplateBucket {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: Vec::new(),
            sessions: Vec::new(),
        }
    }

    fn add_template(&mut self, template: &Template) -> bool {
        if self.templates.iter().any(|known| known.id == template.id) {
            return false;
        }
        self.templates.push(template.clone());
        true
    }

    pub fn holds_template(&self, template_id: &str) -> bool {
        self.templates.iter().any(|template| template.id == template_id)
    }

    pub fn match_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.sessions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub name: String,
    pub day_ids: Vec<String>,
    pub block_id: Option<String>,
    pub color: Option<String>,
    pub buckets: BTreeMap<String, TemplateBucket>,
    /// Every session attributed to the group, bucketed or not.
    pub sessions: Vec<MatchedSession>,
}

impl DayGroup {
    fn new(date: NaiveDate, name: &str, block: &Block) -> Self {
        Self {
            date,
            name: name.to_string(),
            day_ids: Vec::new(),
            block_id: Some(block.id.clone()),
            color: block.color.clone(),
            buckets: BTreeMap::new(),
            sessions: Vec::new(),
        }
    }

    fn merge_day(&mut self, day: &Day) {
        if !self.day_ids.contains(&day.id) {
            self.day_ids.push(day.id.clone());
        }
        for template in &day.templates {
            self.buckets
                .entry(template.name.clone())
                .or_insert_with(|| TemplateBucket::new(template.name.clone()))
                .add_template(template);
        }
    }

    pub fn key(&self) -> DayGroupKey {
        DayGroupKey::new(self.date, self.name.clone())
    }

    /// Complete once there is at least one bucket and every bucket has a match.
    pub fn is_complete(&self) -> bool {
        !self.buckets.is_empty() && self.buckets.values().all(TemplateBucket::is_complete)
    }

    pub fn completed_buckets(&self) -> usize {
        self.buckets
            .values()
            .filter(|bucket| bucket.is_complete())
            .count()
    }

    /// Attaches a session to the group and, when named, to that bucket.
    pub(crate) fn attach(&mut self, session: &Session, bucket: Option<&str>) {
        let matched = MatchedSession::from(session);
        if let Some(bucket) = bucket.and_then(|name| self.buckets.get_mut(name)) {
            bucket.sessions.push(matched.clone());
        }
        self.sessions.push(matched);
    }

    /// Bucket for a session: by template id first, then by name.
    pub(crate) fn bucket_for(&self, session: &Session) -> Option<String> {
        if let Some(template_id) = session.template_id.as_deref() {
            if let Some(bucket) = self
                .buckets
                .values()
                .find(|bucket| bucket.holds_template(template_id))
            {
                return Some(bucket.name.clone());
            }
        }
        self.buckets
            .contains_key(&session.name)
            .then(|| session.name.clone())
    }
}

/// A plan Day together with the Block that declared it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDay {
    pub day: Day,
    pub block: Block,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanIndex {
    groups: BTreeMap<DayGroupKey, DayGroup>,
    days: HashMap<String, PlannedDay>,
}

impl PlanIndex {
    /// Expands every Day of every Block into (date, day name) groups.
    pub fn build(program: &Program) -> Self {
        let mut index = PlanIndex::default();
        for block in &program.blocks {
            if let (Some(start), Some(end)) = (block.start_date, block.end_date) {
                if end < start {
                    warn!(
                        target: "engine.expand",
                        block_id = %block.id,
                        %start,
                        %end,
                        "block range is inverted, recurring days will not expand"
                    );
                }
            }
            for day in &block.days {
                index.register_day(block, day);
                for date in expand_day(day, block.range()) {
                    index.upsert(date, block, day);
                }
            }
        }
        debug!(
            target: "engine",
            groups = index.groups.len(),
            days = index.days.len(),
            "plan index built"
        );
        index
    }

    fn register_day(&mut self, block: &Block, day: &Day) {
        if let Some(existing) = self.days.get(&day.id) {
            if existing.block.id != block.id {
                debug!(
                    target: "engine",
                    day_id = %day.id,
                    owner = %existing.block.id,
                    ignored = %block.id,
                    "day declared by several blocks, keeping first owner"
                );
            }
            return;
        }
        let mut owner = block.clone();
        owner.days.clear();
        self.days.insert(
            day.id.clone(),
            PlannedDay {
                day: day.clone(),
                block: owner,
            },
        );
    }

    /// Finds or creates the group for (date, day name) and merges the day into it.
    /// The first block to create a group keeps its color.
    pub(crate) fn upsert(&mut self, date: NaiveDate, block: &Block, day: &Day) -> &mut DayGroup {
        let group = self
            .groups
            .entry(DayGroupKey::new(date, day.name.clone()))
            .or_insert_with(|| DayGroup::new(date, &day.name, block));
        group.merge_day(day);
        group
    }

    pub fn group(&self, key: &DayGroupKey) -> Option<&DayGroup> {
        self.groups.get(key)
    }

    pub(crate) fn group_mut(&mut self, key: &DayGroupKey) -> Option<&mut DayGroup> {
        self.groups.get_mut(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = &DayGroup> {
        self.groups.values()
    }

    /// Groups on `date`, in name order.
    pub fn groups_on(&self, date: NaiveDate) -> impl Iterator<Item = &DayGroup> {
        let from = DayGroupKey::new(date, String::new());
        self.groups
            .range(from..)
            .take_while(move |(key, _)| key.date == date)
            .map(|(_, group)| group)
    }

    pub fn planned_day(&self, day_id: &str) -> Option<&PlannedDay> {
        self.days.get(day_id)
    }

    pub fn is_known_day(&self, day_id: &str) -> bool {
        self.days.contains_key(day_id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
