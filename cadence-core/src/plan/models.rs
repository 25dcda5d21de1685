use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub goal_ids: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Program {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn days(&self) -> impl Iterator<Item = (&Block, &Day)> {
        self.blocks
            .iter()
            .flat_map(|block| block.days.iter().map(move |day| (block, day)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Block {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub goal_ids: Vec<String>,
    #[serde(default)]
    pub days: Vec<Day>,
}

impl Block {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Inclusive range, `None` when either bound is missing or the range is inverted.
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start <= end => Some((start, end)),
            _ => None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.range()
            .map(|(start, end)| start <= date && date <= end)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Day {
    pub id: String,
    pub name: String,
    /// Pinned date; authoritative over `day_of_week` when set.
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub day_of_week: Vec<String>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

impl Day {
    pub fn pinned(id: impl Into<String>, name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn recurring<I, S>(id: impl Into<String>, name: impl Into<String>, weekdays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            day_of_week: weekdays.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    /// Templates with repeated ids removed, first occurrence kept.
    pub fn distinct_templates(&self) -> Vec<&Template> {
        let mut seen = Vec::new();
        let mut distinct = Vec::new();
        for template in &self.templates {
            if !seen.contains(&template.id.as_str()) {
                seen.push(template.id.as_str());
                distinct.push(template);
            }
        }
        distinct
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Template {
    pub id: String,
    pub name: String,
}

impl Template {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub session_start: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub program_day_id: Option<String>,
    /// Raw attributes blob as delivered by the data layer; may embed `program_day_id`.
    pub context: Option<String>,
    pub template_id: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub total_duration_seconds: i64,
}

impl Session {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn started_at(mut self, instant: DateTime<Utc>) -> Self {
        self.session_start = Some(instant);
        self
    }

    pub fn linked_to(mut self, day_id: impl Into<String>) -> Self {
        self.program_day_id = Some(day_id.into());
        self
    }

    pub fn completed_in(mut self, seconds: i64) -> Self {
        self.completed = true;
        self.total_duration_seconds = seconds;
        self
    }

    /// Timestamp used for dating: the start, falling back to creation.
    pub fn dating_instant(&self) -> Option<DateTime<Utc>> {
        self.session_start.or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Goal {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub goal_type: Option<String>,
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: Vec<String>,
}

impl Goal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

/// Goals keyed by id. Child references may form cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalArena {
    root: Option<String>,
    goals: HashMap<String, Goal>,
}

impl GoalArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: Some(root.into()),
            goals: HashMap::new(),
        }
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Inserts a goal unless one with the same id is already present.
    pub fn insert(&mut self, goal: Goal) -> bool {
        if self.goals.contains_key(&goal.id) {
            return false;
        }
        self.goals.insert(goal.id.clone(), goal);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Goal> {
        self.goals.get(id)
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

impl FromIterator<Goal> for GoalArena {
    fn from_iter<T: IntoIterator<Item = Goal>>(iter: T) -> Self {
        let mut arena = GoalArena::new();
        for goal in iter {
            arena.insert(goal);
        }
        arena
    }
}

/// Which step of the link → name → unlinked chain placed a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    LinkedById { day_id: String },
    MatchedByName { day_name: String },
    Unlinked,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::LinkedById { .. } => "linked_by_id",
            Resolution::MatchedByName { .. } => "matched_by_name",
            Resolution::Unlinked => "unlinked",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResolution {
    pub session_id: String,
    pub session_name: String,
    pub date: Option<NaiveDate>,
    pub resolution: Resolution,
    /// Day id found on the session or in its context, known to the plan or not.
    pub resolved_day_id: Option<String>,
}
