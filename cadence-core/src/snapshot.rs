//! Boundary between the data-access layer and the engine.
//!
//! The data layer hands over loosely shaped JSON: ids that are sometimes
//! numbers, dates with or without a time part, goal fields that may sit under
//! an `attributes` object, goal children given as ids or as nested goals. All
//! of it is normalized here into the canonical records of [`crate::plan::models`]
//! so the engine never branches on shape.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{SnapshotError, SnapshotResult};
use crate::plan::expand::normalize_date;
use crate::plan::models::{Block, Day, Goal, GoalArena, Program, Session, Template};
use crate::plan::reconcile::day_id_from_context;

/// One program's entities, immutable for the duration of a refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramSnapshot {
    pub program: Program,
    pub goals: GoalArena,
    pub sessions: Vec<Session>,
}

impl ProgramSnapshot {
    pub fn from_json_str(json: &str) -> SnapshotResult<Self> {
        let raw: RawSnapshot = serde_json::from_str(json)?;
        raw.normalize()
    }

    pub fn from_value(value: Value) -> SnapshotResult<Self> {
        let raw: RawSnapshot = serde_json::from_value(value)?;
        raw.normalize()
    }
}

pub fn load_snapshot<P: AsRef<Path>>(path: P) -> SnapshotResult<ProgramSnapshot> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    ProgramSnapshot::from_json_str(&content)
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    program: Option<RawProgram>,
    #[serde(default)]
    goals: Value,
    #[serde(default, alias = "goalRootId", alias = "root_goal_id")]
    goal_root_id: Value,
    #[serde(default)]
    sessions: Option<Vec<RawSession>>,
}

#[derive(Debug, Deserialize)]
struct RawProgram {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "startDate")]
    start_date: Value,
    #[serde(default, alias = "endDate")]
    end_date: Value,
    #[serde(default, alias = "goalIds")]
    goal_ids: Value,
    #[serde(default)]
    blocks: Option<Vec<RawBlock>>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default, alias = "startDate")]
    start_date: Value,
    #[serde(default, alias = "endDate")]
    end_date: Value,
    #[serde(default, alias = "goalIds")]
    goal_ids: Value,
    #[serde(default)]
    days: Option<Vec<RawDay>>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Value,
    #[serde(default, alias = "dayOfWeek")]
    day_of_week: Value,
    #[serde(default)]
    templates: Option<Vec<RawTemplate>>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "sessionStart")]
    session_start: Value,
    #[serde(default, alias = "createdAt")]
    created_at: Value,
    #[serde(default, alias = "programDayId")]
    program_day_id: Value,
    #[serde(default)]
    context: Value,
    #[serde(default)]
    attributes: Value,
    #[serde(default, alias = "templateId")]
    template_id: Value,
    #[serde(default)]
    completed: Value,
    #[serde(default, alias = "totalDurationSeconds")]
    total_duration_seconds: Value,
}

impl RawSnapshot {
    fn normalize(self) -> SnapshotResult<ProgramSnapshot> {
        let program = self.program.ok_or(SnapshotError::MissingProgram)?.normalize();
        let mut goals = match id_text(&self.goal_root_id) {
            Some(root) => GoalArena::with_root(root),
            None => GoalArena::new(),
        };
        collect_goals(&self.goals, &mut goals);
        let sessions = self
            .sessions
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, raw)| raw.normalize(position))
            .collect();
        Ok(ProgramSnapshot {
            program,
            goals,
            sessions,
        })
    }
}

impl RawProgram {
    fn normalize(self) -> Program {
        let id = id_text(&self.id).unwrap_or_default();
        let blocks = self
            .blocks
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, raw)| raw.normalize(&id, position))
            .collect();
        Program {
            name: self.name.unwrap_or_default(),
            start_date: date_field(&self.start_date, "program.start_date"),
            end_date: date_field(&self.end_date, "program.end_date"),
            goal_ids: id_list(&self.goal_ids),
            blocks,
            id,
        }
    }
}

impl RawBlock {
    fn normalize(self, program_id: &str, position: usize) -> Block {
        let id = id_text(&self.id).unwrap_or_else(|| synthetic_id(program_id, "block", position));
        let days = self
            .days
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.normalize(&id, index))
            .collect();
        Block {
            name: self.name.unwrap_or_default(),
            color: self.color.filter(|color| !color.trim().is_empty()),
            start_date: date_field(&self.start_date, "block.start_date"),
            end_date: date_field(&self.end_date, "block.end_date"),
            goal_ids: id_list(&self.goal_ids),
            days,
            id,
        }
    }
}

impl RawDay {
    fn normalize(self, block_id: &str, position: usize) -> Day {
        let id = id_text(&self.id).unwrap_or_else(|| synthetic_id(block_id, "day", position));
        let templates = self
            .templates
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, raw)| Template {
                id: id_text(&raw.id).unwrap_or_else(|| synthetic_id(&id, "template", index)),
                name: raw.name.unwrap_or_default(),
            })
            .collect();
        Day {
            name: self.name.unwrap_or_default(),
            date: date_field(&self.date, "day.date"),
            day_of_week: weekday_list(&self.day_of_week),
            templates,
            id,
        }
    }
}

impl RawSession {
    fn normalize(self, position: usize) -> Session {
        let id = id_text(&self.id).unwrap_or_else(|| synthetic_id("session", "unsaved", position));
        let context = context_text(&self.context);
        let attributes = context_text(&self.attributes);
        // With two blobs only one can travel as context; lift the link out of either.
        let program_day_id = id_text(&self.program_day_id).or_else(|| match (&context, &attributes) {
            (Some(context), Some(attributes)) => day_id_from_context(&id, context)
                .or_else(|| day_id_from_context(&id, attributes)),
            _ => None,
        });
        Session {
            name: self.name.unwrap_or_default(),
            session_start: instant_field(&self.session_start, "session.session_start"),
            created_at: instant_field(&self.created_at, "session.created_at"),
            program_day_id,
            context: context.or(attributes),
            template_id: id_text(&self.template_id),
            completed: truthy(&self.completed),
            total_duration_seconds: seconds(&self.total_duration_seconds),
            id,
        }
    }
}

fn synthetic_id(parent: &str, kind: &str, position: usize) -> String {
    let id = format!("{parent}/{kind}-{position}");
    debug!(target: "snapshot", %id, "record without id, using positional id");
    id
}

/// Walks a goal tree or list, flattening nested children into `arena`.
fn collect_goals(value: &Value, arena: &mut GoalArena) {
    let mut stack: Vec<&Value> = match value {
        Value::Array(items) => items.iter().rev().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };

    while let Some(node) = stack.pop() {
        let Some(object) = node.as_object() else {
            continue;
        };
        let fields = GoalFields::new(object);
        let Some(id) = fields.get("id").and_then(id_text) else {
            warn!(target: "snapshot", "goal without id skipped");
            continue;
        };

        let mut children = Vec::new();
        let mut nested = Vec::new();
        if let Some(Value::Array(items)) = fields.get("children") {
            for child in items {
                if let Some(child_object) = child.as_object() {
                    if let Some(child_id) = GoalFields::new(child_object).get("id").and_then(id_text) {
                        children.push(child_id);
                    }
                    nested.push(child);
                } else if let Some(child_id) = id_text(child) {
                    children.push(child_id);
                }
            }
        }
        stack.extend(nested.into_iter().rev());

        let goal = Goal {
            name: fields
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            goal_type: fields
                .get("type")
                .or_else(|| fields.get("goal_type"))
                .and_then(Value::as_str)
                .map(str::to_string),
            deadline: fields
                .get("deadline")
                .and_then(|value| date_field(value, "goal.deadline")),
            completed: fields.get("completed").map(truthy).unwrap_or(false),
            completed_at: fields
                .get("completed_at")
                .and_then(|value| instant_field(value, "goal.completed_at")),
            children,
            id,
        };
        if !arena.insert(goal) {
            debug!(target: "snapshot", "duplicate goal id, keeping first");
        }
    }
}

/// Goal attribute lookup: top-level key first, then `attributes.<key>`.
struct GoalFields<'a> {
    top: &'a Map<String, Value>,
    attributes: Option<&'a Map<String, Value>>,
}

impl<'a> GoalFields<'a> {
    fn new(top: &'a Map<String, Value>) -> Self {
        Self {
            top,
            attributes: top.get("attributes").and_then(Value::as_object),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        let present = |value: &&Value| !value.is_null();
        self.top
            .get(key)
            .filter(present)
            .or_else(|| self.attributes.and_then(|attrs| attrs.get(key)).filter(present))
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn id_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(object) => object.get("id").and_then(id_text),
                other => id_text(other),
            })
            .collect(),
        other => id_text(other).into_iter().collect(),
    }
}

fn weekday_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        Value::String(text) => text
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn date_field(value: &Value, field: &str) -> Option<NaiveDate> {
    let text = match value {
        Value::Null => return None,
        Value::String(text) if text.trim().is_empty() => return None,
        Value::String(text) => text,
        other => {
            warn!(target: "snapshot", field, value = %other, "date is not a string, ignoring");
            return None;
        }
    };
    let parsed = normalize_date(text);
    if parsed.is_none() {
        warn!(target: "snapshot", field, value = %text, "unparseable date, ignoring");
    }
    parsed
}

fn instant_field(value: &Value, field: &str) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::Null => return None,
        Value::String(text) if text.trim().is_empty() => return None,
        Value::String(text) => parse_instant(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()),
        _ => None,
    };
    if parsed.is_none() {
        warn!(target: "snapshot", field, value = %value, "unparseable timestamp, ignoring");
    }
    parsed
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn context_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => matches!(text.trim(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn seconds(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n.round() as i64))
            .unwrap_or(0),
        Value::String(text) => text.trim().parse::<f64>().map(|n| n.round() as i64).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = ProgramSnapshot::from_json_str(r#"{"sessions": []}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingProgram));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = ProgramSnapshot::from_json_str("{").unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(_)));
    }

    #[test]
    fn numeric_ids_and_timestamped_dates_are_normalized() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {
                "id": 7,
                "name": "Strength",
                "startDate": "2024-01-01T00:00:00Z",
                "end_date": "2024-02-01",
                "goal_ids": [1, "2", {"id": 3}],
                "blocks": [{
                    "id": 11,
                    "name": "Week 1",
                    "color": "",
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-07",
                    "days": [{
                        "id": 21,
                        "name": "Leg Day",
                        "day_of_week": "Monday, Thursday",
                        "templates": [{"id": 31, "name": "Squats"}]
                    }]
                }]
            }
        }))
        .unwrap();
        let program = &snapshot.program;
        assert_eq!(program.id, "7");
        assert_eq!(program.start_date, Some(date(2024, 1, 1)));
        assert_eq!(program.goal_ids, vec!["1", "2", "3"]);
        let block = &program.blocks[0];
        assert_eq!(block.id, "11");
        assert_eq!(block.color, None);
        let day = &block.days[0];
        assert_eq!(day.id, "21");
        assert_eq!(day.day_of_week, vec!["Monday", "Thursday"]);
        assert_eq!(day.templates[0], Template::new("31", "Squats"));
    }

    #[test]
    fn goal_attributes_may_be_flat_or_nested() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {"id": "p"},
            "goal_root_id": "root",
            "goals": {
                "id": "root",
                "name": "Root",
                "children": [
                    {
                        "id": "A",
                        "attributes": {
                            "name": "Nested A",
                            "deadline": "2024-03-01",
                            "completed": "true",
                            "completed_at": "2024-02-20 10:00:00"
                        },
                        "children": ["B"]
                    },
                    {"id": "B", "name": "Flat B", "type": "milestone", "deadline": null}
                ]
            }
        }))
        .unwrap();
        let goals = &snapshot.goals;
        assert_eq!(goals.root(), Some("root"));
        assert_eq!(goals.len(), 3);
        assert_eq!(goals.get("root").unwrap().children, vec!["A", "B"]);
        let a = goals.get("A").unwrap();
        assert_eq!(a.name, "Nested A");
        assert_eq!(a.deadline, Some(date(2024, 3, 1)));
        assert!(a.completed);
        assert!(a.completed_at.is_some());
        assert_eq!(a.children, vec!["B"]);
        let b = goals.get("B").unwrap();
        assert_eq!(b.goal_type.as_deref(), Some("milestone"));
        assert_eq!(b.deadline, None);
    }

    #[test]
    fn goal_lists_keep_the_first_duplicate() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {"id": "p"},
            "goals": [
                {"id": "A", "name": "first"},
                {"id": "A", "name": "second"},
                {"name": "no id"}
            ]
        }))
        .unwrap();
        assert_eq!(snapshot.goals.len(), 1);
        assert_eq!(snapshot.goals.get("A").unwrap().name, "first");
    }

    #[test]
    fn session_context_and_loose_scalars_are_normalized() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {"id": "p"},
            "sessions": [
                {
                    "id": 1,
                    "name": "Squats",
                    "sessionStart": "2024-01-01T09:30:00+01:00",
                    "attributes": {"program_day_id": 21},
                    "completed": 1,
                    "total_duration_seconds": "1799.6"
                },
                {
                    "name": "Walk",
                    "created_at": 1704067200,
                    "context": "{not json",
                    "program_day_id": "",
                    "completed": false,
                    "total_duration_seconds": 60
                }
            ]
        }))
        .unwrap();
        let first = &snapshot.sessions[0];
        assert_eq!(first.id, "1");
        assert_eq!(
            first.session_start,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(first.context.as_deref(), Some(r#"{"program_day_id":21}"#));
        assert!(first.completed);
        assert_eq!(first.total_duration_seconds, 1800);

        let second = &snapshot.sessions[1];
        assert_eq!(second.id, "session/unsaved-1");
        assert_eq!(
            second.created_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(second.program_day_id, None);
        assert_eq!(second.context.as_deref(), Some("{not json"));
        assert!(!second.completed);
    }

    #[test]
    fn null_collections_are_treated_as_empty() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {
                "id": "p",
                "blocks": [
                    {"id": "b", "days": null},
                    {"id": "c", "days": [{"id": "d", "name": "Rest", "templates": null}]}
                ]
            },
            "sessions": null
        }))
        .unwrap();
        assert!(snapshot.program.blocks[0].days.is_empty());
        assert!(snapshot.program.blocks[1].days[0].templates.is_empty());
        assert!(snapshot.sessions.is_empty());

        let bare = ProgramSnapshot::from_value(json!({"program": {"id": "p", "blocks": null}})).unwrap();
        assert!(bare.program.blocks.is_empty());
    }

    #[test]
    fn session_with_context_and_attributes_keeps_both_links() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {"id": "p"},
            "sessions": [
                {
                    "id": "s1",
                    "context": {"source": "watch"},
                    "attributes": {"program_day_id": "d1"}
                },
                {
                    "id": "s2",
                    "context": "{\"program_day_id\": \"d2\"}",
                    "attributes": {"program_day_id": "d9"}
                },
                {"id": "s3", "attributes": {"program_day_id": 7}}
            ]
        }))
        .unwrap();
        let sessions = &snapshot.sessions;
        assert_eq!(sessions[0].program_day_id.as_deref(), Some("d1"));
        assert_eq!(sessions[0].context.as_deref(), Some(r#"{"source":"watch"}"#));
        assert_eq!(sessions[1].program_day_id.as_deref(), Some("d2"));
        assert_eq!(sessions[2].program_day_id, None);
        assert_eq!(sessions[2].context.as_deref(), Some(r#"{"program_day_id":7}"#));
    }

    #[test]
    fn unparseable_dates_become_none() {
        let snapshot = ProgramSnapshot::from_value(json!({
            "program": {"id": "p", "start_date": "someday", "end_date": 20240101}
        }))
        .unwrap();
        assert_eq!(snapshot.program.start_date, None);
        assert_eq!(snapshot.program.end_date, None);
    }

    #[test]
    fn load_snapshot_reports_missing_file() {
        let err = load_snapshot("/nonexistent/snapshot.json").unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }

    #[test]
    fn load_snapshot_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"program": {"id": "p", "name": "From disk"}}"#).unwrap();
        let snapshot = load_snapshot(&path).unwrap();
        assert_eq!(snapshot.program.name, "From disk");
    }
}
