use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;

use super::index::{DayGroup, MatchedSession, PlanIndex, PlannedDay};
use super::models::{Resolution, Session, SessionResolution};

const DAY_LINK_KEY: &str = "program_day_id";

/// A session no plan day claimed. Undated sessions carry no date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlinkedSession {
    pub date: Option<NaiveDate>,
    pub session: MatchedSession,
}

/// The plan index with every session folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledIndex {
    pub plan: PlanIndex,
    pub unlinked: Vec<UnlinkedSession>,
    /// One entry per input session, in input order.
    pub resolutions: Vec<SessionResolution>,
}

impl ReconciledIndex {
    pub fn groups(&self) -> impl Iterator<Item = &DayGroup> {
        self.plan.groups()
    }

    pub fn resolution_of(&self, session_id: &str) -> Option<&SessionResolution> {
        self.resolutions
            .iter()
            .find(|entry| entry.session_id == session_id)
    }
}

/// Day id a session points at: the direct field, else one embedded in its context.
pub fn resolve_day_id(session: &Session) -> Option<String> {
    if let Some(id) = session
        .program_day_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        return Some(id.to_string());
    }
    let blob = session.context.as_deref()?;
    day_id_from_context(&session.id, blob)
}

pub(crate) fn day_id_from_context(session_id: &str, blob: &str) -> Option<String> {
    if blob.trim().is_empty() {
        return None;
    }
    let value = match serde_json::from_str::<Value>(blob) {
        Ok(Value::String(inner)) => serde_json::from_str::<Value>(&inner).ok()?,
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "engine.reconcile",
                session_id = %session_id,
                "context blob is not valid json, treating link as absent: {err}"
            );
            return None;
        }
    };
    let object = value.as_object()?;
    if let Some(id) = object.get(DAY_LINK_KEY).and_then(id_text) {
        return Some(id);
    }
    object
        .values()
        .filter_map(Value::as_object)
        .find_map(|nested| nested.get(DAY_LINK_KEY).and_then(id_text))
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Folds `sessions` into `plan`: explicit day link, then template name on the
/// same date, then unlinked.
pub fn reconcile(mut plan: PlanIndex, sessions: &[Session], clock: &dyn Clock) -> ReconciledIndex {
    let mut unlinked = Vec::new();
    let mut resolutions = Vec::with_capacity(sessions.len());

    for session in sessions {
        let day_id = resolve_day_id(session);
        let date = session.dating_instant().map(|instant| clock.date_of(instant));

        let known_day = day_id
            .as_deref()
            .and_then(|id| plan.planned_day(id))
            .cloned();

        let resolution = match (known_day, date) {
            (Some(planned), Some(date)) => link(&mut plan, session, date, planned),
            (Some(planned), None) => {
                debug!(
                    target: "engine.reconcile",
                    session_id = %session.id,
                    day_id = %planned.day.id,
                    "linked session has no start or creation time, not placed on a date"
                );
                Resolution::LinkedById {
                    day_id: planned.day.id,
                }
            }
            (None, Some(date)) => match_by_name(&mut plan, session, date),
            (None, None) => {
                warn!(
                    target: "engine.reconcile",
                    session_id = %session.id,
                    "session has no start or creation time, recording as undated"
                );
                Resolution::Unlinked
            }
        };

        if resolution == Resolution::Unlinked {
            unlinked.push(UnlinkedSession {
                date,
                session: MatchedSession::from(session),
            });
        }
        debug!(
            target: "engine.reconcile",
            session_id = %session.id,
            resolution = %resolution,
            "session placed"
        );
        resolutions.push(SessionResolution {
            session_id: session.id.clone(),
            session_name: session.name.clone(),
            date,
            resolution,
            resolved_day_id: day_id,
        });
    }

    ReconciledIndex {
        plan,
        unlinked,
        resolutions,
    }
}

fn link(
    plan: &mut PlanIndex,
    session: &Session,
    date: NaiveDate,
    planned: PlannedDay,
) -> Resolution {
    let group = plan.upsert(date, &planned.block, &planned.day);
    let bucket = group.bucket_for(session);
    group.attach(session, bucket.as_deref());
    Resolution::LinkedById {
        day_id: planned.day.id,
    }
}

fn match_by_name(plan: &mut PlanIndex, session: &Session, date: NaiveDate) -> Resolution {
    let key = plan
        .groups_on(date)
        .find(|group| group.buckets.contains_key(&session.name))
        .map(DayGroup::key);
    if let Some(key) = key {
        if let Some(group) = plan.group_mut(&key) {
            group.attach(session, Some(&session.name));
            return Resolution::MatchedByName { day_name: key.name };
        }
    }
    Resolution::Unlinked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::plan::index::DayGroupKey;
    use crate::plan::models::{Block, Day, Program, Template};
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock() -> FixedClock {
        FixedClock::utc(date(2024, 1, 3))
    }

    fn program() -> Program {
        let mut block = Block::new("b1", "Week 1").with_range(date(2024, 1, 1), date(2024, 1, 7));
        block.days.push(
            Day::recurring("d1", "Leg Day", ["Monday"])
                .with_template(Template::new("t1", "Squats"))
                .with_template(Template::new("t2", "Lunges")),
        );
        block.days.push(
            Day::recurring("d2", "Arm Day", ["Wednesday"]).with_template(Template::new("t3", "Curls")),
        );
        let mut program = Program::new("p1", "Strength");
        program.blocks.push(block);
        program
    }

    fn on(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn leg_day(index: &ReconciledIndex) -> &DayGroup {
        index
            .plan
            .group(&DayGroupKey::new(date(2024, 1, 1), "Leg Day"))
            .unwrap()
    }

    #[test]
    fn name_match_fills_bucket_on_same_date() {
        let sessions = vec![Session::new("s1", "Squats").started_at(on(2024, 1, 1))];
        let index = reconcile(PlanIndex::build(&program()), &sessions, &clock());
        assert_eq!(
            index.resolutions[0].resolution,
            Resolution::MatchedByName {
                day_name: "Leg Day".into()
            }
        );
        let group = leg_day(&index);
        assert!(group.buckets["Squats"].is_complete());
        assert!(!group.is_complete());
        assert!(index.unlinked.is_empty());
    }

    #[test]
    fn explicit_link_wins_even_when_name_matches_nothing() {
        let sessions = vec![Session::new("s1", "Morning lift")
            .started_at(on(2024, 1, 1))
            .linked_to("d1")];
        let index = reconcile(PlanIndex::build(&program()), &sessions, &clock());
        assert_eq!(
            index.resolutions[0].resolution,
            Resolution::LinkedById {
                day_id: "d1".into()
            }
        );
        let group = leg_day(&index);
        assert_eq!(group.sessions.len(), 1);
        assert_eq!(group.completed_buckets(), 0);
        assert!(index.unlinked.is_empty());
    }

    #[test]
    fn link_to_off_schedule_date_materializes_group() {
        let mut session = Session::new("s1", "Curls")
            .started_at(on(2024, 1, 5))
            .linked_to("d2");
        session.template_id = Some("t3".into());
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        let group = index
            .plan
            .group(&DayGroupKey::new(date(2024, 1, 5), "Arm Day"))
            .expect("materialized group");
        assert!(group.is_complete());
        assert_eq!(group.buckets["Curls"].match_count(), 1);
    }

    #[test]
    fn template_id_selects_bucket_over_name() {
        let mut session = Session::new("s1", "Squats")
            .started_at(on(2024, 1, 1))
            .linked_to("d1");
        session.template_id = Some("t2".into());
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        let group = leg_day(&index);
        assert_eq!(group.buckets["Lunges"].match_count(), 1);
        assert_eq!(group.buckets["Squats"].match_count(), 0);
    }

    #[test]
    fn link_embedded_in_context_is_used() {
        let mut session = Session::new("s1", "Whatever").started_at(on(2024, 1, 1));
        session.context = Some(r#"{"program": {"program_day_id": "d1"}}"#.into());
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        assert_eq!(index.resolutions[0].resolution.as_str(), "linked_by_id");
    }

    #[test]
    fn context_link_accepts_numbers_and_double_encoding() {
        let mut session = Session::new("s1", "x");
        session.context = Some(r#""{\"program_day_id\": 42}""#.into());
        assert_eq!(resolve_day_id(&session).as_deref(), Some("42"));
    }

    #[test]
    fn malformed_context_falls_back_to_name_match() {
        let mut session = Session::new("s1", "Squats").started_at(on(2024, 1, 1));
        session.context = Some("{program_day_id: d1".into());
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        assert_eq!(index.resolutions[0].resolution.as_str(), "matched_by_name");
    }

    #[test]
    fn unknown_link_and_unknown_name_is_unlinked_not_dropped() {
        let sessions = vec![Session::new("s1", "Yoga")
            .started_at(on(2024, 1, 2))
            .linked_to("nope")];
        let index = reconcile(PlanIndex::build(&program()), &sessions, &clock());
        assert_eq!(index.resolutions[0].resolution, Resolution::Unlinked);
        assert_eq!(index.resolutions[0].resolved_day_id.as_deref(), Some("nope"));
        assert_eq!(index.unlinked.len(), 1);
        assert_eq!(index.unlinked[0].date, Some(date(2024, 1, 2)));
    }

    #[test]
    fn name_match_only_considers_the_session_date() {
        let sessions = vec![Session::new("s1", "Squats").started_at(on(2024, 1, 2))];
        let index = reconcile(PlanIndex::build(&program()), &sessions, &clock());
        assert_eq!(index.unlinked.len(), 1);
        assert!(!leg_day(&index).buckets["Squats"].is_complete());
    }

    #[test]
    fn created_at_dates_sessions_without_start() {
        let mut session = Session::new("s1", "Squats");
        session.created_at = Some(on(2024, 1, 1));
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        assert_eq!(index.resolutions[0].date, Some(date(2024, 1, 1)));
        assert_eq!(index.resolutions[0].resolution.as_str(), "matched_by_name");
    }

    #[test]
    fn undated_linked_session_stays_linked_without_a_date() {
        let session = Session::new("s1", "Squats").linked_to("d1");
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        assert_eq!(
            index.resolutions[0].resolution,
            Resolution::LinkedById {
                day_id: "d1".into()
            }
        );
        assert_eq!(index.resolutions[0].date, None);
        assert!(index.unlinked.is_empty());
        assert!(index.groups().all(|group| group.sessions.is_empty()));
    }

    #[test]
    fn undated_session_without_known_link_is_unlinked() {
        let session = Session::new("s1", "Squats").linked_to("nope");
        let index = reconcile(PlanIndex::build(&program()), &[session], &clock());
        assert_eq!(index.resolutions[0].resolution, Resolution::Unlinked);
        assert_eq!(index.unlinked.len(), 1);
        assert_eq!(index.unlinked[0].date, None);
    }

    #[test]
    fn repeat_attempts_raise_match_count_only() {
        let sessions = vec![
            Session::new("s1", "Squats").started_at(on(2024, 1, 1)),
            Session::new("s2", "Lunges").started_at(on(2024, 1, 1)),
            Session::new("s3", "Squats").started_at(on(2024, 1, 1)),
        ];
        let index = reconcile(PlanIndex::build(&program()), &sessions, &clock());
        let group = leg_day(&index);
        assert!(group.is_complete());
        assert_eq!(group.buckets["Squats"].match_count(), 2);
        assert_eq!(group.completed_buckets(), 2);
        assert!(index.resolution_of("s3").is_some());
    }
}
