use crate::achievements::current_run;
use crate::calc::parse_entry_date;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::daily_goal_minutes;
use crate::ipc::helpers::{now_millis, optional_date, optional_str, storage_err, store_ref, today};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, StudySession};
use crate::store::{self, keys};
use chrono::{Days, NaiveDate};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

const MAX_SESSION_MINUTES: u64 = 24 * 60;
const SERIES_DAYS: u64 = 7;

fn handle_study_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let minutes = match req.params.get("minutes").and_then(|v| v.as_u64()) {
        Some(m) if (1..=MAX_SESSION_MINUTES).contains(&m) => m as u32,
        _ => {
            return err(
                &req.id,
                "bad_params",
                format!("minutes must be an integer in 1..={}", MAX_SESSION_MINUTES),
                None,
            )
        }
    };
    let date = match optional_date(req, "date") {
        Ok(v) => v.unwrap_or_else(today),
        Err(e) => return e,
    };
    let subject = match optional_str(req, "subject", 80) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let session = StudySession {
        id: new_id(),
        subject,
        minutes,
        date: date.format("%Y-%m-%d").to_string(),
        timestamp: now_millis(),
    };
    let mut sessions: Vec<StudySession> = match store::load_list(store, keys::STUDY_SESSIONS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    sessions.push(session.clone());
    if let Err(e) = store::set_json(store, keys::STUDY_SESSIONS, &sessions) {
        return storage_err(req, "db_update_failed", e);
    }
    info!(minutes, date = %session.date, "study session logged");
    ok(&req.id, json!({ "session": session }))
}

fn handle_study_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let sessions: Vec<StudySession> = match store::load_list(store, keys::STUDY_SESSIONS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let goal = match daily_goal_minutes(store) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let today = match optional_date(req, "today") {
        Ok(v) => v.unwrap_or_else(today),
        Err(e) => return e,
    };
    ok(&req.id, study_summary(&sessions, goal, today))
}

fn study_summary(
    sessions: &[StudySession],
    goal_minutes: i64,
    today: NaiveDate,
) -> serde_json::Value {
    let mut per_day: HashMap<NaiveDate, u64> = HashMap::new();
    let mut per_subject: HashMap<String, u64> = HashMap::new();
    let mut total: u64 = 0;
    for s in sessions {
        total += s.minutes as u64;
        if let Some(d) = parse_entry_date(&s.date) {
            *per_day.entry(d).or_insert(0) += s.minutes as u64;
        }
        let subject = s.subject.clone().unwrap_or_else(|| "General".to_string());
        *per_subject.entry(subject).or_insert(0) += s.minutes as u64;
    }

    let today_minutes = per_day.get(&today).copied().unwrap_or(0);
    let goal_progress = if goal_minutes > 0 {
        (today_minutes as f64 / goal_minutes as f64).min(1.0)
    } else {
        0.0
    };
    // Days before the start of the calendar are left out of the series.
    let series: Vec<serde_json::Value> = (0..SERIES_DAYS)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|d| {
            json!({
                "date": d.format("%Y-%m-%d").to_string(),
                "minutes": per_day.get(&d).copied().unwrap_or(0),
            })
        })
        .collect();
    let mut by_subject: Vec<(String, u64)> = per_subject.into_iter().collect();
    by_subject.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let study_days: BTreeSet<NaiveDate> = per_day.keys().copied().collect();

    json!({
        "today": today.format("%Y-%m-%d").to_string(),
        "todayMinutes": today_minutes,
        "dailyGoalMinutes": goal_minutes,
        "goalProgress": goal_progress,
        "goalReached": today_minutes as i64 >= goal_minutes,
        "totalMinutes": total,
        "sessionCount": sessions.len(),
        "last7Days": series,
        "bySubject": by_subject
            .into_iter()
            .map(|(subject, minutes)| json!({ "subject": subject, "minutes": minutes }))
            .collect::<Vec<_>>(),
        "studyStreak": current_run(&study_days, today),
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "study.log" => Some(handle_study_log(state, req)),
        "study.summary" => Some(handle_study_summary(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(date: &str, minutes: u32, subject: Option<&str>) -> StudySession {
        StudySession {
            id: new_id(),
            subject: subject.map(|s| s.to_string()),
            minutes,
            date: date.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn summary_tracks_goal_and_series() {
        let today = NaiveDate::from_ymd_opt(2024, 8, 10).expect("date");
        let sessions = vec![
            session("2024-08-10", 45, Some("Physics")),
            session("2024-08-10", 30, None),
            session("2024-08-09", 60, Some("Physics")),
            session("2024-07-01", 90, Some("Chemistry")),
        ];
        let v = study_summary(&sessions, 150, today);
        assert_eq!(v["todayMinutes"], 75);
        assert_eq!(v["goalProgress"], 0.5);
        assert_eq!(v["goalReached"], false);
        assert_eq!(v["totalMinutes"], 225);
        assert_eq!(v["studyStreak"], 2);
        let series = v["last7Days"].as_array().expect("series");
        assert_eq!(series.len(), 7);
        assert_eq!(series[6]["date"], "2024-08-10");
        assert_eq!(series[5]["minutes"], 60);
        assert_eq!(v["bySubject"][0]["subject"], "Physics");
    }

    #[test]
    fn summary_near_the_earliest_date_does_not_panic() {
        let earliest = NaiveDate::MIN.succ_opt().expect("date");
        let v = study_summary(&[], 120, earliest);
        let series = v["last7Days"].as_array().expect("series");
        assert_eq!(series.len(), 2);
        assert_eq!(v["studyStreak"], 0);
    }

    #[test]
    fn goal_progress_is_clamped() {
        let today = NaiveDate::from_ymd_opt(2024, 8, 10).expect("date");
        let v = study_summary(&[session("2024-08-10", 500, None)], 120, today);
        assert_eq!(v["goalProgress"], 1.0);
        assert_eq!(v["goalReached"], true);
    }
}
