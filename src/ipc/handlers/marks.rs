use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grade_scale;
use crate::ipc::helpers::{calc_err, now_millis, optional_score, storage_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, MarkEntry};
use crate::store::{self, keys};
use serde_json::json;
use tracing::info;

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let filters = match calc::parse_mark_filters(req.params.get("filters")) {
        Ok(f) => f,
        Err(e) => return calc_err(req, e),
    };
    let marks: Vec<MarkEntry> = match store::load_list(store, keys::MARKS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };

    let mut selected: Vec<MarkEntry> = calc::filter_entries(&marks, &filters)
        .into_iter()
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    ok(&req.id, json!({ "marks": selected, "count": selected.len() }))
}

/// `paperName` with the older `paper` spelling as a fallback.
fn paper_name(req: &Request) -> Option<String> {
    ["paperName", "paper"]
        .iter()
        .filter_map(|k| req.params.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn handle_marks_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let mut missing: Vec<&str> = Vec::new();
    let subject = req
        .params
        .get("subject")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if subject.is_none() {
        missing.push("subject");
    }
    let paper = paper_name(req);
    if paper.is_none() {
        missing.push("paperName");
    }
    let date = req
        .params
        .get("date")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if date.is_none() {
        missing.push("date");
    }

    let mut scores = [None, None, None, None];
    for (slot, key) in scores.iter_mut().zip(["mcq", "seq", "essay", "total"]) {
        match optional_score(req, key) {
            Ok(v) => *slot = v,
            Err(e) => return e,
        }
    }
    let [mcq, seq, essay, total] = scores;
    let total = total.or_else(|| {
        if mcq.is_none() && seq.is_none() && essay.is_none() {
            None
        } else {
            Some(mcq.unwrap_or(0.0) + seq.unwrap_or(0.0) + essay.unwrap_or(0.0))
        }
    });
    if total.is_none() {
        missing.push("total");
    }

    let (Some(subject), Some(paper_name), Some(date), Some(total)) = (subject, paper, date, total)
    else {
        return err(
            &req.id,
            "bad_params",
            format!("missing required fields: {}", missing.join(", ")),
            Some(json!({ "missing": missing })),
        );
    };

    let entry = MarkEntry {
        id: new_id(),
        subject,
        paper_name,
        date,
        mcq,
        seq,
        essay,
        total,
        timestamp: now_millis(),
    };

    let mut marks: Vec<MarkEntry> = match store::load_list(store, keys::MARKS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    marks.push(entry.clone());
    if let Err(e) = store::set_json(store, keys::MARKS, &marks) {
        return storage_err(req, "db_update_failed", e);
    }

    let grade = match grade_scale(store) {
        Ok(scale) => scale.grade(entry.total, 100.0),
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    info!(id = %entry.id, subject = %entry.subject, total = entry.total, "mark added");
    ok(
        &req.id,
        json!({
            "mark": entry,
            "grade": grade,
            "totalMismatch": !entry.total_matches_components(),
        }),
    )
}

fn handle_marks_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(id) = req.params.get("id").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing id", None);
    };

    let mut marks: Vec<MarkEntry> = match store::load_list(store, keys::MARKS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let before = marks.len();
    marks.retain(|m| m.id != id);
    let removed = marks.len() != before;
    if removed {
        if let Err(e) = store::set_json(store, keys::MARKS, &marks) {
            return storage_err(req, "db_update_failed", e);
        }
        info!(id, "mark deleted");
    }
    ok(&req.id, json!({ "removed": removed, "remaining": marks.len() }))
}

fn handle_marks_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let marks: Vec<MarkEntry> = match store::load_list(store, keys::MARKS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    if let Err(e) = store.remove(keys::MARKS) {
        return storage_err(req, "db_update_failed", e);
    }
    info!(removed = marks.len(), "marks cleared");
    ok(&req.id, json!({ "removed": marks.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.list" => Some(handle_marks_list(state, req)),
        "marks.add" => Some(handle_marks_add(state, req)),
        "marks.delete" => Some(handle_marks_delete(state, req)),
        "marks.clear" => Some(handle_marks_clear(state, req)),
        _ => None,
    }
}
