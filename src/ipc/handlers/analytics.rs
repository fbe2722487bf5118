use crate::calc::{self, MarkFilters};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grade_scale;
use crate::ipc::helpers::{calc_err, storage_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::MarkEntry;
use crate::store::{self, keys, Storage};
use serde_json::json;

fn load_inputs<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a dyn Storage, MarkFilters, Vec<MarkEntry>), serde_json::Value> {
    let store = store_ref(state, req)?;
    let filters =
        calc::parse_mark_filters(req.params.get("filters")).map_err(|e| calc_err(req, e))?;
    let marks = store::load_list(store, keys::MARKS)
        .map_err(|e| storage_err(req, "db_query_failed", e))?;
    Ok((store, filters, marks))
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, filters, marks) = match load_inputs(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scale = match grade_scale(store) {
        Ok(s) => s,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let summary = calc::summarize(&marks, &filters, &scale);
    ok(&req.id, json!({ "summary": summary, "scale": scale }))
}

fn handle_dispersion(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (_, filters, marks) = match load_inputs(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "dispersion": calc::dispersion(&marks, &filters) }),
    )
}

fn handle_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(score) = req.params.get("score").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "score must be a number", None);
    };
    let max = match req.params.get("max") {
        None => 100.0,
        Some(v) if v.is_null() => 100.0,
        Some(v) => match v.as_f64() {
            Some(n) => n,
            None => return err(&req.id, "bad_params", "max must be a number", None),
        },
    };
    let scale = match grade_scale(store) {
        Ok(s) => s,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let percent = if max > 0.0 {
        Some(calc::round_off_1_decimal(100.0 * score / max))
    } else {
        None
    };
    ok(
        &req.id,
        json!({
            "grade": scale.grade(score, max),
            "percent": percent,
            "scale": scale.kind,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.summary" => Some(handle_summary(state, req)),
        "analytics.dispersion" => Some(handle_dispersion(state, req)),
        "analytics.grade" => Some(handle_grade(state, req)),
        _ => None,
    }
}
