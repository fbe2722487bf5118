use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::Storage;
use chrono::NaiveDate;
use serde_json::Value;

pub fn store_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a dyn Storage, Value> {
    state
        .store
        .as_deref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Non-empty, trimmed string parameter.
pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    let Some(raw) = req.params.get(key).and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    let t = raw.trim();
    if t.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(t.to_string())
}

/// Absent, null and blank all read as `None`.
pub fn optional_str(req: &Request, key: &str, max_len: usize) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a string", key),
                    None,
                ));
            };
            let t = s.trim();
            if t.len() > max_len {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{} length must be <= {}", key, max_len),
                    None,
                ));
            }
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn optional_score(req: &Request, key: &str) -> Result<Option<f64>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let n = v.as_f64().filter(|n| n.is_finite() && *n >= 0.0).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a non-negative number", key),
                    None,
                )
            })?;
            Ok(Some(n))
        }
    }
}

pub fn optional_date(req: &Request, key: &str) -> Result<Option<NaiveDate>, Value> {
    match optional_str(req, key, 32)? {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be YYYY-MM-DD", key),
                    None,
                )
            }),
    }
}

pub fn calc_err(req: &Request, e: CalcError) -> Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn storage_err(req: &Request, code: &str, e: anyhow::Error) -> Value {
    err(&req.id, code, format!("{e:#}"), None)
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
