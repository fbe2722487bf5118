use crate::exchange::DEFAULT_WATERMARK;
use crate::grading::{GradeScale, ScaleKind};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::store_ref;
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Storage};
use serde_json::{json, Map, Value};
use tracing::warn;

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Study,
    Display,
    Export,
}

impl SetupSection {
    const ALL: [SetupSection; 4] = [Self::Grading, Self::Study, Self::Display, Self::Export];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "study" => Some(Self::Study),
            "display" => Some(Self::Display),
            "export" => Some(Self::Export),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Study => "study",
            Self::Display => "display",
            Self::Export => "export",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Study => "setup.study",
            Self::Display => "setup.display",
            Self::Export => "setup.export",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "scale": "standard"
        }),
        SetupSection::Study => json!({
            "dailyGoalMinutes": 120
        }),
        SetupSection::Display => json!({
            "theme": "system",
            "language": "en"
        }),
        SetupSection::Export => json!({
            "watermark": DEFAULT_WATERMARK
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_one_of(v: &Value, key: &str, allowed: &[&str]) -> Result<String, String> {
    let s = parse_string_max(v, key, 16)?.to_ascii_lowercase();
    if !allowed.contains(&s.as_str()) {
        return Err(format!("{} must be one of: {}", key, allowed.join(", ")));
    }
    Ok(s)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "scale" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(kind) = ScaleKind::parse(&s) else {
                        return Err("scale must be one of: standard, extended".into());
                    };
                    obj.insert(k.clone(), Value::String(kind.as_str().to_string()));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Study => match k.as_str() {
                "dailyGoalMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 15, 960)?));
                }
                _ => return Err(format!("unknown study field: {}", k)),
            },
            SetupSection::Display => match k.as_str() {
                "theme" => {
                    let s = parse_one_of(v, k, &["light", "dark", "system"])?;
                    obj.insert(k.clone(), Value::String(s));
                }
                "language" => {
                    let s = parse_one_of(v, k, &["en", "si", "ta"])?;
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown display field: {}", k)),
            },
            SetupSection::Export => match k.as_str() {
                "watermark" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                _ => return Err(format!("unknown export field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(store: &dyn Storage, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    // A corrupt saved value must not block reads; defaults win.
    let saved: Option<Value> = match store::get_json(store, section.key()) {
        Ok(v) => v,
        Err(e) => {
            warn!(key = section.key(), error = %e, "ignoring malformed settings");
            None
        }
    };
    let Some(saved_obj) = saved.as_ref().and_then(|v| v.as_object()) else {
        return Ok(current);
    };
    // Fields are applied one at a time so a bad field keeps its default only.
    for (k, v) in saved_obj {
        let single = Map::from_iter([(k.clone(), v.clone())]);
        if let Err(msg) = merge_section_patch(section, &mut current, &single) {
            warn!(key = section.key(), field = %k, error = %msg, "ignoring invalid saved setting");
        }
    }
    Ok(current)
}

pub fn grade_scale(store: &dyn Storage) -> anyhow::Result<GradeScale> {
    let grading = load_section(store, SetupSection::Grading)?;
    let kind = grading
        .get("scale")
        .and_then(|v| v.as_str())
        .and_then(ScaleKind::parse)
        .unwrap_or_default();
    Ok(GradeScale::for_kind(kind))
}

pub fn daily_goal_minutes(store: &dyn Storage) -> anyhow::Result<i64> {
    let study = load_section(store, SetupSection::Study)?;
    Ok(study
        .get("dailyGoalMinutes")
        .and_then(|v| v.as_i64())
        .unwrap_or(120))
}

pub fn export_watermark(store: &dyn Storage) -> anyhow::Result<String> {
    let export = load_section(store, SetupSection::Export)?;
    Ok(export
        .get("watermark")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_WATERMARK)
        .to_string())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(store, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(store, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = store::set_json(store, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "section": section.name(), "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn invalid_saved_field_falls_back_without_dropping_the_rest() {
        let store = MemoryStore::new();
        store::set_json(&store, "setup.display", &json!({ "theme": "neon", "language": "si" }))
            .expect("seed");
        let display = load_section(&store, SetupSection::Display).expect("load");
        assert_eq!(display["theme"], "system");
        assert_eq!(display["language"], "si");
    }

    #[test]
    fn unknown_saved_field_is_ignored() {
        let store = MemoryStore::new();
        store::set_json(&store, "setup.study", &json!({ "dailyGoalMinutes": 90, "legacy": true }))
            .expect("seed");
        assert_eq!(daily_goal_minutes(&store).expect("goal"), 90);
    }
}
