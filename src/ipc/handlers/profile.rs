use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{storage_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::Profile;
use crate::store::{self, keys};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};
use tracing::info;

const MAX_AVATAR_BYTES: usize = 512 * 1024;

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Avatars are stored as `data:image/<type>;base64,<payload>` URLs.
fn validate_avatar(raw: &str) -> Result<String, String> {
    let Some(rest) = raw.strip_prefix("data:image/") else {
        return Err("avatar must be a data:image/... URL".into());
    };
    let Some((_, payload)) = rest.split_once(";base64,") else {
        return Err("avatar must be base64 encoded".into());
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("avatar is not valid base64: {e}"))?;
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(format!("avatar must be <= {} bytes", MAX_AVATAR_BYTES));
    }
    Ok(raw.to_string())
}

fn apply_patch(profile: &mut Profile, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "name" => profile.name = parse_string_max(v, k, 80)?,
            "school" => profile.school = parse_string_max(v, k, 120)?,
            "notes" => profile.notes = parse_string_max(v, k, 2000)?,
            "age" => {
                profile.age = if v.is_null() {
                    None
                } else {
                    let n = v.as_u64().ok_or_else(|| "age must be integer".to_string())?;
                    if !(10..=99).contains(&n) {
                        return Err("age must be in 10..=99".into());
                    }
                    Some(n as u32)
                };
            }
            "avatar" => {
                profile.avatar = if v.is_null() {
                    None
                } else {
                    let s = v.as_str().ok_or_else(|| "avatar must be string".to_string())?;
                    Some(validate_avatar(s)?)
                };
            }
            _ => return Err(format!("unknown profile field: {}", k)),
        }
    }
    Ok(())
}

fn handle_profile_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store::load_or_default::<Profile>(store, keys::PROFILE) {
        Ok(p) => ok(&req.id, json!({ "profile": p })),
        Err(e) => storage_err(req, "db_query_failed", e),
    }
}

fn handle_profile_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let mut profile: Profile = match store::load_or_default(store, keys::PROFILE) {
        Ok(p) => p,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    if let Err(msg) = apply_patch(&mut profile, patch) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = store::set_json(store, keys::PROFILE, &profile) {
        return storage_err(req, "db_update_failed", e);
    }
    info!(fields = patch.len(), "profile updated");
    ok(&req.id, json!({ "profile": profile }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.get" => Some(handle_profile_get(state, req)),
        "profile.update" => Some(handle_profile_update(state, req)),
        _ => None,
    }
}
