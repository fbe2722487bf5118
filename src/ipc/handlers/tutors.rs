use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str, storage_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::{default_tutor_color, new_id, Tutor, MAX_TUTORS};
use crate::store::{self, keys};
use serde_json::json;

fn is_hex_color(s: &str) -> bool {
    let Some(hex) = s.strip_prefix('#') else {
        return false;
    };
    (hex.len() == 6 || hex.len() == 3) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn handle_tutors_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store::load_list::<Tutor>(store, keys::TUTORS) {
        Ok(tutors) => ok(&req.id, json!({ "tutors": tutors, "limit": MAX_TUTORS })),
        Err(e) => storage_err(req, "db_query_failed", e),
    }
}

fn handle_tutors_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let contact = match optional_str(req, "contact", 120) {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let color = match optional_str(req, "color", 7) {
        Ok(Some(c)) if is_hex_color(&c) => c,
        Ok(Some(_)) => {
            return err(&req.id, "bad_params", "color must be a #rgb or #rrggbb hex value", None)
        }
        Ok(None) => default_tutor_color(),
        Err(e) => return e,
    };

    let mut tutors: Vec<Tutor> = match store::load_list(store, keys::TUTORS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    if tutors.len() >= MAX_TUTORS {
        return err(
            &req.id,
            "limit_reached",
            format!("at most {} tutors can be saved", MAX_TUTORS),
            Some(json!({ "limit": MAX_TUTORS })),
        );
    }
    let tutor = Tutor {
        id: new_id(),
        name,
        contact,
        color,
    };
    tutors.push(tutor.clone());
    if let Err(e) = store::set_json(store, keys::TUTORS, &tutors) {
        return storage_err(req, "db_update_failed", e);
    }
    ok(&req.id, json!({ "tutor": tutor }))
}

fn handle_tutors_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut tutors: Vec<Tutor> = match store::load_list(store, keys::TUTORS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let before = tutors.len();
    tutors.retain(|t| t.id != id);
    let removed = tutors.len() != before;
    if removed {
        if let Err(e) = store::set_json(store, keys::TUTORS, &tutors) {
            return storage_err(req, "db_update_failed", e);
        }
    }
    ok(&req.id, json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tutors.list" => Some(handle_tutors_list(state, req)),
        "tutors.create" => Some(handle_tutors_create(state, req)),
        "tutors.delete" => Some(handle_tutors_delete(state, req)),
        _ => None,
    }
}
