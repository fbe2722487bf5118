use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, storage_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::{CustomSubject, Stream, SubjectView, SUBJECT_CATALOG};
use crate::store::{self, keys, Storage};
use serde_json::json;
use tracing::info;

fn load_lists(store: &dyn Storage) -> anyhow::Result<(Vec<CustomSubject>, Vec<String>)> {
    let custom = store::load_list(store, keys::CUSTOM_SUBJECTS)?;
    let favorites = store::load_list(store, keys::FAVORITE_SUBJECTS)?;
    Ok((custom, favorites))
}

fn is_known(name: &str, custom: &[CustomSubject]) -> bool {
    SUBJECT_CATALOG
        .iter()
        .any(|(n, _)| n.eq_ignore_ascii_case(name))
        || custom.iter().any(|c| c.name.eq_ignore_ascii_case(name))
}

fn build_views(custom: &[CustomSubject], favorites: &[String]) -> Vec<SubjectView> {
    let is_fav = |name: &str| favorites.iter().any(|f| f.eq_ignore_ascii_case(name));
    let mut out: Vec<SubjectView> = SUBJECT_CATALOG
        .iter()
        .map(|(name, stream)| SubjectView {
            name: name.to_string(),
            stream: *stream,
            custom: false,
            favorite: is_fav(name),
        })
        .collect();
    out.extend(custom.iter().map(|c| SubjectView {
        name: c.name.clone(),
        stream: c.stream,
        custom: true,
        favorite: is_fav(&c.name),
    }));
    // Favorites float to the top; otherwise catalog order is kept.
    out.sort_by_key(|s| !s.favorite);
    out
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let (custom, favorites) = match load_lists(store) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let stream_filter = req
        .params
        .get("stream")
        .and_then(|v| v.as_str())
        .and_then(Stream::parse);
    let subjects: Vec<SubjectView> = build_views(&custom, &favorites)
        .into_iter()
        .filter(|s| stream_filter.map(|f| s.stream == f).unwrap_or(true))
        .collect();
    ok(&req.id, json!({ "subjects": subjects }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if name.chars().count() > 80 {
        return err(&req.id, "bad_params", "name length must be <= 80", None);
    }
    let stream = match req.params.get("stream").and_then(|v| v.as_str()) {
        None => Stream::Other,
        Some(s) => match Stream::parse(s) {
            Some(v) => v,
            None => return err(&req.id, "bad_params", "unknown stream", None),
        },
    };

    let (mut custom, _) = match load_lists(store) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    if is_known(&name, &custom) {
        return err(
            &req.id,
            "duplicate",
            format!("subject already exists: {}", name),
            None,
        );
    }
    let subject = CustomSubject { name, stream };
    custom.push(subject.clone());
    if let Err(e) = store::set_json(store, keys::CUSTOM_SUBJECTS, &custom) {
        return storage_err(req, "db_update_failed", e);
    }
    info!(name = %subject.name, "custom subject added");
    ok(&req.id, json!({ "subject": subject }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (mut custom, mut favorites) = match load_lists(store) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let before = custom.len();
    custom.retain(|c| !c.name.eq_ignore_ascii_case(&name));
    if custom.len() == before {
        return err(&req.id, "not_found", "custom subject not found", None);
    }
    favorites.retain(|f| !f.eq_ignore_ascii_case(&name));
    let writes = match (serde_json::to_string(&custom), serde_json::to_string(&favorites)) {
        (Ok(c), Ok(f)) => vec![
            (keys::CUSTOM_SUBJECTS.to_string(), c),
            (keys::FAVORITE_SUBJECTS.to_string(), f),
        ],
        (Err(e), _) | (_, Err(e)) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if let Err(e) = store.set_many(&writes) {
        return storage_err(req, "db_update_failed", e);
    }
    ok(&req.id, json!({ "removed": true }))
}

fn handle_subjects_favorite(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(favorite) = req.params.get("favorite").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "favorite must be boolean", None);
    };
    let (custom, mut favorites) = match load_lists(store) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    if !is_known(&name, &custom) {
        return err(&req.id, "not_found", "subject not found", None);
    }
    favorites.retain(|f| !f.eq_ignore_ascii_case(&name));
    if favorite {
        favorites.push(name.clone());
    }
    if let Err(e) = store::set_json(store, keys::FAVORITE_SUBJECTS, &favorites) {
        return storage_err(req, "db_update_failed", e);
    }
    ok(
        &req.id,
        json!({ "name": name, "favorite": favorite, "favorites": favorites }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        "subjects.favorite" => Some(handle_subjects_favorite(state, req)),
        _ => None,
    }
}
