use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    now_millis, optional_date, optional_str, required_str, storage_err, store_ref,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, Todo};
use crate::store::{self, keys};
use serde_json::json;

fn handle_todos_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let mut todos: Vec<Todo> = match store::load_list(store, keys::TODOS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    // Open items first, then by due date (undated last), then oldest first.
    todos.sort_by(|a, b| {
        a.done
            .cmp(&b.done)
            .then_with(|| match (&a.due_date, &b.due_date) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    let open = todos.iter().filter(|t| !t.done).count();
    ok(&req.id, json!({ "todos": todos, "openCount": open }))
}

fn handle_todos_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let text = match required_str(req, "text") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match optional_str(req, "subject", 80) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let due_date = match optional_date(req, "dueDate") {
        Ok(v) => v.map(|d| d.format("%Y-%m-%d").to_string()),
        Err(e) => return e,
    };

    let todo = Todo {
        id: new_id(),
        text,
        subject,
        due_date,
        done: false,
        created_at: now_millis(),
    };
    let mut todos: Vec<Todo> = match store::load_list(store, keys::TODOS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    todos.push(todo.clone());
    if let Err(e) = store::set_json(store, keys::TODOS, &todos) {
        return storage_err(req, "db_update_failed", e);
    }
    ok(&req.id, json!({ "todo": todo }))
}

fn handle_todos_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut todos: Vec<Todo> = match store::load_list(store, keys::TODOS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let Some(todo) = todos.iter_mut().find(|t| t.id == id) else {
        return err(&req.id, "not_found", "todo not found", None);
    };
    todo.done = match req.params.get("done").and_then(|v| v.as_bool()) {
        Some(v) => v,
        None => !todo.done,
    };
    let updated = todo.clone();
    if let Err(e) = store::set_json(store, keys::TODOS, &todos) {
        return storage_err(req, "db_update_failed", e);
    }
    ok(&req.id, json!({ "todo": updated }))
}

fn handle_todos_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut todos: Vec<Todo> = match store::load_list(store, keys::TODOS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    let before = todos.len();
    todos.retain(|t| t.id != id);
    let removed = todos.len() != before;
    if removed {
        if let Err(e) = store::set_json(store, keys::TODOS, &todos) {
            return storage_err(req, "db_update_failed", e);
        }
    }
    ok(&req.id, json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "todos.list" => Some(handle_todos_list(state, req)),
        "todos.create" => Some(handle_todos_create(state, req)),
        "todos.toggle" => Some(handle_todos_toggle(state, req)),
        "todos.delete" => Some(handle_todos_delete(state, req)),
        _ => None,
    }
}
