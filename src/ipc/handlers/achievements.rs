use crate::achievements::{self, AchievementInputs};
use crate::ipc::error::ok;
use crate::ipc::helpers::{storage_err, store_ref, today};
use crate::ipc::types::{AppState, Request};
use crate::model::MarkEntry;
use crate::store::{self, keys};
use serde_json::json;

fn handle_achievements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let marks: Vec<MarkEntry> = match store::load_list(store, keys::MARKS) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };

    let inputs = AchievementInputs::from_entries(&marks);
    let list = achievements::evaluate(&marks);
    let unlocked = list.iter().filter(|a| a.unlocked).count();
    ok(
        &req.id,
        json!({
            "achievements": list,
            "unlockedCount": unlocked,
            "totalCount": list.len(),
            "inputs": inputs,
            "currentStreak": achievements::current_streak(&marks, today()),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "achievements.list" => Some(handle_achievements_list(state, req)),
        _ => None,
    }
}
