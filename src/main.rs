mod achievements;
mod backup;
mod calc;
mod db;
mod exchange;
mod grading;
mod ipc;
mod logging;
mod model;
mod store;

use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

fn main() {
    if let Err(e) = logging::init_logging() {
        eprintln!("marksyd: {e}");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "marksyd started");

    let mut state = ipc::AppState {
        workspace: None,
        store: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "request is not valid JSON");
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed; marksyd exiting");
}
