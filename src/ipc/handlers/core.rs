use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::model::format_date;
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "programName": state.config.program_name,
            "startDate": format_date(state.config.start_date),
            "workspacePath": state.config.workspace.to_string_lossy(),
            "authenticated": state.sessions.is_valid(state.store.as_ref()),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        _ => None,
    }
}
