use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde_json::json;
use tracing::info;

fn get_required_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

fn session_login(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?.trim();
    let password = get_required_str(params, "password")?;
    let session = state.sessions.login(
        state.store.as_ref(),
        &state.config.credentials,
        username,
        password,
    )?;
    info!(username = %session.username, "logged in");
    Ok(json!({ "session": session }))
}

fn session_status(state: &mut AppState) -> serde_json::Value {
    let session = state
        .sessions
        .valid_session_at(state.store.as_ref(), Utc::now());
    json!({
        "authenticated": session.is_some(),
        "session": session,
    })
}

fn session_logout(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    state.sessions.destroy(state.store.as_ref())?;
    state.view.reset();
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.login" => session_login(state, &req.params),
        "session.status" => Ok(session_status(state)),
        "session.logout" => session_logout(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
