use crate::controller::{SubmissionSummary, UiEvent, ViewUpdate};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_date, AttendanceStatus};
use chrono::NaiveDate;
use serde_json::json;

const LAST_SUBMISSION_KEY: &str = "last_submission";

const METHODS: &[&str] = &[
    "attendance.open",
    "attendance.view",
    "attendance.setDate",
    "attendance.toggle",
    "attendance.markAll",
    "attendance.submit",
    "attendance.deleteRecord",
    "attendance.lastSubmission",
];

fn get_required_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

fn parse_date_param(raw: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(raw).ok_or_else(|| HandlerErr::bad_params("date must be YYYY-MM-DD"))
}

fn get_optional_date(params: &serde_json::Value) -> Result<Option<NaiveDate>, HandlerErr> {
    match params.get("date") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params("date must be a string or null"));
            };
            parse_date_param(s).map(Some)
        }
    }
}

fn get_status(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, "status")?;
    AttendanceStatus::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be Present or Absent"))
}

fn require_auth(state: &AppState) -> Result<(), HandlerErr> {
    if state.sessions.is_valid(state.store.as_ref()) {
        return Ok(());
    }
    Err(HandlerErr::new(
        "unauthenticated",
        "session missing or expired; log in again",
    ))
}

fn require_loaded(state: &AppState) -> Result<(), HandlerErr> {
    if state.view.is_loaded() {
        return Ok(());
    }
    Err(HandlerErr::new(
        "not_loaded",
        "open the attendance view first",
    ))
}

async fn dispatch(state: &mut AppState, event: UiEvent) -> Result<ViewUpdate, HandlerErr> {
    let AppState { backend, view, .. } = state;
    Ok(view.dispatch(&**backend, event).await?)
}

async fn attendance_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_optional_date(params)?;
    let update = dispatch(state, UiEvent::Load { date }).await?;
    Ok(json!({ "view": update.snapshot }))
}

async fn attendance_set_date(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_loaded(state)?;
    let date = parse_date_param(get_required_str(params, "date")?)?;
    let update = dispatch(state, UiEvent::ChangeDate(date)).await?;
    Ok(json!({ "view": update.snapshot }))
}

async fn attendance_toggle(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_loaded(state)?;
    let participant_id = get_required_str(params, "participantId")?.to_string();
    let status = get_status(params)?;
    let update = dispatch(
        state,
        UiEvent::Toggle {
            participant_id,
            status,
        },
    )
    .await?;
    Ok(json!({ "view": update.snapshot }))
}

async fn attendance_mark_all(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_loaded(state)?;
    let status = get_status(params)?;
    let update = dispatch(state, UiEvent::MarkAll(status)).await?;
    Ok(json!({ "view": update.snapshot }))
}

async fn attendance_submit(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    require_loaded(state)?;
    let update = dispatch(state, UiEvent::Submit).await?;
    let Some(summary) = update.submitted else {
        return Err(HandlerErr::new("internal", "submit produced no summary"));
    };
    let encoded = serde_json::to_string(&summary)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    state.store.set(LAST_SUBMISSION_KEY, &encoded)?;
    Ok(json!({
        "created": summary.created,
        "updated": summary.updated,
        "summary": summary,
        "view": update.snapshot
    }))
}

async fn attendance_delete_record(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    state
        .backend
        .delete_one(&state.config.attendance_table, record_id)
        .await?;
    Ok(json!({ "deleted": record_id }))
}

fn attendance_last_submission(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let summary: Option<SubmissionSummary> = state
        .store
        .get(LAST_SUBMISSION_KEY)?
        .and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(json!({ "summary": summary }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let method = req.method.as_str();
    if !METHODS.contains(&method) {
        return None;
    }
    let result = match require_auth(state) {
        Err(e) => Err(e),
        Ok(()) => match method {
            "attendance.open" => attendance_open(state, &req.params).await,
            "attendance.view" => Ok(json!({ "view": state.view.snapshot() })),
            "attendance.setDate" => attendance_set_date(state, &req.params).await,
            "attendance.toggle" => attendance_toggle(state, &req.params).await,
            "attendance.markAll" => attendance_mark_all(state, &req.params).await,
            "attendance.submit" => attendance_submit(state).await,
            "attendance.deleteRecord" => attendance_delete_record(state, &req.params).await,
            "attendance.lastSubmission" => attendance_last_submission(state),
            _ => return None,
        },
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
