use serde::Serialize;
use serde_json::json;

use crate::controller::ControllerError;
use crate::reconcile::ReconcileError;
use crate::remote::RemoteApiError;
use crate::session::SessionError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
struct OkResp<'a> {
    id: &'a str,
    ok: bool,
    result: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ErrObj {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrResp<'a> {
    id: &'a str,
    ok: bool,
    error: ErrObj,
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!(OkResp {
        id,
        ok: true,
        result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    json!(ErrResp {
        id,
        ok: false,
        error: ErrObj {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    })
}

/// Failure of one handler, rendered into an error response at the edge.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<RemoteApiError> for HandlerErr {
    fn from(e: RemoteApiError) -> Self {
        let details = e.status().map(|s| json!({ "status": s }));
        Self {
            code: "remote_api_failed",
            message: e.to_string(),
            details,
        }
    }
}

impl From<ReconcileError> for HandlerErr {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Validation(msg) => Self::new("validation_failed", msg),
            ReconcileError::RemoteApi(api) => api.into(),
            ReconcileError::RemoteWrite(write) => Self {
                code: "remote_write_failed",
                message: write.to_string(),
                details: Some(json!({ "report": write.report })),
            },
        }
    }
}

impl From<ControllerError> for HandlerErr {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::Validation(msg) => Self::new("validation_failed", msg),
            ControllerError::NoParticipants => {
                Self::new("no_participants", ControllerError::NoParticipants.to_string())
            }
            ControllerError::Remote(api) => api.into(),
            ControllerError::Reconcile(r) => r.into(),
        }
    }
}

impl From<SessionError> for HandlerErr {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials => Self::new(
                "invalid_credentials",
                SessionError::InvalidCredentials.to_string(),
            ),
            other => Self::new("store_failed", other.to_string()),
        }
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        Self::new("store_failed", e.to_string())
    }
}
