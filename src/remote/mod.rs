//! Record-table backend access.
//!
//! Tables are addressed by name and hold `{id, fields}` records. Writes go out in
//! `{"records": [...]}` envelopes of at most [`MAX_BATCH`] records per call.

mod fake;
mod http;

pub use fake::{FakeCall, FakeTable};
pub use http::HttpTableClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Per-call record limit for create and update requests.
pub const MAX_BATCH: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteApiError {
    #[error("table api returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("table api request failed: {0}")]
    Transport(String),
    #[error("table api response could not be decoded: {0}")]
    Decode(String),
    #[error("batch of {len} records exceeds the limit of {max}", max = MAX_BATCH)]
    BatchTooLarge { len: usize },
}

impl RemoteApiError {
    /// HTTP status for errors the backend actually answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn list_all(&self, table: &str) -> Result<Vec<RemoteRecord>, RemoteApiError>;

    async fn list_filtered(
        &self,
        table: &str,
        formula: &str,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError>;

    async fn create_batch(
        &self,
        table: &str,
        records: Vec<NewRecord>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError>;

    async fn update_batch(
        &self,
        table: &str,
        records: Vec<RecordPatch>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError>;

    async fn delete_one(&self, table: &str, id: &str) -> Result<(), RemoteApiError>;
}

pub(crate) fn check_batch_len(len: usize) -> Result<(), RemoteApiError> {
    if len > MAX_BATCH {
        return Err(RemoteApiError::BatchTooLarge { len });
    }
    Ok(())
}
