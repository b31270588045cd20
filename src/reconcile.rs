//! Turns a submission of desired statuses for one date into batched creates and
//! updates against the attendance table.
//!
//! The write is not transactional: batches that succeed stay committed even when
//! a sibling batch fails, and the caller gets a [`FanOutReport`] describing both.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    date_formula, format_date, AttendanceRecord, SelectionEntry, FIELD_DATE,
    FIELD_PARTICIPANT_ID, FIELD_PARTICIPANT_NAME, FIELD_STATUS, FIELD_TIMESTAMP,
};
use crate::remote::{NewRecord, RecordPatch, RemoteApiError, TableBackend, MAX_BATCH};

pub const BATCH_SIZE: usize = MAX_BATCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchKind {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBatch {
    pub kind: BatchKind,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<FailedBatch>,
}

impl FanOutReport {
    pub fn succeeded(&self) -> usize {
        self.created + self.updated
    }

    pub fn attempted(&self) -> usize {
        self.succeeded() + self.failed.iter().map(|b| b.size).sum::<usize>()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "saved {} of {} attendance records; {} batch(es) failed",
    .report.succeeded(),
    .report.attempted(),
    .report.failed.len()
)]
pub struct RemoteWriteError {
    pub report: FanOutReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to read existing attendance: {0}")]
    RemoteApi(#[from] RemoteApiError),
    #[error(transparent)]
    RemoteWrite(#[from] RemoteWriteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
}

/// Creates and updates to issue for one date, already de-duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub date: NaiveDate,
    pub creates: Vec<NewRecord>,
    pub updates: Vec<RecordPatch>,
}

enum Batch {
    Create(Vec<NewRecord>),
    Update(Vec<RecordPatch>),
}

/// Checks the submission is non-empty and names exactly one date.
pub fn validate_submission(entries: &[SelectionEntry]) -> Result<NaiveDate, ReconcileError> {
    let Some(first) = entries.first() else {
        return Err(ReconcileError::Validation(
            "at least one attendance entry is required".to_string(),
        ));
    };
    let Some(date) = first.date else {
        return Err(ReconcileError::Validation(
            "Date is required for attendance".to_string(),
        ));
    };
    for entry in entries {
        match entry.date {
            None => {
                return Err(ReconcileError::Validation(format!(
                    "Date is required for attendance (participant {})",
                    entry.participant_id
                )))
            }
            Some(d) if d != date => {
                return Err(ReconcileError::Validation(format!(
                    "all entries must share one date: found {} and {}",
                    format_date(date),
                    format_date(d)
                )))
            }
            Some(_) => {}
        }
    }
    Ok(date)
}

/// Later entries for the same participant replace earlier ones in place.
fn dedupe_last_wins(entries: &[SelectionEntry]) -> Vec<&SelectionEntry> {
    let mut out: Vec<&SelectionEntry> = Vec::with_capacity(entries.len());
    let mut index: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        match index.get(entry.participant_id.as_str()) {
            Some(&i) => out[i] = entry,
            None => {
                index.insert(entry.participant_id.as_str(), out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// Participant id to existing record id. When the table holds more than one
/// row for a participant on this date, the last one returned is used.
fn existing_by_participant(existing: &[AttendanceRecord]) -> HashMap<&str, &str> {
    let mut map: HashMap<&str, &str> = HashMap::new();
    for record in existing {
        if let Some(prev) = map.insert(record.participant_id.as_str(), record.id.as_str()) {
            warn!(
                participant_id = %record.participant_id,
                kept = %record.id,
                ignored = %prev,
                "duplicate attendance rows for one participant and date"
            );
        }
    }
    map
}

pub fn plan_writes(
    date: NaiveDate,
    entries: &[SelectionEntry],
    existing: &[AttendanceRecord],
    now: DateTime<Utc>,
) -> WritePlan {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let lookup = existing_by_participant(existing);
    let mut creates = Vec::new();
    let mut updates = Vec::new();

    for entry in dedupe_last_wins(entries) {
        match lookup.get(entry.participant_id.as_str()) {
            Some(record_id) => {
                let mut fields = Map::new();
                fields.insert(FIELD_STATUS.to_string(), json!(entry.status.as_str()));
                fields.insert(FIELD_TIMESTAMP.to_string(), json!(timestamp));
                updates.push(RecordPatch {
                    id: record_id.to_string(),
                    fields,
                });
            }
            None => {
                let mut fields = Map::new();
                fields.insert(
                    FIELD_PARTICIPANT_ID.to_string(),
                    Value::String(entry.participant_id.clone()),
                );
                fields.insert(
                    FIELD_PARTICIPANT_NAME.to_string(),
                    Value::String(entry.participant_name.clone()),
                );
                fields.insert(FIELD_DATE.to_string(), json!(format_date(date)));
                fields.insert(FIELD_STATUS.to_string(), json!(entry.status.as_str()));
                fields.insert(FIELD_TIMESTAMP.to_string(), json!(timestamp));
                creates.push(NewRecord { fields });
            }
        }
    }

    WritePlan {
        date,
        creates,
        updates,
    }
}

impl WritePlan {
    fn into_batches(self) -> Vec<Batch> {
        let mut batches = Vec::new();
        batches.extend(self.updates.chunks(BATCH_SIZE).map(|c| Batch::Update(c.to_vec())));
        batches.extend(self.creates.chunks(BATCH_SIZE).map(|c| Batch::Create(c.to_vec())));
        batches
    }
}

async fn run_batch(
    backend: &dyn TableBackend,
    table: &str,
    batch: Batch,
) -> (BatchKind, usize, Result<(), RemoteApiError>) {
    match batch {
        Batch::Create(records) => {
            let size = records.len();
            let res = backend.create_batch(table, records).await.map(|_| ());
            (BatchKind::Create, size, res)
        }
        Batch::Update(records) => {
            let size = records.len();
            let res = backend.update_batch(table, records).await.map(|_| ());
            (BatchKind::Update, size, res)
        }
    }
}

/// Issues every batch at once and waits for all of them to settle.
pub async fn fan_out(backend: &dyn TableBackend, table: &str, plan: WritePlan) -> FanOutReport {
    let results = join_all(
        plan.into_batches()
            .into_iter()
            .map(|batch| run_batch(backend, table, batch)),
    )
    .await;

    let mut report = FanOutReport::default();
    for (kind, size, res) in results {
        match (res, kind) {
            (Ok(()), BatchKind::Create) => report.created += size,
            (Ok(()), BatchKind::Update) => report.updated += size,
            (Err(e), _) => {
                warn!(?kind, size, error = %e, "attendance batch failed");
                report.failed.push(FailedBatch {
                    kind,
                    size,
                    status: e.status(),
                    message: e.to_string(),
                });
            }
        }
    }
    report
}

pub async fn reconcile(
    backend: &dyn TableBackend,
    table: &str,
    entries: &[SelectionEntry],
) -> Result<ReconcileOutcome, ReconcileError> {
    reconcile_at(backend, table, entries, Utc::now()).await
}

pub async fn reconcile_at(
    backend: &dyn TableBackend,
    table: &str,
    entries: &[SelectionEntry],
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let date = validate_submission(entries)?;

    let existing: Vec<AttendanceRecord> = backend
        .list_filtered(table, &date_formula(date))
        .await?
        .iter()
        .filter_map(AttendanceRecord::from_record)
        .collect();

    let plan = plan_writes(date, entries, &existing, now);
    let report = fan_out(backend, table, plan).await;
    if !report.is_complete() {
        return Err(RemoteWriteError { report }.into());
    }

    info!(
        date = %format_date(date),
        created = report.created,
        updated = report.updated,
        "attendance saved"
    );
    Ok(ReconcileOutcome {
        created: report.created,
        updated: report.updated,
    })
}
