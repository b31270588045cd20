use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    check_batch_len, NewRecord, RecordPatch, RemoteApiError, RemoteRecord, TableBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    ListAll { table: String },
    ListFiltered { table: String, formula: String },
    Create { table: String, len: usize },
    Update { table: String, len: usize },
    Delete { table: String, id: String },
}

impl FakeCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::Update { .. } | Self::Delete { .. }
        )
    }
}

#[derive(Default)]
struct Failures {
    lists: Option<u16>,
    creates: Option<u16>,
    updates: Option<u16>,
}

/// In-memory record table. Understands `{Field} = 'value'` formulas only.
#[derive(Default)]
pub struct FakeTable {
    tables: Mutex<HashMap<String, Vec<RemoteRecord>>>,
    calls: Mutex<Vec<FakeCall>>,
    failures: Mutex<Failures>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn new_record_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("rec{}", &raw[..14])
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_equality_formula(formula: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = formula.split_once('=')?;
    let field = lhs.trim().strip_prefix('{')?.strip_suffix('}')?;
    let value = rhs.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some((field, value))
}

impl FakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record directly, bypassing call accounting. Returns its id.
    pub fn seed(&self, table: &str, fields: Value) -> String {
        let id = new_record_id();
        let record = RemoteRecord {
            id: id.clone(),
            fields: fields.as_object().cloned().unwrap_or_default(),
            created_time: Some(now_iso()),
        };
        guard(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(record);
        id
    }

    pub fn records(&self, table: &str) -> Vec<RemoteRecord> {
        guard(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        guard(&self.calls).clone()
    }

    pub fn write_calls(&self) -> Vec<FakeCall> {
        self.calls().into_iter().filter(FakeCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        guard(&self.calls).clear();
    }

    pub fn fail_lists_with(&self, status: u16) {
        guard(&self.failures).lists = Some(status);
    }

    pub fn fail_creates_with(&self, status: u16) {
        guard(&self.failures).creates = Some(status);
    }

    pub fn fail_updates_with(&self, status: u16) {
        guard(&self.failures).updates = Some(status);
    }

    fn record_call(&self, call: FakeCall) {
        guard(&self.calls).push(call);
    }

    fn injected(status: Option<u16>) -> Result<(), RemoteApiError> {
        match status {
            Some(status) => Err(RemoteApiError::Status {
                status,
                message: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TableBackend for FakeTable {
    async fn list_all(&self, table: &str) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        self.record_call(FakeCall::ListAll {
            table: table.to_string(),
        });
        Self::injected(guard(&self.failures).lists)?;
        Ok(self.records(table))
    }

    async fn list_filtered(
        &self,
        table: &str,
        formula: &str,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        self.record_call(FakeCall::ListFiltered {
            table: table.to_string(),
            formula: formula.to_string(),
        });
        Self::injected(guard(&self.failures).lists)?;
        let Some((field, value)) = parse_equality_formula(formula) else {
            return Err(RemoteApiError::Status {
                status: 422,
                message: format!("unsupported formula: {}", formula),
            });
        };
        Ok(self
            .records(table)
            .into_iter()
            .filter(|r| r.fields.get(field).and_then(|v| v.as_str()) == Some(value))
            .collect())
    }

    async fn create_batch(
        &self,
        table: &str,
        records: Vec<NewRecord>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        self.record_call(FakeCall::Create {
            table: table.to_string(),
            len: records.len(),
        });
        check_batch_len(records.len())?;
        Self::injected(guard(&self.failures).creates)?;
        let created: Vec<RemoteRecord> = records
            .into_iter()
            .map(|r| RemoteRecord {
                id: new_record_id(),
                fields: r.fields,
                created_time: Some(now_iso()),
            })
            .collect();
        guard(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn update_batch(
        &self,
        table: &str,
        records: Vec<RecordPatch>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        self.record_call(FakeCall::Update {
            table: table.to_string(),
            len: records.len(),
        });
        check_batch_len(records.len())?;
        Self::injected(guard(&self.failures).updates)?;
        let mut tables = guard(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::with_capacity(records.len());
        for patch in records {
            let Some(row) = rows.iter_mut().find(|r| r.id == patch.id) else {
                return Err(RemoteApiError::Status {
                    status: 404,
                    message: format!("record not found: {}", patch.id),
                });
            };
            merge_fields(&mut row.fields, patch.fields);
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete_one(&self, table: &str, id: &str) -> Result<(), RemoteApiError> {
        self.record_call(FakeCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        });
        let mut tables = guard(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(RemoteApiError::Status {
                status: 404,
                message: format!("record not found: {}", id),
            });
        }
        Ok(())
    }
}

fn merge_fields(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (k, v) in patch {
        target.insert(k, v);
    }
}
