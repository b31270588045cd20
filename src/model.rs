use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::remote::RemoteRecord;

pub const FIELD_PARTICIPANT_ID: &str = "Participant ID";
/// Older attendance rows were written with this spelling.
pub const FIELD_PARTICIPANT_ID_LEGACY: &str = "ParticipantID";
pub const FIELD_PARTICIPANT_NAME: &str = "Participant Name";
pub const FIELD_DATE: &str = "Date";
pub const FIELD_STATUS: &str = "Status";
pub const FIELD_TIMESTAMP: &str = "Timestamp";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Present" | "present" => Some(Self::Present),
            "Absent" | "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Participant {
    pub fn from_record(record: &RemoteRecord) -> Self {
        let fields = &record.fields;
        Self {
            id: record.id.clone(),
            name: lenient_str(fields, &["Name", "name"]).unwrap_or_else(|| "Unknown".to_string()),
            email: lenient_str(fields, &["Email", "email"]),
            phone: lenient_str(fields, &["Phone", "phone"]),
        }
    }
}

/// Attendance row as read back from the remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub id: String,
    pub participant_id: String,
    pub date: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
    pub timestamp: Option<String>,
}

impl AttendanceRecord {
    /// Rows without a participant id can't be matched to anyone and are skipped.
    pub fn from_record(record: &RemoteRecord) -> Option<Self> {
        let fields = &record.fields;
        let participant_id =
            lenient_str(fields, &[FIELD_PARTICIPANT_ID, FIELD_PARTICIPANT_ID_LEGACY])?;
        Some(Self {
            id: record.id.clone(),
            participant_id,
            date: lenient_str(fields, &[FIELD_DATE]).and_then(|d| parse_date(&d)),
            status: lenient_str(fields, &[FIELD_STATUS]).and_then(|s| AttendanceStatus::parse(&s)),
            timestamp: lenient_str(fields, &[FIELD_TIMESTAMP]),
        })
    }
}

/// One desired (participant, date, status) row of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEntry {
    pub participant_id: String,
    pub participant_name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub status: AttendanceStatus,
}

impl SelectionEntry {
    pub fn new(
        participant_id: impl Into<String>,
        participant_name: impl Into<String>,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            participant_name: participant_name.into(),
            date: Some(date),
            status,
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Formula selecting every attendance row of one calendar day.
pub fn date_formula(date: NaiveDate) -> String {
    format!("{{{}}} = '{}'", FIELD_DATE, format_date(date))
}

fn lenient_str(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match fields.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}
