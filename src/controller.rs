//! Attendance screen state and the single event dispatcher that drives it.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    date_formula, format_date, AttendanceRecord, AttendanceStatus, Participant, SelectionEntry,
};
use crate::reconcile::{self, ReconcileError};
use crate::remote::{RemoteApiError, TableBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Fetch participants and the statuses already recorded for the date.
    Load { date: Option<NaiveDate> },
    ChangeDate(NaiveDate),
    Toggle {
        participant_id: String,
        status: AttendanceStatus,
    },
    MarkAll(AttendanceStatus),
    Submit,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0}")]
    Validation(String),
    #[error("No participants found. Please add participants to the participants table.")]
    NoParticipants,
    #[error("Failed to fetch participants: {0}")]
    Remote(#[from] RemoteApiError),
    #[error("Failed to save attendance: {0}")]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub participants: String,
    pub attendance: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRow {
    #[serde(flatten)]
    pub participant: Participant,
    pub status: Option<AttendanceStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub date: String,
    pub min_date: String,
    pub participants: Vec<ParticipantRow>,
    pub stats: Stats,
    pub can_submit: bool,
}

/// What a successful submit wrote, kept for the confirmation screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub date: String,
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewUpdate {
    pub snapshot: ViewSnapshot,
    pub submitted: Option<SubmissionSummary>,
}

pub struct AttendanceView {
    tables: Tables,
    min_date: NaiveDate,
    current_date: NaiveDate,
    participants: Vec<Participant>,
    selection: HashMap<String, AttendanceStatus>,
    loaded: bool,
}

impl AttendanceView {
    /// Starts on `today`, or on the first program day if today is earlier.
    pub fn new(tables: Tables, min_date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            tables,
            min_date,
            current_date: today.max(min_date),
            participants: Vec::new(),
            selection: HashMap::new(),
            loaded: false,
        }
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Drops everything fetched or selected, e.g. on logout.
    pub fn reset(&mut self) {
        self.participants.clear();
        self.selection.clear();
        self.loaded = false;
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats {
            total: self.participants.len(),
            ..Stats::default()
        };
        for status in self.selection.values() {
            match status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Absent => stats.absent += 1,
            }
        }
        stats
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            date: format_date(self.current_date),
            min_date: format_date(self.min_date),
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantRow {
                    participant: p.clone(),
                    status: self.selection.get(&p.id).copied(),
                })
                .collect(),
            stats: self.stats(),
            can_submit: self.loaded && !self.participants.is_empty(),
        }
    }

    pub async fn dispatch(
        &mut self,
        backend: &dyn TableBackend,
        event: UiEvent,
    ) -> Result<ViewUpdate, ControllerError> {
        let mut submitted = None;
        match event {
            UiEvent::Load { date } => {
                if let Some(d) = date {
                    self.check_date(d)?;
                    self.current_date = d;
                }
                self.load(backend).await?;
            }
            UiEvent::ChangeDate(date) => {
                self.check_date(date)?;
                self.current_date = date;
                self.load_statuses(backend).await;
            }
            UiEvent::Toggle {
                participant_id,
                status,
            } => self.toggle(participant_id, status)?,
            UiEvent::MarkAll(status) => {
                for p in &self.participants {
                    self.selection.insert(p.id.clone(), status);
                }
            }
            UiEvent::Submit => submitted = Some(self.submit(backend).await?),
        }
        Ok(ViewUpdate {
            snapshot: self.snapshot(),
            submitted,
        })
    }

    fn check_date(&self, date: NaiveDate) -> Result<(), ControllerError> {
        if date < self.min_date {
            return Err(ControllerError::Validation(format!(
                "Please select a date on or after {}",
                self.min_date.format("%B %-d, %Y")
            )));
        }
        Ok(())
    }

    async fn load(&mut self, backend: &dyn TableBackend) -> Result<(), ControllerError> {
        let records = backend.list_all(&self.tables.participants).await?;
        let participants: Vec<Participant> =
            records.iter().map(Participant::from_record).collect();
        if participants.is_empty() {
            self.reset();
            return Err(ControllerError::NoParticipants);
        }
        self.participants = participants;
        self.loaded = true;
        self.load_statuses(backend).await;
        info!(
            participants = self.participants.len(),
            date = %format_date(self.current_date),
            "attendance view loaded"
        );
        Ok(())
    }

    /// Replaces the selection with what is already stored for the current date.
    /// A failed read leaves the selection empty so marking can still proceed.
    async fn load_statuses(&mut self, backend: &dyn TableBackend) {
        self.selection.clear();
        let records = match backend
            .list_filtered(&self.tables.attendance, &date_formula(self.current_date))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, date = %format_date(self.current_date), "could not load existing attendance");
                return;
            }
        };
        for record in records.iter().filter_map(AttendanceRecord::from_record) {
            if let Some(status) = record.status {
                self.selection.insert(record.participant_id, status);
            }
        }
    }

    fn toggle(
        &mut self,
        participant_id: String,
        status: AttendanceStatus,
    ) -> Result<(), ControllerError> {
        if !self.participants.iter().any(|p| p.id == participant_id) {
            return Err(ControllerError::Validation(format!(
                "unknown participant: {}",
                participant_id
            )));
        }
        if self.selection.get(&participant_id) == Some(&status) {
            self.selection.remove(&participant_id);
        } else {
            self.selection.insert(participant_id, status);
        }
        Ok(())
    }

    async fn submit(
        &mut self,
        backend: &dyn TableBackend,
    ) -> Result<SubmissionSummary, ControllerError> {
        if self.selection.is_empty() {
            return Err(ControllerError::Validation(
                "Please mark attendance for at least one participant".to_string(),
            ));
        }
        let entries: Vec<SelectionEntry> = self
            .participants
            .iter()
            .filter_map(|p| {
                self.selection
                    .get(&p.id)
                    .map(|&status| SelectionEntry::new(&p.id, &p.name, self.current_date, status))
            })
            .collect();
        if entries.is_empty() {
            return Err(ControllerError::Validation(
                "Please mark attendance for at least one participant".to_string(),
            ));
        }

        let outcome =
            reconcile::reconcile(backend, &self.tables.attendance, &entries).await?;
        let present = entries
            .iter()
            .filter(|e| e.status == AttendanceStatus::Present)
            .count();
        Ok(SubmissionSummary {
            date: format_date(self.current_date),
            total: entries.len(),
            present,
            absent: entries.len() - present,
            created: outcome.created,
            updated: outcome.updated,
        })
    }
}
