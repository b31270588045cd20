use chrono::Local;
use serde::Deserialize;

use crate::config::Config;
use crate::controller::{AttendanceView, Tables};
use crate::remote::TableBackend;
use crate::session::SessionManager;
use crate::store::KeyValueStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub backend: Box<dyn TableBackend>,
    pub store: Box<dyn KeyValueStore>,
    pub sessions: SessionManager,
    pub view: AttendanceView,
}

impl AppState {
    pub fn new(
        config: Config,
        backend: Box<dyn TableBackend>,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        let sessions = SessionManager::new(config.session_key.clone());
        let view = AttendanceView::new(
            Tables {
                participants: config.participants_table.clone(),
                attendance: config.attendance_table.clone(),
            },
            config.start_date,
            Local::now().date_naive(),
        );
        Self {
            config,
            backend,
            store,
            sessions,
            view,
        }
    }
}
