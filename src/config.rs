use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::model::parse_date;

pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_PARTICIPANTS_TABLE: &str = "Participants";
pub const DEFAULT_ATTENDANCE_TABLE: &str = "Attendance";
pub const DEFAULT_PROGRAM_NAME: &str = "Buildathon 2025";
pub const DEFAULT_START_DATE: &str = "2025-12-26";
pub const DEFAULT_SESSION_KEY: &str = "buildathon_session";
pub const DEFAULT_WORKSPACE: &str = ".rollcall";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    /// Lowercase hex SHA-256 of the password.
    pub password_sha256: String,
}

impl Credential {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password_sha256 == hash_password(password)
    }
}

pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub base_id: String,
    pub participants_table: String,
    pub attendance_table: String,
    pub program_name: String,
    pub start_date: NaiveDate,
    pub credentials: Vec<Credential>,
    pub session_key: String,
    pub workspace: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let or_default = |key: &str, default: &str| -> String {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => v.trim().to_string(),
                _ => {
                    info!("{key} not set, using default: {default}");
                    default.to_string()
                }
            }
        };

        let api_key = lookup("ROLLCALL_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            warn!("ROLLCALL_API_KEY is empty; table requests will be unauthenticated");
        }
        let base_id = lookup("ROLLCALL_BASE_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("ROLLCALL_BASE_ID must be set"))?;

        let start_raw = or_default("ROLLCALL_START_DATE", DEFAULT_START_DATE);
        let start_date = parse_date(&start_raw)
            .ok_or_else(|| anyhow!("ROLLCALL_START_DATE must be YYYY-MM-DD, got {start_raw}"))?;

        let credentials = match lookup("ROLLCALL_CREDENTIALS") {
            Some(raw) => parse_credentials(&raw).context("invalid ROLLCALL_CREDENTIALS")?,
            None => {
                warn!("ROLLCALL_CREDENTIALS not set; every login will be rejected");
                Vec::new()
            }
        };

        Ok(Self {
            api_url: or_default("ROLLCALL_API_URL", DEFAULT_API_URL),
            api_key,
            base_id: base_id.trim().to_string(),
            participants_table: or_default("ROLLCALL_PARTICIPANTS_TABLE", DEFAULT_PARTICIPANTS_TABLE),
            attendance_table: or_default("ROLLCALL_ATTENDANCE_TABLE", DEFAULT_ATTENDANCE_TABLE),
            program_name: or_default("ROLLCALL_PROGRAM_NAME", DEFAULT_PROGRAM_NAME),
            start_date,
            credentials,
            session_key: or_default("ROLLCALL_SESSION_KEY", DEFAULT_SESSION_KEY),
            workspace: PathBuf::from(or_default("ROLLCALL_WORKSPACE", DEFAULT_WORKSPACE)),
        })
    }
}

/// `user:sha256hex` pairs separated by commas.
pub fn parse_credentials(raw: &str) -> anyhow::Result<Vec<Credential>> {
    let mut out = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((user, hash)) = pair.split_once(':') else {
            return Err(anyhow!("credential entry must be user:sha256hex"));
        };
        let user = user.trim();
        let hash = hash.trim().to_ascii_lowercase();
        if user.is_empty() {
            return Err(anyhow!("credential entry has an empty username"));
        }
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("credential for {user} is not a sha256 hex digest"));
        }
        out.push(Credential {
            username: user.to_string(),
            password_sha256: hash,
        });
    }
    Ok(out)
}
