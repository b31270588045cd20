use anyhow::Context;
use rollcalld::config::Config;
use rollcalld::remote::HttpTableClient;
use rollcalld::store::SqliteStore;
use rollcalld::{db, ipc};
use std::io::{self, BufRead, Write};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = Config::load().context("failed to load configuration")?;
    let conn = db::open_db(&config.workspace)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let _guard = runtime.enter();
    let backend = HttpTableClient::new(&config.api_url, &config.base_id, &config.api_key)?;

    info!(
        program = %config.program_name,
        workspace = %config.workspace.to_string_lossy(),
        "rollcalld ready"
    );
    let mut state = ipc::AppState::new(config, Box::new(backend), Box::new(SqliteStore::new(conn)));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = runtime.block_on(ipc::handle_request(&mut state, req));
        let _ = writeln!(stdout, "{}", resp);
        let _ = stdout.flush();
    }
    Ok(())
}
