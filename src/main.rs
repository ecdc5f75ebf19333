mod backup;
mod calc;
mod config;
mod db;
mod error;
mod exams;
mod grading;
mod ipc;
mod model;
mod records;
mod sentiment;
mod store;

use std::io::{self, BufRead, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(filter: &str) {
    // stdout carries the protocol; logs go to stderr only.
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() {
    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env();
    init_logging(&cfg.log_filter);

    let mut state = ipc::AppState {
        workspace: None,
        store: None,
    };
    if let Some(path) = cfg.workspace.as_ref() {
        match store::SqliteStore::open(path) {
            Ok(s) => {
                info!(workspace = %path.display(), "workspace opened from config");
                state.workspace = Some(path.clone());
                state.store = Some(s);
            }
            Err(e) => warn!(workspace = %path.display(), error = %e, "configured workspace failed to open"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, shutting down");
}
