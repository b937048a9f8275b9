mod config;
mod db;
mod ipc;
mod logging;
mod ranking;
mod store;

use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    let config = config::AppConfig::load()?;
    logging::init(&config.logging.filter);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        band_size = config.sections.band_size,
        labels = config.sections.labels.len(),
        "campusd starting"
    );

    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to; answer with an empty one.
                tracing::warn!(error = %e, "unparseable request");
                let _ = writeln!(stdout, "{}", ipc::err("", "bad_json", e.to_string(), None));
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
