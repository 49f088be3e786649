use anyhow::Result;
use rotor_config::RotorConfig;
use rotor_process::is_process_alive;
use rotor_scheduler::{CredentialPool, RotationState};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::OutputFormat;

#[derive(Debug, Serialize)]
struct PoolEntry {
    index: usize,
    label: String,
    path: PathBuf,
    current: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    credentials_dir: PathBuf,
    pool: Vec<PoolEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_error: Option<String>,
    state_path: PathBuf,
    state: RotationState,
    launcher_alive: Option<bool>,
}

/// Read-only view of pool and state. Does not take the supervisor lock.
pub(crate) fn handle_status(config: &RotorConfig, format: OutputFormat) -> Result<()> {
    let report = build_report(config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report)),
    }
    Ok(())
}

fn build_report(config: &RotorConfig) -> Result<StatusReport> {
    let state = RotationState::load(&config.state_path)?;

    let (pool, pool_error) = match CredentialPool::load(&config.credentials_dir) {
        Ok(pool) => {
            let entries = pool
                .iter()
                .enumerate()
                .map(|(index, c)| PoolEntry {
                    index,
                    label: c.label().to_string(),
                    path: c.path().to_path_buf(),
                    current: state.last_credential.as_deref() == Some(c.path()),
                })
                .collect();
            (entries, None)
        }
        Err(e) => (Vec::new(), Some(format!("{e:#}"))),
    };

    let launcher_alive = state.last_launcher_pid.map(is_process_alive);
    Ok(StatusReport {
        credentials_dir: config.credentials_dir.clone(),
        pool,
        pool_error,
        state_path: config.state_path.clone(),
        state,
        launcher_alive,
    })
}

fn render_text(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Credentials: {}\n",
        report.credentials_dir.display()
    ));
    if let Some(err) = &report.pool_error {
        out.push_str(&format!("  (unavailable: {err})\n"));
    }
    for entry in &report.pool {
        let marker = if entry.current { "*" } else { " " };
        out.push_str(&format!(
            "{marker} {:>3}  {}  ({})\n",
            entry.index,
            entry.label,
            entry.path.display()
        ));
    }

    out.push_str(&format!("State: {}\n", report.state_path.display()));
    match &report.state.last_credential {
        Some(path) => out.push_str(&format!("  last credential: {}\n", path.display())),
        None => out.push_str("  last credential: none\n"),
    }
    match (report.state.last_launcher_pid, report.launcher_alive) {
        (Some(pid), Some(true)) => out.push_str(&format!("  launcher pid: {pid} (running)\n")),
        (Some(pid), _) => out.push_str(&format!("  launcher pid: {pid} (not running)\n")),
        (None, _) => out.push_str("  launcher pid: none\n"),
    }
    if let Some(updated) = report.state.updated_at {
        out.push_str(&format!("  updated: {}\n", updated.to_rfc3339()));
    }
    out
}
