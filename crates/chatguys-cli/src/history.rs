//! Transcript persistence: a JSON document and a plain-text log per session

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use chatguys_core::{Transcript, TranscriptEntry};

/// Default session name: `chat_YYYYMMDD_HHMMSS`
pub fn default_session_name() -> String {
    format!("chat_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

#[derive(Serialize)]
struct SavedSession<'a> {
    session: &'a str,
    saved_at: DateTime<Utc>,
    entries: Vec<&'a TranscriptEntry>,
}

/// Render the line-oriented form: one line per entry, citations indented below
pub fn render_log(transcript: &Transcript) -> String {
    let mut out = String::new();
    for entry in transcript.iter() {
        out.push_str(&entry.format_for_history());
        out.push('\n');
        for citation in &entry.citations {
            out.push_str("    ");
            out.push_str(&citation.to_string());
            out.push('\n');
        }
    }
    out
}

/// Write `<dir>/<session>.json` and `<dir>/<session>.log`. Returns both paths.
pub fn save(dir: &Path, session: &str, transcript: &Transcript) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create history dir: {}", dir.display()))?;

    let json_path = dir.join(format!("{}.json", session));
    let log_path = dir.join(format!("{}.log", session));

    let doc = SavedSession {
        session,
        saved_at: Utc::now(),
        entries: transcript.iter().collect(),
    };
    let json = serde_json::to_string_pretty(&doc).context("Failed to serialize transcript")?;
    std::fs::write(&json_path, json)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    std::fs::write(&log_path, render_log(transcript))
        .with_context(|| format!("Failed to write {}", log_path.display()))?;

    info!(
        "Saved {} entries to {} and {}",
        transcript.len(),
        json_path.display(),
        log_path.display()
    );
    Ok((json_path, log_path))
}
