//! Session trace: one JSON object per line, grouped by visitor turn.
//!
//! The file records credentials verbatim, so it is created owner-only.

use anyhow::{Context, Result, anyhow};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const APP_DIR: &str = "persona-chat";

/// What happened, as written to the trace. Every line also carries the
/// timestamp and the number of the visitor turn it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceRecord<'a> {
    VisitorTurn {
        text: &'a str,
    },
    ToolCall {
        round: usize,
        id: &'a str,
        name: &'a str,
        arguments: &'a str,
    },
    ToolResult {
        round: usize,
        id: &'a str,
        content: &'a str,
    },
    Verdict {
        accepted: bool,
        feedback: &'a str,
    },
    Revised,
    Reply {
        text: &'a str,
    },
    TurnFailed {
        error: String,
    },
    HistoryReset,
    HttpRequest {
        method: &'a str,
        url: &'a str,
        headers: BTreeMap<String, String>,
        body: Value,
    },
    HttpResponse {
        status: u16,
        headers: BTreeMap<String, String>,
        body: Value,
    },
    HttpError {
        message: String,
    },
}

#[derive(Serialize)]
struct Line<'a> {
    at: String,
    turn: u64,
    #[serde(flatten)]
    record: &'a TraceRecord<'a>,
}

#[derive(Clone)]
pub struct SessionTrace {
    path: Arc<PathBuf>,
    file: Arc<Mutex<TraceFile>>,
}

struct TraceFile {
    writer: LineWriter<File>,
    turn: u64,
    failed: bool,
}

impl SessionTrace {
    /// Opens `session-<id>.jsonl` under the user's state directory.
    pub fn create(session_id: &str) -> Result<Self> {
        Self::create_in(&default_trace_dir()?, session_id)
    }

    pub fn create_in(trace_dir: &Path, session_id: &str) -> Result<Self> {
        fs::create_dir_all(trace_dir)
            .with_context(|| format!("cannot create trace directory {}", trace_dir.display()))?;
        let path = trace_dir.join(format!("session-{session_id}.jsonl"));
        let file = open_owner_only(&path)
            .with_context(|| format!("cannot create trace file {}", path.display()))?;

        Ok(Self {
            path: Arc::new(path),
            file: Arc::new(Mutex::new(TraceFile {
                writer: LineWriter::new(file),
                turn: 0,
                failed: false,
            })),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Never fails the caller; the first write error is reported once.
    pub fn record(&self, record: TraceRecord<'_>) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(record, TraceRecord::VisitorTurn { .. }) {
            file.turn += 1;
        }

        let line = Line {
            at: timestamp(),
            turn: file.turn,
            record: &record,
        };
        let written = serde_json::to_string(&line)
            .map_err(std::io::Error::from)
            .and_then(|json| writeln!(file.writer, "{json}"));

        if let Err(err) = written {
            if !file.failed {
                file.failed = true;
                tracing::warn!(path = %self.path.display(), error = %err, "session trace write failed");
            }
        }
    }
}

/// Headers as a name → value map; non-UTF-8 values are replaced.
pub fn header_fields(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<non-utf8>").to_string(),
            )
        })
        .collect()
}

/// JSON bodies are embedded as JSON, anything else as a string.
pub fn body_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn default_trace_dir() -> Result<PathBuf> {
    trace_dir_under(dirs::state_dir(), dirs::home_dir())
}

fn trace_dir_under(state_dir: Option<PathBuf>, home_dir: Option<PathBuf>) -> Result<PathBuf> {
    let base = state_dir
        .or_else(|| home_dir.map(|home| home.join(".local").join("state")))
        .ok_or_else(|| anyhow!("cannot place session traces: no state or home directory"))?;
    Ok(base.join(APP_DIR).join("traces"))
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<File> {
    File::create(path)
}
