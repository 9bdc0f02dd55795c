//! Run progress reporting.
//!
//! Reports observable progress during `dedup scan` and `dedup merge` so
//! operators see pages being fetched and which group is being worked on.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use crate::models::DuplicateKind;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunProgressEvent {
    /// A page of contacts arrived; `fetched` is the running total.
    Fetching {
        source: String,
        page: u32,
        fetched: u64,
    },
    /// Fetching finished.
    Fetched { source: String, total: u64 },
    /// Group `n` of `total` within one dimension is being planned or merged.
    Processing {
        kind: DuplicateKind,
        key: String,
        n: u64,
        total: u64,
    },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "phone  group 3 / 12  9876543210".
pub struct StderrProgress;

impl RunReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Fetching {
                source,
                page,
                fetched,
            } => format!(
                "fetch {}  page {}  {} contacts\n",
                source,
                page,
                format_number(*fetched)
            ),
            RunProgressEvent::Fetched { source, total } => {
                format!("fetch {}  done  {} contacts\n", source, format_number(*total))
            }
            RunProgressEvent::Processing { kind, key, n, total } => format!(
                "{}  group {} / {}  {}\n",
                kind,
                format_number(*n),
                format_number(*total),
                key
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Fetching {
                source,
                page,
                fetched,
            } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "source": source,
                "page": page,
                "fetched": fetched
            }),
            RunProgressEvent::Fetched { source, total } => serde_json::json!({
                "event": "progress",
                "phase": "fetched",
                "source": source,
                "total": total
            }),
            RunProgressEvent::Processing { kind, key, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "kind": kind.as_str(),
                "key": key,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn RunReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
