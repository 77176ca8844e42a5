//! Sync progress reporting.
//!
//! Reports observable progress during `qah sync` so users see which month
//! is being fetched and how many records have been indexed so far.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::models::Cursor;

/// A single progress event for sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// About to fetch the page for this cursor.
    Fetching { cursor: Cursor },
    /// A page was parsed and upserted.
    PageSynced {
        cursor: Cursor,
        records: u64,
        total: u64,
        from_cache: bool,
    },
    /// The archive answered not-found for this month.
    BoundaryReached { cursor: Cursor },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the orchestrator.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync 2020-11  indexed  312 records (total 4,210)".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Fetching { cursor } => {
                format!("sync {}  fetching...\n", cursor)
            }
            SyncProgressEvent::PageSynced {
                cursor,
                records,
                total,
                from_cache,
            } => format!(
                "sync {}  indexed  {} records (total {}){}\n",
                cursor,
                format_number(*records),
                format_number(*total),
                if *from_cache { "  [cached]" } else { "" }
            ),
            SyncProgressEvent::BoundaryReached { cursor } => {
                format!("sync {}  not found, archive boundary reached\n", cursor)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Fetching { cursor } => serde_json::json!({
                "event": "progress",
                "page": cursor.to_string(),
                "phase": "fetching"
            }),
            SyncProgressEvent::PageSynced {
                cursor,
                records,
                total,
                from_cache,
            } => serde_json::json!({
                "event": "progress",
                "page": cursor.to_string(),
                "phase": "indexed",
                "records": records,
                "total": total,
                "from_cache": from_cache
            }),
            SyncProgressEvent::BoundaryReached { cursor } => serde_json::json!({
                "event": "progress",
                "page": cursor.to_string(),
                "phase": "boundary"
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

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
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
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

    /// Parse the `--progress` flag; `None` picks [`default_for_tty`](Self::default_for_tty).
    pub fn from_flag(flag: Option<&str>) -> anyhow::Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("off") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => anyhow::bail!(
                "Unknown progress mode: {}. Use off, human, or json.",
                other
            ),
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
