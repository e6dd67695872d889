//! Ingestion progress reporting.
//!
//! Indexing publishes [`IngestProgressEvent`]s to a reporter. The CLI
//! prints them on **stderr** so stdout stays parseable for scripts; the
//! server feeds them into a [`StatusBoard`] that answers
//! `GET /projects/{id}/progress`.

use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single progress event for one project's indexing run.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// Listing the repository tree. Total unknown.
    Discovering { project_id: String },
    /// File `n` of `total` is being summarized and embedded.
    FileStarted {
        project_id: String,
        file: String,
        n: u64,
        total: u64,
    },
    Finished {
        project_id: String,
        files_indexed: u64,
        files_skipped: u64,
        embed_failures: u64,
    },
}

impl IngestProgressEvent {
    pub fn project_id(&self) -> &str {
        match self {
            Self::Discovering { project_id }
            | Self::FileStarted { project_id, .. }
            | Self::Finished { project_id, .. } => project_id,
        }
    }
}

/// Receives ingestion progress. Called from the ingest pipeline.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "index 3f2a…  12 / 40  src/main.rs".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { project_id } => {
                format!("index {}  discovering...\n", project_id)
            }
            IngestProgressEvent::FileStarted {
                project_id,
                file,
                n,
                total,
            } => format!(
                "index {}  {} / {}  {}\n",
                project_id,
                format_number(*n),
                format_number(*total),
                file
            ),
            IngestProgressEvent::Finished {
                project_id,
                files_indexed,
                ..
            } => format!(
                "index {}  done, {} files\n",
                project_id,
                format_number(*files_indexed)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Discovering { project_id } => serde_json::json!({
                "event": "progress",
                "project_id": project_id,
                "phase": "discovering"
            }),
            IngestProgressEvent::FileStarted {
                project_id,
                file,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "project_id": project_id,
                "phase": "indexing",
                "file": file,
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Finished {
                project_id,
                files_indexed,
                files_skipped,
                embed_failures,
            } => serde_json::json!({
                "event": "progress",
                "project_id": project_id,
                "phase": "finished",
                "files_indexed": files_indexed,
                "files_skipped": files_skipped,
                "embed_failures": embed_failures
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

/// Sends every event to each inner reporter in order.
pub struct FanOut(pub Vec<Arc<dyn IngestProgressReporter>>);

impl IngestProgressReporter for FanOut {
    fn report(&self, event: IngestProgressEvent) {
        for reporter in &self.0 {
            reporter.report(event.clone());
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    Discovering,
    Indexing,
    Finished,
}

/// Latest known indexing state of one project.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct IngestStatus {
    pub phase: IngestPhase,
    /// File currently being processed; cleared when the run finishes.
    pub current_file: Option<String>,
    pub n: u64,
    pub total: u64,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub embed_failures: u64,
    pub updated_at: DateTime<Utc>,
}

/// In-memory map of project id to its latest [`IngestStatus`].
#[derive(Default)]
pub struct StatusBoard {
    inner: RwLock<HashMap<String, IngestStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &str) -> Option<IngestStatus> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned()
    }
}

impl IngestProgressReporter for StatusBoard {
    fn report(&self, event: IngestProgressEvent) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let entry = map
            .entry(event.project_id().to_string())
            .or_insert_with(|| IngestStatus {
                phase: IngestPhase::Discovering,
                current_file: None,
                n: 0,
                total: 0,
                files_indexed: 0,
                files_skipped: 0,
                embed_failures: 0,
                updated_at: now,
            });
        entry.updated_at = now;

        match event {
            IngestProgressEvent::Discovering { .. } => {
                *entry = IngestStatus {
                    phase: IngestPhase::Discovering,
                    current_file: None,
                    n: 0,
                    total: 0,
                    files_indexed: 0,
                    files_skipped: 0,
                    embed_failures: 0,
                    updated_at: now,
                };
            }
            IngestProgressEvent::FileStarted { file, n, total, .. } => {
                entry.phase = IngestPhase::Indexing;
                entry.current_file = Some(file);
                entry.n = n;
                entry.total = total;
            }
            IngestProgressEvent::Finished {
                files_indexed,
                files_skipped,
                embed_failures,
                ..
            } => {
                entry.phase = IngestPhase::Finished;
                entry.current_file = None;
                entry.files_indexed = files_indexed;
                entry.files_skipped = files_skipped;
                entry.embed_failures = embed_failures;
            }
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
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

    pub fn reporter(&self) -> Arc<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: {} (expected off, human, json)", other),
        }
    }
}
