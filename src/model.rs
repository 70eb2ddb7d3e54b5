//! Core data model.
//!
//! Log records flow from workers to the consolidator; worker states and
//! per-item stats describe what each worker did during one `map` run.

use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Log Record
// ---------------------------------------------------------------------------

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// One message sent by a worker over the log channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker State
// ---------------------------------------------------------------------------

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Between items, about to claim the next one.
    Idle,
    /// Running the processing routine on a claimed item.
    Processing,
    /// Found the work queue empty. Terminal.
    Drained,
    /// The processing routine failed. Terminal.
    Failed,
    /// The pool was torn down before the queue drained. Terminal.
    Cancelled,
}

impl WorkerState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, to),
            (Idle, Processing)
                | (Idle, Drained)
                | (Idle, Cancelled)
                | (Processing, Idle)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerState::Drained | WorkerState::Failed | WorkerState::Cancelled
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Processing => "processing",
            WorkerState::Drained => "drained",
            WorkerState::Failed => "failed",
            WorkerState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// What a worker recorded for one successfully processed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStats {
    /// Full rendering of the item.
    pub item: String,
    /// Number of values the routine emitted for it.
    pub values: usize,
    pub elapsed: Duration,
}

impl ItemStats {
    /// The informational line logged when the worker drains.
    pub fn summary(&self, worker: &str) -> String {
        format!(
            "{worker}: - Extracted {} values from {} in {:.3} seconds",
            self.values,
            self.item,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Final account of one worker, available once the pool is joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub name: String,
    pub state: WorkerState,
    pub stats: Vec<ItemStats>,
}

impl WorkerReport {
    /// Total values emitted across all successfully processed items.
    pub fn values(&self) -> usize {
        self.stats.iter().map(|s| s.values).sum()
    }
}

/// `Debug` rendering of an item, without the quotes `Debug` wraps around
/// strings and paths.
pub fn render<T: Debug + ?Sized>(item: &T) -> String {
    let rendered = format!("{item:?}");
    match rendered.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => rendered,
    }
}

/// `rendered` cut to at most `max_chars` characters.
pub fn preview(rendered: &str, max_chars: usize) -> String {
    match rendered.char_indices().nth(max_chars) {
        Some((cut, _)) => rendered[..cut].to_string(),
        None => rendered.to_string(),
    }
}
