//! Cross-worker log consolidation.
//!
//! Workers never write to the log sink directly. They send [`LogRecord`]s
//! through a [`QueueLogger`], and a single [`LogConsolidator`] task drains
//! the channel and forwards each record to the sink, so lines from
//! concurrent workers never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{Level, LogRecord};

/// Destination for consolidated log records.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str);
}

/// Forwards records to the process-wide `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!(target: "para", "{message}"),
            Level::Info => tracing::info!(target: "para", "{message}"),
            Level::Warning => tracing::warn!(target: "para", "{message}"),
            Level::Error => tracing::error!(target: "para", "{message}"),
        }
    }
}

/// Sending half of the log channel. Cheap to clone, one per worker.
///
/// Sends are fire-and-forget: once the consolidator is gone, records are dropped.
#[derive(Debug, Clone)]
pub struct QueueLogger {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl QueueLogger {
    /// Create a logger and the receiving half for its consolidator.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        let _ = self.tx.send(LogRecord::new(level, message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }
}

/// The single writer between the log channel and the sink.
pub struct LogConsolidator;

impl LogConsolidator {
    /// Spawn the consolidator on the current tokio runtime.
    ///
    /// It runs until every [`QueueLogger`] attached to `rx` is dropped and
    /// the buffered records are forwarded, then resolves to the number of
    /// records it forwarded.
    pub fn spawn(
        mut rx: mpsc::UnboundedReceiver<LogRecord>,
        sink: Arc<dyn LogSink>,
        poll: Duration,
    ) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut forwarded = 0;
            loop {
                match tokio::time::timeout(poll, rx.recv()).await {
                    Ok(Some(record)) => {
                        sink.log(record.level, &record.message);
                        forwarded += 1;
                    }
                    Ok(None) => break,
                    // Nothing arrived within the poll window; wait again.
                    Err(_) => continue,
                }
            }
            forwarded
        })
    }
}
