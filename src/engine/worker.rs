//! Pool worker: claims items, runs the processing routine, streams values.
//!
//! Each worker runs on its own blocking thread. A failure in the routine,
//! including a panic, is contained in the worker: it is logged through the
//! log channel, sent to the orchestrator as a single `Err` record, and the
//! worker stops claiming items.

use std::any::Any;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::{BoxError, Error, Result};
use crate::log::QueueLogger;
use crate::model::{ItemStats, WorkerReport, WorkerState, preview, render};
use crate::process::Process;
use crate::queue::WorkQueue;
use crate::telemetry::{metrics, work};

/// State shared by every worker of one pool.
pub(crate) struct SharedWorkerContext<P, I> {
    pub(crate) process: Arc<P>,
    pub(crate) queue: WorkQueue<I>,
    pub(crate) cancel: CancellationToken,
    pub(crate) claim_timeout: Duration,
    pub(crate) preview_len: usize,
}

impl<P, I> Clone for SharedWorkerContext<P, I> {
    fn clone(&self) -> Self {
        Self {
            process: Arc::clone(&self.process),
            queue: self.queue.clone(),
            cancel: self.cancel.clone(),
            claim_timeout: self.claim_timeout,
            preview_len: self.preview_len,
        }
    }
}

/// How processing a single item ended.
enum ItemOutcome {
    Done,
    Failed,
    /// The pool stopped listening mid-item.
    Abandoned,
}

/// Values forwarded for one item before the routine stopped.
enum Emitted {
    All(usize),
    Partial,
}

pub(crate) struct Worker<P, I>
where
    P: Process<I>,
{
    name: String,
    ctx: SharedWorkerContext<P, I>,
    output: mpsc::UnboundedSender<Result<P::Value>>,
    logger: QueueLogger,
    span: Span,
    state: WorkerState,
    stats: Vec<ItemStats>,
}

impl<P, I> Worker<P, I>
where
    P: Process<I>,
    I: Debug,
{
    pub(crate) fn new(
        name: String,
        ctx: SharedWorkerContext<P, I>,
        output: mpsc::UnboundedSender<Result<P::Value>>,
        logger: QueueLogger,
        parent: &Span,
    ) -> Self {
        let span = work::start_worker_span(parent, &name);
        Self {
            name,
            ctx,
            output,
            logger,
            span,
            state: WorkerState::Idle,
            stats: Vec::new(),
        }
    }

    /// Process items until the queue drains, the routine fails, or the pool
    /// is cancelled.
    pub(crate) fn run(mut self) -> WorkerReport {
        let span = self.span.clone();
        let _enter = span.enter();
        self.logger.info(format!("{}: Starting up.", self.name));

        let terminal = loop {
            if self.ctx.cancel.is_cancelled() {
                break WorkerState::Cancelled;
            }
            let Some(item) = self.ctx.queue.claim(self.ctx.claim_timeout) else {
                break WorkerState::Drained;
            };

            self.transition(WorkerState::Processing);
            match self.process_item(item) {
                ItemOutcome::Done => self.transition(WorkerState::Idle),
                ItemOutcome::Failed => break WorkerState::Failed,
                ItemOutcome::Abandoned => break WorkerState::Cancelled,
            }
        };
        self.transition(terminal);

        match terminal {
            WorkerState::Drained => {
                self.logger
                    .info(format!("{}: No more items to process", self.name));
                self.log_stats();
            }
            WorkerState::Cancelled => {
                self.logger
                    .info(format!("{}: Stopping, the pool was shut down", self.name));
                self.log_stats();
            }
            _ => {}
        }
        metrics::worker_exits().add(1, &[KeyValue::new("state", terminal.to_string())]);

        WorkerReport {
            name: self.name,
            state: terminal,
            stats: self.stats,
        }
    }

    fn transition(&mut self, to: WorkerState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "{}: illegal transition {} -> {to}",
            self.name,
            self.state
        );
        work::record_state_transition(&self.span, &self.state.to_string(), &to.to_string());
        self.state = to;
    }

    fn process_item(&mut self, item: I) -> ItemOutcome {
        let rendered = render(&item);
        let item_preview = preview(&rendered, self.ctx.preview_len);
        self.logger
            .info(format!("{}: Processing {item_preview}", self.name));

        let start = Instant::now();
        let process = &self.ctx.process;
        let output = &self.output;
        let cancel = &self.ctx.cancel;

        let result = catch_unwind(AssertUnwindSafe(
            || -> std::result::Result<Emitted, BoxError> {
                let mut count = 0;
                for value in process.process(item) {
                    let value = value.map_err(Into::<BoxError>::into)?;
                    if output.send(Ok(value)).is_err() {
                        return Ok(Emitted::Partial);
                    }
                    count += 1;
                    if cancel.is_cancelled() {
                        return Ok(Emitted::Partial);
                    }
                }
                Ok(Emitted::All(count))
            },
        ));

        match result {
            Ok(Ok(Emitted::All(values))) => {
                let elapsed = start.elapsed();
                metrics::items_processed().add(1, &[KeyValue::new("result", "ok")]);
                metrics::values_emitted().add(values as u64, &[]);
                metrics::item_duration_ms().record(elapsed.as_secs_f64() * 1000.0, &[]);
                self.stats.push(ItemStats {
                    item: rendered,
                    values,
                    elapsed,
                });
                ItemOutcome::Done
            }
            Ok(Ok(Emitted::Partial)) => ItemOutcome::Abandoned,
            Ok(Err(source)) => self.fail(
                &item_preview,
                Error::Process {
                    worker: self.name.clone(),
                    item: item_preview.clone(),
                    source,
                },
            ),
            Err(payload) => self.fail(
                &item_preview,
                Error::Panic {
                    worker: self.name.clone(),
                    item: item_preview.clone(),
                    message: panic_message(payload.as_ref()),
                },
            ),
        }
    }

    fn fail(&mut self, item_preview: &str, err: Error) -> ItemOutcome {
        metrics::items_processed().add(1, &[KeyValue::new("result", "error")]);
        self.logger.error(format!(
            "{}: An error occurred while processing {item_preview}",
            self.name
        ));
        self.logger.error(format!("{}: {}", self.name, err.trace()));
        // The orchestrator may already be gone after an earlier failure.
        let _ = self.output.send(Err(err));
        ItemOutcome::Failed
    }

    fn log_stats(&self) {
        if self.stats.is_empty() {
            return;
        }
        let lines: Vec<String> = self.stats.iter().map(|s| s.summary(&self.name)).collect();
        self.logger.info(format!("\n{}", lines.join("\n")));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
