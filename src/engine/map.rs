//! Orchestrator: fans items out to a worker pool and fans values back in.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, trace, warn};
use uuid::Uuid;

use super::worker::{SharedWorkerContext, Worker};
use crate::config::{MapConfig, effective_pool_size};
use crate::error::{Error, Result};
use crate::log::{LogConsolidator, LogSink, QueueLogger, TracingSink};
use crate::model::{WorkerReport, WorkerState};
use crate::process::Process;
use crate::queue::WorkQueue;
use crate::telemetry::work::start_map_span;

/// Map `process` over `items` on a pool of `pool_size` workers (default:
/// available parallelism), logging through `tracing`.
///
/// Must be called from within a tokio runtime. See [`map_with`].
///
/// A panic in `process` is caught and returned as [`Error::Panic`], but the
/// process-wide panic hook still runs first and by default prints the panic
/// to stderr. Install a quieter hook with [`std::panic::set_hook`] if that
/// output is unwanted.
pub fn map<P, I>(
    process: P,
    items: impl IntoIterator<Item = I>,
    pool_size: Option<usize>,
) -> Result<MapStream<P::Value>>
where
    P: Process<I>,
    I: Debug + Send + 'static,
{
    map_with(
        process,
        items,
        &MapConfig::with_pool_size(pool_size),
        Arc::new(TracingSink),
    )
}

/// Map `process` over `items` with explicit settings and log sink.
///
/// Every item is queued before any worker starts. The pool has
/// `clamp(pool_size, 1, items)` workers; an empty input spawns nothing and
/// yields an already exhausted stream.
///
/// # Errors
///
/// Fails before launching anything if `config` is invalid or no tokio
/// runtime is available.
pub fn map_with<P, I>(
    process: P,
    items: impl IntoIterator<Item = I>,
    config: &MapConfig,
    sink: Arc<dyn LogSink>,
) -> Result<MapStream<P::Value>>
where
    P: Process<I>,
    I: Debug + Send + 'static,
{
    config.validate()?;
    tokio::runtime::Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;

    let queue = WorkQueue::sealed(items);
    let item_count = queue.len();
    let pool_size = effective_pool_size(config.pool_size, item_count);
    let (output_tx, output_rx) = mpsc::unbounded_channel();

    if pool_size == 0 {
        debug!("no items to map, skipping pool startup");
        return Ok(MapStream::new(output_rx, None, config.output_poll, 0));
    }

    let run_id = Uuid::new_v4();
    let span = start_map_span(&run_id, pool_size, item_count);

    let (logger, log_rx) = QueueLogger::channel();
    let consolidator = LogConsolidator::spawn(log_rx, sink, config.log_poll);

    let cancel = CancellationToken::new();
    let ctx = SharedWorkerContext {
        process: Arc::new(process),
        queue,
        cancel: cancel.clone(),
        claim_timeout: config.claim_timeout,
        preview_len: config.preview_len,
    };

    let workers = (0..pool_size)
        .map(|i| {
            let worker = Worker::new(
                format!("Mapper {i}"),
                ctx.clone(),
                output_tx.clone(),
                logger.clone(),
                &span,
            );
            tokio::task::spawn_blocking(move || worker.run())
        })
        .collect();

    info!(parent: &span, pool_size, items = item_count, "map started");

    let pool = Pool {
        cancel,
        workers,
        consolidator,
        span,
    };
    Ok(MapStream::new(
        output_rx,
        Some(pool),
        config.output_poll,
        pool_size,
    ))
}

/// The running workers and log consolidator of one `map` call.
struct Pool {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<WorkerReport>>,
    consolidator: JoinHandle<usize>,
    span: Span,
}

impl Pool {
    fn alive(&self) -> usize {
        self.workers.iter().filter(|h| !h.is_finished()).count()
    }

    /// Stop the workers at their next suspension point and wait for them
    /// and the consolidator to exit.
    async fn join(self) -> Vec<WorkerReport> {
        let Pool {
            cancel,
            workers,
            consolidator,
            span,
        } = self;
        cancel.cancel();

        let mut reports = Vec::with_capacity(workers.len());
        for handle in workers {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(parent: &span, error = %e, "worker task failed"),
            }
        }

        // Every worker dropped its logger, so the consolidator drains and exits.
        match consolidator.await {
            Ok(records) => debug!(parent: &span, records, "log consolidator finished"),
            Err(e) => warn!(parent: &span, error = %e, "log consolidator failed"),
        }

        let failed = reports
            .iter()
            .filter(|r| r.state == WorkerState::Failed)
            .count();
        info!(parent: &span, workers = reports.len(), failed, "map finished");
        reports
    }
}

/// Lazy sequence of values produced by a `map` call.
///
/// Values arrive in output-channel order: per item, the routine's emission
/// order is kept, but items from different workers interleave freely. The
/// first failure ends the sequence.
///
/// Dropping the stream cancels the pool without waiting for it; use
/// [`MapStream::shutdown`] to stop and join it.
pub struct MapStream<V> {
    output: mpsc::UnboundedReceiver<Result<V>>,
    pool: Option<Pool>,
    poll: Duration,
    pool_size: usize,
    finished: bool,
    reports: Vec<WorkerReport>,
}

impl<V> MapStream<V> {
    fn new(
        output: mpsc::UnboundedReceiver<Result<V>>,
        pool: Option<Pool>,
        poll: Duration,
        pool_size: usize,
    ) -> Self {
        Self {
            output,
            finished: pool.is_none(),
            pool,
            poll,
            pool_size,
            reports: Vec::new(),
        }
    }

    /// Number of workers started for this call.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Whether the sequence has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Worker reports, available once the sequence has ended.
    pub fn reports(&self) -> &[WorkerReport] {
        &self.reports
    }

    /// Next value, or the failure that ended the run.
    ///
    /// Returns `None` once every worker has exited and the output channel
    /// is drained, and after a failure has been returned. A failure is
    /// returned as soon as it arrives; the pool is only cancelled then, and
    /// the next call (or [`MapStream::shutdown`]) waits for it.
    pub async fn next(&mut self) -> Option<Result<V>> {
        if self.finished {
            self.finish().await;
            return None;
        }
        loop {
            match tokio::time::timeout(self.poll, self.output.recv()).await {
                Ok(Some(Ok(value))) => return Some(Ok(value)),
                Ok(Some(Err(err))) => {
                    self.stop();
                    return Some(Err(err));
                }
                // Every worker has dropped its sender and the channel is empty.
                Ok(None) => {
                    self.finish().await;
                    return None;
                }
                Err(_) => {
                    if let Some(pool) = &self.pool {
                        trace!(parent: &pool.span, alive = pool.alive(), "waiting for output");
                    }
                }
            }
        }
    }

    /// Drain the sequence into a vector, stopping at the first failure.
    pub async fn collect_values(mut self) -> Result<Vec<V>> {
        let mut values = Vec::new();
        while let Some(value) = self.next().await {
            values.push(value?);
        }
        Ok(values)
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<V>> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }

    /// Stop the pool, wait for every worker and the log consolidator to
    /// exit, and return the worker reports. Values not yet consumed are
    /// discarded.
    pub async fn shutdown(mut self) -> Vec<WorkerReport> {
        self.finish().await;
        std::mem::take(&mut self.reports)
    }

    /// End the sequence and signal the pool without waiting for it.
    fn stop(&mut self) {
        self.finished = true;
        // Workers still emitting see a closed channel and stop.
        self.output.close();
        if let Some(pool) = &self.pool {
            pool.cancel.cancel();
        }
    }

    async fn finish(&mut self) {
        self.stop();
        if let Some(pool) = self.pool.take() {
            self.reports = pool.join().await;
        }
    }
}

impl<V> Drop for MapStream<V> {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.cancel.cancel();
        }
    }
}
