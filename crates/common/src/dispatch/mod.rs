//! Fan-out dispatcher
//!
//! Runs a list of independent work items through one downstream service.
//! Every item goes through the retry executor, and every attempt goes
//! through the service's `CallGateway`. The result list always has one entry
//! per input item, at the item's index; items that fail permanently (or never
//! finish because the dispatch was cancelled) get `R::sentinel()`.
//!
//! Items are processed in batches of `batch_size`. Within a batch the
//! cooperative strategy multiplexes all items on the async runtime. If the
//! batch task itself dies (a panic, not a per-item failure) the rest of the
//! call moves to a fixed pool of blocking worker threads.

use crate::config::{DispatchConfig, DispatchStrategy};
use crate::errors::CallError;
use crate::gateway::CallGateway;
use crate::metrics;
use crate::models::{Sentinel, WorkItem};
use crate::retry::RetryExecutor;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Items that ended with a sentinel result
#[derive(Debug, Clone, PartialEq)]
pub struct PartialBatchFailure {
    pub failed: Vec<usize>,
    pub total: usize,
}

impl fmt::Display for PartialBatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} items failed", self.failed.len(), self.total)
    }
}

/// Result of one `dispatch` call
#[derive(Debug)]
pub struct DispatchOutcome<R> {
    /// One result per input item, in input order
    pub results: Vec<R>,
    pub failure: Option<PartialBatchFailure>,
    pub cancelled: bool,
    /// Strategy in effect when the call finished
    pub strategy: DispatchStrategy,
}

enum BatchOutcome {
    Completed,
    Cancelled,
    TransportFailed(String),
}

/// Everything a worker needs to process one item by index
struct Shared<T, F> {
    gateway: Arc<CallGateway>,
    executor: RetryExecutor,
    op: F,
    items: Vec<WorkItem<T>>,
}

impl<T, F> Shared<T, F> {
    async fn run_item<R, Fut>(&self, idx: usize) -> Result<R, CallError>
    where
        F: Fn(&WorkItem<T>) -> Fut,
        Fut: Future<Output = Result<R, CallError>>,
    {
        let item = &self.items[idx];
        let gateway = &self.gateway;
        let op = &self.op;
        self.executor
            .try_execute(move || gateway.submit(1, move || op(item)))
            .await
    }
}

/// Result slots for one dispatch call
struct Slots<R> {
    values: Vec<Option<R>>,
    failed: Vec<usize>,
}

impl<R: Sentinel> Slots<R> {
    fn new(len: usize) -> Self {
        Self {
            values: (0..len).map(|_| None).collect(),
            failed: Vec::new(),
        }
    }

    fn store(&mut self, idx: usize, result: Result<R, CallError>) {
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                debug!(index = idx, class = e.class().as_str(), error = %e, "Item failed");
                self.failed.push(idx);
                R::sentinel()
            }
        };
        self.values[idx] = Some(value);
    }

    /// Keep results that finished before a cancellation was observed
    fn drain(&mut self, rx: &mut mpsc::UnboundedReceiver<(usize, Result<R, CallError>)>) {
        while let Ok((idx, result)) = rx.try_recv() {
            self.store(idx, result);
        }
    }

    fn pending(&self, indices: impl Iterator<Item = usize>) -> Vec<usize> {
        indices.filter(|&idx| self.values[idx].is_none()).collect()
    }

    /// Fill unfinished slots with sentinels
    fn finish(mut self) -> (Vec<R>, Vec<usize>) {
        for (idx, slot) in self.values.iter_mut().enumerate() {
            if slot.is_none() {
                self.failed.push(idx);
                *slot = Some(R::sentinel());
            }
        }
        self.failed.sort_unstable();
        let values = self.values.into_iter().flatten().collect();
        (values, self.failed)
    }
}

fn strategy_label(strategy: DispatchStrategy) -> &'static str {
    match strategy {
        DispatchStrategy::Cooperative => "cooperative",
        DispatchStrategy::WorkerPool => "worker_pool",
    }
}

/// Concurrent executor for one downstream service
#[derive(Clone)]
pub struct Dispatcher {
    config: DispatchConfig,
    gateway: Arc<CallGateway>,
    executor: RetryExecutor,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, gateway: Arc<CallGateway>, executor: RetryExecutor) -> Self {
        Self {
            config,
            gateway,
            executor,
        }
    }

    pub fn gateway(&self) -> &Arc<CallGateway> {
        &self.gateway
    }

    /// Run `op` over every item; `results[i]` belongs to `items[i]`
    pub async fn dispatch<T, R, F, Fut>(&self, items: Vec<WorkItem<T>>, op: F) -> Vec<R>
    where
        T: Send + Sync + 'static,
        R: Sentinel + Send + 'static,
        F: Fn(&WorkItem<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CallError>> + Send + 'static,
    {
        self.dispatch_until(items, op, std::future::pending())
            .await
            .results
    }

    /// Like `dispatch`, stopping early once `cancel` resolves.
    ///
    /// Items still in flight at cancellation get sentinels; results already
    /// produced are kept.
    pub async fn dispatch_until<T, R, F, Fut, C>(
        &self,
        items: Vec<WorkItem<T>>,
        op: F,
        cancel: C,
    ) -> DispatchOutcome<R>
    where
        T: Send + Sync + 'static,
        R: Sentinel + Send + 'static,
        F: Fn(&WorkItem<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CallError>> + Send + 'static,
        C: Future<Output = ()>,
    {
        let total = items.len();
        let mut strategy = self.config.strategy;
        let mut slots = Slots::new(total);
        let mut cancelled = false;
        let batch_size = self.config.batch_size.max(1);

        let shared = Arc::new(Shared {
            gateway: self.gateway.clone(),
            executor: self.executor.clone(),
            op,
            items,
        });
        tokio::pin!(cancel);

        for start in (0..total).step_by(batch_size) {
            let end = (start + batch_size).min(total);
            let batch_start = Instant::now();

            let outcome = self
                .run_batch(strategy, &shared, (start..end).collect(), &mut slots, &mut cancel)
                .await;

            let outcome = match outcome {
                BatchOutcome::TransportFailed(reason) if self.config.fallback_to_pool => {
                    warn!(
                        service = self.gateway.service(),
                        batch_start = start,
                        reason = %reason,
                        "Batch task failed, switching to worker pool"
                    );
                    strategy = DispatchStrategy::WorkerPool;
                    let pending = slots.pending(start..end);
                    self.run_batch(strategy, &shared, pending, &mut slots, &mut cancel)
                        .await
                }
                other => other,
            };

            metrics::record_dispatch(
                strategy_label(strategy),
                end - start,
                batch_start.elapsed().as_secs_f64(),
            );

            match outcome {
                BatchOutcome::Completed => {}
                BatchOutcome::Cancelled => {
                    warn!(
                        service = self.gateway.service(),
                        completed = start,
                        total,
                        "Dispatch cancelled, remaining items get sentinels"
                    );
                    cancelled = true;
                    break;
                }
                BatchOutcome::TransportFailed(reason) => {
                    error!(
                        service = self.gateway.service(),
                        batch_start = start,
                        reason = %reason,
                        "Batch task failed with no fallback"
                    );
                }
            }
        }

        let (results, failed) = slots.finish();
        metrics::record_sentinels(self.gateway.service(), failed.len());

        let failure = if failed.is_empty() {
            None
        } else {
            let failure = PartialBatchFailure { failed, total };
            warn!(
                service = self.gateway.service(),
                failed = ?failure.failed,
                "Partial batch failure: {}",
                failure
            );
            Some(failure)
        };

        DispatchOutcome {
            results,
            failure,
            cancelled,
            strategy,
        }
    }

    /// Dispatch up to `rounds` times, re-submitting only items whose result
    /// is still `None`.
    ///
    /// For operations whose output is validated after the call: a failed
    /// validation makes the item fail without network retries, and the next
    /// round asks again.
    pub async fn dispatch_rounds<T, R, F, Fut>(
        &self,
        items: Vec<WorkItem<T>>,
        rounds: u32,
        op: F,
    ) -> Vec<Option<R>>
    where
        T: Clone + Send + Sync + 'static,
        R: Send + 'static,
        F: Fn(&WorkItem<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, CallError>> + Send + 'static,
    {
        let op = Arc::new(op);
        let mut results: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
        let mut pending: Vec<usize> = (0..items.len()).collect();

        for round in 1..=rounds.max(1) {
            if pending.is_empty() {
                break;
            }
            let batch: Vec<WorkItem<T>> = pending.iter().map(|&idx| items[idx].clone()).collect();
            let round_op = op.clone();
            let round_results = self.dispatch(batch, move |item| round_op(item)).await;

            let mut still_pending = Vec::new();
            for (idx, result) in pending.into_iter().zip(round_results) {
                match result {
                    Some(value) => results[idx] = Some(value),
                    None => still_pending.push(idx),
                }
            }
            if !still_pending.is_empty() {
                debug!(
                    service = self.gateway.service(),
                    round,
                    unresolved = still_pending.len(),
                    "Items unresolved after round"
                );
            }
            pending = still_pending;
        }

        results
    }

    async fn run_batch<T, R, F, Fut, C>(
        &self,
        strategy: DispatchStrategy,
        shared: &Arc<Shared<T, F>>,
        indices: Vec<usize>,
        slots: &mut Slots<R>,
        cancel: &mut Pin<&mut C>,
    ) -> BatchOutcome
    where
        T: Send + Sync + 'static,
        R: Sentinel + Send + 'static,
        F: Fn(&WorkItem<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CallError>> + Send + 'static,
        C: Future<Output = ()>,
    {
        if indices.is_empty() {
            return BatchOutcome::Completed;
        }
        match strategy {
            DispatchStrategy::Cooperative => run_cooperative(shared, indices, slots, cancel).await,
            DispatchStrategy::WorkerPool => {
                let workers = self.config.effective_worker_threads();
                run_worker_pool(shared, indices, workers, slots, cancel).await
            }
        }
    }
}

/// All items of the batch as tasks on the async runtime
async fn run_cooperative<T, R, F, Fut, C>(
    shared: &Arc<Shared<T, F>>,
    indices: Vec<usize>,
    slots: &mut Slots<R>,
    cancel: &mut Pin<&mut C>,
) -> BatchOutcome
where
    T: Send + Sync + 'static,
    R: Sentinel + Send + 'static,
    F: Fn(&WorkItem<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CallError>> + Send + 'static,
    C: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task_shared = shared.clone();

    let handle = tokio::spawn(async move {
        let shared = &task_shared;
        let mut in_flight: FuturesUnordered<_> = indices
            .into_iter()
            .map(|idx| async move { (idx, shared.run_item(idx).await) })
            .collect();

        while let Some((idx, result)) = in_flight.next().await {
            if tx.send((idx, result)).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some((idx, result)) => slots.store(idx, result),
                None => break,
            },
            _ = cancel.as_mut() => {
                handle.abort();
                slots.drain(&mut rx);
                return BatchOutcome::Cancelled;
            }
        }
    }

    match handle.await {
        Ok(()) => BatchOutcome::Completed,
        Err(e) => BatchOutcome::TransportFailed(e.to_string()),
    }
}

/// Fixed set of blocking threads pulling items off a shared cursor
async fn run_worker_pool<T, R, F, Fut, C>(
    shared: &Arc<Shared<T, F>>,
    indices: Vec<usize>,
    workers: usize,
    slots: &mut Slots<R>,
    cancel: &mut Pin<&mut C>,
) -> BatchOutcome
where
    T: Send + Sync + 'static,
    R: Sentinel + Send + 'static,
    F: Fn(&WorkItem<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CallError>> + Send + 'static,
    C: Future<Output = ()>,
{
    let workers = workers.clamp(1, indices.len().max(1));
    let queue = Arc::new(indices);
    let cursor = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = Handle::current();

    debug!(workers, items = queue.len(), "Starting worker pool");

    for _ in 0..workers {
        let shared = shared.clone();
        let queue = queue.clone();
        let cursor = cursor.clone();
        let stop = stop.clone();
        let tx = tx.clone();
        let handle = handle.clone();

        tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::Relaxed) {
                let Some(&idx) = queue.get(cursor.fetch_add(1, Ordering::Relaxed)) else {
                    break;
                };
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    handle.block_on(shared.run_item(idx))
                }))
                .unwrap_or_else(|_| Err(CallError::fatal("worker panicked while processing item")));

                if tx.send((idx, result)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some((idx, result)) => slots.store(idx, result),
                None => return BatchOutcome::Completed,
            },
            _ = cancel.as_mut() => {
                stop.store(true, Ordering::Relaxed);
                slots.drain(&mut rx);
                return BatchOutcome::Cancelled;
            }
        }
    }
}
