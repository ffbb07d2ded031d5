//! Topic worker: one consumer, one batcher, a blocking poll loop
//!
//! A worker runs on its own blocking thread. The batcher is shared with the
//! consumer's rebalance callback, which only ever fires from inside
//! `poll_event`, so the lock is never contended by two live callers.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::models::message::{Action, RawMessage};
use crate::services::batcher::{BatchError, Batcher};
use crate::services::consumer::{ConsumeError, ConsumerFactory, EventConsumer, RevokeHandler};

pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerError {
    Consume(ConsumeError),
    Rebalance(ConsumeError),
    Batch(BatchError),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Consume(e) => write!(f, "Consumer error: {}", e),
            WorkerError::Rebalance(e) => write!(f, "Rebalance callback error: {}", e),
            WorkerError::Batch(e) => write!(f, "Batch error: {}", e),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Consume(e) | WorkerError::Rebalance(e) => Some(e),
            WorkerError::Batch(e) => Some(e),
        }
    }
}

impl From<ConsumeError> for WorkerError {
    fn from(e: ConsumeError) -> Self {
        WorkerError::Consume(e)
    }
}

impl From<BatchError> for WorkerError {
    fn from(e: BatchError) -> Self {
        WorkerError::Batch(e)
    }
}

/// Unit of supervision. `run` blocks until cancellation or failure.
pub trait MirrorWorker: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, ct: &CancellationToken) -> Result<(), WorkerError>;
    fn reset(&self);
}

/// Per-action counters, reported and cleared once per interval
#[derive(Debug)]
pub struct WorkerStats {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub unknown: u64,
    since: Instant,
    interval: Duration,
}

impl WorkerStats {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            inserts: 0,
            updates: 0,
            deletes: 0,
            unknown: 0,
            since: now,
            interval,
        }
    }

    pub fn record(&mut self, action: Option<Action>) {
        match action {
            Some(Action::Insert) => self.inserts += 1,
            Some(Action::Update) => self.updates += 1,
            Some(Action::Delete) => self.deletes += 1,
            None => self.unknown += 1,
        }
    }

    /// Emit the stats line when the interval has elapsed. Returns whether it did.
    pub fn maybe_report(&mut self, worker: &str, now: Instant) -> bool {
        if now.duration_since(self.since) < self.interval {
            return false;
        }

        info!(
            worker,
            inserts = self.inserts,
            updates = self.updates,
            deletes = self.deletes,
            unknown = self.unknown,
            interval_secs = self.interval.as_secs(),
            "Worker stats"
        );

        *self = Self::new(self.interval, now);
        true
    }
}

pub struct TopicWorker<P, F> {
    name: String,
    topic: String,
    factory: Arc<F>,
    batcher: Arc<Mutex<Batcher<P>>>,
    stats_interval: Duration,
}

impl<P, F> TopicWorker<P, F>
where
    P: Send + 'static,
    F: ConsumerFactory,
{
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        factory: Arc<F>,
        batcher: Batcher<P>,
        stats_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            factory,
            batcher: Arc::new(Mutex::new(batcher)),
            stats_interval,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn consume(&self, consumer: &F::Consumer, ct: &CancellationToken) -> Result<(), WorkerError> {
        let mut stats = WorkerStats::new(self.stats_interval, Instant::now());

        loop {
            if ct.is_cancelled() {
                info!(worker = %self.name, topic = %self.topic, "Shutdown requested, flushing batch");
                return self.flush(consumer);
            }

            let event = consumer.poll_event(POLL_TIMEOUT);

            if let Some(e) = consumer.take_rebalance_error() {
                return Err(WorkerError::Rebalance(e));
            }

            match event {
                None => self.submit_if_ready(consumer)?,
                Some(Err(e)) => return Err(WorkerError::Consume(e)),
                Some(Ok(msg)) => {
                    stats.record(msg.action());
                    self.add(&msg)?;
                    self.submit_if_ready(consumer)?;
                }
            }

            stats.maybe_report(&self.name, Instant::now());
        }
    }

    fn add(&self, msg: &RawMessage) -> Result<(), WorkerError> {
        self.batcher.lock().add(msg).map_err(|e| {
            error!(
                worker = %self.name,
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "Failed to add message to batch"
            );
            WorkerError::Batch(e)
        })
    }

    fn submit_if_ready(&self, consumer: &F::Consumer) -> Result<(), WorkerError> {
        let mut batcher = self.batcher.lock();
        if !batcher.is_ready() {
            return Ok(());
        }

        let size = batcher.len();
        batcher.submit(consumer).map_err(|e| {
            error!(worker = %self.name, topic = %self.topic, size, error = %e, "Failed to submit batch");
            WorkerError::Batch(e)
        })
    }

    fn flush(&self, consumer: &F::Consumer) -> Result<(), WorkerError> {
        self.batcher.lock().submit(consumer).map_err(WorkerError::Batch)
    }
}

impl<P, F> MirrorWorker for TopicWorker<P, F>
where
    P: Send + 'static,
    F: ConsumerFactory,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ct: &CancellationToken) -> Result<(), WorkerError> {
        let revoke: Arc<dyn RevokeHandler> = self.batcher.clone();
        let consumer = self.factory.connect(&self.name, revoke)?;
        consumer.subscribe(&self.topic)?;
        info!(worker = %self.name, topic = %self.topic, "Subscribed");

        let result = self.consume(&consumer, ct);
        if result.is_err() {
            // Closing the consumer revokes its partitions; the failed batch must
            // not be retried from that callback.
            self.reset();
        }
        debug!(worker = %self.name, "Closing consumer");
        drop(consumer);

        result
    }

    fn reset(&self) {
        self.batcher.lock().reset();
    }
}
