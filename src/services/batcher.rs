//! Size/time bounded batcher, generic over the parameter type it buffers.
//!
//! A batcher is owned by exactly one topic worker. It is built from two
//! closures: `parse` turns a bus message into a parameter and `submit` applies a
//! slice of parameters to the mirror store. Offsets are committed only after a
//! successful submit.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::consumer::{ConsumeError, OffsetCommitter, PartitionOffset};
use super::mirror_store::StoreError;
use super::normalizer::ParseError;
use crate::models::message::RawMessage;

pub const DEFAULT_MAX_SIZE: usize = 250;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

pub type ParseFn<P> = Box<dyn Fn(&RawMessage) -> Result<P, ParseError> + Send>;
pub type SubmitFn<P> = Box<dyn Fn(&[P]) -> Result<(), StoreError> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchError {
    Parse(ParseError),
    Store(StoreError),
    Commit(ConsumeError),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::Parse(e) => write!(f, "Failed to parse message: {}", e),
            BatchError::Store(e) => write!(f, "Failed to apply batch: {}", e),
            BatchError::Commit(e) => write!(f, "Batch applied but offsets not committed: {}", e),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchError::Parse(e) => Some(e),
            BatchError::Store(e) => Some(e),
            BatchError::Commit(e) => Some(e),
        }
    }
}

impl From<ParseError> for BatchError {
    fn from(e: ParseError) -> Self {
        BatchError::Parse(e)
    }
}

pub struct Batcher<P> {
    name: String,
    max_size: usize,
    timeout: Duration,
    parse: ParseFn<P>,
    submit: SubmitFn<P>,
    buffer: Vec<P>,
    next_timeout: Option<Instant>,
    /// Highest buffered offset per (topic, partition)
    pending: HashMap<(String, i32), i64>,
    /// Highest offset ever committed per (topic, partition)
    committed: HashMap<(String, i32), i64>,
}

impl<P> Batcher<P> {
    pub fn new(
        name: impl Into<String>,
        max_size: usize,
        timeout: Duration,
        parse: ParseFn<P>,
        submit: SubmitFn<P>,
    ) -> Self {
        Self {
            name: name.into(),
            max_size: max_size.max(1),
            timeout,
            parse,
            submit,
            buffer: Vec::with_capacity(max_size),
            next_timeout: None,
            pending: HashMap::new(),
            committed: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn add(&mut self, msg: &RawMessage) -> Result<(), BatchError> {
        self.add_at(msg, Instant::now())
    }

    /// Parse and buffer a message. A message that fails to parse is not enqueued.
    pub fn add_at(&mut self, msg: &RawMessage, now: Instant) -> Result<(), BatchError> {
        let param = (self.parse)(msg)?;

        self.buffer.push(param);
        self.next_timeout = Some(now + self.timeout);

        let offset = self
            .pending
            .entry((msg.topic.clone(), msg.partition))
            .or_insert(msg.offset);
        *offset = (*offset).max(msg.offset);

        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Instant::now())
    }

    pub fn is_ready_at(&self, now: Instant) -> bool {
        if self.buffer.is_empty() {
            return false;
        }

        self.buffer.len() >= self.max_size || self.next_timeout.is_some_and(|deadline| now >= deadline)
    }

    /// Apply the buffer, then commit its offsets. On any failure the buffer is
    /// kept and nothing further is committed.
    pub fn submit(&mut self, committer: &dyn OffsetCommitter) -> Result<(), BatchError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        (self.submit)(&self.buffer).map_err(BatchError::Store)?;

        let offsets = self.offsets_to_commit();
        if !offsets.is_empty() {
            committer.commit_offsets(&offsets).map_err(BatchError::Commit)?;
        }

        for offset in &offsets {
            self.committed
                .insert((offset.topic.clone(), offset.partition), offset.offset);
        }

        debug!(
            batcher = %self.name,
            size = self.buffer.len(),
            partitions = offsets.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch applied and committed"
        );

        self.clear();
        Ok(())
    }

    /// Discard everything buffered, used when the owning worker restarts
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            info!(batcher = %self.name, dropped = self.buffer.len(), "Resetting batcher");
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.next_timeout = None;
    }

    /// Pending offsets that move a partition forward. Offsets at or below the
    /// committed high-water mark are never sent again.
    fn offsets_to_commit(&self) -> Vec<PartitionOffset> {
        let mut offsets: Vec<PartitionOffset> = self
            .pending
            .iter()
            .filter(|(tp, offset)| self.committed.get(*tp).is_none_or(|c| **offset > *c))
            .map(|((topic, partition), offset)| PartitionOffset {
                topic: topic.clone(),
                partition: *partition,
                offset: *offset,
            })
            .collect();

        offsets.sort_by(|a, b| (&a.topic, a.partition).cmp(&(&b.topic, b.partition)));
        offsets
    }
}
