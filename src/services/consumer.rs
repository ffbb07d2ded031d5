//! Event bus consumer seam
//!
//! Workers only talk to the [`EventConsumer`] trait. The production
//! implementation is an rdkafka `BaseConsumer` with manual offset commits whose
//! rebalance callback flushes the worker's batch before partitions are released.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::batcher::{BatchError, Batcher};
use crate::models::message::RawMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeError {
    Config(String),
    Subscribe(String),
    Poll(String),
    Commit(String),
    Rebalance(String),
}

impl std::fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumeError::Config(msg) => write!(f, "Consumer configuration error: {}", msg),
            ConsumeError::Subscribe(msg) => write!(f, "Subscribe failed: {}", msg),
            ConsumeError::Poll(msg) => write!(f, "Poll failed: {}", msg),
            ConsumeError::Commit(msg) => write!(f, "Offset commit failed: {}", msg),
            ConsumeError::Rebalance(msg) => write!(f, "Rebalance failed: {}", msg),
        }
    }
}

impl std::error::Error for ConsumeError {}

/// Last processed offset of one partition. Committers store `offset + 1`,
/// the position of the next message to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

pub trait OffsetCommitter {
    /// Synchronously commit the given offsets
    fn commit_offsets(&self, offsets: &[PartitionOffset]) -> Result<(), ConsumeError>;
}

pub trait EventConsumer: OffsetCommitter {
    fn subscribe(&self, topic: &str) -> Result<(), ConsumeError>;

    /// `None` means the read deadline passed without a message. Rebalance
    /// callbacks run inline during this call.
    fn poll_event(&self, timeout: Duration) -> Option<Result<RawMessage, ConsumeError>>;

    /// Failure recorded by a rebalance callback since the last call
    fn take_rebalance_error(&self) -> Option<ConsumeError>;
}

/// Invoked inline when partitions are revoked, before they are released
pub trait RevokeHandler: Send + Sync {
    fn on_revoke(&self, committer: &dyn OffsetCommitter) -> Result<(), BatchError>;
}

impl<P: Send> RevokeHandler for Mutex<Batcher<P>> {
    fn on_revoke(&self, committer: &dyn OffsetCommitter) -> Result<(), BatchError> {
        self.lock().submit(committer)
    }
}

pub trait ConsumerFactory: Send + Sync {
    type Consumer: EventConsumer;

    fn connect(
        &self,
        worker: &str,
        revoke: Arc<dyn RevokeHandler>,
    ) -> Result<Self::Consumer, ConsumeError>;
}

/// Connection settings shared by every worker in the consumer group
#[derive(Debug, Clone)]
pub struct KafkaConsumerFactory {
    bootstrap_servers: String,
    group_id: String,
    sasl_username: String,
    sasl_password: String,
}

impl KafkaConsumerFactory {
    pub fn new(
        bootstrap_servers: String,
        group_id: String,
        sasl_username: String,
        sasl_password: String,
    ) -> Self {
        Self {
            bootstrap_servers,
            group_id,
            sasl_username,
            sasl_password,
        }
    }

    fn client_config(&self, worker: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("client.id", worker)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", &self.sasl_username)
            .set("sasl.password", &self.sasl_password);
        config
    }
}

impl ConsumerFactory for KafkaConsumerFactory {
    type Consumer = KafkaEventConsumer;

    fn connect(
        &self,
        worker: &str,
        revoke: Arc<dyn RevokeHandler>,
    ) -> Result<KafkaEventConsumer, ConsumeError> {
        let context = MirrorContext {
            worker: worker.to_string(),
            revoke,
            rebalance_err: Mutex::new(None),
        };

        let inner: BaseConsumer<MirrorContext> = self
            .client_config(worker)
            .create_with_context(context)
            .map_err(|e| ConsumeError::Config(e.to_string()))?;

        Ok(KafkaEventConsumer { inner })
    }
}

/// rdkafka context carrying the worker's revoke handler and the slot a failing
/// rebalance callback writes into
pub struct MirrorContext {
    worker: String,
    revoke: Arc<dyn RevokeHandler>,
    rebalance_err: Mutex<Option<ConsumeError>>,
}

impl ClientContext for MirrorContext {}

impl ConsumerContext for MirrorContext {
    fn pre_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                info!(
                    worker = %self.worker,
                    partitions = tpl.count(),
                    "Partitions revoked, flushing batch"
                );
                if let Err(e) = self.revoke.on_revoke(base_consumer) {
                    error!(worker = %self.worker, error = %e, "Flush on revoke failed");
                    *self.rebalance_err.lock() =
                        Some(ConsumeError::Rebalance(format!("flush on revoke: {}", e)));
                }
            }
            Rebalance::Assign(tpl) => {
                info!(worker = %self.worker, partitions = tpl.count(), "Partitions assigned");
            }
            Rebalance::Error(e) => {
                warn!(worker = %self.worker, error = %e, "Rebalance error");
                *self.rebalance_err.lock() = Some(ConsumeError::Rebalance(e.to_string()));
            }
        }
    }
}

impl OffsetCommitter for BaseConsumer<MirrorContext> {
    fn commit_offsets(&self, offsets: &[PartitionOffset]) -> Result<(), ConsumeError> {
        let mut tpl = TopicPartitionList::new();
        for po in offsets {
            tpl.add_partition_offset(&po.topic, po.partition, Offset::Offset(po.offset + 1))
                .map_err(|e| ConsumeError::Commit(e.to_string()))?;
        }

        self.commit(&tpl, CommitMode::Sync)
            .map_err(|e| ConsumeError::Commit(e.to_string()))
    }
}

pub struct KafkaEventConsumer {
    inner: BaseConsumer<MirrorContext>,
}

impl OffsetCommitter for KafkaEventConsumer {
    fn commit_offsets(&self, offsets: &[PartitionOffset]) -> Result<(), ConsumeError> {
        self.inner.commit_offsets(offsets)
    }
}

impl EventConsumer for KafkaEventConsumer {
    fn subscribe(&self, topic: &str) -> Result<(), ConsumeError> {
        self.inner
            .subscribe(&[topic])
            .map_err(|e| ConsumeError::Subscribe(format!("{}: {}", topic, e)))
    }

    fn poll_event(&self, timeout: Duration) -> Option<Result<RawMessage, ConsumeError>> {
        self.inner.poll(timeout).map(|result| {
            result
                .map(|msg| raw_message(&msg))
                .map_err(|e| ConsumeError::Poll(e.to_string()))
        })
    }

    fn take_rebalance_error(&self) -> Option<ConsumeError> {
        self.inner.context().rebalance_err.lock().take()
    }
}

fn raw_message(msg: &BorrowedMessage<'_>) -> RawMessage {
    let headers: HashMap<String, Vec<u8>> = msg
        .headers()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|h| h.value.map(|v| (h.key.to_string(), v.to_vec())))
                .collect()
        })
        .unwrap_or_default();

    RawMessage {
        key: msg.key().map(<[u8]>::to_vec),
        value: msg.payload().map(<[u8]>::to_vec),
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        timestamp: msg
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_disables_auto_commit() {
        let factory = KafkaConsumerFactory::new(
            "broker:9092".to_string(),
            "mirror".to_string(),
            "user".to_string(),
            "pass".to_string(),
        );
        let config = factory.client_config("ethereum.owner.v4#0");

        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(config.get("sasl.mechanisms"), Some("PLAIN"));
        assert_eq!(config.get("group.id"), Some("mirror"));
        assert_eq!(config.get("client.id"), Some("ethereum.owner.v4#0"));
    }
}
