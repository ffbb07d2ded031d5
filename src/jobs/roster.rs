//! Default worker roster: every chain × record kind topic, each consumed by
//! several workers of the same group so partitions spread across them.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use super::topic_worker::{MirrorWorker, TopicWorker, DEFAULT_STATS_INTERVAL};
use crate::models::chain::{Chain, RecordKind, TopicName};
use crate::models::message::RawMessage;
use crate::models::owner::{OwnerParam, OwnerRecord};
use crate::models::token::{TokenParam, TokenRecord};
use crate::services::batcher::{Batcher, ParseFn, SubmitFn, DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT};
use crate::services::consumer::ConsumerFactory;
use crate::services::decoder::AvroDecoder;
use crate::services::mirror_store::MirrorStore;
use crate::services::normalizer::{normalize_owner, normalize_token, parse_message};

pub const DEFAULT_TOPIC_VERSION: u32 = 4;
pub const DEFAULT_WORKERS_PER_TOPIC: usize = 2;

#[derive(Debug, Clone)]
pub struct RosterSettings {
    pub topic_version: u32,
    pub workers_per_topic: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub stats_interval: Duration,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            topic_version: DEFAULT_TOPIC_VERSION,
            workers_per_topic: DEFAULT_WORKERS_PER_TOPIC,
            batch_size: DEFAULT_MAX_SIZE,
            batch_timeout: DEFAULT_TIMEOUT,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

impl RosterSettings {
    pub fn topics(&self) -> Vec<TopicName> {
        Chain::ALL
            .iter()
            .flat_map(|chain| {
                RecordKind::ALL
                    .iter()
                    .map(move |kind| TopicName::new(*chain, *kind, self.topic_version))
            })
            .collect()
    }

    pub fn roster_size(&self) -> usize {
        Chain::ALL.len() * RecordKind::ALL.len() * self.workers_per_topic
    }
}

/// Decode and normalize owner messages for one chain, apply them to its owners table.
/// Async collaborators are driven through `handle`, so the batcher must run on a
/// blocking thread.
pub fn owner_batcher(
    name: &str,
    chain: Chain,
    decoder: AvroDecoder,
    store: Arc<dyn MirrorStore>,
    handle: Handle,
    settings: &RosterSettings,
) -> Batcher<OwnerParam> {
    let parse_handle = handle.clone();
    let parse: ParseFn<OwnerParam> = Box::new(move |msg: &RawMessage| {
        parse_message(
            msg,
            |payload| parse_handle.block_on(decoder.decode::<OwnerRecord>(payload)),
            |envelope, record| normalize_owner(chain, envelope, record),
        )
    });

    let submit: SubmitFn<OwnerParam> =
        Box::new(move |batch: &[OwnerParam]| handle.block_on(store.apply_owners(chain, batch)));

    Batcher::new(name, settings.batch_size, settings.batch_timeout, parse, submit)
}

pub fn token_batcher(
    name: &str,
    chain: Chain,
    decoder: AvroDecoder,
    store: Arc<dyn MirrorStore>,
    handle: Handle,
    settings: &RosterSettings,
) -> Batcher<TokenParam> {
    let parse_handle = handle.clone();
    let parse: ParseFn<TokenParam> = Box::new(move |msg: &RawMessage| {
        parse_message(
            msg,
            |payload| parse_handle.block_on(decoder.decode::<TokenRecord>(payload)),
            |envelope, record| normalize_token(chain, envelope, record),
        )
    });

    let submit: SubmitFn<TokenParam> =
        Box::new(move |batch: &[TokenParam]| handle.block_on(store.apply_tokens(chain, batch)));

    Batcher::new(name, settings.batch_size, settings.batch_timeout, parse, submit)
}

pub fn build_roster<F>(
    settings: &RosterSettings,
    factory: Arc<F>,
    decoder: AvroDecoder,
    store: Arc<dyn MirrorStore>,
    handle: Handle,
) -> Vec<Arc<dyn MirrorWorker>>
where
    F: ConsumerFactory + 'static,
{
    let mut roster: Vec<Arc<dyn MirrorWorker>> = Vec::with_capacity(settings.roster_size());

    for topic in settings.topics() {
        for slot in 0..settings.workers_per_topic {
            let name = format!("{}#{}", topic, slot);
            let worker: Arc<dyn MirrorWorker> = match topic.kind {
                RecordKind::Owner => Arc::new(TopicWorker::new(
                    name.clone(),
                    topic.to_string(),
                    factory.clone(),
                    owner_batcher(&name, topic.chain, decoder.clone(), store.clone(), handle.clone(), settings),
                    settings.stats_interval,
                )),
                RecordKind::Token => Arc::new(TopicWorker::new(
                    name.clone(),
                    topic.to_string(),
                    factory.clone(),
                    token_batcher(&name, topic.chain, decoder.clone(), store.clone(), handle.clone(), settings),
                    settings.stats_interval,
                )),
            };
            roster.push(worker);
        }
    }

    roster
}
