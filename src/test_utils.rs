//! Shared fakes and fixtures for unit tests

use apache_avro::types::Value as AvroValue;
use apache_avro::{to_avro_datum, Schema};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::chain::Chain;
use crate::models::message::{RawMessage, MOD_TYPE_HEADER};
use crate::models::owner::{OwnerParam, OwnerRecord, OwnerRow};
use crate::models::param::MirrorOp;
use crate::models::token::{TokenParam, TokenRecord, TokenRow};
use crate::services::batcher::{Batcher, ParseFn, SubmitFn};
use crate::services::consumer::{
    ConsumeError, ConsumerFactory, EventConsumer, OffsetCommitter, PartitionOffset, RevokeHandler,
};
use crate::services::decoder::{DecodeError, MAGIC_BYTE};
use crate::services::mirror_store::{MirrorStore, StoreError};
use crate::services::normalizer::{normalize_owner, parse_message};
use crate::services::schema_registry::SchemaSource;

pub const OWNER_SCHEMA: &str = r#"{
    "type": "record",
    "name": "Owner",
    "namespace": "simplehash",
    "fields": [
        {"name": "nft_id", "type": "string"},
        {"name": "owner_address", "type": ["null", "string"], "default": null},
        {"name": "quantity", "type": ["null", "string"], "default": null},
        {"name": "collection_id", "type": ["null", "string"], "default": null},
        {"name": "first_acquired_date", "type": ["null", "string"], "default": null},
        {"name": "last_acquired_date", "type": ["null", "string"], "default": null},
        {"name": "first_acquired_transaction", "type": ["null", "string"], "default": null},
        {"name": "last_acquired_transaction", "type": ["null", "string"], "default": null},
        {"name": "minted_to_this_wallet", "type": ["null", "boolean"], "default": null},
        {"name": "airdropped_to_this_wallet", "type": ["null", "boolean"], "default": null},
        {"name": "sold_to_this_wallet", "type": ["null", "boolean"], "default": null}
    ]
}"#;

pub const TOKEN_SCHEMA: &str = r#"{
    "type": "record",
    "name": "Token",
    "namespace": "simplehash",
    "fields": [
        {"name": "nft_id", "type": "string"},
        {"name": "contract_address", "type": ["null", "string"], "default": null},
        {"name": "name", "type": ["null", "string"], "default": null},
        {"name": "collection_id", "type": ["null", "string"], "default": null},
        {"name": "status", "type": ["null", "string"], "default": null},
        {"name": "token_count", "type": ["null", "string"], "default": null}
    ]
}"#;

/// Schema source backed by a fixed id → schema table
#[derive(Default)]
pub struct StaticSchemaSource {
    schemas: HashMap<u32, Arc<Schema>>,
}

impl StaticSchemaSource {
    pub fn with_schema(mut self, id: u32, schema: &str) -> Self {
        let schema = Schema::parse_str(schema).unwrap();
        self.schemas.insert(id, Arc::new(schema));
        self
    }

    pub fn with_owner_schema(id: u32) -> Self {
        Self::default().with_schema(id, OWNER_SCHEMA)
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn schema(&self, id: u32) -> Result<Arc<Schema>, DecodeError> {
        self.schemas
            .get(&id)
            .cloned()
            .ok_or(DecodeError::UnknownSchema(id))
    }
}

fn opt_string(value: &Option<String>) -> AvroValue {
    match value {
        None => AvroValue::Union(0, Box::new(AvroValue::Null)),
        Some(s) => AvroValue::Union(1, Box::new(AvroValue::String(s.clone()))),
    }
}

fn opt_bool(value: Option<bool>) -> AvroValue {
    match value {
        None => AvroValue::Union(0, Box::new(AvroValue::Null)),
        Some(b) => AvroValue::Union(1, Box::new(AvroValue::Boolean(b))),
    }
}

fn wire_format(schema_id: u32, schema: &str, record: AvroValue) -> Vec<u8> {
    let schema = Schema::parse_str(schema).unwrap();
    let body = to_avro_datum(&schema, record).unwrap();

    let mut payload = vec![MAGIC_BYTE];
    payload.extend_from_slice(&schema_id.to_be_bytes());
    payload.extend_from_slice(&body);
    payload
}

/// Encode an owner record the way the upstream producer does
pub fn encode_owner(schema_id: u32, record: &OwnerRecord) -> Vec<u8> {
    let value = AvroValue::Record(vec![
        ("nft_id".to_string(), AvroValue::String(record.nft_id.clone())),
        ("owner_address".to_string(), opt_string(&record.owner_address)),
        ("quantity".to_string(), opt_string(&record.quantity)),
        ("collection_id".to_string(), opt_string(&record.collection_id)),
        ("first_acquired_date".to_string(), opt_string(&record.first_acquired_date)),
        ("last_acquired_date".to_string(), opt_string(&record.last_acquired_date)),
        (
            "first_acquired_transaction".to_string(),
            opt_string(&record.first_acquired_transaction),
        ),
        (
            "last_acquired_transaction".to_string(),
            opt_string(&record.last_acquired_transaction),
        ),
        ("minted_to_this_wallet".to_string(), opt_bool(record.minted_to_this_wallet)),
        ("airdropped_to_this_wallet".to_string(), opt_bool(record.airdropped_to_this_wallet)),
        ("sold_to_this_wallet".to_string(), opt_bool(record.sold_to_this_wallet)),
    ]);
    wire_format(schema_id, OWNER_SCHEMA, value)
}

pub fn encode_token(schema_id: u32, record: &TokenRecord) -> Vec<u8> {
    let value = AvroValue::Record(vec![
        ("nft_id".to_string(), AvroValue::String(record.nft_id.clone())),
        ("contract_address".to_string(), opt_string(&record.contract_address)),
        ("name".to_string(), opt_string(&record.name)),
        ("collection_id".to_string(), opt_string(&record.collection_id)),
        ("status".to_string(), opt_string(&record.status)),
        ("token_count".to_string(), opt_string(&record.token_count)),
    ]);
    wire_format(schema_id, TOKEN_SCHEMA, value)
}

pub fn owner_record(nft_id: &str, owner: Option<&str>, quantity: Option<&str>) -> OwnerRecord {
    OwnerRecord {
        nft_id: nft_id.to_string(),
        owner_address: owner.map(str::to_string),
        quantity: quantity.map(str::to_string),
        ..Default::default()
    }
}

pub fn token_record(nft_id: &str, contract: Option<&str>, collection: Option<&str>) -> TokenRecord {
    TokenRecord {
        nft_id: nft_id.to_string(),
        contract_address: contract.map(str::to_string),
        collection_id: collection.map(str::to_string),
        ..Default::default()
    }
}

pub fn message(topic: &str, key: &str, mod_type: &str, offset: i64, value: Vec<u8>) -> RawMessage {
    RawMessage {
        key: Some(key.as_bytes().to_vec()),
        value: Some(value),
        topic: topic.to_string(),
        partition: 0,
        offset,
        timestamp: None,
        headers: HashMap::new(),
    }
    .with_header(MOD_TYPE_HEADER, mod_type)
}

/// Message on `ethereum.owner.v4` whose value is not meant to be decoded
pub fn owner_message(key: &str, mod_type: &str, offset: i64) -> RawMessage {
    message("ethereum.owner.v4", key, mod_type, offset, vec![MAGIC_BYTE])
}

/// Committer that records every commit call
#[derive(Default)]
pub struct RecordingCommitter {
    commits: Mutex<Vec<Vec<PartitionOffset>>>,
    fail: bool,
}

impl RecordingCommitter {
    pub fn failing() -> Self {
        Self {
            commits: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn commits(&self) -> Vec<Vec<PartitionOffset>> {
        self.commits.lock().clone()
    }
}

impl OffsetCommitter for RecordingCommitter {
    fn commit_offsets(&self, offsets: &[PartitionOffset]) -> Result<(), ConsumeError> {
        if self.fail {
            return Err(ConsumeError::Commit("broker unavailable".to_string()));
        }
        self.commits.lock().push(offsets.to_vec());
        Ok(())
    }
}

/// Terminal state of the in-memory mirror
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorSnapshot {
    pub owners: HashMap<(Chain, String), OwnerRow>,
    pub tokens: HashMap<(Chain, String), TokenRow>,
    /// (chain, address) → simplehash_lookup_nft_id
    pub contracts: HashMap<(Chain, String), String>,
    /// (chain, id) → simplehash_lookup_nft_id
    pub collections: HashMap<(Chain, String), String>,
}

/// In-memory mirror with the same upsert, delete and first-sight semantics as
/// the Postgres store. A failing batch leaves the state untouched.
#[derive(Default)]
pub struct MemoryMirrorStore {
    state: Mutex<MirrorSnapshot>,
    fail_next: Mutex<Option<StoreError>>,
}

impl MemoryMirrorStore {
    pub fn snapshot(&self) -> MirrorSnapshot {
        self.state.lock().clone()
    }

    pub fn fail_next(&self, err: StoreError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn apply_owner_batch(&self, chain: Chain, batch: &[OwnerParam]) -> Result<(), StoreError> {
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }

        let mut state = self.state.lock();
        for param in batch {
            let key = (chain, param.simplehash_kafka_key.clone());
            match &param.op {
                MirrorOp::Delete => {
                    state.owners.remove(&key);
                }
                MirrorOp::Upsert(row) => {
                    state.owners.insert(key, row.clone());
                }
            }
        }
        Ok(())
    }

    pub fn apply_token_batch(&self, chain: Chain, batch: &[TokenParam]) -> Result<(), StoreError> {
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }

        let mut state = self.state.lock();
        for param in batch {
            let key = (chain, param.simplehash_kafka_key.clone());
            match &param.op {
                MirrorOp::Delete => {
                    state.tokens.remove(&key);
                }
                MirrorOp::Upsert(row) => {
                    if !row.contract_address.is_empty() {
                        state
                            .contracts
                            .entry((chain, row.contract_address.clone()))
                            .or_insert_with(|| row.simplehash_nft_id.clone());
                    }
                    if let Some(collection_id) = &row.collection_id {
                        state
                            .collections
                            .entry((chain, collection_id.clone()))
                            .or_insert_with(|| row.simplehash_nft_id.clone());
                    }
                    state.tokens.insert(key, row.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorStore for MemoryMirrorStore {
    async fn apply_owners(&self, chain: Chain, batch: &[OwnerParam]) -> Result<(), StoreError> {
        self.apply_owner_batch(chain, batch)
    }

    async fn apply_tokens(&self, chain: Chain, batch: &[TokenParam]) -> Result<(), StoreError> {
        self.apply_token_batch(chain, batch)
    }
}

/// One step of a scripted consumer session
pub enum ScriptEvent {
    Message(RawMessage),
    /// Poll deadline passes with no message
    Timeout,
    /// Partitions are revoked from inside the poll call
    Revoke,
    Error(ConsumeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerLog {
    Connected(String),
    Subscribed(String),
    Commit(Vec<PartitionOffset>),
    Unassigned,
    /// The script ran out and the session was cancelled
    Drained,
}

/// Consumer replaying a fixed script. Revokes call the handler inline the way
/// the bus client does; once drained it cancels the session's token.
pub struct ScriptedConsumer {
    events: Mutex<VecDeque<ScriptEvent>>,
    revoke: Arc<dyn RevokeHandler>,
    rebalance_err: Mutex<Option<ConsumeError>>,
    fail_commits: bool,
    log: Arc<Mutex<Vec<ConsumerLog>>>,
    ct: CancellationToken,
}

impl OffsetCommitter for ScriptedConsumer {
    fn commit_offsets(&self, offsets: &[PartitionOffset]) -> Result<(), ConsumeError> {
        if self.fail_commits {
            return Err(ConsumeError::Commit("coordinator not available".to_string()));
        }
        self.log.lock().push(ConsumerLog::Commit(offsets.to_vec()));
        Ok(())
    }
}

impl EventConsumer for ScriptedConsumer {
    fn subscribe(&self, topic: &str) -> Result<(), ConsumeError> {
        self.log.lock().push(ConsumerLog::Subscribed(topic.to_string()));
        Ok(())
    }

    fn poll_event(&self, timeout: Duration) -> Option<Result<RawMessage, ConsumeError>> {
        let next = self.events.lock().pop_front();
        match next {
            Some(ScriptEvent::Message(msg)) => Some(Ok(msg)),
            Some(ScriptEvent::Timeout) => {
                std::thread::sleep(timeout);
                None
            }
            Some(ScriptEvent::Revoke) => {
                if let Err(e) = self.revoke.on_revoke(self) {
                    *self.rebalance_err.lock() = Some(ConsumeError::Rebalance(e.to_string()));
                }
                self.log.lock().push(ConsumerLog::Unassigned);
                None
            }
            Some(ScriptEvent::Error(e)) => Some(Err(e)),
            None => {
                if !self.ct.is_cancelled() {
                    self.log.lock().push(ConsumerLog::Drained);
                    self.ct.cancel();
                }
                None
            }
        }
    }

    fn take_rebalance_error(&self) -> Option<ConsumeError> {
        self.rebalance_err.lock().take()
    }
}

/// Hands out one script per connect; later connects get an empty session
pub struct ScriptedFactory {
    scripts: Mutex<VecDeque<Vec<ScriptEvent>>>,
    fail_commits: bool,
    log: Arc<Mutex<Vec<ConsumerLog>>>,
    ct: CancellationToken,
}

impl ScriptedFactory {
    pub fn new(scripts: Vec<Vec<ScriptEvent>>, ct: CancellationToken) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            fail_commits: false,
            log: Arc::new(Mutex::new(Vec::new())),
            ct,
        }
    }

    /// Every consumer handed out rejects offset commits
    pub fn with_failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    pub fn log(&self) -> Vec<ConsumerLog> {
        self.log.lock().clone()
    }
}

impl ConsumerFactory for ScriptedFactory {
    type Consumer = ScriptedConsumer;

    fn connect(
        &self,
        worker: &str,
        revoke: Arc<dyn RevokeHandler>,
    ) -> Result<ScriptedConsumer, ConsumeError> {
        self.log.lock().push(ConsumerLog::Connected(worker.to_string()));
        let events = self.scripts.lock().pop_front().unwrap_or_default();

        Ok(ScriptedConsumer {
            events: Mutex::new(events.into_iter().collect()),
            revoke,
            rebalance_err: Mutex::new(None),
            fail_commits: self.fail_commits,
            log: self.log.clone(),
            ct: self.ct.clone(),
        })
    }
}

/// Highest committed offset of every commit call, in call order
pub fn committed_offsets(log: &[ConsumerLog]) -> Vec<i64> {
    log.iter()
        .filter_map(|entry| match entry {
            ConsumerLog::Commit(offsets) => Some(offsets.iter().map(|o| o.offset).max().unwrap_or(-1)),
            _ => None,
        })
        .collect()
}

/// `insert` messages `k0..k{count}` at offsets `0..count`
pub fn owner_inserts(count: i64) -> Vec<ScriptEvent> {
    (0..count)
        .map(|i| ScriptEvent::Message(owner_message(&format!("k{}", i), "insert", i)))
        .collect()
}

/// Owner batcher over the in-memory store. Every upsert decodes to the same
/// record, so rows differ only by message key.
pub fn memory_owner_batcher(
    store: Arc<MemoryMirrorStore>,
    max_size: usize,
    timeout: Duration,
) -> Batcher<OwnerParam> {
    let parse: ParseFn<OwnerParam> = Box::new(|msg: &RawMessage| {
        parse_message(
            msg,
            |_| Ok(owner_record("ethereum.0xABCD.42", Some("0xDEAD"), Some("1"))),
            |env, rec| normalize_owner(Chain::Ethereum, env, rec),
        )
    });
    let submit: SubmitFn<OwnerParam> =
        Box::new(move |batch: &[OwnerParam]| store.apply_owner_batch(Chain::Ethereum, batch));
    Batcher::new("ethereum.owner.v4#0", max_size, timeout, parse, submit)
}
