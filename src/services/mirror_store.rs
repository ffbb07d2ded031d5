//! Upsert executor for the per-chain mirror tables
//!
//! A batch is packed into runs of same-kind elements with distinct keys. Each
//! run goes out as one multi-row statement (token runs add up to two lookup
//! inserts ahead of their upsert). Runs execute in submission order inside a
//! single transaction, so a failed batch leaves no partial writes behind.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, Statement, TransactionTrait, Value,
};
use std::collections::HashSet;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, warn};

use crate::models::chain::Chain;
use crate::models::owner::{OwnerParam, OwnerRow};
use crate::models::param::BatchParam;
use crate::models::token::{TokenParam, TokenRow};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Database(String),
    /// The statement carrying batch elements `index..index + rows` failed.
    /// `key` belongs to element `index`.
    Statement {
        index: usize,
        rows: usize,
        key: String,
        message: String,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::Statement {
                index,
                rows,
                key,
                message,
            } => write!(
                f,
                "Batch elements {}..{} (first key {}) failed: {}",
                index,
                index + rows,
                key,
                message
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Applies ordered batches of parameters to one chain's mirror tables
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn apply_owners(&self, chain: Chain, batch: &[OwnerParam]) -> Result<(), StoreError>;
    async fn apply_tokens(&self, chain: Chain, batch: &[TokenParam]) -> Result<(), StoreError>;
}

pub const OWNER_COLUMNS: &[&str] = &[
    "simplehash_kafka_key",
    "simplehash_nft_id",
    "contract_address",
    "token_id",
    "owner_address",
    "quantity",
    "collection_id",
    "first_acquired_date",
    "last_acquired_date",
    "first_acquired_transaction",
    "last_acquired_transaction",
    "minted_to_this_wallet",
    "airdropped_to_this_wallet",
    "sold_to_this_wallet",
    "kafka_offset",
    "kafka_partition",
    "kafka_timestamp",
];

pub const TOKEN_COLUMNS: &[&str] = &[
    "simplehash_kafka_key",
    "simplehash_nft_id",
    "contract_address",
    "token_id",
    "name",
    "description",
    "previews",
    "image_url",
    "video_url",
    "audio_url",
    "model_url",
    "other_url",
    "background_color",
    "external_url",
    "on_chain_created_date",
    "status",
    "token_count",
    "owner_count",
    "contract",
    "collection_id",
    "last_sale",
    "first_created",
    "rarity",
    "extra_metadata",
    "image_properties",
    "video_properties",
    "audio_properties",
    "model_properties",
    "other_properties",
    "kafka_offset",
    "kafka_partition",
    "kafka_timestamp",
];

/// Postgres accepts at most this many bind parameters in one statement
pub const MAX_BIND_PARAMS: usize = 65535;

/// `rows` parenthesised tuples of `width` consecutive placeholders each
fn value_tuples(rows: usize, width: usize, suffix: &str) -> String {
    (0..rows)
        .map(|r| {
            let placeholders: Vec<String> =
                (1..=width).map(|c| format!("${}", r * width + c)).collect();
            format!("({}{})", placeholders.join(", "), suffix)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row `INSERT ... ON CONFLICT (simplehash_kafka_key) DO UPDATE`
/// overwriting every non-identity column. `last_updated` is always taken from
/// the server clock. The keys of the rows must be distinct.
pub fn upsert_sql(schema: &str, table: &str, columns: &[&str], rows: usize) -> String {
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != "simplehash_kafka_key")
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    format!(
        "INSERT INTO {schema}.{table} ({}, last_updated) VALUES {} \
         ON CONFLICT (simplehash_kafka_key) DO UPDATE SET {}, last_updated = now()",
        columns.join(", "),
        value_tuples(rows, columns.len(), ", now()"),
        updates.join(", "),
    )
}

pub fn delete_sql(schema: &str, table: &str, rows: usize) -> String {
    let placeholders: Vec<String> = (1..=rows).map(|i| format!("${}", i)).collect();
    format!(
        "DELETE FROM {schema}.{table} WHERE simplehash_kafka_key IN ({})",
        placeholders.join(", ")
    )
}

/// Insert-on-first-sight for the `contracts` / `collections` lookup tables
pub fn lookup_sql(schema: &str, table: &str, id_column: &str, rows: usize) -> String {
    format!(
        "INSERT INTO {schema}.{table} ({id_column}, simplehash_lookup_nft_id) VALUES {} \
         ON CONFLICT ({id_column}) DO NOTHING",
        value_tuples(rows, 2, "")
    )
}

/// Split a batch into runs that each fit one multi-row statement. A run holds
/// a single op kind, never repeats a key and stays under the bind limit for
/// `columns` parameters per row. Runs keep submission order.
pub fn chunk_ranges<R>(batch: &[BatchParam<R>], columns: usize) -> Vec<Range<usize>> {
    let max_rows = (MAX_BIND_PARAMS / columns.max(1)).max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut keys: HashSet<&str> = HashSet::new();

    for (i, param) in batch.iter().enumerate() {
        let key = param.simplehash_kafka_key.as_str();
        let split = i > start
            && (param.should_delete() != batch[start].should_delete()
                || i - start >= max_rows
                || keys.contains(key));
        if split {
            ranges.push(start..i);
            start = i;
            keys.clear();
        }
        keys.insert(key);
    }

    if start < batch.len() {
        ranges.push(start..batch.len());
    }
    ranges
}

/// A rendered statement and the run of batch elements it carries
#[derive(Debug)]
pub struct ChunkStatement {
    pub start: usize,
    pub rows: usize,
    pub statement: Statement,
}

fn statement(sql: String, values: Vec<Value>) -> Statement {
    Statement::from_sql_and_values(DatabaseBackend::Postgres, sql, values)
}

fn delete_statement<R>(schema: &str, table: &str, chunk: &[BatchParam<R>]) -> Statement {
    let keys: Vec<Value> = chunk
        .iter()
        .map(|p| p.simplehash_kafka_key.as_str().into())
        .collect();
    statement(delete_sql(schema, table, keys.len()), keys)
}

fn upsert_statement<R>(
    schema: &str,
    table: &str,
    columns: &[&str],
    chunk: &[BatchParam<R>],
    render: fn(&str, &R) -> Vec<Value>,
) -> Statement {
    let mut values = Vec::with_capacity(chunk.len() * columns.len());
    let mut rows = 0;
    for param in chunk {
        if let Some(row) = param.row() {
            values.extend(render(&param.simplehash_kafka_key, row));
            rows += 1;
        }
    }
    statement(upsert_sql(schema, table, columns, rows), values)
}

/// Lookup insert for the first sighting of each id in the chunk, or nothing
/// when no element carries one
fn lookup_statement<'a>(
    schema: &str,
    table: &str,
    id_column: &str,
    ids: impl Iterator<Item = (&'a str, &'a str)>,
) -> Option<Statement> {
    let mut seen = HashSet::new();
    let mut values: Vec<Value> = Vec::new();
    for (id, nft_id) in ids {
        if seen.insert(id) {
            values.push(id.into());
            values.push(nft_id.into());
        }
    }

    if values.is_empty() {
        return None;
    }
    Some(statement(lookup_sql(schema, table, id_column, seen.len()), values))
}

fn owner_values(key: &str, row: &OwnerRow) -> Vec<Value> {
    vec![
        key.into(),
        row.simplehash_nft_id.as_str().into(),
        row.contract_address.as_str().into(),
        row.token_id.clone().into(),
        row.owner_address.clone().into(),
        row.quantity.clone().into(),
        row.collection_id.clone().into(),
        row.first_acquired_date.into(),
        row.last_acquired_date.into(),
        row.first_acquired_transaction.clone().into(),
        row.last_acquired_transaction.clone().into(),
        row.minted_to_this_wallet.into(),
        row.airdropped_to_this_wallet.into(),
        row.sold_to_this_wallet.into(),
        row.audit.kafka_offset.into(),
        row.audit.kafka_partition.into(),
        row.audit.kafka_timestamp.into(),
    ]
}

fn token_values(key: &str, row: &TokenRow) -> Vec<Value> {
    vec![
        key.into(),
        row.simplehash_nft_id.as_str().into(),
        row.contract_address.as_str().into(),
        row.token_id.clone().into(),
        row.name.clone().into(),
        row.description.clone().into(),
        row.previews.clone().into(),
        row.image_url.clone().into(),
        row.video_url.clone().into(),
        row.audio_url.clone().into(),
        row.model_url.clone().into(),
        row.other_url.clone().into(),
        row.background_color.clone().into(),
        row.external_url.clone().into(),
        row.on_chain_created_date.into(),
        row.status.clone().into(),
        row.token_count.clone().into(),
        row.owner_count.clone().into(),
        row.contract.clone().into(),
        row.collection_id.clone().into(),
        row.last_sale.clone().into(),
        row.first_created.clone().into(),
        row.rarity.clone().into(),
        row.extra_metadata.clone().into(),
        row.image_properties.clone().into(),
        row.video_properties.clone().into(),
        row.audio_properties.clone().into(),
        row.model_properties.clone().into(),
        row.other_properties.clone().into(),
        row.audit.kafka_offset.into(),
        row.audit.kafka_partition.into(),
        row.audit.kafka_timestamp.into(),
    ]
}

pub fn owner_statements(chain: Chain, batch: &[OwnerParam]) -> Vec<ChunkStatement> {
    let schema = chain.schema();

    chunk_ranges(batch, OWNER_COLUMNS.len())
        .into_iter()
        .map(|range| {
            let chunk = &batch[range.clone()];
            let statement = if chunk.first().is_some_and(|p| p.should_delete()) {
                delete_statement(schema, "owners", chunk)
            } else {
                upsert_statement(schema, "owners", OWNER_COLUMNS, chunk, owner_values)
            };
            ChunkStatement {
                start: range.start,
                rows: range.len(),
                statement,
            }
        })
        .collect()
}

/// Token upserts first register their contracts and collections so the token
/// rows' foreign keys always resolve. Owner events never touch the lookup tables.
pub fn token_statements(chain: Chain, batch: &[TokenParam]) -> Vec<ChunkStatement> {
    let schema = chain.schema();
    let mut statements = Vec::new();

    for range in chunk_ranges(batch, TOKEN_COLUMNS.len()) {
        let chunk = &batch[range.clone()];
        let tag = |statement: Statement| ChunkStatement {
            start: range.start,
            rows: range.len(),
            statement,
        };

        if chunk.first().is_some_and(|p| p.should_delete()) {
            statements.push(tag(delete_statement(schema, "tokens", chunk)));
            continue;
        }

        let rows = || chunk.iter().filter_map(|p| p.row());
        let contracts = rows()
            .filter(|row| !row.contract_address.is_empty())
            .map(|row| (row.contract_address.as_str(), row.simplehash_nft_id.as_str()));
        if let Some(stmt) = lookup_statement(schema, "contracts", "address", contracts) {
            statements.push(tag(stmt));
        }

        let collections = rows().filter_map(|row| {
            row.collection_id
                .as_deref()
                .map(|id| (id, row.simplehash_nft_id.as_str()))
        });
        if let Some(stmt) = lookup_statement(schema, "collections", "id", collections) {
            statements.push(tag(stmt));
        }

        statements.push(tag(upsert_statement(
            schema,
            "tokens",
            TOKEN_COLUMNS,
            chunk,
            token_values,
        )));
    }

    statements
}

#[derive(Clone)]
pub struct PostgresMirrorStore {
    db: DatabaseConnection,
}

impl PostgresMirrorStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn apply<R>(
        &self,
        chain: Chain,
        table: &str,
        batch: &[BatchParam<R>],
        render: fn(Chain, &[BatchParam<R>]) -> Vec<ChunkStatement>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let statements = render(chain, batch);
        let count = statements.len();
        let txn = self.db.begin().await?;

        for chunk in statements {
            if let Err(e) = txn.execute(chunk.statement).await {
                let key = batch
                    .get(chunk.start)
                    .map(|p| p.simplehash_kafka_key.clone())
                    .unwrap_or_default();
                warn!(
                    chain = %chain,
                    table,
                    index = chunk.start,
                    rows = chunk.rows,
                    key = %key,
                    error = %e,
                    "Mirror statement failed, rolling back batch"
                );
                txn.rollback().await?;
                return Err(StoreError::Statement {
                    index: chunk.start,
                    rows: chunk.rows,
                    key,
                    message: e.to_string(),
                });
            }
        }

        txn.commit().await?;

        debug!(
            chain = %chain,
            table,
            size = batch.len(),
            statements = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Applied mirror batch"
        );

        Ok(())
    }
}

#[async_trait]
impl MirrorStore for PostgresMirrorStore {
    async fn apply_owners(&self, chain: Chain, batch: &[OwnerParam]) -> Result<(), StoreError> {
        self.apply(chain, "owners", batch, owner_statements).await
    }

    async fn apply_tokens(&self, chain: Chain, batch: &[TokenParam]) -> Result<(), StoreError> {
        self.apply(chain, "tokens", batch, token_statements).await
    }
}
