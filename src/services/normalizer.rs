//! Record normalizer
//!
//! Turns a decoded record plus its bus envelope into a batch parameter.
//! Every address written to the mirror passes through [`normalize_address`].

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::BigDecimal;
use std::str::FromStr;

use crate::models::chain::Chain;
use crate::models::message::{Action, RawMessage};
use crate::models::owner::{OwnerParam, OwnerRecord, OwnerRow};
use crate::models::param::{BatchParam, KafkaAudit};
use crate::models::token::{TokenParam, TokenRecord, TokenRow};

use super::decoder::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeError {
    InvalidAction(Option<String>),
    InvalidKey(String),
    InvalidNftId(String),
    InvalidNumeric { field: &'static str, value: String },
    InvalidTimestamp { field: &'static str, value: String },
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::InvalidAction(Some(raw)) => write!(f, "Invalid action: {}", raw),
            NormalizeError::InvalidAction(None) => write!(f, "Invalid action: missing modType header"),
            NormalizeError::InvalidKey(msg) => write!(f, "Invalid message key: {}", msg),
            NormalizeError::InvalidNftId(raw) => write!(f, "Invalid nft id: {}", raw),
            NormalizeError::InvalidNumeric { field, value } => {
                write!(f, "Invalid numeric value for {}: {}", field, value)
            }
            NormalizeError::InvalidTimestamp { field, value } => {
                write!(f, "Invalid timestamp for {}: {}", field, value)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Failure to turn a message into a batch parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Decode(DecodeError),
    Normalize(NormalizeError),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Decode(e) => write!(f, "Decode error: {}", e),
            ParseError::Normalize(e) => write!(f, "Normalize error: {}", e),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Decode(e) => Some(e),
            ParseError::Normalize(e) => Some(e),
        }
    }
}

impl From<DecodeError> for ParseError {
    fn from(e: DecodeError) -> Self {
        ParseError::Decode(e)
    }
}

impl From<NormalizeError> for ParseError {
    fn from(e: NormalizeError) -> Self {
        ParseError::Normalize(e)
    }
}

/// Parts of `chain.contract_address.token_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftId {
    pub chain: String,
    pub contract_address: String,
    pub token_id: String,
}

pub fn parse_nft_id(raw: &str) -> Result<NftId, NormalizeError> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(NormalizeError::InvalidNftId(raw.to_string()));
    }

    Ok(NftId {
        chain: parts[0].to_string(),
        contract_address: parts[1].to_string(),
        token_id: parts[2].to_string(),
    })
}

/// Chain-aware address normalization. All mirrored chains are EVM today, where
/// addresses are stored lowercase.
pub fn normalize_address(chain: Chain, raw: &str) -> String {
    if chain.is_evm() {
        raw.to_lowercase()
    } else {
        raw.to_string()
    }
}

/// Absent input is an explicit NULL, never zero
pub fn parse_decimal(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<BigDecimal>, NormalizeError> {
    match raw {
        None => Ok(None),
        Some(s) => BigDecimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| NormalizeError::InvalidNumeric {
                field,
                value: s.to_string(),
            }),
    }
}

pub fn parse_timestamp(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, NormalizeError> {
    match raw {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| NormalizeError::InvalidTimestamp {
                field,
                value: s.to_string(),
            }),
    }
}

/// Envelope facts every parameter needs, extracted before the value is decoded
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub key: String,
    pub action: Action,
    pub audit: KafkaAudit,
}

impl Envelope {
    pub fn from_message(msg: &RawMessage) -> Result<Self, NormalizeError> {
        let action = match msg.mod_type() {
            None => return Err(NormalizeError::InvalidAction(None)),
            Some(raw) => Action::parse(&raw).ok_or(NormalizeError::InvalidAction(Some(raw)))?,
        };

        let key = match &msg.key {
            None => return Err(NormalizeError::InvalidKey("missing key".to_string())),
            Some(bytes) if bytes.is_empty() => {
                return Err(NormalizeError::InvalidKey("empty key".to_string()));
            }
            Some(bytes) => String::from_utf8(bytes.clone())
                .map_err(|e| NormalizeError::InvalidKey(e.to_string()))?,
        };

        Ok(Self {
            key,
            action,
            audit: KafkaAudit {
                kafka_offset: msg.offset,
                kafka_partition: msg.partition,
                kafka_timestamp: msg.timestamp,
            },
        })
    }

    pub fn into_delete<R>(self) -> BatchParam<R> {
        BatchParam::delete(self.key)
    }
}

/// Shared parse path: deletes carry only the key and skip decoding (their value
/// may be a tombstone); everything else is decoded then normalized.
pub fn parse_message<Rec, Row>(
    msg: &RawMessage,
    decode: impl FnOnce(&[u8]) -> Result<Rec, DecodeError>,
    normalize: impl FnOnce(Envelope, Rec) -> Result<BatchParam<Row>, NormalizeError>,
) -> Result<BatchParam<Row>, ParseError> {
    let envelope = Envelope::from_message(msg)?;
    if envelope.action == Action::Delete {
        return Ok(envelope.into_delete());
    }

    let payload = msg.value.as_deref().ok_or(DecodeError::EmptyPayload)?;
    let record = decode(payload)?;
    Ok(normalize(envelope, record)?)
}

pub fn normalize_owner(
    chain: Chain,
    envelope: Envelope,
    record: OwnerRecord,
) -> Result<OwnerParam, NormalizeError> {
    let nft = parse_nft_id(&record.nft_id)?;

    let row = OwnerRow {
        contract_address: normalize_address(chain, &nft.contract_address),
        token_id: parse_decimal("token_id", Some(&nft.token_id))?,
        owner_address: record.owner_address.as_deref().map(|a| normalize_address(chain, a)),
        quantity: parse_decimal("quantity", record.quantity.as_deref())?,
        collection_id: record.collection_id,
        first_acquired_date: parse_timestamp(
            "first_acquired_date",
            record.first_acquired_date.as_deref(),
        )?,
        last_acquired_date: parse_timestamp(
            "last_acquired_date",
            record.last_acquired_date.as_deref(),
        )?,
        first_acquired_transaction: record.first_acquired_transaction,
        last_acquired_transaction: record.last_acquired_transaction,
        minted_to_this_wallet: record.minted_to_this_wallet,
        airdropped_to_this_wallet: record.airdropped_to_this_wallet,
        sold_to_this_wallet: record.sold_to_this_wallet,
        simplehash_nft_id: record.nft_id,
        audit: envelope.audit,
    };

    Ok(BatchParam::upsert(envelope.key, row))
}

pub fn normalize_token(
    chain: Chain,
    envelope: Envelope,
    record: TokenRecord,
) -> Result<TokenParam, NormalizeError> {
    let nft = parse_nft_id(&record.nft_id)?;
    let contract_address = record
        .contract_address
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(&nft.contract_address);

    let row = TokenRow {
        contract_address: normalize_address(chain, contract_address),
        token_id: parse_decimal("token_id", Some(&nft.token_id))?,
        name: record.name,
        description: record.description,
        previews: record.previews,
        image_url: record.image_url,
        video_url: record.video_url,
        audio_url: record.audio_url,
        model_url: record.model_url,
        other_url: record.other_url,
        background_color: record.background_color,
        external_url: record.external_url,
        on_chain_created_date: parse_timestamp("created_date", record.created_date.as_deref())?,
        status: record.status,
        token_count: parse_decimal("token_count", record.token_count.as_deref())?,
        owner_count: parse_decimal("owner_count", record.owner_count.as_deref())?,
        contract: record.contract,
        collection_id: record.collection_id,
        last_sale: record.last_sale,
        first_created: record.first_created,
        rarity: record.rarity,
        extra_metadata: record.extra_metadata,
        image_properties: record.image_properties,
        video_properties: record.video_properties,
        audio_properties: record.audio_properties,
        model_properties: record.model_properties,
        other_properties: record.other_properties,
        simplehash_nft_id: record.nft_id,
        audit: envelope.audit,
    };

    Ok(BatchParam::upsert(envelope.key, row))
}
