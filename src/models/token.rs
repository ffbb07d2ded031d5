use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::BigDecimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::de_opt_numeric_string;
use super::param::{BatchParam, KafkaAudit};

/// Token metadata record as published on `{chain}.token.vN`.
///
/// Nested blobs (previews, contract, sales, rarity, media properties) are kept as
/// JSON and stored as `jsonb` without further interpretation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenRecord {
    #[serde(alias = "simplehash_nft_id")]
    pub nft_id: String,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub previews: Option<JsonValue>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default)]
    pub other_url: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub token_count: Option<String>,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub owner_count: Option<String>,
    #[serde(default)]
    pub contract: Option<JsonValue>,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub last_sale: Option<JsonValue>,
    #[serde(default)]
    pub first_created: Option<JsonValue>,
    #[serde(default)]
    pub rarity: Option<JsonValue>,
    #[serde(default)]
    pub extra_metadata: Option<String>,
    #[serde(default)]
    pub image_properties: Option<JsonValue>,
    #[serde(default)]
    pub video_properties: Option<JsonValue>,
    #[serde(default)]
    pub audio_properties: Option<JsonValue>,
    #[serde(default)]
    pub model_properties: Option<JsonValue>,
    #[serde(default)]
    pub other_properties: Option<JsonValue>,
}

/// Column values for one `<chain>.tokens` row
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRow {
    pub simplehash_nft_id: String,
    pub contract_address: String,
    pub token_id: Option<BigDecimal>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub previews: Option<JsonValue>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub model_url: Option<String>,
    pub other_url: Option<String>,
    pub background_color: Option<String>,
    pub external_url: Option<String>,
    pub on_chain_created_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub token_count: Option<BigDecimal>,
    pub owner_count: Option<BigDecimal>,
    pub contract: Option<JsonValue>,
    pub collection_id: Option<String>,
    pub last_sale: Option<JsonValue>,
    pub first_created: Option<JsonValue>,
    pub rarity: Option<JsonValue>,
    pub extra_metadata: Option<String>,
    pub image_properties: Option<JsonValue>,
    pub video_properties: Option<JsonValue>,
    pub audio_properties: Option<JsonValue>,
    pub model_properties: Option<JsonValue>,
    pub other_properties: Option<JsonValue>,
    pub audit: KafkaAudit,
}

pub type TokenParam = BatchParam<TokenRow>;
