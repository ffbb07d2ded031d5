use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::BigDecimal;
use serde::Deserialize;

use super::de_opt_numeric_string;
use super::param::{BatchParam, KafkaAudit};

/// Ownership record as published on `{chain}.owner.vN`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OwnerRecord {
    #[serde(alias = "simplehash_nft_id")]
    pub nft_id: String,
    #[serde(default)]
    pub owner_address: Option<String>,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub quantity: Option<String>,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub first_acquired_date: Option<String>,
    #[serde(default)]
    pub last_acquired_date: Option<String>,
    #[serde(default)]
    pub first_acquired_transaction: Option<String>,
    #[serde(default)]
    pub last_acquired_transaction: Option<String>,
    #[serde(default)]
    pub minted_to_this_wallet: Option<bool>,
    #[serde(default)]
    pub airdropped_to_this_wallet: Option<bool>,
    #[serde(default)]
    pub sold_to_this_wallet: Option<bool>,
}

/// Column values for one `<chain>.owners` row
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerRow {
    pub simplehash_nft_id: String,
    pub contract_address: String,
    pub token_id: Option<BigDecimal>,
    pub owner_address: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub collection_id: Option<String>,
    pub first_acquired_date: Option<DateTime<Utc>>,
    pub last_acquired_date: Option<DateTime<Utc>>,
    pub first_acquired_transaction: Option<String>,
    pub last_acquired_transaction: Option<String>,
    pub minted_to_this_wallet: Option<bool>,
    pub airdropped_to_this_wallet: Option<bool>,
    pub sold_to_this_wallet: Option<bool>,
    pub audit: KafkaAudit,
}

pub type OwnerParam = BatchParam<OwnerRow>;
