use sea_orm_migration::prelude::*;

/// One Postgres schema per mirrored chain
const CHAIN_SCHEMAS: [&str; 3] = ["ethereum", "base", "zora"];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for schema in CHAIN_SCHEMAS {
            manager
                .get_connection()
                .execute_unprepared(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .await?;

            create_lookup_tables(manager, schema).await?;
            create_owners(manager, schema).await?;
            create_tokens(manager, schema).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for schema in CHAIN_SCHEMAS {
            let s = Alias::new(schema);
            manager
                .drop_table(
                    Table::drop()
                        .table((s.clone(), Tokens::Table))
                        .table((s.clone(), Owners::Table))
                        .table((s.clone(), Collections::Table))
                        .table((s, Contracts::Table))
                        .if_exists()
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }
}

async fn create_lookup_tables(manager: &SchemaManager<'_>, schema: &str) -> Result<(), DbErr> {
    let s = Alias::new(schema);

    manager
        .create_table(
            Table::create()
                .table((s.clone(), Contracts::Table))
                .if_not_exists()
                .col(ColumnDef::new(Contracts::Address).text().not_null().primary_key())
                .col(ColumnDef::new(Contracts::SimplehashLookupNftId).text().null())
                .to_owned(),
        )
        .await?;

    manager
        .create_table(
            Table::create()
                .table((s, Collections::Table))
                .if_not_exists()
                .col(ColumnDef::new(Collections::Id).text().not_null().primary_key())
                .col(ColumnDef::new(Collections::SimplehashLookupNftId).text().null())
                .to_owned(),
        )
        .await?;

    Ok(())
}

async fn create_owners(manager: &SchemaManager<'_>, schema: &str) -> Result<(), DbErr> {
    let s = Alias::new(schema);

    manager
        .create_table(
            Table::create()
                .table((s.clone(), Owners::Table))
                .if_not_exists()
                .col(ColumnDef::new(Owners::SimplehashKafkaKey).text().not_null().primary_key())
                .col(ColumnDef::new(Owners::SimplehashNftId).text().not_null())
                .col(ColumnDef::new(Owners::ContractAddress).text().not_null())
                .col(ColumnDef::new(Owners::TokenId).decimal().null())
                .col(ColumnDef::new(Owners::OwnerAddress).text().null())
                .col(ColumnDef::new(Owners::Quantity).decimal().null())
                .col(ColumnDef::new(Owners::CollectionId).text().null())
                .col(ColumnDef::new(Owners::FirstAcquiredDate).timestamp_with_time_zone().null())
                .col(ColumnDef::new(Owners::LastAcquiredDate).timestamp_with_time_zone().null())
                .col(ColumnDef::new(Owners::FirstAcquiredTransaction).text().null())
                .col(ColumnDef::new(Owners::LastAcquiredTransaction).text().null())
                .col(ColumnDef::new(Owners::MintedToThisWallet).boolean().null())
                .col(ColumnDef::new(Owners::AirdroppedToThisWallet).boolean().null())
                .col(ColumnDef::new(Owners::SoldToThisWallet).boolean().null())
                .col(audit_offset(Owners::KafkaOffset))
                .col(audit_partition(Owners::KafkaPartition))
                .col(ColumnDef::new(Owners::KafkaTimestamp).timestamp_with_time_zone().null())
                .col(last_updated(Owners::LastUpdated))
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name(format!("idx_{}_owners_owner_address", schema))
                .table((s.clone(), Owners::Table))
                .col(Owners::OwnerAddress)
                .if_not_exists()
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name(format!("idx_{}_owners_nft_id", schema))
                .table((s, Owners::Table))
                .col(Owners::SimplehashNftId)
                .if_not_exists()
                .to_owned(),
        )
        .await?;

    Ok(())
}

async fn create_tokens(manager: &SchemaManager<'_>, schema: &str) -> Result<(), DbErr> {
    let s = Alias::new(schema);

    manager
        .create_table(
            Table::create()
                .table((s.clone(), Tokens::Table))
                .if_not_exists()
                .col(ColumnDef::new(Tokens::SimplehashKafkaKey).text().not_null().primary_key())
                .col(ColumnDef::new(Tokens::SimplehashNftId).text().not_null())
                .col(ColumnDef::new(Tokens::ContractAddress).text().not_null())
                .col(ColumnDef::new(Tokens::TokenId).decimal().null())
                .col(ColumnDef::new(Tokens::Name).text().null())
                .col(ColumnDef::new(Tokens::Description).text().null())
                .col(ColumnDef::new(Tokens::Previews).json_binary().null())
                .col(ColumnDef::new(Tokens::ImageUrl).text().null())
                .col(ColumnDef::new(Tokens::VideoUrl).text().null())
                .col(ColumnDef::new(Tokens::AudioUrl).text().null())
                .col(ColumnDef::new(Tokens::ModelUrl).text().null())
                .col(ColumnDef::new(Tokens::OtherUrl).text().null())
                .col(ColumnDef::new(Tokens::BackgroundColor).text().null())
                .col(ColumnDef::new(Tokens::ExternalUrl).text().null())
                .col(ColumnDef::new(Tokens::OnChainCreatedDate).timestamp_with_time_zone().null())
                .col(ColumnDef::new(Tokens::Status).text().null())
                .col(ColumnDef::new(Tokens::TokenCount).decimal().null())
                .col(ColumnDef::new(Tokens::OwnerCount).decimal().null())
                .col(ColumnDef::new(Tokens::Contract).json_binary().null())
                .col(ColumnDef::new(Tokens::CollectionId).text().null())
                .col(ColumnDef::new(Tokens::LastSale).json_binary().null())
                .col(ColumnDef::new(Tokens::FirstCreated).json_binary().null())
                .col(ColumnDef::new(Tokens::Rarity).json_binary().null())
                .col(ColumnDef::new(Tokens::ExtraMetadata).text().null())
                .col(ColumnDef::new(Tokens::ImageProperties).json_binary().null())
                .col(ColumnDef::new(Tokens::VideoProperties).json_binary().null())
                .col(ColumnDef::new(Tokens::AudioProperties).json_binary().null())
                .col(ColumnDef::new(Tokens::ModelProperties).json_binary().null())
                .col(ColumnDef::new(Tokens::OtherProperties).json_binary().null())
                .col(audit_offset(Tokens::KafkaOffset))
                .col(audit_partition(Tokens::KafkaPartition))
                .col(ColumnDef::new(Tokens::KafkaTimestamp).timestamp_with_time_zone().null())
                .col(last_updated(Tokens::LastUpdated))
                .foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{}_tokens_contract", schema))
                        .from((s.clone(), Tokens::Table), Tokens::ContractAddress)
                        .to((s.clone(), Contracts::Table), Contracts::Address),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{}_tokens_collection", schema))
                        .from((s.clone(), Tokens::Table), Tokens::CollectionId)
                        .to((s.clone(), Collections::Table), Collections::Id),
                )
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name(format!("idx_{}_tokens_nft_id", schema))
                .table((s, Tokens::Table))
                .col(Tokens::SimplehashNftId)
                .if_not_exists()
                .to_owned(),
        )
        .await?;

    Ok(())
}

fn audit_offset<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).big_integer().not_null().to_owned()
}

fn audit_partition<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).integer().not_null().to_owned()
}

fn last_updated<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Owners {
    Table,
    SimplehashKafkaKey,
    SimplehashNftId,
    ContractAddress,
    TokenId,
    OwnerAddress,
    Quantity,
    CollectionId,
    FirstAcquiredDate,
    LastAcquiredDate,
    FirstAcquiredTransaction,
    LastAcquiredTransaction,
    MintedToThisWallet,
    AirdroppedToThisWallet,
    SoldToThisWallet,
    KafkaOffset,
    KafkaPartition,
    KafkaTimestamp,
    LastUpdated,
}

#[derive(Iden)]
enum Tokens {
    Table,
    SimplehashKafkaKey,
    SimplehashNftId,
    ContractAddress,
    TokenId,
    Name,
    Description,
    Previews,
    ImageUrl,
    VideoUrl,
    AudioUrl,
    ModelUrl,
    OtherUrl,
    BackgroundColor,
    ExternalUrl,
    OnChainCreatedDate,
    Status,
    TokenCount,
    OwnerCount,
    Contract,
    CollectionId,
    LastSale,
    FirstCreated,
    Rarity,
    ExtraMetadata,
    ImageProperties,
    VideoProperties,
    AudioProperties,
    ModelProperties,
    OtherProperties,
    KafkaOffset,
    KafkaPartition,
    KafkaTimestamp,
    LastUpdated,
}

#[derive(Iden)]
enum Contracts {
    Table,
    Address,
    SimplehashLookupNftId,
}

#[derive(Iden)]
enum Collections {
    Table,
    Id,
    SimplehashLookupNftId,
}
