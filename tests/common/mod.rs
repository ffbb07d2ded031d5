use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, DbErr};
use std::env;

/// Set up test database connection and bring the mirror schemas up to date.
/// Uses TEST_DATABASE_URL environment variable or falls back to default
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let database_url = env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://mirror@localhost:5432/nft_mirror_test".to_string());

    let db = Database::connect(&database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Suffix that keeps rows from concurrent test runs apart
#[allow(dead_code)]
pub fn unique_suffix() -> String {
    format!("{:x}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}
