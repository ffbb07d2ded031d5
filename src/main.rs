use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nft_mirror::config::Config;
use nft_mirror::handlers::health;
use nft_mirror::jobs::roster::build_roster;
use nft_mirror::jobs::supervisor::{RestartPolicy, Supervisor};
use nft_mirror::services::consumer::KafkaConsumerFactory;
use nft_mirror::services::decoder::AvroDecoder;
use nft_mirror::services::mirror_store::{MirrorStore, PostgresMirrorStore};
use nft_mirror::services::schema_registry::SchemaRegistryClient;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nft_mirror=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        env = %config.environment,
        topic_version = config.roster.topic_version,
        workers_per_topic = config.roster.workers_per_topic,
        telemetry = config.telemetry_dsn.is_some(),
        "Starting NFT mirror"
    );

    // Connect to database
    let database_url = config.database_url().expect("Invalid Postgres settings");
    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(config.max_connections())
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    tracing::info!(max_connections = config.max_connections(), "Connecting to database...");
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    // Health endpoint
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.health_port))
        .await
        .expect("Failed to bind health port");
    tracing::info!(port = config.health_port, "Health endpoint listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health::router()).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    let registry = SchemaRegistryClient::new(
        config.registry.url.clone(),
        config.registry.api_key.clone(),
        config.registry.secret_key.clone(),
    );
    let decoder = AvroDecoder::new(Arc::new(registry));
    let store: Arc<dyn MirrorStore> = Arc::new(PostgresMirrorStore::new(db));
    let factory = Arc::new(KafkaConsumerFactory::new(
        config.kafka.bootstrap_servers.clone(),
        config.kafka.group_id.clone(),
        config.kafka.api_key.clone(),
        config.kafka.api_secret.clone(),
    ));

    let roster = build_roster(
        &config.roster,
        factory,
        decoder,
        store,
        tokio::runtime::Handle::current(),
    );
    let supervisor = Supervisor::new(roster, RestartPolicy::default());

    let ct = CancellationToken::new();
    let shutdown = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    if let Err(e) = supervisor.run(ct).await {
        panic!("Mirror supervisor failed: {}", e);
    }

    tracing::info!("NFT mirror stopped");
}
