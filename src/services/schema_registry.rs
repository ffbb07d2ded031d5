//! Schema registry client
//!
//! Resolves the schema ids embedded in message payloads to parsed Avro schemas.
//! Schemas are immutable per id, so the cache never expires entries. Workers
//! that miss on the same id at once wait on a single registry request.

use apache_avro::Schema;
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::decoder::DecodeError;

/// Anything that can turn a schema id into a decodable schema
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn schema(&self, id: u32) -> Result<Arc<Schema>, DecodeError>;
}

#[derive(Debug, Deserialize)]
struct SchemaByIdResponse {
    schema: String,
}

#[derive(Clone)]
pub struct SchemaRegistryClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    cache: Arc<Cache<u32, Arc<Schema>>>,
}

impl SchemaRegistryClient {
    pub fn new(base_url: String, api_key: String, secret_key: String) -> Self {
        let cache = Cache::builder().max_capacity(1000).build();

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
            cache: Arc::new(cache),
        }
    }

    async fn fetch_schema(&self, id: u32) -> Result<Schema, DecodeError> {
        let url = format!("{}/schemas/ids/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(&self.secret_key))
            .header("accept", "application/vnd.schemaregistry.v1+json")
            .send()
            .await
            .map_err(|e| DecodeError::Registry(format!("Request for schema {} failed: {}", id, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DecodeError::UnknownSchema(id));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DecodeError::Registry(format!(
                "Schema registry error {} for schema {}: {}",
                status, id, body
            )));
        }

        let body: SchemaByIdResponse = response
            .json()
            .await
            .map_err(|e| DecodeError::Registry(format!("Invalid registry response: {}", e)))?;

        Schema::parse_str(&body.schema)
            .map_err(|e| DecodeError::Schema(format!("Schema {} does not parse: {}", id, e)))
    }
}

/// Return the cached schema for `id`, running `fetch` on a miss. Concurrent
/// callers missing on the same id share one `fetch`; errors are not cached.
async fn cached_schema<F>(
    cache: &Cache<u32, Arc<Schema>>,
    id: u32,
    fetch: F,
) -> Result<Arc<Schema>, DecodeError>
where
    F: Future<Output = Result<Schema, DecodeError>>,
{
    cache
        .try_get_with(id, async move {
            let schema = fetch.await?;
            info!(schema_id = id, "Cached schema from registry");
            Ok(Arc::new(schema))
        })
        .await
        .map_err(|e: Arc<DecodeError>| e.as_ref().clone())
}

#[async_trait]
impl SchemaSource for SchemaRegistryClient {
    async fn schema(&self, id: u32) -> Result<Arc<Schema>, DecodeError> {
        cached_schema(&self.cache, id, self.fetch_schema(id)).await
    }
}
