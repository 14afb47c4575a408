//! Redis-backed remote cache

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind, RedisError};
use std::fmt;
use url::Url;

use super::RemoteCache;
use crate::{DbError, Result};

/// Username some hosting providers embed as a no-op credential marker
const PLACEHOLDER_USERNAME: &str = "default";

/// Prepare a connection string for the client.
///
/// - only `redis://` and `rediss://` are accepted
/// - a `default` username is removed, keeping the password
/// - `rediss://` connects with certificate verification disabled
pub fn normalize_uri(uri: &str) -> Result<String> {
    let mut url = Url::parse(uri.trim())
        .map_err(|e| DbError::BackendConnect(format!("invalid redis uri: {}", e)))?;

    let secure = match url.scheme() {
        "redis" => false,
        "rediss" => true,
        other => {
            return Err(DbError::BackendConnect(format!(
                "unsupported redis uri scheme: {}",
                other
            )))
        }
    };

    if url.username() == PLACEHOLDER_USERNAME {
        url.set_username("").map_err(|_| {
            DbError::BackendConnect("can't strip placeholder username".to_string())
        })?;
    }

    if secure && url.fragment().is_none() {
        url.set_fragment(Some("insecure"));
    }

    Ok(url.to_string())
}

/// Remote cache backed by a Redis server
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    endpoint: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl RedisCache {
    /// Connect and verify the connection with a `PING`
    pub async fn connect(uri: &str) -> Result<Self> {
        let normalized = normalize_uri(uri)?;
        let endpoint = endpoint_of(&normalized);

        let client = redis::Client::open(normalized.as_str())
            .map_err(|e| DbError::BackendConnect(e.to_string()))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connect_error)?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(connect_error)?;

        tracing::info!("Connected to Redis at {}", endpoint);
        Ok(Self { conn, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteCache for RedisCache {
    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let blob: Option<String> = conn.get(key).await?;
        Ok(blob)
    }

    async fn store(&self, key: &str, blob: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, blob).await?;
        Ok(())
    }
}

fn connect_error(e: RedisError) -> DbError {
    if e.kind() == ErrorKind::AuthenticationFailed {
        tracing::error!("Redis auth failed: {}", e);
    } else {
        tracing::error!("Redis connection failed: {}", e);
    }
    DbError::BackendConnect(e.to_string())
}

/// Host and port only, credentials never end up in logs
fn endpoint_of(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) => format!(
            "{}:{}",
            url.host_str().unwrap_or("localhost"),
            url.port().unwrap_or(6379)
        ),
        Err(_) => "<unparsable>".to_string(),
    }
}
