use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Persists the bearer token under a single key so it survives a restart.
pub struct RedisCredentialStore {
    conn: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

impl RedisCredentialStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, ttl_secs: u64) -> Self {
        RedisCredentialStore {
            conn,
            prefix: prefix.into(),
            ttl_secs,
        }
    }

    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        ttl_secs: u64,
    ) -> Result<Self, CredentialStoreError> {
        let client = redis::Client::open(url).map_err(store_error)?;
        let conn = ConnectionManager::new(client).await.map_err(store_error)?;
        Ok(Self::new(conn, prefix, ttl_secs))
    }

    fn key(&self) -> String {
        token_key(&self.prefix)
    }
}

fn token_key(prefix: &str) -> String {
    format!("{}:access_token", prefix)
}

fn store_error(e: redis::RedisError) -> CredentialStoreError {
    CredentialStoreError::Store(e.to_string())
}

#[async_trait::async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn load_token(&self) -> Result<Option<String>, CredentialStoreError> {
        let mut conn = self.conn.clone();
        let token: Option<String> = conn.get(self.key()).await.map_err(store_error)?;
        Ok(token)
    }

    async fn save_token(&self, token: &str) -> Result<(), CredentialStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.key(), token, self.ttl_secs)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key()).await.map_err(store_error)?;
        Ok(())
    }
}
