#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("credential store error: {0}")]
    Store(String),
}

/// Locally persisted copy of the bearer token. Read as a fallback when the
/// identity backend cannot produce a session, wiped on any auth purge.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<String>, CredentialStoreError>;
    async fn save_token(&self, token: &str) -> Result<(), CredentialStoreError>;
    async fn clear(&self) -> Result<(), CredentialStoreError>;
}
