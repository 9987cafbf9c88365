use crate::domain_port::{CredentialStore, CredentialStoreError};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_owned())),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load_token(&self) -> Result<Option<String>, CredentialStoreError> {
        let token = self
            .token
            .lock()
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        Ok(token.clone())
    }

    async fn save_token(&self, token: &str) -> Result<(), CredentialStoreError> {
        let mut slot = self
            .token
            .lock()
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        *slot = Some(token.to_owned());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialStoreError> {
        let mut slot = self
            .token
            .lock()
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}
