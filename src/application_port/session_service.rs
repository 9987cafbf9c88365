use crate::domain_model::{Session, UserId};
use crate::domain_port::{CredentialStoreError, IdentityError};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("not signed in")]
    NotSignedIn,
    #[error("session expired")]
    Expired,
    #[error("a refresh is already in progress")]
    RefreshInProgress,
    #[error("identity backend error: {0}")]
    Identity(String),
    #[error("credential store error: {0}")]
    Store(String),
}

impl From<IdentityError> for SessionError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::InvalidCredentials => SessionError::InvalidCredentials,
            IdentityError::NoSession => SessionError::NotSignedIn,
            other => SessionError::Identity(other.to_string()),
        }
    }
}

impl From<CredentialStoreError> for SessionError {
    fn from(error: CredentialStoreError) -> Self {
        SessionError::Store(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NoSession,
    Authenticated,
    Refreshing,
}

/// What the UI reads: `{session, user, loading}` plus the lifecycle phase.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub user: Option<UserId>,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn loading() -> Self {
        Self {
            phase: SessionPhase::NoSession,
            session: None,
            user: None,
            loading: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReauthNotice {
    pub message: String,
    pub redirect_to: String,
    pub issued_at: DateTime<Utc>,
}

/// UI-facing side of a forced logout: show the notice, go to sign-in.
pub trait ReauthNotifier: Send + Sync {
    fn notify(&self, notice: ReauthNotice);
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    fn snapshot(&self) -> SessionSnapshot;
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SessionError>;
    async fn sign_out(&self) -> Result<(), SessionError>;
    async fn refresh_session(&self) -> Result<Session, SessionError>;
}
