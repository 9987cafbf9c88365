use crate::domain_model::{Session, SessionEvent, UserId};
use crate::domain_port::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Minimal fake for the "fake" identity backend and for tests.
// Passwords are compared in plain text; there is no real token validation.
pub struct FakeIdentityBackend {
    accounts: Mutex<HashMap<String, String>>,
    session: Mutex<Option<Session>>,
    registry: SubscriberRegistry,
    session_ttl: Duration,
    read_delay: Mutex<Duration>,
    refresh_delay: Mutex<Duration>,
    fail_reads: AtomicBool,
    fail_refresh: AtomicBool,
    session_reads: AtomicU64,
    refresh_calls: AtomicU64,
    issued: AtomicU64,
}

impl FakeIdentityBackend {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            registry: SubscriberRegistry::new(),
            session_ttl: Duration::from_secs(60 * 60),
            read_delay: Mutex::new(Duration::ZERO),
            refresh_delay: Mutex::new(Duration::ZERO),
            fail_reads: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            session_reads: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
            issued: AtomicU64::new(0),
        }
    }

    pub fn with_account(self, identifier: &str, secret: &str) -> Self {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(identifier.to_owned(), secret.to_owned());
        }
        self
    }

    pub fn user_id_for(identifier: &str) -> UserId {
        UserId(uuid::Uuid::new_v5(
            &uuid::Uuid::NAMESPACE_OID,
            identifier.as_bytes(),
        ))
    }

    pub fn issue_session(&self, subject_id: UserId, expires_at: i64) -> Session {
        let n = self.issued.fetch_add(1, Ordering::Relaxed);
        Session {
            access_token: format!("fake-access-token:{}:{}", subject_id, n),
            refresh_token: format!("fake-refresh-token:{}:{}", subject_id, n),
            expires_at,
            subject_id,
        }
    }

    /// Installs a session without emitting a notification, as if it had
    /// been restored from storage before anyone subscribed.
    pub fn sign_in_silently(&self, identifier: &str) -> Session {
        let expires_at = Utc::now().timestamp() + self.session_ttl.as_secs() as i64;
        let session = self.issue_session(Self::user_id_for(identifier), expires_at);
        self.set_session(Some(session.clone()));
        session
    }

    pub fn set_session(&self, session: Option<Session>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = session;
        }
    }

    /// Replaces the session and notifies subscribers, like a change made in
    /// another tab would.
    pub fn emit(&self, event: SessionEvent, session: Option<Session>) {
        self.set_session(session.clone());
        self.registry.notify(event, session.as_ref());
    }

    pub fn set_read_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.read_delay.lock() {
            *slot = delay;
        }
    }

    /// Delays refreshes after the refresh token has been read, like a slow
    /// token endpoint.
    pub fn set_refresh_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.refresh_delay.lock() {
            *slot = delay;
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::Relaxed);
    }

    pub fn session_reads(&self) -> u64 {
        self.session_reads.load(Ordering::Relaxed)
    }

    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    fn current(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|s| s.clone())
    }
}

impl Default for FakeIdentityBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityBackend for FakeIdentityBackend {
    async fn get_session(&self) -> Result<Option<Session>, IdentityError> {
        self.session_reads.fetch_add(1, Ordering::Relaxed);
        let delay = self.read_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(IdentityError::Transport("simulated session read failure".into()));
        }
        Ok(self.current())
    }

    async fn refresh_session(&self) -> Result<Session, IdentityError> {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_refresh.load(Ordering::Relaxed) {
            return Err(IdentityError::Rejected("simulated refresh failure".into()));
        }
        let current = self.current().ok_or(IdentityError::NoSession)?;
        let delay = self.refresh_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let expires_at = Utc::now().timestamp() + self.session_ttl.as_secs() as i64;
        let refreshed = self.issue_session(current.subject_id, expires_at);
        self.emit(SessionEvent::TokenRefreshed, Some(refreshed.clone()));
        Ok(refreshed)
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, IdentityError> {
        let known = self
            .accounts
            .lock()
            .map(|accounts| accounts.get(identifier).is_some_and(|s| s == secret))
            .unwrap_or(false);
        if !known {
            return Err(IdentityError::InvalidCredentials);
        }
        let expires_at = Utc::now().timestamp() + self.session_ttl.as_secs() as i64;
        let session = self.issue_session(Self::user_id_for(identifier), expires_at);
        self.emit(SessionEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.emit(SessionEvent::SignedOut, None);
        Ok(())
    }

    fn subscribe(&self, handler: Arc<dyn SessionChangeHandler>) -> Subscription {
        self.registry.subscribe(handler)
    }
}
