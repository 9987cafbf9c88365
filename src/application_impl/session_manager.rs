use crate::application_port::*;
use crate::domain_model::{Session, SessionEvent};
use crate::domain_port::*;
use crate::resilience::{AuthFailureHandler, TokenCache};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest period the expiry timer runs at; smaller configured values are raised to it.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub check_interval: Duration,
    pub refresh_threshold: Duration,
    pub sign_in_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(300),
            sign_in_path: "/sign-in".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    Nothing,
    Refresh,
    ForceLogout,
}

/// Decides what one tick of the expiry check does.
pub fn plan_expiry_check(
    phase: SessionPhase,
    session: Option<&Session>,
    now_epoch_secs: i64,
    refresh_threshold_secs: i64,
) -> ExpiryAction {
    let session = match (phase, session) {
        (SessionPhase::NoSession, _) | (_, None) => return ExpiryAction::Nothing,
        (SessionPhase::Refreshing, _) => return ExpiryAction::Nothing,
        (SessionPhase::Authenticated, Some(session)) => session,
    };
    let remaining = session.seconds_remaining(now_epoch_secs);
    if remaining < 0 {
        ExpiryAction::ForceLogout
    } else if remaining < refresh_threshold_secs {
        ExpiryAction::Refresh
    } else {
        ExpiryAction::Nothing
    }
}

/// Folds one backend notification into the local snapshot.
///
/// Refresh and user-update notifications only touch an existing session; a
/// signed-out snapshot stays signed out until an explicit sign-in.
pub fn apply_session_event(
    current: &SessionSnapshot,
    event: SessionEvent,
    session: Option<&Session>,
) -> SessionSnapshot {
    match (event, session) {
        (SessionEvent::TokenRefreshed | SessionEvent::UserUpdated, _)
            if current.phase == SessionPhase::NoSession =>
        {
            current.clone()
        }
        (SessionEvent::SignedOut, _) | (SessionEvent::InitialSession, None) => SessionSnapshot {
            phase: SessionPhase::NoSession,
            session: None,
            user: None,
            loading: false,
        },
        (
            SessionEvent::SignedIn
            | SessionEvent::TokenRefreshed
            | SessionEvent::UserUpdated
            | SessionEvent::InitialSession,
            Some(session),
        ) => SessionSnapshot {
            phase: SessionPhase::Authenticated,
            session: Some(session.clone()),
            user: Some(session.subject_id),
            loading: false,
        },
        _ => current.clone(),
    }
}

fn signed_out() -> SessionSnapshot {
    SessionSnapshot {
        phase: SessionPhase::NoSession,
        session: None,
        user: None,
        loading: false,
    }
}

fn authenticated(session: Session) -> SessionSnapshot {
    SessionSnapshot {
        phase: SessionPhase::Authenticated,
        user: Some(session.subject_id),
        session: Some(session),
        loading: false,
    }
}

/// Owns the current session: keeps it in sync with the identity backend,
/// refreshes ahead of expiry and performs forced logout.
pub struct SessionManager {
    identity: Arc<dyn IdentityBackend>,
    token_cache: TokenCache,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn ReauthNotifier>,
    config: SessionConfig,
    state: watch::Sender<SessionSnapshot>,
    // bumped on every sign-out; a sign-in or refresh that started under an
    // older value must not install its session
    sign_out_epoch: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        token_cache: TokenCache,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn ReauthNotifier>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::loading());
        Arc::new(Self {
            identity,
            token_cache,
            credentials,
            notifier,
            config,
            state,
            sign_out_epoch: AtomicU64::new(0),
            subscription: Mutex::new(None),
            timer_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Reads the current session once, subscribes to change notifications
    /// and starts the expiry check timer.
    pub async fn start(self: &Arc<Self>) {
        match self.identity.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(user = %session.subject_id, "restored session");
                self.token_cache.prime(&session.access_token);
                self.state.send_replace(authenticated(session));
            }
            Ok(None) => {
                self.state.send_replace(signed_out());
            }
            Err(e) => {
                tracing::warn!(error = %e, "initial session read failed");
                self.state.send_replace(signed_out());
            }
        }

        let handler = Arc::new(SessionEvents {
            manager: Arc::downgrade(self),
        });
        let subscription = self.identity.subscribe(handler);
        if let Ok(mut slot) = self.subscription.lock() {
            *slot = Some(subscription);
        }

        let handle = spawn_expiry_timer(
            Arc::downgrade(self),
            self.config.check_interval,
            self.cancel.clone(),
        );
        if let Ok(mut slot) = self.timer_handle.lock() {
            *slot = Some(handle);
        }
    }

    /// Stops the timer and drops the subscription.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Ok(mut slot) = self.subscription.lock() {
            if let Some(subscription) = slot.take() {
                subscription.unsubscribe();
            }
        }
        let handle = self.timer_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            let r = handle.await;
            tracing::debug!("session timer dropped: {:?}", r);
        }
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn epoch(&self) -> u64 {
        self.sign_out_epoch.load(Ordering::SeqCst)
    }

    fn handle_event(&self, event: SessionEvent, session: Option<&Session>) {
        tracing::debug!(?event, "session change");
        if matches!(event, SessionEvent::SignedOut) {
            self.sign_out_epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.state.send_if_modified(|snapshot| {
            let next = apply_session_event(snapshot, event, session);
            if let (SessionEvent::SignedIn | SessionEvent::TokenRefreshed, Some(session)) =
                (event, next.session.as_ref())
            {
                self.token_cache.prime(&session.access_token);
            }
            if next == *snapshot {
                return false;
            }
            *snapshot = next;
            true
        });
        if matches!(event, SessionEvent::SignedOut) {
            self.token_cache.invalidate();
            let credentials = self.credentials.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = credentials.clear().await {
                        tracing::warn!(error = %e, "failed to clear stored token");
                    }
                });
            }
        }
    }

    /// One tick of the expiry check.
    pub async fn check_expiry(&self) -> ExpiryAction {
        let (phase, session) = {
            let snapshot = self.state.borrow();
            (snapshot.phase, snapshot.session.clone())
        };
        let action = plan_expiry_check(
            phase,
            session.as_ref(),
            Utc::now().timestamp(),
            self.config.refresh_threshold.as_secs() as i64,
        );
        match action {
            ExpiryAction::Nothing => {}
            ExpiryAction::Refresh => {
                tracing::debug!("session close to expiry, refreshing");
                let _ = self.refresh_session().await;
            }
            ExpiryAction::ForceLogout => {
                self.force_logout("session expired").await;
            }
        }
        action
    }

    /// Installs `session` unless a sign-out happened after `epoch` was read.
    /// With `replace_only` a signed-out snapshot is never brought back.
    async fn install(&self, session: &Session, epoch: u64, replace_only: bool) -> bool {
        let installed = self.state.send_if_modified(|snapshot| {
            if self.epoch() != epoch
                || (replace_only && snapshot.phase == SessionPhase::NoSession)
            {
                return false;
            }
            self.token_cache.prime(&session.access_token);
            *snapshot = authenticated(session.clone());
            true
        });
        if !installed {
            return false;
        }
        if let Err(e) = self.credentials.save_token(&session.access_token).await {
            tracing::warn!(error = %e, "failed to persist token");
        }
        if self.epoch() != epoch {
            // signed out while the token was being written
            if let Err(e) = self.credentials.clear().await {
                tracing::warn!(error = %e, "failed to clear stored token");
            }
            return false;
        }
        true
    }

    async fn purge_local(&self) {
        self.sign_out_epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(signed_out());
        self.token_cache.invalidate();
        if let Err(e) = self.credentials.clear().await {
            tracing::warn!(error = %e, "failed to clear stored token");
        }
    }

    /// Clears all local auth state, tells the UI to send the user to sign-in.
    pub async fn force_logout(&self, reason: &str) {
        tracing::warn!(reason, "forcing logout");
        self.purge_local().await;
        if let Err(e) = self.identity.sign_out().await {
            tracing::debug!(error = %e, "backend sign-out after forced logout failed");
        }
        self.notifier.notify(ReauthNotice {
            message: "Your session has expired. Please sign in again.".to_string(),
            redirect_to: self.config.sign_in_path.clone(),
            issued_at: Utc::now(),
        });
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_expiry_timer(
    manager: Weak<SessionManager>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    if period < MIN_CHECK_INTERVAL {
        tracing::warn!(?period, "session check interval too small, using {:?}", MIN_CHECK_INTERVAL);
    }
    let period = period.max(MIN_CHECK_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(manager) = manager.upgrade() else { break };
                    manager.check_expiry().await;
                }
            }
        }
        tracing::debug!("session expiry timer stopped");
    })
}

struct SessionEvents {
    manager: Weak<SessionManager>,
}

impl SessionChangeHandler for SessionEvents {
    fn on_session_change(&self, event: SessionEvent, session: Option<&Session>) {
        if let Some(manager) = self.manager.upgrade() {
            manager.handle_event(event, session);
        }
    }
}

#[async_trait::async_trait]
impl SessionService for SessionManager {
    fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SessionError> {
        let epoch = self.epoch();
        let session = self
            .identity
            .sign_in_with_password(identifier, secret)
            .await?;
        if !self.install(&session, epoch, false).await {
            tracing::info!("signed out while signing in, dropping the new session");
            if let Err(e) = self.identity.sign_out().await {
                tracing::debug!(error = %e, "backend sign-out of dropped session failed");
            }
            return Err(SessionError::NotSignedIn);
        }
        tracing::info!(user = %session.subject_id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        let result = self.identity.sign_out().await;
        self.purge_local().await;
        tracing::info!("signed out");
        result.map_err(SessionError::from)
    }

    async fn refresh_session(&self) -> Result<Session, SessionError> {
        let epoch = self.epoch();
        let mut refused = None;
        self.state.send_if_modified(|snapshot| match snapshot.phase {
            SessionPhase::Authenticated => {
                snapshot.phase = SessionPhase::Refreshing;
                true
            }
            SessionPhase::Refreshing => {
                refused = Some(SessionError::RefreshInProgress);
                false
            }
            SessionPhase::NoSession => {
                refused = Some(SessionError::NotSignedIn);
                false
            }
        });
        if let Some(error) = refused {
            return Err(error);
        }

        match self.identity.refresh_session().await {
            Ok(session) => {
                if !self.install(&session, epoch, true).await {
                    tracing::info!("signed out during refresh, dropping the refreshed session");
                    if let Err(e) = self.identity.sign_out().await {
                        tracing::debug!(error = %e, "backend sign-out of dropped session failed");
                    }
                    return Err(SessionError::NotSignedIn);
                }
                tracing::info!(expires_at = session.expires_at, "session refreshed");
                Ok(session)
            }
            Err(e) if self.epoch() != epoch => {
                tracing::debug!(error = %e, "refresh failed after sign-out");
                Err(SessionError::NotSignedIn)
            }
            Err(e) => {
                // a single failed refresh is treated as expiry
                tracing::warn!(error = %e, "session refresh failed");
                self.force_logout("session refresh failed").await;
                Err(SessionError::Expired)
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthFailureHandler for SessionManager {
    async fn on_authentication_expired(&self, reason: &str) {
        self.force_logout(reason).await;
    }
}
