use bitebook::application_impl::*;
use bitebook::application_port::*;
use bitebook::domain_model::SessionEvent;
use bitebook::domain_port::IdentityBackend;
use bitebook::infra_memory::{FakeIdentityBackend, MemoryCredentialStore};
use bitebook::resilience::{DEFAULT_TOKEN_TTL, TokenCache};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    identity: Arc<FakeIdentityBackend>,
    credentials: Arc<MemoryCredentialStore>,
    token_cache: TokenCache,
    notices: Arc<NoticeBoard>,
    manager: Arc<SessionManager>,
}

fn fixture(identity: FakeIdentityBackend) -> Fixture {
    let identity = Arc::new(identity);
    let credentials = Arc::new(MemoryCredentialStore::new());
    let token_cache = TokenCache::new(identity.clone(), credentials.clone(), DEFAULT_TOKEN_TTL);
    let notices = Arc::new(NoticeBoard::new());
    let manager = SessionManager::new(
        identity.clone(),
        token_cache.clone(),
        credentials.clone(),
        notices.clone(),
        SessionConfig::default(),
    );
    Fixture {
        identity,
        credentials,
        token_cache,
        notices,
        manager,
    }
}

/// Installs a session that expires `seconds` from now.
fn session_expiring_in(f: &Fixture, seconds: i64) {
    let subject = FakeIdentityBackend::user_id_for("ada@example.com");
    let session = f
        .identity
        .issue_session(subject, Utc::now().timestamp() + seconds);
    f.identity.set_session(Some(session));
}

#[tokio::test]
async fn start_restores_the_existing_session() {
    let f = fixture(FakeIdentityBackend::new());
    let session = f.identity.sign_in_silently("ada@example.com");

    assert!(f.manager.snapshot().loading);
    f.manager.start().await;

    let snapshot = f.manager.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    assert_eq!(snapshot.user, Some(session.subject_id));
    assert_eq!(f.identity.subscriber_count(), 1);
    assert_eq!(f.token_cache.get_token().await, Some(session.access_token));
    assert_eq!(f.token_cache.fetch_count(), 0);

    f.manager.shutdown().await;
    assert_eq!(f.identity.subscriber_count(), 0);
}

#[tokio::test]
async fn a_session_close_to_expiry_is_refreshed() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, 120);
    f.manager.start().await;

    assert_eq!(f.manager.check_expiry().await, ExpiryAction::Refresh);
    assert_eq!(f.identity.refresh_calls(), 1);

    let session = f.manager.current_session().unwrap();
    assert!(session.seconds_remaining(Utc::now().timestamp()) > 300);
    assert_eq!(f.manager.phase(), SessionPhase::Authenticated);
    assert_eq!(f.credentials.peek(), Some(session.access_token.clone()));
    assert_eq!(f.token_cache.get_token().await, Some(session.access_token));
}

#[tokio::test]
async fn a_session_with_time_left_is_left_alone() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, 3_600);
    f.manager.start().await;

    assert_eq!(f.manager.check_expiry().await, ExpiryAction::Nothing);
    assert_eq!(f.identity.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn the_timer_drives_the_refresh() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, 120);
    f.manager.start().await;
    assert_eq!(f.identity.refresh_calls(), 0);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(f.identity.refresh_calls(), 1);

    f.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn a_zero_check_interval_still_runs_the_timer() {
    let identity = Arc::new(FakeIdentityBackend::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    let token_cache = TokenCache::new(identity.clone(), credentials.clone(), DEFAULT_TOKEN_TTL);
    let manager = SessionManager::new(
        identity.clone(),
        token_cache,
        credentials,
        Arc::new(NoticeBoard::new()),
        SessionConfig {
            check_interval: Duration::ZERO,
            ..SessionConfig::default()
        },
    );
    let subject = FakeIdentityBackend::user_id_for("ada@example.com");
    identity.set_session(Some(
        identity.issue_session(subject, Utc::now().timestamp() + 120),
    ));
    manager.start().await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(identity.refresh_calls(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn a_failed_refresh_forces_logout() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, 120);
    f.manager.start().await;
    f.identity.set_fail_refresh(true);

    let result = f.manager.refresh_session().await;
    assert!(matches!(result, Err(SessionError::Expired)));
    assert_eq!(f.manager.phase(), SessionPhase::NoSession);
    assert!(f.manager.current_session().is_none());
    assert!(!f.token_cache.has_fresh_token());
    assert_eq!(f.credentials.peek(), None);

    let notice = f.notices.take().unwrap();
    assert_eq!(notice.redirect_to, "/sign-in");
    assert!(f.notices.latest().is_none());
}

#[tokio::test]
async fn an_expired_session_is_logged_out_without_a_refresh() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, -5);
    f.manager.start().await;

    assert_eq!(f.manager.check_expiry().await, ExpiryAction::ForceLogout);
    assert_eq!(f.identity.refresh_calls(), 0);
    assert!(f.manager.current_session().is_none());
    assert!(f.notices.latest().is_some());
}

#[tokio::test]
async fn refresh_requires_a_session() {
    let f = fixture(FakeIdentityBackend::new());
    f.manager.start().await;

    let result = f.manager.refresh_session().await;
    assert!(matches!(result, Err(SessionError::NotSignedIn)));
    assert_eq!(f.identity.refresh_calls(), 0);
}

#[tokio::test]
async fn backend_notifications_keep_the_snapshot_in_sync() {
    let f = fixture(FakeIdentityBackend::new());
    f.manager.start().await;
    let mut updates = f.manager.watch();
    assert_eq!(updates.borrow_and_update().phase, SessionPhase::NoSession);

    let subject = FakeIdentityBackend::user_id_for("grace@example.com");
    let session = f
        .identity
        .issue_session(subject, Utc::now().timestamp() + 3_600);
    f.identity.emit(SessionEvent::SignedIn, Some(session.clone()));

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().user, Some(subject));
    assert!(f.token_cache.has_fresh_token());

    f.identity.emit(SessionEvent::SignedOut, None);
    assert_eq!(f.manager.phase(), SessionPhase::NoSession);
    assert!(!f.token_cache.has_fresh_token());
}

#[tokio::test]
async fn sign_in_and_sign_out_round_trip() {
    let f = fixture(FakeIdentityBackend::new().with_account("ada@example.com", "hunter2"));
    f.manager.start().await;

    let wrong = f.manager.sign_in("ada@example.com", "nope").await;
    assert!(matches!(wrong, Err(SessionError::InvalidCredentials)));

    let session = f.manager.sign_in("ada@example.com", "hunter2").await.unwrap();
    assert_eq!(f.manager.phase(), SessionPhase::Authenticated);
    assert_eq!(f.credentials.peek(), Some(session.access_token.clone()));

    f.manager.sign_out().await.unwrap();
    assert_eq!(f.manager.phase(), SessionPhase::NoSession);
    assert_eq!(f.credentials.peek(), None);
    assert!(f.token_cache.get_token().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn sign_out_wins_over_an_in_flight_refresh() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, 120);
    f.manager.start().await;
    f.identity.set_refresh_delay(Duration::from_secs(1));

    let manager = f.manager.clone();
    let refresh = tokio::spawn(async move { manager.refresh_session().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(f.manager.phase(), SessionPhase::Refreshing);

    f.manager.sign_out().await.unwrap();
    assert_eq!(f.manager.phase(), SessionPhase::NoSession);

    let result = refresh.await.unwrap();
    assert!(matches!(result, Err(SessionError::NotSignedIn)));
    assert_eq!(f.identity.refresh_calls(), 1);
    assert_eq!(f.manager.phase(), SessionPhase::NoSession);
    assert!(f.manager.current_session().is_none());
    assert!(!f.token_cache.has_fresh_token());
    assert_eq!(f.credentials.peek(), None);
    assert!(f.identity.get_session().await.unwrap().is_none());
    assert!(f.notices.latest().is_none());
}

#[tokio::test]
async fn refresh_notifications_after_sign_out_are_ignored() {
    let f = fixture(FakeIdentityBackend::new());
    session_expiring_in(&f, 3_600);
    f.manager.start().await;
    f.manager.sign_out().await.unwrap();

    let subject = FakeIdentityBackend::user_id_for("ada@example.com");
    let late = f
        .identity
        .issue_session(subject, Utc::now().timestamp() + 3_600);
    f.identity.emit(SessionEvent::TokenRefreshed, Some(late));

    assert_eq!(f.manager.phase(), SessionPhase::NoSession);
    assert!(!f.token_cache.has_fresh_token());
}
