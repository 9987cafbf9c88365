use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::resilience::*;
use crate::settings::Settings;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// External collaborators the server is wired on top of.
pub struct Backends {
    pub identity: Arc<dyn IdentityBackend>,
    pub credentials: Arc<dyn CredentialStore>,
    /// Record store transport; every record read and write goes through the dispatcher on top of it.
    pub transport: Arc<dyn HttpTransport>,
}

pub struct Server {
    pub session_manager: Arc<SessionManager>,
    pub profile_service: Arc<dyn ProfileService>,
    pub visit_service: Arc<dyn VisitService>,
    pub visits: Arc<VisitStateSynchronizer>,
    pub notices: Arc<NoticeBoard>,
    pub aggregate_cache: Arc<UserAggregateCache>,
    pub dispatcher: Arc<Dispatcher>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    session_watch_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

/// Registers the SIGINT handler up front so a failure surfaces before
/// serving; the returned future resolves on the first interrupt.
#[cfg(unix)]
pub fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut interrupt = signal(SignalKind::interrupt())?;
    Ok(async move {
        interrupt.recv().await;
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    })
}

/// Drops per-user state held in memory whenever the session ends.
fn spawn_sign_out_cleanup(
    mut session: watch::Receiver<SessionSnapshot>,
    aggregate_cache: Arc<UserAggregateCache>,
    visits: Arc<VisitStateSynchronizer>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut signed_in = session.borrow_and_update().user.is_some();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_signed_in = session.borrow_and_update().user.is_some();
                    if signed_in && !now_signed_in {
                        aggregate_cache.clear();
                        visits.clear();
                        debug!("cleared per-user state after sign-out");
                    }
                    signed_in = now_signed_in;
                }
            }
        }
        debug!("sign-out cleanup stopped");
    })
}

fn fake_identity(settings: &Settings) -> FakeIdentityBackend {
    settings
        .identity
        .fake_accounts
        .iter()
        .fold(FakeIdentityBackend::new(), |backend, account| {
            backend.with_account(&account.identifier, &account.secret)
        })
}

/// Gives every fake account a public profile so the fake stack is browsable.
fn fake_profiles(settings: &Settings) -> InMemoryProfileRepo {
    let repo = InMemoryProfileRepo::new();
    for account in &settings.identity.fake_accounts {
        let id = FakeIdentityBackend::user_id_for(&account.identifier);
        let name = account
            .identifier
            .split('@')
            .next()
            .unwrap_or(&account.identifier)
            .to_string();
        repo.insert_profile(Profile {
            id,
            owner_id: id,
            short_code: name.clone(),
            display_name: name,
            is_public: true,
        });
    }
    repo
}

impl Backends {
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let identity: Arc<dyn IdentityBackend> = match settings.identity.backend.as_str() {
            "fake" => Arc::new(fake_identity(settings)),
            "real" => Arc::new(HttpIdentityBackend::new(HttpIdentityConfig {
                base_url: settings.identity.base_url.clone(),
                api_key: settings.identity.api_key.clone(),
                request_timeout: Duration::from_millis(settings.resilience.request_timeout_ms),
            })?),
            other => return Err(anyhow::anyhow!("Unknown identity backend: {}", other)),
        };

        let credentials: Arc<dyn CredentialStore> =
            match settings.credential_store.backend.as_str() {
                "memory" => Arc::new(MemoryCredentialStore::new()),
                "redis" => Arc::new(
                    RedisCredentialStore::connect(
                        &settings.credential_store.redis_url,
                        settings.credential_store.key_prefix.clone(),
                        settings.credential_store.ttl_secs,
                    )
                    .await?,
                ),
                other => return Err(anyhow::anyhow!("Unknown credential store: {}", other)),
            };

        let transport: Arc<dyn HttpTransport> = match settings.record_store.backend.as_str() {
            "fake" => Arc::new(InMemoryRecordStore::new(
                Arc::new(fake_profiles(settings)),
                Arc::new(InMemoryVisitRepo::new()),
            )),
            "real" => Arc::new(ReqwestTransport::new()),
            other => return Err(anyhow::anyhow!("Unknown record store backend: {}", other)),
        };

        Ok(Self {
            identity,
            credentials,
            transport,
        })
    }
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let backends = Backends::from_settings(settings).await?;
        Ok(Self::with_backends(settings, backends).await)
    }

    pub async fn with_backends(settings: &Settings, backends: Backends) -> Self {
        let resilience = &settings.resilience;

        let token_cache = TokenCache::new(
            backends.identity.clone(),
            backends.credentials.clone(),
            Duration::from_secs(resilience.token_ttl_secs),
        );

        let notices = Arc::new(NoticeBoard::new());
        let session_manager = SessionManager::new(
            backends.identity.clone(),
            token_cache.clone(),
            backends.credentials.clone(),
            notices.clone(),
            SessionConfig {
                check_interval: Duration::from_secs(settings.session.check_interval_secs),
                refresh_threshold: Duration::from_secs(settings.session.refresh_threshold_secs),
                sign_in_path: settings.session.sign_in_path.clone(),
            },
        );
        session_manager.start().await;

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: resilience.failure_threshold,
            cooldown: Duration::from_secs(resilience.cooldown_secs),
        }));
        let mut default_headers = Vec::new();
        if !settings.identity.api_key.is_empty() {
            default_headers.push(("apikey".to_string(), settings.identity.api_key.clone()));
        }
        let dispatcher = Arc::new(Dispatcher::new(
            backends.transport,
            token_cache,
            breaker,
            session_manager.clone(),
            DispatcherConfig {
                base_url: settings.record_store.base_url.clone(),
                request_timeout: Duration::from_millis(resilience.request_timeout_ms),
                max_retries: resilience.max_retries,
                backoff_base: Duration::from_millis(resilience.backoff_base_ms),
                default_headers,
            },
        ));

        let profile_repo: Arc<dyn ProfileRepo> = Arc::new(RestProfileRepo::new(dispatcher.clone()));
        let visit_repo: Arc<dyn VisitRepo> = Arc::new(RestVisitRepo::new(dispatcher.clone()));

        let aggregate_cache = Arc::new(UserAggregateCache::new(Duration::from_secs(
            settings.aggregate_cache.ttl_secs,
        )));
        let profile_service: Arc<dyn ProfileService> = Arc::new(RealProfileService::new(
            profile_repo,
            aggregate_cache.clone(),
            PageSize(settings.aggregate_cache.public_page_size),
        ));
        let visits = Arc::new(VisitStateSynchronizer::new(
            visit_repo,
            session_manager.clone(),
            VisitSyncConfig {
                initial_load_retry_delay: Duration::from_millis(
                    settings.visits.initial_load_retry_delay_ms,
                ),
                refocus_retry_delay: Duration::from_millis(settings.visits.refocus_retry_delay_ms),
            },
        ));
        let visit_service: Arc<dyn VisitService> = visits.clone();

        let cancel = CancellationToken::new();
        let sweeper_handle = aggregate_cache.spawn_sweeper(
            Duration::from_secs(settings.aggregate_cache.sweep_interval_secs),
            cancel.clone(),
        );
        let session_watch_handle = spawn_sign_out_cleanup(
            session_manager.watch(),
            aggregate_cache.clone(),
            visits.clone(),
            cancel.clone(),
        );

        info!("server started");

        Self {
            session_manager,
            profile_service,
            visit_service,
            visits,
            notices,
            aggregate_cache,
            dispatcher,
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            session_watch_handle: Mutex::new(Some(session_watch_handle)),
            cancel,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let sweeper = self.sweeper_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = sweeper {
            let r = handle.await;
            info!("cache sweeper handle dropped: {:?}", r);
        }

        let session_watch = self.session_watch_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = session_watch {
            let r = handle.await;
            info!("session watch handle dropped: {:?}", r);
        }

        self.session_manager.shutdown().await;
    }
}
