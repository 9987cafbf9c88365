use crate::domain_port::{CredentialStore, IdentityBackend};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct TokenCacheEntry {
    token: String,
    cached_at: Instant,
    ttl: Duration,
}

impl TokenCacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.cached_at) <= self.ttl
    }
}

type PendingToken = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct Slot {
    entry: Option<TokenCacheEntry>,
    inflight: Option<PendingToken>,
    // bumped on every invalidate/prime so a fetch that started earlier
    // cannot write a stale token back into the slot
    generation: u64,
}

struct Inner {
    identity: Arc<dyn IdentityBackend>,
    credentials: Arc<dyn CredentialStore>,
    ttl: Duration,
    slot: Mutex<Slot>,
    fetches: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(self: Arc<Self>, generation: u64) -> Option<String> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = match self.identity.get_session().await {
            Ok(Some(session)) => Some(session.access_token),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "session read failed, falling back to stored token");
                None
            }
        };

        let token = match fetched {
            Some(token) => {
                let mut slot = self.lock();
                if slot.generation == generation {
                    slot.entry = Some(TokenCacheEntry {
                        token: token.clone(),
                        cached_at: Instant::now(),
                        ttl: self.ttl,
                    });
                }
                Some(token)
            }
            None => match self.credentials.load_token().await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(error = %e, "stored token lookup failed");
                    None
                }
            },
        };

        let mut slot = self.lock();
        if slot.generation == generation {
            slot.inflight = None;
        }
        token
    }
}

/// Single shared slot holding the current user's bearer token.
///
/// Concurrent misses share one fetch against the session endpoint. Cheap to
/// clone; clones share the slot.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<Inner>,
}

impl TokenCache {
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        credentials: Arc<dyn CredentialStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                credentials,
                ttl,
                slot: Mutex::new(Slot::default()),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    pub async fn get_token(&self) -> Option<String> {
        let pending = {
            let mut slot = self.inner.lock();
            if let Some(entry) = &slot.entry {
                if entry.is_fresh(Instant::now()) {
                    return Some(entry.token.clone());
                }
                slot.entry = None;
            }
            if let Some(pending) = slot.inflight.clone() {
                pending
            } else {
                let pending = self
                    .inner
                    .clone()
                    .fetch(slot.generation)
                    .boxed()
                    .shared();
                slot.inflight = Some(pending.clone());
                pending
            }
        };
        pending.await
    }

    /// Drops the cached token and detaches any fetch in flight.
    pub fn invalidate(&self) {
        let mut slot = self.inner.lock();
        slot.entry = None;
        slot.inflight = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Seeds the slot with a token just obtained from sign-in or refresh.
    pub fn prime(&self, token: &str) {
        let mut slot = self.inner.lock();
        slot.entry = Some(TokenCacheEntry {
            token: token.to_owned(),
            cached_at: Instant::now(),
            ttl: self.inner.ttl,
        });
        slot.inflight = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    pub fn has_fresh_token(&self) -> bool {
        self.inner
            .lock()
            .entry
            .as_ref()
            .is_some_and(|entry| entry.is_fresh(Instant::now()))
    }

    /// Number of fetches issued against the session endpoint so far.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }
}
