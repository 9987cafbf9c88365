use crate::application_port::ProfileView;
use crate::domain_model::*;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_AGGREGATE_TTL: Duration = Duration::from_secs(5 * 60);
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct CacheEntry {
    view: ProfileView,
    cached_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.cached_at) <= self.ttl
    }
}

/// Time-boxed cache of profile pages keyed by the profile owner. An entry
/// remembers the access level it was built for and is only served back to
/// a viewer resolving to that same level.
pub struct UserAggregateCache {
    entries: DashMap<UserId, CacheEntry>,
    ttl: Duration,
}

impl UserAggregateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, profile_id: UserId, level: AccessLevel) -> Option<ProfileView> {
        let entry = self.entries.get(&profile_id)?;
        if entry.view.access != level || !entry.is_fresh(Instant::now()) {
            return None;
        }
        Some(entry.view.clone())
    }

    pub fn put(&self, profile_id: UserId, view: ProfileView) {
        self.entries.insert(
            profile_id,
            CacheEntry {
                view,
                cached_at: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    /// Field updates only land on an entry built for the same access level.
    fn update(
        &self,
        profile_id: UserId,
        level: AccessLevel,
        apply: impl FnOnce(&mut ProfileView),
    ) -> bool {
        match self.entries.get_mut(&profile_id) {
            Some(mut entry) if entry.view.access == level => {
                apply(&mut entry.view);
                entry.cached_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    pub fn update_profile(&self, profile_id: UserId, level: AccessLevel, profile: Profile) -> bool {
        self.update(profile_id, level, |view| view.profile = profile)
    }

    pub fn update_reviews(&self, profile_id: UserId, level: AccessLevel, reviews: Vec<Review>) -> bool {
        self.update(profile_id, level, |view| view.reviews = reviews)
    }

    pub fn update_lists(
        &self,
        profile_id: UserId,
        level: AccessLevel,
        lists: Vec<RestaurantList>,
    ) -> bool {
        self.update(profile_id, level, |view| view.lists = lists)
    }

    pub fn update_restaurants(
        &self,
        profile_id: UserId,
        level: AccessLevel,
        restaurants: Vec<Restaurant>,
    ) -> bool {
        self.update(profile_id, level, |view| view.restaurants = restaurants)
    }

    pub fn invalidate(&self, profile_id: UserId) {
        self.entries.remove(&profile_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deletes every entry older than its TTL, returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        if period < MIN_SWEEP_INTERVAL {
            tracing::warn!(?period, "sweep interval too small, using {:?}", MIN_SWEEP_INTERVAL);
        }
        let period = period.max(MIN_SWEEP_INTERVAL);
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("aggregate cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "swept stale profile aggregates");
                        }
                    }
                }
            }
        })
    }
}

impl Default for UserAggregateCache {
    fn default() -> Self {
        Self::new(DEFAULT_AGGREGATE_TTL)
    }
}
