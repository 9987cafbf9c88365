use crate::application_impl::SessionManager;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::VisitRepo;
use crate::resilience::DispatchError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VisitSyncConfig {
    pub initial_load_retry_delay: Duration,
    pub refocus_retry_delay: Duration,
}

impl Default for VisitSyncConfig {
    fn default() -> Self {
        Self {
            initial_load_retry_delay: Duration::from_millis(1000),
            refocus_retry_delay: Duration::from_millis(500),
        }
    }
}

impl VisitSyncConfig {
    fn retry_delay(&self, trigger: FetchTrigger) -> Duration {
        match trigger {
            FetchTrigger::InitialLoad => self.initial_load_retry_delay,
            FetchTrigger::Refocus => self.refocus_retry_delay,
        }
    }
}

/// Per-restaurant visit state for the signed-in user. Every mutation is
/// written through and the local copy replaced by what the backend returns.
pub struct VisitStateSynchronizer {
    visit_repo: Arc<dyn VisitRepo>,
    session: Arc<SessionManager>,
    records: DashMap<(UserId, RestaurantId), VisitRecord>,
    config: VisitSyncConfig,
}

impl VisitStateSynchronizer {
    pub fn new(
        visit_repo: Arc<dyn VisitRepo>,
        session: Arc<SessionManager>,
        config: VisitSyncConfig,
    ) -> Self {
        Self {
            visit_repo,
            session,
            records: DashMap::new(),
            config,
        }
    }

    fn current_user(&self) -> Result<UserId, VisitError> {
        self.session.snapshot().user.ok_or(VisitError::NotSignedIn)
    }

    /// Drops every locally held record, whoever it belonged to.
    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn held_records(&self) -> usize {
        self.records.len()
    }

    pub fn cached(&self, restaurant_id: RestaurantId) -> Option<VisitRecord> {
        let user = self.session.snapshot().user?;
        self.records
            .get(&(user, restaurant_id))
            .map(|r| r.value().clone())
    }

    async fn read_once(
        &self,
        user: UserId,
        restaurant_ids: &[RestaurantId],
    ) -> Result<Vec<VisitRecord>, DispatchError> {
        self.visit_repo.bulk_read(user, restaurant_ids).await
    }

    /// A 401 straight after sign-in usually means the new token has not
    /// reached the backend yet: wait once, try again, then give up.
    async fn read_with_retry(
        &self,
        user: UserId,
        restaurant_ids: &[RestaurantId],
        trigger: FetchTrigger,
    ) -> Result<Vec<VisitRecord>, VisitError> {
        match self.read_once(user, restaurant_ids).await {
            Err(DispatchError::Unauthorized) => {}
            other => return Ok(other?),
        }
        let delay = self.config.retry_delay(trigger);
        tracing::debug!(
            retry_in_ms = delay.as_millis() as u64,
            "visit fetch got 401, retrying once"
        );
        tokio::time::sleep(delay).await;
        match self.read_once(user, restaurant_ids).await {
            Err(DispatchError::Unauthorized) => {
                self.session
                    .force_logout("visit fetch rejected after retry")
                    .await;
                Err(VisitError::AuthenticationExpired)
            }
            other => Ok(other?),
        }
    }

    fn store(&self, record: VisitRecord) {
        self.records
            .insert((record.user_id, record.restaurant_id), record);
    }

    async fn current_record(
        &self,
        user: UserId,
        restaurant_id: RestaurantId,
    ) -> Result<VisitRecord, VisitError> {
        if let Some(record) = self.records.get(&(user, restaurant_id)) {
            return Ok(record.value().clone());
        }
        let fetched = self
            .read_with_retry(user, &[restaurant_id], FetchTrigger::Refocus)
            .await?;
        let record = fetched
            .into_iter()
            .find(|r| r.restaurant_id == restaurant_id)
            .unwrap_or_else(|| VisitRecord::unvisited(user, restaurant_id));
        self.store(record.clone());
        Ok(record)
    }

    async fn mutate(
        &self,
        restaurant_id: RestaurantId,
        change: impl FnOnce(&VisitRecord) -> Result<VisitRecord, VisitError> + Send,
    ) -> Result<VisitRecord, VisitError> {
        let user = self.current_user()?;
        let current = self.current_record(user, restaurant_id).await?;
        let next = change(&current)?;
        let stored = self.visit_repo.upsert(&next).await?;
        self.store(stored.clone());
        Ok(stored)
    }
}

#[async_trait::async_trait]
impl VisitService for VisitStateSynchronizer {
    async fn visits_for(
        &self,
        restaurant_ids: &[RestaurantId],
        trigger: FetchTrigger,
    ) -> Result<HashMap<RestaurantId, VisitRecord>, VisitError> {
        let user = self.current_user()?;
        if restaurant_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let fetched = self.read_with_retry(user, restaurant_ids, trigger).await?;

        let mut visits: HashMap<RestaurantId, VisitRecord> = restaurant_ids
            .iter()
            .map(|id| (*id, VisitRecord::unvisited(user, *id)))
            .collect();
        for record in fetched {
            if visits.contains_key(&record.restaurant_id) {
                visits.insert(record.restaurant_id, record);
            }
        }
        for record in visits.values() {
            self.store(record.clone());
        }
        Ok(visits)
    }

    async fn toggle_visited(&self, restaurant_id: RestaurantId) -> Result<VisitRecord, VisitError> {
        self.mutate(restaurant_id, |current| Ok(current.toggled()))
            .await
    }

    async fn increment_visit(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<VisitRecord, VisitError> {
        self.mutate(restaurant_id, |current| Ok(current.incremented()))
            .await
    }

    async fn decrement_visit(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<VisitRecord, VisitError> {
        self.mutate(restaurant_id, |current| Ok(current.decremented()?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{NoticeBoard, SessionConfig};
    use crate::infra_memory::*;
    use crate::resilience::TokenCache;
    use std::time::Duration;

    struct Fixture {
        identity: Arc<FakeIdentityBackend>,
        repo: Arc<InMemoryVisitRepo>,
        notices: Arc<NoticeBoard>,
        session: Arc<SessionManager>,
        sync: VisitStateSynchronizer,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let identity = Arc::new(FakeIdentityBackend::new());
        let signed_in = identity.sign_in_silently("ada@example.com");
        let credentials = Arc::new(MemoryCredentialStore::new());
        let token_cache = TokenCache::new(
            identity.clone(),
            credentials.clone(),
            Duration::from_secs(300),
        );
        let notices = Arc::new(NoticeBoard::new());
        let session = SessionManager::new(
            identity.clone(),
            token_cache,
            credentials,
            notices.clone(),
            SessionConfig::default(),
        );
        session.start().await;
        let repo = Arc::new(InMemoryVisitRepo::new());
        let sync =
            VisitStateSynchronizer::new(repo.clone(), session.clone(), VisitSyncConfig::default());
        Fixture {
            identity,
            repo,
            notices,
            session,
            sync,
            user: signed_in.subject_id,
        }
    }

    fn restaurant(n: u128) -> RestaurantId {
        RestaurantId(uuid::Uuid::from_u128(n))
    }

    #[tokio::test(start_paused = true)]
    async fn missing_records_default_to_unvisited() {
        let f = fixture().await;
        f.repo.insert(VisitRecord {
            user_id: f.user,
            restaurant_id: restaurant(1),
            visited: true,
            visit_count: 3,
        });

        let visits = f
            .sync
            .visits_for(&[restaurant(1), restaurant(2)], FetchTrigger::InitialLoad)
            .await
            .unwrap();
        assert_eq!(visits[&restaurant(1)].visit_count, 3);
        assert_eq!(
            visits[&restaurant(2)],
            VisitRecord::unvisited(f.user, restaurant(2))
        );
        assert_eq!(f.repo.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_unauthorized_read_is_retried_after_the_delay() {
        let f = fixture().await;
        f.repo.reject_next_reads(1);

        let started = tokio::time::Instant::now();
        let visits = f
            .sync
            .visits_for(&[restaurant(1)], FetchTrigger::Refocus)
            .await
            .unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(f.repo.read_count(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert!(f.session.current_session().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn second_unauthorized_read_signs_out() {
        let f = fixture().await;
        f.repo.reject_next_reads(2);

        let started = tokio::time::Instant::now();
        let result = f
            .sync
            .visits_for(&[restaurant(1)], FetchTrigger::InitialLoad)
            .await;
        assert!(matches!(result, Err(VisitError::AuthenticationExpired)));
        assert_eq!(f.repo.read_count(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert!(f.session.current_session().is_none());
        assert!(f.notices.latest().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_write_through() {
        let f = fixture().await;
        let id = restaurant(7);

        let toggled = f.sync.toggle_visited(id).await.unwrap();
        assert!(toggled.visited);
        assert_eq!(toggled.visit_count, 1);

        let incremented = f.sync.increment_visit(id).await.unwrap();
        assert_eq!(incremented.visit_count, 2);
        assert_eq!(f.repo.get(f.user, id), Some(incremented.clone()));

        f.sync.decrement_visit(id).await.unwrap();
        let last = f.sync.decrement_visit(id).await.unwrap();
        assert!(!last.visited);
        assert_eq!(last.visit_count, 0);
        assert_eq!(f.sync.cached(id), Some(last));
    }

    #[tokio::test(start_paused = true)]
    async fn decrement_at_zero_is_rejected_locally() {
        let f = fixture().await;
        let id = restaurant(3);
        f.sync
            .visits_for(&[id], FetchTrigger::InitialLoad)
            .await
            .unwrap();

        let result = f.sync.decrement_visit(id).await;
        assert!(matches!(result, Err(VisitError::NothingToDecrement)));
        assert_eq!(f.repo.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_users_cannot_track_visits() {
        let f = fixture().await;
        f.identity.emit(crate::domain_model::SessionEvent::SignedOut, None);

        let result = f.sync.toggle_visited(restaurant(1)).await;
        assert!(matches!(result, Err(VisitError::NotSignedIn)));
        assert_eq!(f.repo.write_count(), 0);
    }
}
