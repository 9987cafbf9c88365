use crate::domain_model::*;
use crate::domain_port::VisitRepo;
use crate::resilience::DispatchError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Default)]
pub struct InMemoryVisitRepo {
    records: DashMap<(UserId, RestaurantId), VisitRecord>,
    unauthorized_reads: AtomicU32,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryVisitRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: VisitRecord) {
        self.records
            .insert((record.user_id, record.restaurant_id), record);
    }

    pub fn get(&self, user_id: UserId, restaurant_id: RestaurantId) -> Option<VisitRecord> {
        self.records
            .get(&(user_id, restaurant_id))
            .map(|r| r.value().clone())
    }

    /// The next `n` bulk reads answer 401, as the backend does while a fresh
    /// token has not propagated yet.
    pub fn reject_next_reads(&self, n: u32) {
        self.unauthorized_reads.store(n, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VisitRepo for InMemoryVisitRepo {
    async fn bulk_read(
        &self,
        user_id: UserId,
        restaurant_ids: &[RestaurantId],
    ) -> Result<Vec<VisitRecord>, DispatchError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .unauthorized_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(DispatchError::Unauthorized);
        }
        Ok(restaurant_ids
            .iter()
            .filter_map(|id| self.get(user_id, *id))
            .collect())
    }

    async fn upsert(&self, record: &VisitRecord) -> Result<VisitRecord, DispatchError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(record.clone());
        Ok(record.clone())
    }
}
