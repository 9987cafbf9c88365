use crate::domain_model::*;
use crate::resilience::DispatchError;

#[async_trait::async_trait]
pub trait VisitRepo: Send + Sync {
    /// A 401 comes back as [`DispatchError::Unauthorized`] instead of purging
    /// the session; the caller decides whether it is terminal.
    async fn bulk_read(
        &self,
        user_id: UserId,
        restaurant_ids: &[RestaurantId],
    ) -> Result<Vec<VisitRecord>, DispatchError>;

    /// Last write wins. Returns the record as stored.
    async fn upsert(&self, record: &VisitRecord) -> Result<VisitRecord, DispatchError>;
}
