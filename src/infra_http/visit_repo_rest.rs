use crate::domain_model::*;
use crate::domain_port::VisitRepo;
use crate::resilience::{CallOptions, DispatchError, Dispatcher, decode};
use std::sync::Arc;

const VISIT_COLUMNS: &str = "user_id,restaurant_id,visited,visit_count";

pub struct RestVisitRepo {
    dispatcher: Arc<Dispatcher>,
}

impl RestVisitRepo {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

fn bulk_read_endpoint(user_id: UserId, restaurant_ids: &[RestaurantId]) -> String {
    let ids = restaurant_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "/rest/v1/restaurant_visits?select={}&user_id=eq.{}&restaurant_id=in.({})",
        VISIT_COLUMNS, user_id, ids
    )
}

#[async_trait::async_trait]
impl VisitRepo for RestVisitRepo {
    async fn bulk_read(
        &self,
        user_id: UserId,
        restaurant_ids: &[RestaurantId],
    ) -> Result<Vec<VisitRecord>, DispatchError> {
        if restaurant_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .dispatcher
            .call(
                &bulk_read_endpoint(user_id, restaurant_ids),
                CallOptions::get().return_unauthorized(),
            )
            .await?;
        decode(&response)
    }

    async fn upsert(&self, record: &VisitRecord) -> Result<VisitRecord, DispatchError> {
        let options = CallOptions::new(HttpMethod::Post)
            .json(&[record])?
            .header("Prefer", "resolution=merge-duplicates,return=representation");
        let endpoint = format!(
            "/rest/v1/restaurant_visits?on_conflict=user_id,restaurant_id&select={}",
            VISIT_COLUMNS
        );
        let response = self.dispatcher.call(&endpoint, options).await?;
        let stored: Vec<VisitRecord> = decode(&response)?;
        stored
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::Decode("upsert returned no rows".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_reads_filter_by_user_and_restaurant_set() {
        let user = UserId(uuid::Uuid::from_u128(1));
        let endpoint = bulk_read_endpoint(
            user,
            &[
                RestaurantId(uuid::Uuid::from_u128(2)),
                RestaurantId(uuid::Uuid::from_u128(3)),
            ],
        );
        assert!(endpoint.contains(&format!("user_id=eq.{}", user)));
        assert!(endpoint.ends_with(
            "restaurant_id=in.(00000000-0000-0000-0000-000000000002,00000000-0000-0000-0000-000000000003)"
        ));
    }
}
