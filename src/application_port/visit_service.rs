use crate::domain_model::*;
use crate::resilience::DispatchError;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum VisitError {
    #[error("sign in to track visits")]
    NotSignedIn,
    #[error("visit count is already zero")]
    NothingToDecrement,
    #[error("authentication expired")]
    AuthenticationExpired,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<DispatchError> for VisitError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::AuthenticationExpired | DispatchError::Unauthorized => {
                VisitError::AuthenticationExpired
            }
            e @ (DispatchError::CircuitOpen | DispatchError::Timeout { .. }) => {
                VisitError::Unavailable(e.to_string())
            }
            other => VisitError::Upstream(other.to_string()),
        }
    }
}

impl From<NothingToDecrement> for VisitError {
    fn from(_: NothingToDecrement) -> Self {
        VisitError::NothingToDecrement
    }
}

/// Why a restaurant list is being rendered; picks the 401 retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchTrigger {
    #[default]
    InitialLoad,
    Refocus,
}

#[async_trait::async_trait]
pub trait VisitService: Send + Sync {
    async fn visits_for(
        &self,
        restaurant_ids: &[RestaurantId],
        trigger: FetchTrigger,
    ) -> Result<HashMap<RestaurantId, VisitRecord>, VisitError>;
    async fn toggle_visited(&self, restaurant_id: RestaurantId) -> Result<VisitRecord, VisitError>;
    async fn increment_visit(&self, restaurant_id: RestaurantId)
    -> Result<VisitRecord, VisitError>;
    async fn decrement_visit(&self, restaurant_id: RestaurantId)
    -> Result<VisitRecord, VisitError>;
}
