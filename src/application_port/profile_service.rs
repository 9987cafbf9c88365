use crate::domain_model::*;
use crate::resilience::DispatchError;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Covers missing profiles and private profiles alike.
    #[error("profile not found")]
    NotFound,
    #[error("authentication expired")]
    AuthenticationExpired,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<DispatchError> for ProfileError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::AuthenticationExpired | DispatchError::Unauthorized => {
                ProfileError::AuthenticationExpired
            }
            e @ (DispatchError::CircuitOpen | DispatchError::Timeout { .. }) => {
                ProfileError::Unavailable(e.to_string())
            }
            e if e.is_not_found() => ProfileError::NotFound,
            other => ProfileError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub access: AccessLevel,
    pub profile: Profile,
    pub counts: ProfileCounts,
    pub reviews: Vec<Review>,
    pub lists: Vec<RestaurantList>,
    pub restaurants: Vec<Restaurant>,
    /// Only ever populated for the owner.
    pub settings: Option<ProfileSettings>,
}

/// One part of a profile view that can be re-read on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSection {
    Profile,
    Reviews,
    Lists,
    Restaurants,
}

#[async_trait::async_trait]
pub trait ProfileService: Send + Sync {
    async fn resolve_access(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
    ) -> Result<AccessResolution, ProfileError>;

    async fn view_profile(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
    ) -> Result<ProfileView, ProfileError>;

    /// Re-reads `section` of a cached view, or the whole view when `None`.
    async fn refresh_profile(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
        section: Option<ProfileSection>,
    ) -> Result<ProfileView, ProfileError>;
}
