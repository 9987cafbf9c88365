use crate::domain_model::*;
use crate::resilience::DispatchError;

#[async_trait::async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn find_profile(
        &self,
        identifier: &ProfileIdentifier,
    ) -> Result<Option<Profile>, DispatchError>;

    async fn counts(&self, owner: UserId, level: AccessLevel)
    -> Result<ProfileCounts, DispatchError>;

    /// `page == None` reads everything the access level allows.
    async fn list_reviews(
        &self,
        owner: UserId,
        level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<Review>, DispatchError>;

    async fn list_lists(
        &self,
        owner: UserId,
        level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<RestaurantList>, DispatchError>;

    async fn list_restaurants(
        &self,
        owner: UserId,
        level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<Restaurant>, DispatchError>;

    async fn get_settings(&self, owner: UserId) -> Result<Option<ProfileSettings>, DispatchError>;
}
