use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub owner_id: UserId,
    pub short_code: String,
    pub display_name: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub email: Option<String>,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: uuid::Uuid,
    pub restaurant_id: uuid::Uuid,
    pub rating: u8,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantList {
    pub id: uuid::Uuid,
    pub name: String,
    pub is_public: bool,
    pub restaurant_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: uuid::Uuid,
    pub name: String,
    pub city: Option<String>,
}

/// Derived collections shown on a profile page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileAggregate {
    pub profile: Profile,
    pub reviews: Vec<Review>,
    pub lists: Vec<RestaurantList>,
    pub restaurants: Vec<Restaurant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounts {
    pub reviews: u32,
    pub lists: u32,
    pub restaurants: u32,
}
