use crate::domain_model::*;
use crate::domain_port::ProfileRepo;
use crate::resilience::{DispatchError, Dispatcher};
use serde::de::{DeserializeOwned, IgnoredAny};
use std::sync::Arc;

const PROFILE_COLUMNS: &str = "id,owner_id,short_code,display_name,is_public";
const REVIEW_COLUMNS: &str = "id,restaurant_id,rating,body,created_at";
const LIST_COLUMNS: &str = "id,name,is_public,restaurant_count";
const RESTAURANT_COLUMNS: &str = "id,name,city";

/// Row-filter query string for a table-style REST endpoint.
#[derive(Debug, Clone)]
struct TableQuery {
    table: &'static str,
    params: Vec<(String, String)>,
}

impl TableQuery {
    fn new(table: &'static str, columns: &str) -> Self {
        Self {
            table,
            params: vec![("select".to_string(), columns.to_string())],
        }
    }

    fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    fn order(mut self, clause: &str) -> Self {
        self.params.push(("order".to_string(), clause.to_string()));
        self
    }

    fn page(mut self, page: Option<PageRequest>) -> Self {
        if let Some(page) = page {
            self.params
                .push(("limit".to_string(), page.size.0.to_string()));
            self.params
                .push(("offset".to_string(), page.offset.to_string()));
        }
        self
    }

    fn endpoint(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("/rest/v1/{}?{}", self.table, query)
    }
}

fn visible_lists(owner: UserId, level: AccessLevel, columns: &str) -> TableQuery {
    let query = TableQuery::new("restaurant_lists", columns).eq("user_id", owner);
    if level == AccessLevel::Owner {
        query
    } else {
        query.eq("is_public", true)
    }
}

fn is_valid_short_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct RestProfileRepo {
    dispatcher: Arc<Dispatcher>,
}

impl RestProfileRepo {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    async fn rows<T: DeserializeOwned>(&self, query: TableQuery) -> Result<Vec<T>, DispatchError> {
        self.dispatcher.get(&query.endpoint()).await
    }

    async fn count(&self, query: TableQuery) -> Result<u32, DispatchError> {
        let rows: Vec<IgnoredAny> = self.rows(query).await?;
        Ok(rows.len() as u32)
    }
}

#[async_trait::async_trait]
impl ProfileRepo for RestProfileRepo {
    async fn find_profile(
        &self,
        identifier: &ProfileIdentifier,
    ) -> Result<Option<Profile>, DispatchError> {
        let query = TableQuery::new("profiles", PROFILE_COLUMNS);
        let query = match identifier {
            ProfileIdentifier::Id(id) => query.eq("id", id),
            ProfileIdentifier::ShortCode(code) if is_valid_short_code(code) => {
                query.eq("short_code", code)
            }
            ProfileIdentifier::ShortCode(_) => return Ok(None),
        };
        let profiles: Vec<Profile> = self
            .rows(query.page(Some(PageRequest::first(PageSize(1)))))
            .await?;
        Ok(profiles.into_iter().next())
    }

    async fn counts(
        &self,
        owner: UserId,
        level: AccessLevel,
    ) -> Result<ProfileCounts, DispatchError> {
        let (reviews, lists, restaurants) = tokio::try_join!(
            self.count(TableQuery::new("reviews", "id").eq("user_id", owner)),
            self.count(visible_lists(owner, level, "id")),
            self.count(TableQuery::new("user_restaurants", "id").eq("user_id", owner)),
        )?;
        Ok(ProfileCounts {
            reviews,
            lists,
            restaurants,
        })
    }

    async fn list_reviews(
        &self,
        owner: UserId,
        _level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<Review>, DispatchError> {
        let query = TableQuery::new("reviews", REVIEW_COLUMNS)
            .eq("user_id", owner)
            .order("created_at.desc")
            .page(page);
        self.rows(query).await
    }

    async fn list_lists(
        &self,
        owner: UserId,
        level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<RestaurantList>, DispatchError> {
        let query = visible_lists(owner, level, LIST_COLUMNS)
            .order("created_at.desc")
            .page(page);
        self.rows(query).await
    }

    async fn list_restaurants(
        &self,
        owner: UserId,
        _level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<Restaurant>, DispatchError> {
        let query = TableQuery::new("user_restaurants", RESTAURANT_COLUMNS)
            .eq("user_id", owner)
            .order("name.asc")
            .page(page);
        self.rows(query).await
    }

    async fn get_settings(&self, owner: UserId) -> Result<Option<ProfileSettings>, DispatchError> {
        let query = TableQuery::new("profile_settings", "email,notifications_enabled")
            .eq("user_id", owner)
            .page(Some(PageRequest::first(PageSize(1))));
        let rows: Vec<ProfileSettings> = self.rows(query).await?;
        Ok(rows.into_iter().next())
    }
}
