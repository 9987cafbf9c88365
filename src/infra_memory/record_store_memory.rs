use super::{InMemoryProfileRepo, InMemoryVisitRepo};
use crate::domain_model::*;
use crate::domain_port::*;
use crate::resilience::DispatchError;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const REST_PREFIX: &str = "/rest/v1/";

/// A table-style REST request split into table name and raw filters.
struct TableRequest<'a> {
    table: &'a str,
    params: Vec<(&'a str, &'a str)>,
}

impl<'a> TableRequest<'a> {
    fn parse(url: &'a str) -> Option<Self> {
        let start = url.find(REST_PREFIX)? + REST_PREFIX.len();
        let rest = &url[start..];
        let (table, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .collect();
        Some(Self { table, params })
    }

    fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    fn eq<T: FromStr>(&self, column: &str) -> Option<T> {
        self.param(column)?.strip_prefix("eq.")?.parse().ok()
    }

    fn in_list<T: FromStr>(&self, column: &str) -> Option<Vec<T>> {
        let inner = self
            .param(column)?
            .strip_prefix("in.(")?
            .strip_suffix(')')?;
        inner
            .split(',')
            .filter(|item| !item.is_empty())
            .map(|item| item.parse().ok())
            .collect()
    }

    fn page(&self) -> Option<PageRequest> {
        let size = self.param("limit")?.parse().ok()?;
        let offset = self
            .param("offset")
            .and_then(|offset| offset.parse().ok())
            .unwrap_or(0);
        Some(PageRequest {
            size: PageSize(size),
            offset,
        })
    }

    // non-owners always filter on the public flag
    fn level(&self) -> AccessLevel {
        if self.param("is_public") == Some("eq.true") {
            AccessLevel::Public
        } else {
            AccessLevel::Owner
        }
    }

    fn owner(&self) -> Result<UserId, DispatchError> {
        self.eq("user_id")
            .ok_or_else(|| bad_request("a user_id filter is required"))
    }
}

fn bad_request(message: &str) -> DispatchError {
    DispatchError::Http {
        status: 400,
        body: message.to_string(),
    }
}

fn json_rows<T: Serialize>(status: u16, rows: &T) -> HttpResponse {
    match serde_json::to_vec(rows) {
        Ok(body) => HttpResponse::new(status, body),
        Err(e) => HttpResponse::new(500, e.to_string()),
    }
}

fn error_response(error: DispatchError) -> HttpResponse {
    match error {
        DispatchError::Unauthorized | DispatchError::AuthenticationExpired => {
            HttpResponse::new(401, "JWT expired")
        }
        DispatchError::Http { status, body } => HttpResponse::new(status, body),
        other => HttpResponse::new(503, other.to_string()),
    }
}

/// Record store for the "fake" backend. Answers the same table endpoints as
/// the hosted store, so reads and writes still go through the dispatcher.
pub struct InMemoryRecordStore {
    profiles: Arc<InMemoryProfileRepo>,
    visits: Arc<InMemoryVisitRepo>,
    unavailable: AtomicBool,
    requests: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new(profiles: Arc<InMemoryProfileRepo>, visits: Arc<InMemoryVisitRepo>) -> Self {
        Self {
            profiles,
            visits,
            unavailable: AtomicBool::new(false),
            requests: AtomicU64::new(0),
        }
    }

    pub fn profiles(&self) -> &Arc<InMemoryProfileRepo> {
        &self.profiles
    }

    pub fn visits(&self) -> &Arc<InMemoryVisitRepo> {
        &self.visits
    }

    /// While set, every request answers 503.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Requests that reached the store, rejected ones included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    async fn read_table(&self, request: &TableRequest<'_>) -> Result<HttpResponse, DispatchError> {
        match request.table {
            "profiles" => {
                let identifier = match (request.eq("id"), request.eq::<String>("short_code")) {
                    (Some(id), _) => ProfileIdentifier::Id(id),
                    (None, Some(code)) => ProfileIdentifier::ShortCode(code),
                    (None, None) => return Err(bad_request("an id or short_code filter is required")),
                };
                let found = self.profiles.find_profile(&identifier).await?;
                Ok(json_rows(200, &found.into_iter().collect::<Vec<_>>()))
            }
            "reviews" => {
                let rows = self
                    .profiles
                    .list_reviews(request.owner()?, request.level(), request.page())
                    .await?;
                Ok(json_rows(200, &rows))
            }
            "restaurant_lists" => {
                let rows = self
                    .profiles
                    .list_lists(request.owner()?, request.level(), request.page())
                    .await?;
                Ok(json_rows(200, &rows))
            }
            "user_restaurants" => {
                let rows = self
                    .profiles
                    .list_restaurants(request.owner()?, request.level(), request.page())
                    .await?;
                Ok(json_rows(200, &rows))
            }
            "profile_settings" => {
                let settings = self.profiles.get_settings(request.owner()?).await?;
                Ok(json_rows(200, &settings.into_iter().collect::<Vec<_>>()))
            }
            "restaurant_visits" => {
                let restaurant_ids: Vec<RestaurantId> = request
                    .in_list("restaurant_id")
                    .ok_or_else(|| bad_request("a restaurant_id=in.(..) filter is required"))?;
                let rows = self
                    .visits
                    .bulk_read(request.owner()?, &restaurant_ids)
                    .await?;
                Ok(json_rows(200, &rows))
            }
            other => Err(DispatchError::Http {
                status: 404,
                body: format!("unknown table {}", other),
            }),
        }
    }

    async fn upsert_visits(&self, body: Option<&[u8]>) -> Result<HttpResponse, DispatchError> {
        let records: Vec<VisitRecord> = serde_json::from_slice(body.unwrap_or_default())
            .map_err(|e| bad_request(&e.to_string()))?;
        let mut stored = Vec::with_capacity(records.len());
        for record in &records {
            stored.push(self.visits.upsert(record).await?);
        }
        Ok(json_rows(201, &stored))
    }
}

#[async_trait::async_trait]
impl HttpTransport for InMemoryRecordStore {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Ok(HttpResponse::new(503, "record store unavailable"));
        }
        let bearer = request
            .header("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| !token.is_empty());
        if !bearer {
            return Ok(HttpResponse::new(401, "missing bearer token"));
        }
        let Some(table) = TableRequest::parse(&request.url) else {
            return Ok(HttpResponse::new(404, format!("no route for {}", request.url)));
        };

        let outcome = match (request.method, table.table) {
            (HttpMethod::Get, _) => self.read_table(&table).await,
            (HttpMethod::Post, "restaurant_visits") => {
                self.upsert_visits(request.body.as_deref()).await
            }
            (method, name) => Err(DispatchError::Http {
                status: 405,
                body: format!("{} is not supported on {}", method, name),
            }),
        };
        Ok(outcome.unwrap_or_else(error_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: vec![("Authorization".to_string(), "Bearer t".to_string())],
            body: None,
        }
    }

    fn store() -> InMemoryRecordStore {
        InMemoryRecordStore::new(
            Arc::new(InMemoryProfileRepo::new()),
            Arc::new(InMemoryVisitRepo::new()),
        )
    }

    #[test]
    fn filters_are_read_back_from_the_query_string() {
        let user = UserId(uuid::Uuid::from_u128(1));
        let url = format!(
            "http://store/rest/v1/restaurant_lists?select=id,name&user_id=eq.{}&is_public=eq.true&limit=10&offset=20",
            user
        );
        let request = TableRequest::parse(&url).unwrap();
        assert_eq!(request.table, "restaurant_lists");
        assert_eq!(request.owner().unwrap(), user);
        assert_eq!(request.level(), AccessLevel::Public);
        assert_eq!(
            request.page(),
            Some(PageRequest {
                size: PageSize(10),
                offset: 20
            })
        );
    }

    #[tokio::test]
    async fn requests_without_a_bearer_token_are_rejected() {
        let store = store();
        let mut request = get("/rest/v1/profiles?select=id&short_code=eq.ada");
        request.headers.clear();
        let response = store.send(request).await.unwrap();
        assert_eq!(response.status, 401);
    }

    #[tokio::test]
    async fn profiles_are_found_by_short_code() {
        let store = store();
        let id = UserId(uuid::Uuid::from_u128(3));
        store.profiles().insert_profile(Profile {
            id,
            owner_id: id,
            short_code: "ada".into(),
            display_name: "Ada".into(),
            is_public: true,
        });

        let response = store
            .send(get("/rest/v1/profiles?select=id&short_code=eq.ada&limit=1&offset=0"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        let rows: Vec<Profile> = response.json().unwrap();
        assert_eq!(rows[0].id, id);
    }

    #[tokio::test]
    async fn rejected_visit_reads_answer_401() {
        let store = store();
        store.visits().reject_next_reads(1);
        let url = format!(
            "/rest/v1/restaurant_visits?user_id=eq.{}&restaurant_id=in.({})",
            uuid::Uuid::from_u128(1),
            uuid::Uuid::from_u128(2)
        );
        assert_eq!(store.send(get(&url)).await.unwrap().status, 401);
        assert_eq!(store.send(get(&url)).await.unwrap().status, 200);
    }
}
