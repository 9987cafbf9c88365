use super::{CircuitBreaker, DispatchError, TokenCache};
use crate::domain_model::{HttpMethod, HttpRequest, HttpResponse};
use crate::domain_port::HttpTransport;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Sent on every request, e.g. the hosted backend's api key.
    pub default_headers: Vec<(String, String)>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
            default_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnauthorizedPolicy {
    /// Purge local auth state and force re-authentication.
    #[default]
    Terminal,
    /// Hand the 401 back as [`DispatchError::Unauthorized`] untouched.
    ReturnToCaller,
}

#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub unauthorized: UnauthorizedPolicy,
}

impl CallOptions {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            headers: Vec::new(),
            body: None,
            unauthorized: UnauthorizedPolicy::Terminal,
        }
    }

    pub fn get() -> Self {
        Self::new(HttpMethod::Get)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, DispatchError> {
        let bytes = serde_json::to_vec(body).map_err(|e| DispatchError::Encode(e.to_string()))?;
        self.body = Some(bytes);
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn return_unauthorized(mut self) -> Self {
        self.unauthorized = UnauthorizedPolicy::ReturnToCaller;
        self
    }
}

/// Invoked after a terminal 401, once the token slot is already empty.
#[async_trait::async_trait]
pub trait AuthFailureHandler: Send + Sync {
    async fn on_authentication_expired(&self, reason: &str);
}

/// The one place outbound calls go through. Owns the process-wide breaker and
/// shares the token slot with the session manager.
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    token_cache: TokenCache,
    breaker: Arc<CircuitBreaker>,
    auth_failure: Arc<dyn AuthFailureHandler>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_cache: TokenCache,
        breaker: Arc<CircuitBreaker>,
        auth_failure: Arc<dyn AuthFailureHandler>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            transport,
            token_cache,
            breaker,
            auth_failure,
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    pub async fn call(
        &self,
        endpoint: &str,
        options: CallOptions,
    ) -> Result<HttpResponse, DispatchError> {
        if !self.breaker.allow_request() {
            return Err(DispatchError::CircuitOpen);
        }

        let token = match self.token_cache.get_token().await {
            Some(token) => token,
            None => {
                tracing::debug!(endpoint, "no bearer token available");
                return Err(DispatchError::AuthenticationExpired);
            }
        };

        let url = endpoint_url(&self.config.base_url, endpoint);
        let mut attempt: u32 = 0;
        loop {
            let request = self.build_request(&url, &token, &options);
            let outcome = timeout(self.config.request_timeout, self.transport.send(request)).await;

            let response = match outcome {
                Err(_elapsed) => {
                    self.breaker.record_failure();
                    if attempt < self.config.max_retries {
                        let delay = backoff_for_attempt(self.config.backoff_base, attempt);
                        tracing::warn!(
                            %url,
                            attempt = attempt + 1,
                            retry_in_ms = delay.as_millis() as u64,
                            "request timed out, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        if !self.breaker.allow_request() {
                            return Err(DispatchError::CircuitOpen);
                        }
                        continue;
                    }
                    return Err(DispatchError::Timeout {
                        attempts: attempt + 1,
                    });
                }
                Ok(Err(e)) => {
                    self.breaker.record_failure();
                    return Err(DispatchError::Network(e.0));
                }
                Ok(Ok(response)) => response,
            };

            if response.is_success() {
                self.breaker.record_success();
                return Ok(response);
            }

            if response.status == 401 {
                // the backend answered; this says nothing about its health
                self.breaker.record_success();
                return match options.unauthorized {
                    UnauthorizedPolicy::Terminal => {
                        self.expire_authentication("request rejected with 401")
                            .await;
                        Err(DispatchError::AuthenticationExpired)
                    }
                    UnauthorizedPolicy::ReturnToCaller => Err(DispatchError::Unauthorized),
                };
            }

            if response.status >= 500 {
                self.breaker.record_failure();
            } else {
                self.breaker.record_success();
            }
            return Err(DispatchError::Http {
                status: response.status,
                body: response.text(),
            });
        }
    }

    /// Terminal auth failure path: empty the token slot synchronously, then
    /// hand over to the session owner for the rest of the purge.
    pub async fn expire_authentication(&self, reason: &str) {
        self.token_cache.invalidate();
        tracing::warn!(reason, "authentication expired");
        self.auth_failure.on_authentication_expired(reason).await;
    }

    fn build_request(&self, url: &str, token: &str, options: &CallOptions) -> HttpRequest {
        let mut headers = Vec::with_capacity(options.headers.len() + 4);
        headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        headers.push(("Accept".to_string(), "application/json".to_string()));
        headers.extend(self.config.default_headers.iter().cloned());
        headers.extend(options.headers.iter().cloned());
        HttpRequest {
            method: options.method,
            url: url.to_owned(),
            headers,
            body: options.body.clone(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, DispatchError> {
        let response = self.call(endpoint, CallOptions::get()).await?;
        decode(&response)
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, DispatchError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let options = CallOptions::new(HttpMethod::Post).json(body)?;
        let response = self.call(endpoint, options).await?;
        decode(&response)
    }

    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> Result<T, DispatchError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let options = CallOptions::new(HttpMethod::Put).json(body)?;
        let response = self.call(endpoint, options).await?;
        decode(&response)
    }

    pub async fn patch<B, T>(&self, endpoint: &str, body: &B) -> Result<T, DispatchError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let options = CallOptions::new(HttpMethod::Patch).json(body)?;
        let response = self.call(endpoint, options).await?;
        decode(&response)
    }

    pub async fn delete(&self, endpoint: &str) -> Result<(), DispatchError> {
        self.call(endpoint, CallOptions::new(HttpMethod::Delete))
            .await
            .map(|_| ())
    }
}

pub fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, DispatchError> {
    response
        .json()
        .map_err(|e| DispatchError::Decode(e.to_string()))
}

fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    if base_url.is_empty() || endpoint.starts_with("http://") || endpoint.starts_with("https://")
    {
        return endpoint.to_owned();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// 1x, 2x, 4x ... the base delay.
pub fn backoff_for_attempt(base: Duration, attempt: u32) -> Duration {
    let multiplier = 1u32 << attempt.min(8);
    base.saturating_mul(multiplier)
}
