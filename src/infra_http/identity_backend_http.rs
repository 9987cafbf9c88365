use crate::domain_model::{Session, SessionEvent, UserId};
use crate::domain_port::*;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const API_KEY_HEADER: &str = "apikey";

#[derive(Debug, Clone)]
pub struct HttpIdentityConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: UserId,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: TokenUser,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Result<Session, IdentityError> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => at,
            (None, Some(within)) => now + within,
            (None, None) => {
                return Err(IdentityError::InvalidResponse(
                    "token response carries no expiry".into(),
                ));
            }
        };
        Ok(Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            subject_id: self.user.id,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Grant {
    Password,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Grant::Password => "password",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

/// Token-endpoint client for a hosted auth service. Holds the current session
/// in memory and fans change notifications out to subscribers.
pub struct HttpIdentityBackend {
    http: reqwest::Client,
    config: HttpIdentityConfig,
    session: Mutex<Option<Session>>,
    registry: SubscriberRegistry,
}

impl HttpIdentityBackend {
    pub fn new(config: HttpIdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            config,
            session: Mutex::new(None),
            registry: SubscriberRegistry::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn current(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    fn replace(&self, session: Option<Session>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = session;
        }
    }

    async fn token_grant(
        &self,
        grant: Grant,
        body: serde_json::Value,
    ) -> Result<Session, IdentityError> {
        let response = self
            .http
            .post(self.url("/auth/v1/token"))
            .query(&[("grant_type", grant.as_str())])
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let detail = response.text().await.unwrap_or_default();
            return Err(match grant {
                Grant::Password => IdentityError::InvalidCredentials,
                Grant::RefreshToken => IdentityError::Rejected(detail),
            });
        }
        if !status.is_success() {
            return Err(IdentityError::Transport(format!(
                "token endpoint answered {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        token.into_session(Utc::now().timestamp())
    }
}

#[async_trait::async_trait]
impl IdentityBackend for HttpIdentityBackend {
    async fn get_session(&self) -> Result<Option<Session>, IdentityError> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now().timestamp()) {
            return Ok(Some(session));
        }
        // an expired session is refreshed on read, as the hosted SDK does
        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(IdentityError::Rejected(reason)) => {
                tracing::debug!(%reason, "stored session could not be refreshed");
                self.replace(None);
                self.registry.notify(SessionEvent::SignedOut, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_session(&self) -> Result<Session, IdentityError> {
        let current = self.current().ok_or(IdentityError::NoSession)?;
        let session = self
            .token_grant(
                Grant::RefreshToken,
                serde_json::json!({ "refresh_token": current.refresh_token }),
            )
            .await?;
        self.replace(Some(session.clone()));
        self.registry
            .notify(SessionEvent::TokenRefreshed, Some(&session));
        Ok(session)
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, IdentityError> {
        let session = self
            .token_grant(
                Grant::Password,
                serde_json::json!({ "email": identifier, "password": secret }),
            )
            .await?;
        self.replace(Some(session.clone()));
        self.registry.notify(SessionEvent::SignedIn, Some(&session));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let Some(session) = self.current() else {
            self.registry.notify(SessionEvent::SignedOut, None);
            return Ok(());
        };
        // local state goes first; the remote revoke is best effort
        self.replace(None);
        self.registry.notify(SessionEvent::SignedOut, None);

        let response = self
            .http
            .post(self.url("/auth/v1/logout"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        let status = response.status();
        // an already revoked token is as good as a successful logout
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(IdentityError::Rejected(format!("logout answered {}", status)))
        }
    }

    fn subscribe(&self, handler: Arc<dyn SessionChangeHandler>) -> Subscription {
        self.registry.subscribe(handler)
    }
}
