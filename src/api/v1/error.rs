use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(failure) = err.find::<ApiFailure>() {
        let json = warp::reply::json(&ApiResponse::<()>::err(
            failure.code,
            failure.code.to_string(),
            failure.notice.clone(),
        ));
        Ok(warp::reply::with_status(json, failure.code.status()))
    } else if err.is_not_found() {
        let json = warp::reply::json(&ApiResponse::<()>::err(
            ApiErrorCode::NotFound,
            "no such route",
            None,
        ));
        Ok(warp::reply::with_status(json, StatusCode::NOT_FOUND))
    } else if err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::filters::body::BodyDeserializeError>().is_some()
    {
        let json = warp::reply::json(&ApiResponse::<()>::err(
            ApiErrorCode::InvalidRequest,
            format!("{:?}", err),
            None,
        ));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else {
        let json = warp::reply::json(&ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                code: ApiErrorCode::InternalError,
                message: format!("Unhandled error: {:?}", err),
                notice: None,
            }),
        });
        Ok(warp::reply::with_status(
            json,
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    /// Present when the caller has to sign in again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<ReauthNotice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Sign in required")]
    NotSignedIn,
    #[error("Your session has expired")]
    AuthenticationExpired,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Visit count is already zero")]
    NothingToDecrement,
    #[error("A session refresh is already running")]
    RefreshInProgress,
    #[error("Service temporarily unavailable")]
    Unavailable,
    #[error("Upstream service error")]
    Upstream,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    fn upstream<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Upstream error: {}", error);
        ApiErrorCode::Upstream
    }

    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::NotSignedIn
            | ApiErrorCode::AuthenticationExpired => StatusCode::UNAUTHORIZED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::InvalidRequest | ApiErrorCode::NothingToDecrement => {
                StatusCode::BAD_REQUEST
            }
            ApiErrorCode::RefreshInProgress => StatusCode::CONFLICT,
            ApiErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::Upstream => StatusCode::BAD_GATEWAY,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Rejection carried through warp; auth failures bring the latest notice.
#[derive(Debug)]
pub struct ApiFailure {
    pub code: ApiErrorCode,
    pub notice: Option<ReauthNotice>,
}

impl reject::Reject for ApiFailure {}

impl ApiFailure {
    pub fn reject(code: ApiErrorCode, notice: Option<ReauthNotice>) -> Rejection {
        let notice = match code {
            ApiErrorCode::AuthenticationExpired => notice,
            _ => None,
        };
        reject::custom(ApiFailure { code, notice })
    }
}

impl From<SessionError> for ApiErrorCode {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            SessionError::NotSignedIn => ApiErrorCode::NotSignedIn,
            SessionError::Expired => ApiErrorCode::AuthenticationExpired,
            SessionError::RefreshInProgress => ApiErrorCode::RefreshInProgress,
            SessionError::Identity(e) => ApiErrorCode::upstream(e),
            SessionError::Store(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<ProfileError> for ApiErrorCode {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::NotFound => ApiErrorCode::NotFound,
            ProfileError::AuthenticationExpired => ApiErrorCode::AuthenticationExpired,
            ProfileError::Unavailable(e) => {
                warn!("profile read unavailable: {}", e);
                ApiErrorCode::Unavailable
            }
            ProfileError::Upstream(e) => ApiErrorCode::upstream(e),
        }
    }
}

impl From<VisitError> for ApiErrorCode {
    fn from(error: VisitError) -> Self {
        match error {
            VisitError::NotSignedIn => ApiErrorCode::NotSignedIn,
            VisitError::NothingToDecrement => ApiErrorCode::NothingToDecrement,
            VisitError::AuthenticationExpired => ApiErrorCode::AuthenticationExpired,
            VisitError::Unavailable(e) => {
                warn!("visit sync unavailable: {}", e);
                ApiErrorCode::Unavailable
            }
            VisitError::Upstream(e) => ApiErrorCode::upstream(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_and_missing_profiles_look_the_same() {
        assert_eq!(
            ApiErrorCode::from(ProfileError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn open_circuit_is_a_503() {
        let code = ApiErrorCode::from(ProfileError::Unavailable("circuit open".into()));
        assert_eq!(code.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn notices_only_ride_on_auth_failures() {
        let notice = ReauthNotice {
            message: "sign in".into(),
            redirect_to: "/sign-in".into(),
            issued_at: chrono::Utc::now(),
        };
        let rejection = ApiFailure::reject(ApiErrorCode::NotFound, Some(notice));
        let failure = rejection.find::<ApiFailure>().unwrap();
        assert!(failure.notice.is_none());
    }
}
