use super::error::*;
use crate::application_impl::{NoticeBoard, SessionManager};
use crate::application_port::*;
use crate::domain_model::*;
use crate::logger::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::Rejection;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(
        code: ApiErrorCode,
        message: impl Into<String>,
        notice: Option<ReauthNotice>,
    ) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
                notice,
            }),
        }
    }
}

fn failure(notices: &NoticeBoard) -> impl Fn(ApiErrorCode) -> Rejection + '_ {
    move |code| ApiFailure::reject(code, notices.latest())
}

/// What the UI sees of the session. Tokens never leave the process.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub user: Option<UserId>,
    pub expires_at: Option<i64>,
    pub loading: bool,
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        SessionView {
            phase: snapshot.phase,
            user: snapshot.user,
            expires_at: snapshot.session.map(|s| s.expires_at),
            loading: snapshot.loading,
        }
    }
}

pub async fn session_status(
    session_manager: Arc<SessionManager>,
) -> Result<impl warp::Reply, Rejection> {
    let view = SessionView::from(session_manager.snapshot());
    Ok(warp::reply::json(&ApiResponse::ok(view)))
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub identifier: String,
    pub secret: String,
}

pub async fn sign_in(
    body: SignInRequest,
    session_manager: Arc<SessionManager>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    session_manager
        .sign_in(&body.identifier, &body.secret)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;
    // a fresh sign-in supersedes any pending re-auth prompt
    notices.take();

    let view = SessionView::from(session_manager.snapshot());
    Ok(warp::reply::json(&ApiResponse::ok(view)))
}

pub async fn sign_out(
    session_manager: Arc<SessionManager>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    session_manager
        .sign_out()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;
    Ok(warp::reply::json(&ApiResponse::ok(())))
}

pub async fn refresh_session(
    session_manager: Arc<SessionManager>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    session_manager
        .refresh_session()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;

    let view = SessionView::from(session_manager.snapshot());
    Ok(warp::reply::json(&ApiResponse::ok(view)))
}

pub async fn view_profile(
    identifier: String,
    session_manager: Arc<SessionManager>,
    profile_service: Arc<dyn ProfileService>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    let target = ProfileIdentifier::parse(&identifier)
        .ok_or(ApiErrorCode::NotFound)
        .map_err(failure(&notices))?;
    let viewer = session_manager.snapshot().user;

    let view = profile_service
        .view_profile(viewer, &target)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;
    Ok(warp::reply::json(&ApiResponse::ok(view)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub section: Option<ProfileSection>,
}

pub async fn refresh_profile(
    identifier: String,
    query: RefreshQuery,
    session_manager: Arc<SessionManager>,
    profile_service: Arc<dyn ProfileService>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    let target = ProfileIdentifier::parse(&identifier)
        .ok_or(ApiErrorCode::NotFound)
        .map_err(failure(&notices))?;
    let viewer = session_manager.snapshot().user;

    let view = profile_service
        .refresh_profile(viewer, &target, query.section)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;
    Ok(warp::reply::json(&ApiResponse::ok(view)))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerParam {
    #[default]
    Initial,
    Refocus,
}

impl From<TriggerParam> for FetchTrigger {
    fn from(trigger: TriggerParam) -> Self {
        match trigger {
            TriggerParam::Initial => FetchTrigger::InitialLoad,
            TriggerParam::Refocus => FetchTrigger::Refocus,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VisitsQuery {
    pub restaurant_ids: String,
    #[serde(default)]
    pub trigger: TriggerParam,
}

fn parse_restaurant_ids(raw: &str) -> Result<Vec<RestaurantId>, ApiErrorCode> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<RestaurantId>().map_err(|_| ApiErrorCode::InvalidRequest))
        .collect()
}

pub async fn list_visits(
    query: VisitsQuery,
    visit_service: Arc<dyn VisitService>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    let ids = parse_restaurant_ids(&query.restaurant_ids).map_err(failure(&notices))?;

    let mut visits = visit_service
        .visits_for(&ids, query.trigger.into())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;
    let records: Vec<VisitRecord> = ids.iter().filter_map(|id| visits.remove(id)).collect();
    debug!(count = records.len(), "visit records served");

    Ok(warp::reply::json(&ApiResponse::ok(records)))
}

#[derive(Debug, Clone, Copy)]
pub enum VisitAction {
    Toggle,
    Increment,
    Decrement,
}

pub async fn change_visit(
    restaurant_id: RestaurantId,
    action: VisitAction,
    visit_service: Arc<dyn VisitService>,
    notices: Arc<NoticeBoard>,
) -> Result<impl warp::Reply, Rejection> {
    let result = match action {
        VisitAction::Toggle => visit_service.toggle_visited(restaurant_id).await,
        VisitAction::Increment => visit_service.increment_visit(restaurant_id).await,
        VisitAction::Decrement => visit_service.decrement_visit(restaurant_id).await,
    };
    let record = result
        .map_err(ApiErrorCode::from)
        .map_err(failure(&notices))?;
    Ok(warp::reply::json(&ApiResponse::ok(record)))
}

pub async fn latest_notice(notices: Arc<NoticeBoard>) -> Result<impl warp::Reply, Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(notices.latest())))
}
