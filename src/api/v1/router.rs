use super::handler::{self, VisitAction};
use crate::domain_model::RestaurantId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let session = warp::get()
        .and(warp::path("session"))
        .and(warp::path::end())
        .and(with(server.session_manager.clone()))
        .and_then(handler::session_status);

    let sign_in = warp::post()
        .and(warp::path!("session" / "sign_in"))
        .and(warp::body::json())
        .and(with(server.session_manager.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::sign_in);

    let sign_out = warp::post()
        .and(warp::path!("session" / "sign_out"))
        .and(with(server.session_manager.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::sign_out);

    let refresh = warp::post()
        .and(warp::path!("session" / "refresh"))
        .and(with(server.session_manager.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::refresh_session);

    let profile = warp::get()
        .and(warp::path!("profiles" / String))
        .and(with(server.session_manager.clone()))
        .and(with(server.profile_service.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::view_profile);

    let refresh_profile = warp::post()
        .and(warp::path!("profiles" / String / "refresh"))
        .and(warp::query::<handler::RefreshQuery>())
        .and(with(server.session_manager.clone()))
        .and(with(server.profile_service.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::refresh_profile);

    let visits = warp::get()
        .and(warp::path("visits"))
        .and(warp::path::end())
        .and(warp::query::<handler::VisitsQuery>())
        .and(with(server.visit_service.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::list_visits);

    let toggle = visit_action(server.clone(), "toggle", VisitAction::Toggle);
    let increment = visit_action(server.clone(), "increment", VisitAction::Increment);
    let decrement = visit_action(server.clone(), "decrement", VisitAction::Decrement);

    let notice = warp::get()
        .and(warp::path!("notices" / "latest"))
        .and(with(server.notices.clone()))
        .and_then(handler::latest_notice);

    session
        .or(sign_in)
        .or(sign_out)
        .or(refresh)
        .or(profile)
        .or(refresh_profile)
        .or(visits)
        .or(toggle)
        .or(increment)
        .or(decrement)
        .or(notice)
}

fn visit_action(
    server: Arc<Server>,
    segment: &'static str,
    action: VisitAction,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path("visits"))
        .and(warp::path::param::<RestaurantId>())
        .and(warp::path(segment))
        .and(warp::path::end())
        .and(warp::any().map(move || action))
        .and(with(server.visit_service.clone()))
        .and(with(server.notices.clone()))
        .and_then(handler::change_visit)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}
