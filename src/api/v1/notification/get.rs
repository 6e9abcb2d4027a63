use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::{STORE, methods};
use warp::{Filter, http::StatusCode};

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("get")
        .and(warp::path::end())
        .and(warp::get())
        .and(identity_headers())
        .and_then(async move |user_id: i32, role: String| {
            let Some(actor) = Actor::from_headers(user_id, &role) else {
                return methods::standard_replies::invalid_identity();
            };
            let Some(owner_id) = actor.user_id() else {
                return methods::standard_replies::invalid_identity();
            };

            let store = STORE.clone();
            let result =
                tokio::task::spawn_blocking(move || store.notifications_for_user(owner_id)).await;

            match result {
                Err(join_err) => methods::standard_replies::internal_server_error_response(
                    format!("notification/get: {}", join_err),
                ),
                Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                    format!("notification/get: {}", err),
                ),
                Ok(Ok(notifications)) => {
                    methods::standard_replies::response_with_obj(notifications, StatusCode::OK)
                }
            }
        })
}
