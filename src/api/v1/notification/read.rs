use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::{STORE, methods};
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MarkReadRequestBody {
    notification_id: i32,
}

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("read")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(identity_headers())
        .and_then(
            async move |body: MarkReadRequestBody, user_id: i32, role: String| {
                let Some(actor) = Actor::from_headers(user_id, &role) else {
                    return methods::standard_replies::invalid_identity();
                };
                let Some(owner_id) = actor.user_id() else {
                    return methods::standard_replies::invalid_identity();
                };

                let store = STORE.clone();
                let result = tokio::task::spawn_blocking(move || {
                    store.mark_notification_read(body.notification_id, owner_id)
                })
                .await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("notification/read: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                        format!("notification/read: {}", err),
                    ),
                    Ok(Ok(false)) => methods::standard_replies::response_with_obj(
                        json!({
                            "title": "Notification Not Found",
                            "message": "No such unread notification belongs to you.",
                        }),
                        StatusCode::NOT_FOUND,
                    ),
                    Ok(Ok(true)) => methods::standard_replies::response_with_obj(
                        json!({ "marked_read": body.notification_id }),
                        StatusCode::OK,
                    ),
                }
            },
        )
}
