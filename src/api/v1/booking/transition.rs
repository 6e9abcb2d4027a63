use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::model::BookingStatus;
use crate::{STORE, methods};
use serde_derive::{Deserialize, Serialize};
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct TransitionRequestBody {
    booking_ref: String,
    requested_status: BookingStatus,
    reason: Option<String>,
}

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("transition")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(identity_headers())
        .and_then(
            async move |body: TransitionRequestBody, user_id: i32, role: String| {
                let Some(actor) = Actor::from_headers(user_id, &role) else {
                    return methods::standard_replies::invalid_identity();
                };

                let store = STORE.clone();
                let result = tokio::task::spawn_blocking(move || {
                    methods::transitions::transition_booking(
                        &*store,
                        &body.booking_ref,
                        body.requested_status,
                        &actor,
                        body.reason,
                    )
                })
                .await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("booking/transition: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::transition_rejection(err),
                    Ok(Ok(booking)) => methods::standard_replies::response_with_obj(
                        booking.to_publish_booking(),
                        StatusCode::OK,
                    ),
                }
            },
        )
}
