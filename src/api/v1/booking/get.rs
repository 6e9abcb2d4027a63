use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::{STORE, methods};
use serde_derive::{Deserialize, Serialize};
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct GetBookingQuery {
    booking_ref: String,
}

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("get")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<GetBookingQuery>())
        .and(identity_headers())
        .and_then(
            async move |query: GetBookingQuery, user_id: i32, role: String| {
                let Some(actor) = Actor::from_headers(user_id, &role) else {
                    return methods::standard_replies::invalid_identity();
                };

                let store = STORE.clone();
                let result = tokio::task::spawn_blocking(move || {
                    store.find_booking(&query.booking_ref)
                })
                .await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("booking/get: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                        format!("booking/get: {}", err),
                    ),
                    Ok(Ok(None)) => methods::standard_replies::booking_not_found(),
                    Ok(Ok(Some(booking))) => {
                        let allowed = match actor {
                            Actor::Admin(_) | Actor::System => true,
                            Actor::Renter(id) => booking.renter_id == id,
                            Actor::Host(id) => booking.host_id == id,
                        };
                        if !allowed {
                            return methods::standard_replies::not_booking_party();
                        }
                        methods::standard_replies::response_with_obj(
                            booking.to_publish_booking(),
                            StatusCode::OK,
                        )
                    }
                }
            },
        )
}
