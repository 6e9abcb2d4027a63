use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::{STORE, methods};
use chrono::NaiveDate;
use serde_derive::{Deserialize, Serialize};
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct NewBookingRequestBody {
    vehicle_id: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    idempotency_key: Option<String>,
}

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("new")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(identity_headers())
        .and_then(
            async move |body: NewBookingRequestBody, user_id: i32, role: String| {
                let Some(actor) = Actor::from_headers(user_id, &role) else {
                    return methods::standard_replies::invalid_identity();
                };
                let Actor::Renter(renter_id) = actor else {
                    return methods::standard_replies::renter_only();
                };

                let store = STORE.clone();
                let result = tokio::task::spawn_blocking(move || {
                    methods::reservation::create_booking(
                        &*store,
                        renter_id,
                        body.vehicle_id,
                        body.start_date,
                        body.end_date,
                        body.idempotency_key,
                    )
                })
                .await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("booking/new: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::create_booking_rejection(err),
                    Ok(Ok(booking)) => methods::standard_replies::response_with_obj(
                        booking.to_publish_booking(),
                        StatusCode::CREATED,
                    ),
                }
            },
        )
}
