use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::{STORE, methods};
use chrono::NaiveDate;
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct AvailabilityRequestBody {
    vehicle_id: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

/// Point-in-time answer only. A range reported free here can still be
/// taken by the time `booking/new` runs; the reservation path re-checks
/// under its own lock.
pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("availability")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(identity_headers())
        .and_then(
            async move |body: AvailabilityRequestBody, user_id: i32, role: String| {
                if Actor::from_headers(user_id, &role).is_none() {
                    return methods::standard_replies::invalid_identity();
                }
                if body.start_date >= body.end_date {
                    return methods::standard_replies::bad_request(
                        "The start date must fall before the end date.",
                    );
                }

                let store = STORE.clone();
                let result = tokio::task::spawn_blocking(move || {
                    store.overlaps(body.vehicle_id, body.start_date, body.end_date)
                })
                .await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("vehicle/availability: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                        format!("vehicle/availability: {}", err),
                    ),
                    Ok(Ok(taken)) => methods::standard_replies::response_with_obj(
                        json!({ "available": !taken }),
                        StatusCode::OK,
                    ),
                }
            },
        )
}
