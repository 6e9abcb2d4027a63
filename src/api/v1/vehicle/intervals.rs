use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::{STORE, methods};
use chrono::NaiveDate;
use serde_derive::{Deserialize, Serialize};
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct IntervalsQuery {
    vehicle_id: i32,
    from: NaiveDate,
    to: NaiveDate,
}

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("intervals")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<IntervalsQuery>())
        .and(identity_headers())
        .and_then(
            async move |query: IntervalsQuery, user_id: i32, role: String| {
                if Actor::from_headers(user_id, &role).is_none() {
                    return methods::standard_replies::invalid_identity();
                }
                if query.from >= query.to {
                    return methods::standard_replies::bad_request(
                        "The start of the window must fall before its end.",
                    );
                }

                let store = STORE.clone();
                let result = tokio::task::spawn_blocking(move || {
                    store.active_intervals(query.vehicle_id, query.from, query.to)
                })
                .await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("vehicle/intervals: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                        format!("vehicle/intervals: {}", err),
                    ),
                    Ok(Ok(intervals)) => {
                        let published = intervals
                            .iter()
                            .map(|interval| interval.to_publish_interval())
                            .collect::<Vec<_>>();
                        methods::standard_replies::response_with_obj(published, StatusCode::OK)
                    }
                }
            },
        )
}
