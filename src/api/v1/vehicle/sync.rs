use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::model::Vehicle;
use crate::{STORE, methods};
use chrono::Utc;
use serde_derive::{Deserialize, Serialize};
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SyncVehicleRequestBody {
    vehicle_id: i32,
    host_id: i32,
    daily_rate: f64,
    is_approved: bool,
}

/// Mirrors vehicle records from the fleet service into the local table.
pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("sync")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(identity_headers())
        .and_then(
            async move |body: SyncVehicleRequestBody, user_id: i32, role: String| {
                let Some(actor) = Actor::from_headers(user_id, &role) else {
                    return methods::standard_replies::invalid_identity();
                };
                if !actor.is_admin() {
                    return methods::standard_replies::admin_only();
                }
                if body.daily_rate <= 0.0 {
                    return methods::standard_replies::bad_request(
                        "The daily rate must be positive.",
                    );
                }

                let vehicle = Vehicle {
                    id: body.vehicle_id,
                    host_id: body.host_id,
                    daily_rate: body.daily_rate,
                    is_approved: body.is_approved,
                    updated_at: Utc::now(),
                };
                let published = vehicle.clone();

                let store = STORE.clone();
                let result =
                    tokio::task::spawn_blocking(move || store.upsert_vehicle(vehicle)).await;

                match result {
                    Err(join_err) => methods::standard_replies::internal_server_error_response(
                        format!("vehicle/sync: {}", join_err),
                    ),
                    Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                        format!("vehicle/sync: {}", err),
                    ),
                    Ok(Ok(())) => {
                        methods::standard_replies::response_with_obj(published, StatusCode::OK)
                    }
                }
            },
        )
}
