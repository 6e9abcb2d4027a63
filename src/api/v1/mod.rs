mod booking;
mod notification;
mod vehicle;

use warp::Filter;

pub fn api_v1() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("v1").and(
        booking::api_v1_booking()
            .or(vehicle::api_v1_vehicle())
            .or(notification::api_v1_notification()),
    )
}
