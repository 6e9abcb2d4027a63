mod v1;
mod webhook;

use warp::Filter;

pub fn api() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("api")
        .and(v1::api_v1().or(webhook::webhook()))
        .and(warp::path::end())
}

/// Verified identity forwarded by the upstream auth layer. These headers
/// are trusted as-is; this service performs no authentication of its own.
pub fn identity_headers()
-> impl Filter<Extract = (i32, String), Error = warp::Rejection> + Clone {
    warp::header::<i32>("x-user-id").and(warp::header::<String>("x-user-role"))
}
