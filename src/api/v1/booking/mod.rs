mod get;
mod new;
mod transition;

use warp::Filter;

pub fn api_v1_booking()
-> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("booking").and(new::main().or(transition::main()).or(get::main()))
}
