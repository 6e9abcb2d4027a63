mod get;
mod read;
mod stream;

use warp::Filter;

pub fn api_v1_notification()
-> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("notification").and(stream::main().or(get::main()).or(read::main()))
}
