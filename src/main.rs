mod api;
mod config;
mod db;
mod helper_model;
mod methods;
mod model;
mod scheduled_tasks;
mod schema;
mod store;

use crate::store::BookingStore;
use once_cell::sync::Lazy;
use std::sync::Arc;
use warp::Filter;

/// Process-wide booking store. Postgres when DATABASE_URL is set, the
/// in-memory backend otherwise.
pub static STORE: Lazy<Arc<dyn BookingStore>> = Lazy::new(|| {
    dotenv::dotenv().ok();
    if std::env::var("DATABASE_URL").is_ok() {
        Arc::new(store::pg::PgStore::new(db::get_connection_pool()))
    } else {
        println!("DATABASE_URL not set; bookings will not survive a restart");
        Arc::new(store::memory::MemStore::new())
    }
});

#[tokio::main]
async fn main() {
    Lazy::force(&STORE);

    tokio::spawn(scheduled_tasks::expire_unpaid_bookings());

    // routing for the server
    let httpd = api::api().and(warp::path::end());
    println!(
        "====== lendwheel-httpd listening on port {} ======",
        config::CONFIG.port
    );
    warp::serve(httpd).run(([0, 0, 0, 0], config::CONFIG.port)).await;
}
