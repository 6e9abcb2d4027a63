use crate::config::CONFIG;
use crate::helper_model::Actor;
use crate::methods::transitions;
use crate::model::BookingStatus;
use crate::STORE;
use chrono::Utc;
use std::time::Duration;

/// Sweeps bookings that sat pending without payment past the configured
/// window and cancels them as the system actor, which releases their
/// reserved dates.
pub async fn expire_unpaid_bookings() {
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;

        let store = STORE.clone();
        let swept = tokio::task::spawn_blocking(move || {
            let cutoff = Utc::now() - chrono::Duration::hours(CONFIG.pending_payment_window_hours);
            let expired = match store.pending_unpaid_created_before(cutoff) {
                Ok(refs) => refs,
                Err(err) => {
                    eprintln!("scheduled_tasks: expiry scan failed: {}", err);
                    return 0;
                }
            };

            let mut cancelled = 0;
            for booking_ref in expired {
                match transitions::transition_booking(
                    &*store,
                    &booking_ref,
                    BookingStatus::Cancelled,
                    &Actor::System,
                    Some(String::from("payment window expired")),
                ) {
                    Ok(_) => cancelled += 1,
                    Err(err) => {
                        // a concurrent payment or cancellation wins; skip it
                        eprintln!(
                            "scheduled_tasks: could not expire {}: {:?}",
                            booking_ref, err
                        );
                    }
                }
            }
            cancelled
        })
        .await
        .unwrap_or(0);

        if swept > 0 {
            println!("====== Expired {} Unpaid Bookings ======", swept);
        }
    }
}
