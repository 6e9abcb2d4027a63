//! Booking creation: validation, pricing snapshot, and the atomic
//! check-and-reserve against the interval store.

use crate::config::CONFIG;
use crate::methods::{booking_ref, notifier, pricing};
use crate::model::{Booking, BookingStatus, NewBooking, NotificationKind, PaymentStatus};
use crate::store::{
    retry_on_lock_timeout, BookingStore, PlannedNotification, StoreError,
};
use chrono::{NaiveDate, Utc};

#[derive(Debug)]
pub enum CreateBookingError {
    InvalidDateRange,
    PastStartDate,
    VehicleNotFound,
    VehicleNotApproved,
    DateRangeUnavailable,
    ReservationTimeout,
    Store(anyhow::Error),
}

/// `POST /booking/new`. At most one interval and one booking row come out
/// of a successful call; a replayed idempotency key returns the original
/// booking without re-running any reservation logic.
pub fn create_booking(
    store: &dyn BookingStore,
    renter_id: i32,
    vehicle_id: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    idempotency_key: Option<String>,
) -> Result<Booking, CreateBookingError> {
    if start_date >= end_date {
        return Err(CreateBookingError::InvalidDateRange);
    }
    if start_date < Utc::now().date_naive() {
        return Err(CreateBookingError::PastStartDate);
    }

    let key = idempotency_key.unwrap_or_else(booking_ref::generate_booking_ref);
    if let Some(existing) = store
        .find_booking_by_idempotency_key(&key)
        .map_err(store_err)?
    {
        return Ok(existing);
    }

    let vehicle = store
        .find_vehicle(vehicle_id)
        .map_err(store_err)?
        .ok_or(CreateBookingError::VehicleNotFound)?;
    if !vehicle.is_approved {
        return Err(CreateBookingError::VehicleNotApproved);
    }

    let quote = pricing::quote(
        vehicle.daily_rate,
        start_date,
        end_date,
        CONFIG.service_fee_percent,
        CONFIG.insurance_fee_percent,
    );
    let now = Utc::now();
    let new = NewBooking {
        booking_ref: booking_ref::generate_booking_ref(),
        confirmation: booking_ref::generate_confirmation(),
        idempotency_key: key,
        renter_id,
        host_id: vehicle.host_id,
        vehicle_id,
        start_date,
        end_date,
        base_price: quote.base_price,
        service_fee: quote.service_fee,
        insurance_fee: quote.insurance_fee,
        total_price: quote.total_price,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        cancellation_reason: None,
        cancellation_fee: None,
        created_at: now,
        updated_at: now,
    };
    let planned = vec![PlannedNotification {
        user_id: vehicle.host_id,
        kind: NotificationKind::BookingCreated,
        message: format!(
            "New booking {} requested for your vehicle, {} to {}.",
            new.confirmation, start_date, end_date
        ),
    }];

    let reserved = retry_on_lock_timeout(CONFIG.lock_retry_attempts, || {
        store.reserve_booking(new.clone(), planned.clone())
    })
    .map_err(|e| match e {
        StoreError::Timeout => CreateBookingError::ReservationTimeout,
        StoreError::Backend(inner) => CreateBookingError::Store(inner),
    })?;

    match reserved {
        Ok(booking) => {
            notifier::fan_out(&booking.booking_ref, &planned);
            Ok(booking)
        }
        Err(_conflict) => Err(CreateBookingError::DateRangeUnavailable),
    }
}

fn store_err(e: StoreError) -> CreateBookingError {
    match e {
        StoreError::Timeout => CreateBookingError::ReservationTimeout,
        StoreError::Backend(inner) => CreateBookingError::Store(inner),
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_model::Actor;
    use crate::methods::intervals::ranges_overlap;
    use crate::methods::transitions;
    use crate::model::Vehicle;
    use crate::store::memory::MemStore;
    use std::sync::Arc;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn store_with_vehicle(vehicle_id: i32, daily_rate: f64) -> MemStore {
        let store = MemStore::new();
        store
            .upsert_vehicle(Vehicle {
                id: vehicle_id,
                host_id: 20,
                daily_rate,
                is_approved: true,
                updated_at: Utc::now(),
            })
            .unwrap();
        store
    }

    #[test]
    fn worked_example_pricing_and_conflicts() {
        let store = store_with_vehicle(5, 100.0);

        let first =
            create_booking(&store, 1, 5, d("2030-06-01"), d("2030-06-04"), None).unwrap();
        assert_eq!(first.base_price, 300.0);
        assert_eq!(first.service_fee, 30.0);
        assert_eq!(first.insurance_fee, 15.0);
        assert_eq!(first.total_price, 345.0);
        assert_eq!(first.status, BookingStatus::Pending);
        assert_eq!(first.payment_status, PaymentStatus::Pending);

        let overlapping = create_booking(&store, 2, 5, d("2030-06-02"), d("2030-06-03"), None);
        assert!(matches!(
            overlapping,
            Err(CreateBookingError::DateRangeUnavailable)
        ));

        // touching boundary: return day equals next pickup day
        let touching =
            create_booking(&store, 3, 5, d("2030-06-04"), d("2030-06-06"), None).unwrap();
        assert_eq!(touching.total_price, 230.0);
    }

    #[test]
    fn validation_rejections() {
        let store = store_with_vehicle(5, 100.0);
        assert!(matches!(
            create_booking(&store, 1, 5, d("2030-06-04"), d("2030-06-04"), None),
            Err(CreateBookingError::InvalidDateRange)
        ));
        assert!(matches!(
            create_booking(&store, 1, 5, d("2000-01-01"), d("2000-01-03"), None),
            Err(CreateBookingError::PastStartDate)
        ));
        assert!(matches!(
            create_booking(&store, 1, 999, d("2030-06-01"), d("2030-06-04"), None),
            Err(CreateBookingError::VehicleNotFound)
        ));
    }

    #[test]
    fn unapproved_vehicle_is_not_bookable() {
        let store = MemStore::new();
        store
            .upsert_vehicle(Vehicle {
                id: 7,
                host_id: 20,
                daily_rate: 50.0,
                is_approved: false,
                updated_at: Utc::now(),
            })
            .unwrap();
        assert!(matches!(
            create_booking(&store, 1, 7, d("2030-06-01"), d("2030-06-04"), None),
            Err(CreateBookingError::VehicleNotApproved)
        ));
    }

    #[test]
    fn idempotency_key_returns_same_booking_once() {
        let store = store_with_vehicle(5, 100.0);
        let key = Some(String::from("req-abc"));
        let first =
            create_booking(&store, 1, 5, d("2030-06-01"), d("2030-06-04"), key.clone()).unwrap();
        let replay =
            create_booking(&store, 1, 5, d("2030-06-01"), d("2030-06-04"), key).unwrap();
        assert_eq!(first.booking_ref, replay.booking_ref);
        assert_eq!(
            store
                .active_intervals(5, d("2030-06-01"), d("2030-06-30"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn cancelled_range_is_rebookable() {
        let store = store_with_vehicle(5, 100.0);
        let booking =
            create_booking(&store, 1, 5, d("2030-06-01"), d("2030-06-04"), None).unwrap();

        assert!(store.overlaps(5, d("2030-06-02"), d("2030-06-03")).unwrap());
        transitions::transition_booking(
            &store,
            &booking.booking_ref,
            BookingStatus::Cancelled,
            &Actor::Renter(1),
            Some(String::from("changed plans")),
        )
        .unwrap();
        assert!(!store.overlaps(5, d("2030-06-02"), d("2030-06-03")).unwrap());

        let again =
            create_booking(&store, 2, 5, d("2030-06-01"), d("2030-06-04"), None).unwrap();
        assert_ne!(again.booking_ref, booking.booking_ref);
    }

    #[test]
    fn concurrent_identical_requests_yield_one_winner() {
        let store = Arc::new(store_with_vehicle(5, 100.0));
        let mut handles = Vec::new();
        for renter in 0..16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                create_booking(&*store, renter, 5, d("2030-06-01"), d("2030-06-04"), None)
            }));
        }
        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => wins += 1,
                Err(CreateBookingError::DateRangeUnavailable) => conflicts += 1,
                Err(other) => panic!("unexpected rejection: {:?}", other),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 15);
    }

    #[test]
    fn concurrent_staggered_requests_never_overlap() {
        let store = Arc::new(store_with_vehicle(5, 100.0));
        let base = d("2030-06-01");
        let mut handles = Vec::new();
        for offset in 0..10i64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let start = base + chrono::Duration::days(offset);
                let end = start + chrono::Duration::days(2);
                create_booking(&*store, offset as i32, 5, start, end, None)
            }));
        }
        let mut won: Vec<Booking> = Vec::new();
        for handle in handles {
            match handle.join().unwrap() {
                Ok(b) => won.push(b),
                Err(CreateBookingError::DateRangeUnavailable) => {}
                Err(other) => panic!("unexpected rejection: {:?}", other),
            }
        }
        assert!(!won.is_empty());
        for a in &won {
            for b in &won {
                if a.booking_ref == b.booking_ref {
                    continue;
                }
                assert!(
                    !ranges_overlap(a.start_date, a.end_date, b.start_date, b.end_date),
                    "{} and {} overlap",
                    a.booking_ref,
                    b.booking_ref
                );
            }
        }
    }
}
