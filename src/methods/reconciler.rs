//! Maps the payment provider's event stream onto booking payment state.
//! Delivery is at-least-once and unordered, so every decision here is made
//! against the booking's current state under lock, and every received event
//! lands in the ledger exactly once.

use crate::config::CONFIG;
use crate::methods::{notifier, pricing, transitions};
use crate::model::{Booking, PaymentEventKind};
use crate::store::{
    retry_on_lock_timeout, BookingStore, StoreResult, TransitionApplied,
};

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The event moved the booking's payment state.
    Applied(Booking),
    /// This `provider_event_id` was already recorded; nothing changed.
    Duplicate,
    /// The event could not be applied and was shelved for manual
    /// reconciliation.
    Unmatched(String),
}

pub fn apply_payment_event(
    store: &dyn BookingStore,
    provider_event_id: &str,
    target_ref: &str,
    kind: PaymentEventKind,
    amount: f64,
) -> StoreResult<ReconcileOutcome> {
    if store.payment_event_seen(provider_event_id)? {
        return Ok(ReconcileOutcome::Duplicate);
    }

    let Some(booking) = store.find_booking(target_ref)? else {
        return shelve(
            store,
            provider_event_id,
            target_ref,
            kind,
            amount,
            String::from("no booking with this reference"),
        );
    };

    if !pricing::amounts_match(amount, booking.total_price, CONFIG.amount_tolerance) {
        return shelve(
            store,
            provider_event_id,
            target_ref,
            kind,
            amount,
            format!(
                "amount {:.2} does not match booking total {:.2}",
                amount, booking.total_price
            ),
        );
    }

    let decide = |b: &Booking| transitions::plan_payment(b, kind);
    let ledger = crate::store::ProcessedEvent {
        provider_event_id: provider_event_id.to_string(),
        kind,
        amount,
    };
    let applied = retry_on_lock_timeout(CONFIG.lock_retry_attempts, || {
        store.apply_transition(target_ref, &decide, Some(ledger.clone()))
    })?;

    match applied {
        TransitionApplied::Applied {
            booking,
            notifications,
        } => {
            notifier::fan_out(&booking.booking_ref, &notifications);
            Ok(ReconcileOutcome::Applied(booking))
        }
        TransitionApplied::DuplicateEvent => Ok(ReconcileOutcome::Duplicate),
        TransitionApplied::Rejected(rejection) => shelve(
            store,
            provider_event_id,
            target_ref,
            kind,
            amount,
            rejection.reason,
        ),
        // The booking vanished between lookup and lock; shelve, never drop.
        TransitionApplied::NotFound => shelve(
            store,
            provider_event_id,
            target_ref,
            kind,
            amount,
            String::from("no booking with this reference"),
        ),
    }
}

fn shelve(
    store: &dyn BookingStore,
    provider_event_id: &str,
    target_ref: &str,
    kind: PaymentEventKind,
    amount: f64,
    note: String,
) -> StoreResult<ReconcileOutcome> {
    eprintln!(
        "reconciler: shelving event {} for booking {}: {}",
        provider_event_id, target_ref, note
    );
    let fresh = store.record_unmatched_event(provider_event_id, target_ref, kind, amount, &note)?;
    if fresh {
        Ok(ReconcileOutcome::Unmatched(note))
    } else {
        Ok(ReconcileOutcome::Duplicate)
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_model::Actor;
    use crate::methods::reservation::create_booking;
    use crate::methods::transitions::transition_booking;
    use crate::model::{BookingStatus, PaymentStatus, Vehicle};
    use crate::store::memory::MemStore;
    use chrono::{NaiveDate, Utc};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn store_with_booking() -> (MemStore, Booking) {
        let store = MemStore::new();
        store
            .upsert_vehicle(Vehicle {
                id: 5,
                host_id: 20,
                daily_rate: 100.0,
                is_approved: true,
                updated_at: Utc::now(),
            })
            .unwrap();
        let booking =
            create_booking(&store, 1, 5, d("2030-06-01"), d("2030-06-04"), None).unwrap();
        (store, booking)
    }

    #[test]
    fn complete_then_approve_then_replay() {
        let (store, booking) = store_with_booking();

        let outcome = apply_payment_event(
            &store,
            "evt-1",
            &booking.booking_ref,
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();
        let paid = match outcome {
            ReconcileOutcome::Applied(b) => b,
            other => panic!("expected Applied, got {:?}", other),
        };
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let approved = transition_booking(
            &store,
            &booking.booking_ref,
            BookingStatus::Approved,
            &Actor::Host(20),
            None,
        )
        .unwrap();
        assert_eq!(approved.status, BookingStatus::Approved);

        // replay changes nothing
        let replay = apply_payment_event(
            &store,
            "evt-1",
            &booking.booking_ref,
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();
        assert!(matches!(replay, ReconcileOutcome::Duplicate));
        let unchanged = store.find_booking(&booking.booking_ref).unwrap().unwrap();
        assert_eq!(unchanged.payment_status, PaymentStatus::Paid);
        assert_eq!(unchanged.status, BookingStatus::Approved);
    }

    #[test]
    fn unknown_booking_is_shelved_not_dropped() {
        let (store, _) = store_with_booking();
        let outcome = apply_payment_event(
            &store,
            "evt-ghost",
            "no-such-ref",
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unmatched(_)));
        assert!(store.payment_event_seen("evt-ghost").unwrap());
        // a retry of the same delivery is now a duplicate
        let retry = apply_payment_event(
            &store,
            "evt-ghost",
            "no-such-ref",
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();
        assert!(matches!(retry, ReconcileOutcome::Duplicate));
    }

    #[test]
    fn amount_mismatch_is_surfaced() {
        let (store, booking) = store_with_booking();
        let outcome = apply_payment_event(
            &store,
            "evt-short",
            &booking.booking_ref,
            PaymentEventKind::Complete,
            300.0,
        )
        .unwrap();
        match outcome {
            ReconcileOutcome::Unmatched(note) => assert!(note.contains("does not match")),
            other => panic!("expected Unmatched, got {:?}", other),
        }
        let unchanged = store.find_booking(&booking.booking_ref).unwrap().unwrap();
        assert_eq!(unchanged.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn out_of_order_failure_after_completion_is_ignored() {
        let (store, booking) = store_with_booking();
        apply_payment_event(
            &store,
            "evt-ok",
            &booking.booking_ref,
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();

        let late_failure = apply_payment_event(
            &store,
            "evt-late-fail",
            &booking.booking_ref,
            PaymentEventKind::Failed,
            345.0,
        )
        .unwrap();
        assert!(matches!(late_failure, ReconcileOutcome::Unmatched(_)));
        let unchanged = store.find_booking(&booking.booking_ref).unwrap().unwrap();
        assert_eq!(unchanged.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn refund_flow_after_host_cancellation() {
        let (store, booking) = store_with_booking();
        apply_payment_event(
            &store,
            "evt-pay",
            &booking.booking_ref,
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();
        transition_booking(
            &store,
            &booking.booking_ref,
            BookingStatus::Approved,
            &Actor::Host(20),
            None,
        )
        .unwrap();
        let cancelled = transition_booking(
            &store,
            &booking.booking_ref,
            BookingStatus::Cancelled,
            &Actor::Host(20),
            Some(String::from("vehicle recalled")),
        )
        .unwrap();
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

        // the provider's own REFUNDED event afterwards is illegal from the
        // current state and gets shelved, not crashed on
        let echo = apply_payment_event(
            &store,
            "evt-refund",
            &booking.booking_ref,
            PaymentEventKind::Refunded,
            345.0,
        )
        .unwrap();
        assert!(matches!(echo, ReconcileOutcome::Unmatched(_)));
    }

    #[test]
    fn failed_payment_booking_is_swept_and_frees_the_dates() {
        let (store, booking) = store_with_booking();
        apply_payment_event(
            &store,
            "evt-fail",
            &booking.booking_ref,
            PaymentEventKind::Failed,
            345.0,
        )
        .unwrap();
        let failed = store.find_booking(&booking.booking_ref).unwrap().unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);

        // a later completion cannot revive a failed payment
        let late = apply_payment_event(
            &store,
            "evt-late-ok",
            &booking.booking_ref,
            PaymentEventKind::Complete,
            345.0,
        )
        .unwrap();
        assert!(matches!(late, ReconcileOutcome::Unmatched(_)));

        // the expiry scan must pick it up; it is as unpaid as it gets
        let due = store
            .pending_unpaid_created_before(Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert!(due.contains(&booking.booking_ref));

        transition_booking(
            &store,
            &booking.booking_ref,
            BookingStatus::Cancelled,
            &Actor::System,
            Some(String::from("payment window expired")),
        )
        .unwrap();
        assert!(!store.overlaps(5, d("2030-06-01"), d("2030-06-04")).unwrap());
    }

    #[test]
    fn concurrent_replays_apply_exactly_once() {
        let (store, booking) = store_with_booking();
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = std::sync::Arc::clone(&store);
            let target = booking.booking_ref.clone();
            handles.push(std::thread::spawn(move || {
                apply_payment_event(&*store, "evt-race", &target, PaymentEventKind::Complete, 345.0)
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if let ReconcileOutcome::Applied(_) = handle.join().unwrap().unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        let paid = store.find_booking(&booking.booking_ref).unwrap().unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
    }
}
