//! The booking state machine. Every status or payment-status mutation in
//! the system goes through the guard functions here; route handlers and the
//! reconciler only ever request named transitions and never touch fields
//! directly.

use crate::config::CONFIG;
use crate::helper_model::Actor;
use crate::methods::{notifier, pricing};
use crate::model::{Booking, BookingStatus, NotificationKind, PaymentEventKind, PaymentStatus};
use crate::store::{
    retry_on_lock_timeout, BookingStore, PlannedNotification, StoreError, TransitionApplied,
    TransitionPlan, TransitionRejected,
};
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};

pub fn status_name(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "pending",
        BookingStatus::Approved => "approved",
        BookingStatus::Active => "active",
        BookingStatus::Completed => "completed",
        BookingStatus::Cancelled => "cancelled",
    }
}

/// Plan that leaves everything as it currently stands; the individual arms
/// below override what their transition changes.
fn carry(booking: &Booking) -> TransitionPlan {
    TransitionPlan {
        status: booking.status,
        payment_status: booking.payment_status,
        cancellation_reason: booking.cancellation_reason.clone(),
        cancellation_fee: booking.cancellation_fee,
        release_interval: false,
        notifications: Vec::new(),
    }
}

fn rejected(reason: impl Into<String>) -> TransitionRejected {
    TransitionRejected::new(reason)
}

fn actor_is_booking_host(actor: &Actor, booking: &Booking) -> bool {
    match *actor {
        Actor::Host(id) => id == booking.host_id,
        Actor::Admin(_) | Actor::System => true,
        Actor::Renter(_) => false,
    }
}

fn notify_both(
    booking: &Booking,
    kind: NotificationKind,
    renter_message: String,
    host_message: String,
) -> Vec<PlannedNotification> {
    vec![
        PlannedNotification {
            user_id: booking.renter_id,
            kind,
            message: renter_message,
        },
        PlannedNotification {
            user_id: booking.host_id,
            kind,
            message: host_message,
        },
    ]
}

/// Pure transition guard. Inspects the booking as it stands under the
/// store's lock and either produces the full set of changes to commit or
/// names the violated precondition. Never performs I/O.
pub fn plan_transition(
    booking: &Booking,
    requested: BookingStatus,
    actor: &Actor,
    reason: Option<String>,
    today: NaiveDate,
    cancellation_fee_percent: f64,
) -> Result<TransitionPlan, TransitionRejected> {
    let mut plan = carry(booking);
    match (booking.status, requested) {
        (BookingStatus::Pending, BookingStatus::Approved) => {
            if !actor_is_booking_host(actor, booking) {
                return Err(rejected("only the host or an admin may approve a booking"));
            }
            // Approval and payment confirmation are one guarded step; an
            // approved-but-unpaid booking cannot exist.
            if booking.payment_status != PaymentStatus::Paid {
                return Err(rejected("booking must be paid before it can be approved"));
            }
            plan.status = BookingStatus::Approved;
            plan.notifications = notify_both(
                booking,
                NotificationKind::BookingApproved,
                format!("Your booking {} was approved by the host.", booking.confirmation),
                format!("You approved booking {}.", booking.confirmation),
            );
            Ok(plan)
        }
        (BookingStatus::Pending, BookingStatus::Cancelled) => {
            let permitted = match *actor {
                Actor::Renter(id) => id == booking.renter_id,
                Actor::Host(id) => id == booking.host_id,
                Actor::Admin(_) | Actor::System => true,
            };
            if !permitted {
                return Err(rejected("not a party to this booking"));
            }
            plan.status = BookingStatus::Cancelled;
            plan.cancellation_reason = reason;
            plan.cancellation_fee = Some(0.0);
            plan.release_interval = true;
            if booking.payment_status == PaymentStatus::Paid {
                plan.payment_status = PaymentStatus::Refunded;
            }
            plan.notifications = notify_both(
                booking,
                NotificationKind::BookingCancelled,
                format!(
                    "Your booking {} was cancelled by {}.",
                    booking.confirmation,
                    actor.describe()
                ),
                format!(
                    "Booking {} was cancelled by {}.",
                    booking.confirmation,
                    actor.describe()
                ),
            );
            Ok(plan)
        }
        (BookingStatus::Approved, BookingStatus::Active) => {
            match *actor {
                Actor::Host(id) if id == booking.host_id => {}
                Actor::Admin(_) => {}
                Actor::System => {
                    if today < booking.start_date {
                        return Err(rejected(
                            "booking cannot be activated before its pickup date",
                        ));
                    }
                }
                _ => {
                    return Err(rejected(
                        "only the host, an admin, or the system may start a rental",
                    ));
                }
            }
            plan.status = BookingStatus::Active;
            plan.notifications = notify_both(
                booking,
                NotificationKind::BookingActivated,
                format!("Your rental {} has started. Enjoy the ride!", booking.confirmation),
                format!("Handover confirmed for booking {}.", booking.confirmation),
            );
            Ok(plan)
        }
        (BookingStatus::Approved, BookingStatus::Cancelled) => {
            if !actor_is_booking_host(actor, booking) {
                return Err(rejected(
                    "an approved booking may only be cancelled by the host or an admin",
                ));
            }
            let Some(reason) = reason else {
                return Err(rejected("a cancellation reason is required"));
            };
            plan.status = BookingStatus::Cancelled;
            plan.cancellation_reason = Some(reason);
            plan.cancellation_fee = Some(pricing::round_cents(
                booking.total_price * cancellation_fee_percent / 100.0,
            ));
            plan.release_interval = true;
            if booking.payment_status == PaymentStatus::Paid {
                plan.payment_status = PaymentStatus::Refunded;
            }
            plan.notifications = notify_both(
                booking,
                NotificationKind::BookingCancelled,
                format!(
                    "Your approved booking {} was cancelled. A refund is on its way.",
                    booking.confirmation
                ),
                format!("You cancelled approved booking {}.", booking.confirmation),
            );
            Ok(plan)
        }
        (BookingStatus::Active, BookingStatus::Completed) => {
            if !actor_is_booking_host(actor, booking) {
                return Err(rejected("only the host or an admin may confirm the return"));
            }
            plan.status = BookingStatus::Completed;
            plan.notifications = notify_both(
                booking,
                NotificationKind::BookingCompleted,
                format!("Your rental {} is complete. Thanks for riding!", booking.confirmation),
                format!("Return confirmed for booking {}.", booking.confirmation),
            );
            Ok(plan)
        }
        (BookingStatus::Active, BookingStatus::Cancelled) => Err(rejected(
            "a booking in progress cannot be cancelled; complete it or open a dispute",
        )),
        (from, _) if from.is_terminal() => Err(rejected(format!(
            "booking is already {}; it accepts no further transitions",
            status_name(from)
        ))),
        (from, to) => Err(rejected(format!(
            "no transition from {} to {}",
            status_name(from),
            status_name(to)
        ))),
    }
}

/// Payment sub-state guard, driven only by the reconciler. Legal moves are
/// `pending -> paid`, `pending -> failed`, and `paid -> refunded` on a
/// cancelled or approved booking; anything else reflects out-of-order or
/// anomalous provider delivery and is rejected so the reconciler can shelve
/// the event.
pub fn plan_payment(
    booking: &Booking,
    kind: PaymentEventKind,
) -> Result<TransitionPlan, TransitionRejected> {
    let mut plan = carry(booking);
    match kind {
        PaymentEventKind::Complete => {
            if booking.status == BookingStatus::Cancelled {
                return Err(rejected("payment completed for a cancelled booking"));
            }
            if booking.payment_status != PaymentStatus::Pending {
                return Err(rejected(format!(
                    "payment is not pending (currently {:?})",
                    booking.payment_status
                )));
            }
            plan.payment_status = PaymentStatus::Paid;
            plan.notifications = notify_both(
                booking,
                NotificationKind::PaymentReceived,
                format!("Payment received for booking {}.", booking.confirmation),
                format!(
                    "The renter paid for booking {}. You can approve it now.",
                    booking.confirmation
                ),
            );
            Ok(plan)
        }
        PaymentEventKind::Failed => {
            if booking.payment_status != PaymentStatus::Pending {
                return Err(rejected(format!(
                    "payment failure reported but payment is {:?}",
                    booking.payment_status
                )));
            }
            plan.payment_status = PaymentStatus::Failed;
            plan.notifications = vec![PlannedNotification {
                user_id: booking.renter_id,
                kind: NotificationKind::PaymentFailed,
                message: format!(
                    "Payment for booking {} failed. Please try another method.",
                    booking.confirmation
                ),
            }];
            Ok(plan)
        }
        PaymentEventKind::Refunded => {
            if booking.payment_status != PaymentStatus::Paid {
                return Err(rejected(format!(
                    "refund reported but payment is {:?}",
                    booking.payment_status
                )));
            }
            // Refunds belong to the cancellation flow. Money moving back
            // on a live or finished rental is an anomaly for an operator,
            // not a state change.
            if !matches!(
                booking.status,
                BookingStatus::Cancelled | BookingStatus::Approved
            ) {
                return Err(rejected(format!(
                    "refund reported for a booking that is {}",
                    status_name(booking.status)
                )));
            }
            plan.payment_status = PaymentStatus::Refunded;
            plan.notifications = vec![PlannedNotification {
                user_id: booking.renter_id,
                kind: NotificationKind::PaymentRefunded,
                message: format!("Your payment for booking {} was refunded.", booking.confirmation),
            }];
            Ok(plan)
        }
    }
}

#[derive(Debug)]
pub enum TransitionError {
    NotFound,
    Rejected(TransitionRejected),
    TransitionTimeout,
    Store(anyhow::Error),
}

/// Engine operation behind `POST /booking/transition` and the expiry
/// sweeper. The guard runs under the store's per-booking lock; notification
/// rows commit with the transition and live delivery follows best effort.
pub fn transition_booking(
    store: &dyn BookingStore,
    target_ref: &str,
    requested: BookingStatus,
    actor: &Actor,
    reason: Option<String>,
) -> Result<Booking, TransitionError> {
    let today = Utc::now().date_naive();
    let decide = |b: &Booking| {
        plan_transition(
            b,
            requested,
            actor,
            reason.clone(),
            today,
            CONFIG.cancellation_fee_percent,
        )
    };
    let applied = retry_on_lock_timeout(CONFIG.lock_retry_attempts, || {
        store.apply_transition(target_ref, &decide, None)
    })
    .map_err(|e| match e {
        StoreError::Timeout => TransitionError::TransitionTimeout,
        StoreError::Backend(inner) => TransitionError::Store(inner),
    })?;

    match applied {
        TransitionApplied::Applied {
            booking,
            notifications,
        } => {
            notifier::fan_out(&booking.booking_ref, &notifications);
            Ok(booking)
        }
        TransitionApplied::NotFound => Err(TransitionError::NotFound),
        TransitionApplied::Rejected(rejection) => Err(TransitionError::Rejected(rejection)),
        TransitionApplied::DuplicateEvent => Err(TransitionError::Store(anyhow!(
            "duplicate-event result on a transition without a ledger entry"
        ))),
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn booking(status: BookingStatus, payment_status: PaymentStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: 1,
            booking_ref: String::from("11111111-2222-3333-4444-555555555555"),
            confirmation: String::from("AB12CD34"),
            idempotency_key: String::from("key-1"),
            renter_id: 10,
            host_id: 20,
            vehicle_id: 5,
            start_date: "2030-06-01".parse().unwrap(),
            end_date: "2030-06-04".parse().unwrap(),
            base_price: 300.0,
            service_fee: 30.0,
            insurance_fee: 15.0,
            total_price: 345.0,
            status,
            payment_status,
            cancellation_reason: None,
            cancellation_fee: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn today() -> NaiveDate {
        "2030-06-01".parse().unwrap()
    }

    #[test]
    fn approval_requires_payment() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Pending);
        let err = plan_transition(
            &b,
            BookingStatus::Approved,
            &Actor::Host(20),
            None,
            today(),
            20.0,
        )
        .unwrap_err();
        assert!(err.reason.contains("paid"));

        let b = booking(BookingStatus::Pending, PaymentStatus::Paid);
        let plan = plan_transition(
            &b,
            BookingStatus::Approved,
            &Actor::Host(20),
            None,
            today(),
            20.0,
        )
        .unwrap();
        assert_eq!(plan.status, BookingStatus::Approved);
        assert!(!plan.release_interval);
    }

    #[test]
    fn renter_cannot_approve() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Paid);
        assert!(plan_transition(
            &b,
            BookingStatus::Approved,
            &Actor::Renter(10),
            None,
            today(),
            20.0,
        )
        .is_err());
    }

    #[test]
    fn wrong_host_cannot_approve() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Paid);
        assert!(plan_transition(
            &b,
            BookingStatus::Approved,
            &Actor::Host(999),
            None,
            today(),
            20.0,
        )
        .is_err());
    }

    #[test]
    fn pending_cancel_releases_interval_without_fee() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Pending);
        let plan = plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Renter(10),
            Some(String::from("changed plans")),
            today(),
            20.0,
        )
        .unwrap();
        assert_eq!(plan.status, BookingStatus::Cancelled);
        assert!(plan.release_interval);
        assert_eq!(plan.cancellation_fee, Some(0.0));
        assert_eq!(plan.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn paid_pending_cancel_refunds() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Paid);
        let plan = plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Renter(10),
            None,
            today(),
            20.0,
        )
        .unwrap();
        assert_eq!(plan.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn stranger_cannot_cancel() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Pending);
        assert!(plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Renter(999),
            None,
            today(),
            20.0,
        )
        .is_err());
    }

    #[test]
    fn approved_cancel_needs_reason_and_charges_fee() {
        let b = booking(BookingStatus::Approved, PaymentStatus::Paid);
        assert!(plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Host(20),
            None,
            today(),
            20.0,
        )
        .is_err());

        let plan = plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Host(20),
            Some(String::from("vehicle damaged")),
            today(),
            20.0,
        )
        .unwrap();
        assert_eq!(plan.cancellation_fee, Some(69.0));
        assert_eq!(plan.payment_status, PaymentStatus::Refunded);
        assert!(plan.release_interval);
        assert_eq!(
            plan.cancellation_reason.as_deref(),
            Some("vehicle damaged")
        );
    }

    #[test]
    fn renter_cannot_cancel_approved_booking() {
        let b = booking(BookingStatus::Approved, PaymentStatus::Paid);
        assert!(plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Renter(10),
            Some(String::from("changed plans")),
            today(),
            20.0,
        )
        .is_err());
    }

    #[test]
    fn system_activation_waits_for_pickup_date() {
        let b = booking(BookingStatus::Approved, PaymentStatus::Paid);
        let early: NaiveDate = "2030-05-31".parse().unwrap();
        assert!(plan_transition(&b, BookingStatus::Active, &Actor::System, None, early, 20.0).is_err());
        assert!(plan_transition(&b, BookingStatus::Active, &Actor::System, None, today(), 20.0).is_ok());
        // the host confirming handover is not date-gated
        assert!(plan_transition(&b, BookingStatus::Active, &Actor::Host(20), None, early, 20.0).is_ok());
    }

    #[test]
    fn active_booking_cannot_be_cancelled() {
        let b = booking(BookingStatus::Active, PaymentStatus::Paid);
        let err = plan_transition(
            &b,
            BookingStatus::Cancelled,
            &Actor::Admin(1),
            Some(String::from("whatever")),
            today(),
            20.0,
        )
        .unwrap_err();
        assert!(err.reason.contains("in progress"));
    }

    #[test]
    fn every_illegal_pair_is_rejected() {
        use BookingStatus::*;
        let legal = [
            (Pending, Approved),
            (Pending, Cancelled),
            (Approved, Active),
            (Approved, Cancelled),
            (Active, Completed),
        ];
        let all = [Pending, Approved, Active, Completed, Cancelled];
        for from in all {
            for to in all {
                if legal.contains(&(from, to)) {
                    continue;
                }
                let b = booking(from, PaymentStatus::Paid);
                let result = plan_transition(
                    &b,
                    to,
                    &Actor::Admin(1),
                    Some(String::from("reason")),
                    today(),
                    20.0,
                );
                assert!(
                    result.is_err(),
                    "expected {:?} -> {:?} to be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn payment_guards_follow_current_state() {
        let b = booking(BookingStatus::Pending, PaymentStatus::Pending);
        let plan = plan_payment(&b, PaymentEventKind::Complete).unwrap();
        assert_eq!(plan.payment_status, PaymentStatus::Paid);

        // a late FAILED after COMPLETE is illegal from the current state
        let b = booking(BookingStatus::Pending, PaymentStatus::Paid);
        assert!(plan_payment(&b, PaymentEventKind::Failed).is_err());

        // refund only applies to paid bookings
        let b = booking(BookingStatus::Pending, PaymentStatus::Pending);
        assert!(plan_payment(&b, PaymentEventKind::Refunded).is_err());
        let b = booking(BookingStatus::Approved, PaymentStatus::Paid);
        assert!(plan_payment(&b, PaymentEventKind::Refunded).is_ok());

        // COMPLETE after failure is not a legal payment move
        let b = booking(BookingStatus::Pending, PaymentStatus::Failed);
        assert!(plan_payment(&b, PaymentEventKind::Complete).is_err());

        // a cancelled booking never accepts a completion
        let b = booking(BookingStatus::Cancelled, PaymentStatus::Pending);
        assert!(plan_payment(&b, PaymentEventKind::Complete).is_err());
    }

    #[test]
    fn refund_is_rejected_on_live_and_finished_rentals() {
        // an in-progress or completed rental keeps its money state; a
        // provider refund there is an anomaly to shelve, not apply
        let b = booking(BookingStatus::Active, PaymentStatus::Paid);
        let err = plan_payment(&b, PaymentEventKind::Refunded).unwrap_err();
        assert!(err.reason.contains("active"));

        let b = booking(BookingStatus::Completed, PaymentStatus::Paid);
        assert!(plan_payment(&b, PaymentEventKind::Refunded).is_err());

        let b = booking(BookingStatus::Cancelled, PaymentStatus::Paid);
        assert!(plan_payment(&b, PaymentEventKind::Refunded).is_ok());
        let b = booking(BookingStatus::Approved, PaymentStatus::Paid);
        assert!(plan_payment(&b, PaymentEventKind::Refunded).is_ok());
    }

    #[test]
    fn payment_plans_keep_cancellation_fields() {
        let mut b = booking(BookingStatus::Cancelled, PaymentStatus::Paid);
        b.cancellation_reason = Some(String::from("host cancelled"));
        b.cancellation_fee = Some(69.0);
        let plan = plan_payment(&b, PaymentEventKind::Refunded).unwrap();
        assert_eq!(plan.cancellation_reason.as_deref(), Some("host cancelled"));
        assert_eq!(plan.cancellation_fee, Some(69.0));
    }
}
