pub mod memory;
pub mod pg;

use crate::model::{
    Booking, Interval, NewBooking, Notification, NotificationKind, PaymentEventKind, Vehicle,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Storage-layer failures. `Timeout` covers bounded lock waits (Postgres
/// `lock_timeout`, or the in-memory lock deadline); everything else is an
/// infrastructure problem carried through `anyhow`.
#[derive(Debug)]
pub enum StoreError {
    Timeout,
    Backend(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "storage lock wait timed out"),
            StoreError::Backend(e) => write!(f, "storage backend error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Backend(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The requested date range is already held by another booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateConflict;

/// A transition request the state machine refused, naming the violated
/// precondition. The booking is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejected {
    pub reason: String,
}

impl TransitionRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        TransitionRejected {
            reason: reason.into(),
        }
    }
}

/// Notification to persist alongside a mutation, in the same transaction.
/// Live delivery happens after commit and is best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNotification {
    pub user_id: i32,
    pub kind: NotificationKind,
    pub message: String,
}

/// What an accepted transition does, decided by the pure guard and applied
/// atomically by the store: the new `(status, payment_status)` pair, the
/// cancellation fields carried or set, whether the held interval is
/// released, and the notifications to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub status: crate::model::BookingStatus,
    pub payment_status: crate::model::PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancellation_fee: Option<f64>,
    pub release_interval: bool,
    pub notifications: Vec<PlannedNotification>,
}

/// Provider event to record as processed in the same transaction as the
/// payment-state change it caused.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEvent {
    pub provider_event_id: String,
    pub kind: PaymentEventKind,
    pub amount: f64,
}

#[derive(Debug)]
pub enum TransitionApplied {
    Applied {
        booking: Booking,
        notifications: Vec<PlannedNotification>,
    },
    NotFound,
    Rejected(TransitionRejected),
    /// The event ledger already holds this `provider_event_id`; the
    /// transaction rolled back without effect.
    DuplicateEvent,
}

/// The single authority over bookings, held intervals, the payment-event
/// ledger and durable notifications. Implementations must linearize
/// `reserve_booking` per vehicle and `apply_transition` per booking, and
/// commit each call's writes as one unit.
pub trait BookingStore: Send + Sync {
    /// Mirror of listing-service reference data.
    fn upsert_vehicle(&self, vehicle: Vehicle) -> StoreResult<()>;

    fn find_vehicle(&self, vehicle_id: i32) -> StoreResult<Option<Vehicle>>;

    fn find_booking(&self, booking_ref: &str) -> StoreResult<Option<Booking>>;

    fn find_booking_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Booking>>;

    /// Atomic check-and-reserve: insert the interval and the booking row
    /// together iff no live interval for the vehicle overlaps the half-open
    /// range. Replays of an already-stored idempotency key return the
    /// existing booking unchanged. This is the only authoritative overlap
    /// gate in the system.
    fn reserve_booking(
        &self,
        new: NewBooking,
        notifications: Vec<PlannedNotification>,
    ) -> StoreResult<Result<Booking, DateConflict>>;

    /// Linearized read-modify-write on one booking. `decide` sees the
    /// current row under lock; an accepted plan (row update, optional
    /// interval release, notification rows, optional ledger row) commits
    /// atomically.
    fn apply_transition(
        &self,
        booking_ref: &str,
        decide: &dyn Fn(&Booking) -> Result<TransitionPlan, TransitionRejected>,
        ledger: Option<ProcessedEvent>,
    ) -> StoreResult<TransitionApplied>;

    fn payment_event_seen(&self, provider_event_id: &str) -> StoreResult<bool>;

    /// Persist an anomalous event for manual reconciliation. Returns false
    /// when the ledger already holds this `provider_event_id`.
    fn record_unmatched_event(
        &self,
        provider_event_id: &str,
        booking_ref: &str,
        kind: PaymentEventKind,
        amount: f64,
        note: &str,
    ) -> StoreResult<bool>;

    /// Advisory pre-flight only; `reserve_booking` is the real gate.
    fn overlaps(&self, vehicle_id: i32, start: NaiveDate, end: NaiveDate) -> StoreResult<bool>;

    fn active_intervals(
        &self,
        vehicle_id: i32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Interval>>;

    fn notifications_for_user(&self, user_id: i32) -> StoreResult<Vec<Notification>>;

    fn mark_notification_read(&self, notification_id: i32, user_id: i32) -> StoreResult<bool>;

    /// Unpaid pending bookings created before `cutoff`, for the expiry
    /// sweeper.
    fn pending_unpaid_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;
}

/// Callers retry lock-timeout failures a bounded number of times with a
/// linear backoff before surfacing them.
pub fn retry_on_lock_timeout<T>(
    attempts: u32,
    mut op: impl FnMut() -> StoreResult<T>,
) -> StoreResult<T> {
    let mut tried = 0;
    loop {
        match op() {
            Err(StoreError::Timeout) if tried + 1 < attempts => {
                tried += 1;
                thread::sleep(Duration::from_millis(50 * tried as u64));
            }
            other => return other,
        }
    }
}
