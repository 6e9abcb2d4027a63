//! In-memory `BookingStore`. Serves local development without a database
//! and every test in the crate. Reservations are linearized with one mutex
//! per vehicle and transitions with one mutex per booking, so contention
//! never crosses vehicles, matching the Postgres advisory-lock discipline.

use crate::config::CONFIG;
use crate::methods::intervals::ranges_overlap;
use crate::model::{
    Booking, EventDisposition, Interval, NewBooking, Notification, PaymentEvent, PaymentEventKind,
    Vehicle,
};
use crate::store::{
    BookingStore, DateConflict, PlannedNotification, ProcessedEvent, StoreError, StoreResult,
    TransitionApplied, TransitionPlan, TransitionRejected,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

pub struct MemStore {
    lock_timeout: Duration,
    vehicles: RwLock<HashMap<i32, Vehicle>>,
    bookings: RwLock<HashMap<String, Arc<Mutex<Booking>>>>,
    idempotency: RwLock<HashMap<String, String>>,
    vehicle_intervals: Mutex<HashMap<i32, Arc<Mutex<Vec<Interval>>>>>,
    events: Mutex<HashMap<String, PaymentEvent>>,
    notifications: Mutex<Vec<Notification>>,
    next_booking_id: AtomicI32,
    next_interval_id: AtomicI32,
    next_event_id: AtomicI32,
    next_notification_id: AtomicI32,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore {
            lock_timeout: Duration::from_millis(CONFIG.lock_timeout_ms),
            vehicles: RwLock::new(HashMap::new()),
            bookings: RwLock::new(HashMap::new()),
            idempotency: RwLock::new(HashMap::new()),
            vehicle_intervals: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
            next_booking_id: AtomicI32::new(1),
            next_interval_id: AtomicI32::new(1),
            next_event_id: AtomicI32::new(1),
            next_notification_id: AtomicI32::new(1),
        }
    }

    /// Per-vehicle lock plus the intervals it guards.
    fn interval_slot(&self, vehicle_id: i32) -> Arc<Mutex<Vec<Interval>>> {
        let mut slots = self
            .vehicle_intervals
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        slots
            .entry(vehicle_id)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    fn push_notifications(&self, booking_ref: &str, planned: &[PlannedNotification]) {
        let mut rows = self
            .notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for p in planned {
            rows.push(Notification {
                id: self.next_notification_id.fetch_add(1, Ordering::SeqCst),
                user_id: p.user_id,
                booking_ref: booking_ref.to_string(),
                kind: p.kind,
                message: p.message.clone(),
                is_read: false,
                created_at: Utc::now(),
            });
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore::new()
    }
}

/// Bounded lock acquisition; a stuck reservation fails fast instead of
/// holding callers indefinitely.
fn lock_with_deadline<T>(
    mutex: &Mutex<T>,
    timeout: Duration,
) -> Result<MutexGuard<'_, T>, StoreError> {
    let deadline = Instant::now() + timeout;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(StoreError::Timeout);
                }
                thread::sleep(Duration::from_millis(2));
            }
        }
    }
}

impl BookingStore for MemStore {
    fn upsert_vehicle(&self, vehicle: Vehicle) -> StoreResult<()> {
        self.vehicles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(vehicle.id, vehicle);
        Ok(())
    }

    fn find_vehicle(&self, vehicle_id: i32) -> StoreResult<Option<Vehicle>> {
        Ok(self
            .vehicles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&vehicle_id)
            .cloned())
    }

    fn find_booking(&self, booking_ref: &str) -> StoreResult<Option<Booking>> {
        let slot = self
            .bookings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(booking_ref)
            .cloned();
        match slot {
            Some(arc) => {
                let guard = lock_with_deadline(&arc, self.lock_timeout)?;
                Ok(Some(guard.clone()))
            }
            None => Ok(None),
        }
    }

    fn find_booking_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Booking>> {
        let booking_ref = self
            .idempotency
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned();
        match booking_ref {
            Some(r) => self.find_booking(&r),
            None => Ok(None),
        }
    }

    fn reserve_booking(
        &self,
        new: NewBooking,
        notifications: Vec<PlannedNotification>,
    ) -> StoreResult<Result<Booking, DateConflict>> {
        let slot = self.interval_slot(new.vehicle_id);
        let mut held = lock_with_deadline(&slot, self.lock_timeout)?;

        // Replayed idempotency keys resolve under the vehicle lock, so two
        // concurrent retries of one request serialize here.
        if let Some(existing) = self.find_booking_by_idempotency_key(&new.idempotency_key)? {
            return Ok(Ok(existing));
        }

        let conflict = held.iter().any(|iv| {
            ranges_overlap(iv.start_date, iv.end_date, new.start_date, new.end_date)
        });
        if conflict {
            return Ok(Err(DateConflict));
        }

        let booking = Booking {
            id: self.next_booking_id.fetch_add(1, Ordering::SeqCst),
            booking_ref: new.booking_ref.clone(),
            confirmation: new.confirmation.clone(),
            idempotency_key: new.idempotency_key.clone(),
            renter_id: new.renter_id,
            host_id: new.host_id,
            vehicle_id: new.vehicle_id,
            start_date: new.start_date,
            end_date: new.end_date,
            base_price: new.base_price,
            service_fee: new.service_fee,
            insurance_fee: new.insurance_fee,
            total_price: new.total_price,
            status: new.status,
            payment_status: new.payment_status,
            cancellation_reason: new.cancellation_reason.clone(),
            cancellation_fee: new.cancellation_fee,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };

        held.push(Interval {
            id: self.next_interval_id.fetch_add(1, Ordering::SeqCst),
            vehicle_id: new.vehicle_id,
            start_date: new.start_date,
            end_date: new.end_date,
            booking_ref: new.booking_ref.clone(),
        });
        self.bookings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                booking.booking_ref.clone(),
                Arc::new(Mutex::new(booking.clone())),
            );
        self.idempotency
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(new.idempotency_key.clone(), booking.booking_ref.clone());
        self.push_notifications(&booking.booking_ref, &notifications);

        Ok(Ok(booking))
    }

    fn apply_transition(
        &self,
        booking_ref: &str,
        decide: &dyn Fn(&Booking) -> Result<TransitionPlan, TransitionRejected>,
        ledger: Option<ProcessedEvent>,
    ) -> StoreResult<TransitionApplied> {
        let arc = self
            .bookings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(booking_ref)
            .cloned();
        let Some(arc) = arc else {
            return Ok(TransitionApplied::NotFound);
        };
        let mut booking = lock_with_deadline(&arc, self.lock_timeout)?;

        // Ledger check and insert both happen under the booking lock, so a
        // replayed event either sees the row or loses the lock race.
        if let Some(ev) = &ledger {
            let seen = self
                .events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains_key(&ev.provider_event_id);
            if seen {
                return Ok(TransitionApplied::DuplicateEvent);
            }
        }

        let plan = match decide(&booking) {
            Ok(plan) => plan,
            Err(rejected) => return Ok(TransitionApplied::Rejected(rejected)),
        };

        booking.status = plan.status;
        booking.payment_status = plan.payment_status;
        booking.cancellation_reason = plan.cancellation_reason.clone();
        booking.cancellation_fee = plan.cancellation_fee;
        booking.updated_at = Utc::now();

        if plan.release_interval {
            let slot = self.interval_slot(booking.vehicle_id);
            let mut held = lock_with_deadline(&slot, self.lock_timeout)?;
            held.retain(|iv| iv.booking_ref != booking.booking_ref);
        }

        self.push_notifications(&booking.booking_ref, &plan.notifications);

        if let Some(ev) = ledger {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(
                    ev.provider_event_id.clone(),
                    PaymentEvent {
                        id: self.next_event_id.fetch_add(1, Ordering::SeqCst),
                        provider_event_id: ev.provider_event_id,
                        booking_ref: booking.booking_ref.clone(),
                        kind: ev.kind,
                        amount: ev.amount,
                        disposition: EventDisposition::Processed,
                        note: None,
                        received_at: Utc::now(),
                    },
                );
        }

        Ok(TransitionApplied::Applied {
            booking: booking.clone(),
            notifications: plan.notifications,
        })
    }

    fn payment_event_seen(&self, provider_event_id: &str) -> StoreResult<bool> {
        Ok(self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(provider_event_id))
    }

    fn record_unmatched_event(
        &self,
        provider_event_id: &str,
        booking_ref: &str,
        kind: PaymentEventKind,
        amount: f64,
        note: &str,
    ) -> StoreResult<bool> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.contains_key(provider_event_id) {
            return Ok(false);
        }
        events.insert(
            provider_event_id.to_string(),
            PaymentEvent {
                id: self.next_event_id.fetch_add(1, Ordering::SeqCst),
                provider_event_id: provider_event_id.to_string(),
                booking_ref: booking_ref.to_string(),
                kind,
                amount,
                disposition: EventDisposition::Unmatched,
                note: Some(note.to_string()),
                received_at: Utc::now(),
            },
        );
        Ok(true)
    }

    fn overlaps(&self, vehicle_id: i32, start: NaiveDate, end: NaiveDate) -> StoreResult<bool> {
        let slot = self.interval_slot(vehicle_id);
        let held = lock_with_deadline(&slot, self.lock_timeout)?;
        Ok(held
            .iter()
            .any(|iv| ranges_overlap(iv.start_date, iv.end_date, start, end)))
    }

    fn active_intervals(
        &self,
        vehicle_id: i32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Interval>> {
        let slot = self.interval_slot(vehicle_id);
        let held = lock_with_deadline(&slot, self.lock_timeout)?;
        let mut out: Vec<Interval> = held
            .iter()
            .filter(|iv| ranges_overlap(iv.start_date, iv.end_date, from, to))
            .cloned()
            .collect();
        out.sort_by_key(|iv| iv.start_date);
        Ok(out)
    }

    fn notifications_for_user(&self, user_id: i32) -> StoreResult<Vec<Notification>> {
        let rows = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Notification> = rows
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn mark_notification_read(&self, notification_id: i32, user_id: i32) -> StoreResult<bool> {
        let mut rows = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        match rows
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(row) => {
                row.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn pending_unpaid_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let arcs: Vec<Arc<Mutex<Booking>>> = self
            .bookings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut out = Vec::new();
        for arc in arcs {
            let booking = lock_with_deadline(&arc, self.lock_timeout)?;
            // A failed payment cannot recover (completion is only legal from
            // a pending payment), so failed counts as unpaid here too.
            if booking.status == crate::model::BookingStatus::Pending
                && matches!(
                    booking.payment_status,
                    crate::model::PaymentStatus::Pending | crate::model::PaymentStatus::Failed
                )
                && booking.created_at < cutoff
            {
                out.push(booking.booking_ref.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingStatus, PaymentStatus};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn new_booking(vehicle_id: i32, key: &str, start: &str, end: &str) -> NewBooking {
        let now = Utc::now();
        NewBooking {
            booking_ref: crate::methods::booking_ref::generate_booking_ref(),
            confirmation: crate::methods::booking_ref::generate_confirmation(),
            idempotency_key: key.to_string(),
            renter_id: 1,
            host_id: 2,
            vehicle_id,
            start_date: d(start),
            end_date: d(end),
            base_price: 300.0,
            service_fee: 30.0,
            insurance_fee: 15.0,
            total_price: 345.0,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            cancellation_reason: None,
            cancellation_fee: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reserve_rejects_overlapping_and_accepts_touching() {
        let store = MemStore::new();
        let first = store
            .reserve_booking(new_booking(5, "k1", "2030-06-01", "2030-06-04"), vec![])
            .unwrap();
        assert!(first.is_ok());

        let overlapping = store
            .reserve_booking(new_booking(5, "k2", "2030-06-02", "2030-06-03"), vec![])
            .unwrap();
        assert_eq!(overlapping.unwrap_err(), DateConflict);

        let touching = store
            .reserve_booking(new_booking(5, "k3", "2030-06-04", "2030-06-06"), vec![])
            .unwrap();
        assert!(touching.is_ok());
    }

    #[test]
    fn idempotency_key_replay_returns_existing_row() {
        let store = MemStore::new();
        let first = store
            .reserve_booking(new_booking(5, "same", "2030-06-01", "2030-06-04"), vec![])
            .unwrap()
            .unwrap();
        let replay = store
            .reserve_booking(new_booking(5, "same", "2030-06-01", "2030-06-04"), vec![])
            .unwrap()
            .unwrap();
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
    fn expiry_scan_selects_unpaid_and_failed_but_not_paid() {
        let store = MemStore::new();
        let unpaid = store
            .reserve_booking(new_booking(1, "k-unpaid", "2030-06-01", "2030-06-04"), vec![])
            .unwrap()
            .unwrap();
        let failed = store
            .reserve_booking(new_booking(2, "k-failed", "2030-06-01", "2030-06-04"), vec![])
            .unwrap()
            .unwrap();
        let paid = store
            .reserve_booking(new_booking(3, "k-paid", "2030-06-01", "2030-06-04"), vec![])
            .unwrap()
            .unwrap();

        let set_payment = |status: PaymentStatus| {
            move |b: &Booking| {
                Ok(TransitionPlan {
                    status: b.status,
                    payment_status: status,
                    cancellation_reason: None,
                    cancellation_fee: None,
                    release_interval: false,
                    notifications: Vec::new(),
                })
            }
        };
        store
            .apply_transition(&failed.booking_ref, &set_payment(PaymentStatus::Failed), None)
            .unwrap();
        store
            .apply_transition(&paid.booking_ref, &set_payment(PaymentStatus::Paid), None)
            .unwrap();

        let due = store
            .pending_unpaid_created_before(Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert!(due.contains(&unpaid.booking_ref));
        assert!(due.contains(&failed.booking_ref));
        assert!(!due.contains(&paid.booking_ref));

        // nothing is due before it was even created
        let none_yet = store
            .pending_unpaid_created_before(Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert!(none_yet.is_empty());
    }

    #[test]
    fn other_vehicles_do_not_conflict() {
        let store = MemStore::new();
        store
            .reserve_booking(new_booking(5, "a", "2030-06-01", "2030-06-04"), vec![])
            .unwrap()
            .unwrap();
        let other = store
            .reserve_booking(new_booking(6, "b", "2030-06-01", "2030-06-04"), vec![])
            .unwrap();
        assert!(other.is_ok());
    }
}
