//! Postgres `BookingStore` over the diesel/r2d2 pool. Reservations take a
//! per-vehicle advisory transaction lock, transitions lock the booking row
//! with `FOR UPDATE`, and `SET LOCAL lock_timeout` bounds every wait so a
//! stuck caller fails fast with `StoreError::Timeout`.

use crate::config::CONFIG;
use crate::db::PgPool;
use crate::model::{
    Booking, BookingStatus, EventDisposition, Interval, NewBooking, NewInterval, NewNotification,
    NewPaymentEvent, Notification, PaymentEventKind, PaymentStatus, Vehicle,
};
use crate::store::{
    BookingStore, DateConflict, PlannedNotification, ProcessedEvent, StoreError, StoreResult,
    TransitionApplied, TransitionPlan, TransitionRejected,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};

/// Namespace for `pg_advisory_xact_lock(int, int)` so vehicle locks never
/// collide with other advisory-lock users of the same database.
const VEHICLE_LOCK_NAMESPACE: i32 = 0x5244; // "RD"

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> PgStore {
        PgStore { pool }
    }

    fn conn(&self) -> StoreResult<PooledConnection<ConnectionManager<PgConnection>>> {
        self.pool
            .get()
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))
    }
}

fn map_db_err(e: diesel::result::Error) -> StoreError {
    // SQLSTATE 55P03 surfaces as a generic database error; the message is
    // the stable part.
    if e.to_string().contains("lock timeout") {
        StoreError::Timeout
    } else {
        StoreError::Backend(anyhow::Error::new(e))
    }
}

fn set_local_lock_timeout(conn: &mut PgConnection) -> QueryResult<()> {
    diesel::sql_query(format!(
        "SET LOCAL lock_timeout = '{}ms'",
        CONFIG.lock_timeout_ms
    ))
    .execute(conn)?;
    Ok(())
}

fn lock_vehicle(conn: &mut PgConnection, vehicle: i32) -> QueryResult<()> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind::<diesel::sql_types::Integer, _>(VEHICLE_LOCK_NAMESPACE)
        .bind::<diesel::sql_types::Integer, _>(vehicle)
        .execute(conn)?;
    Ok(())
}

fn insert_planned_notifications(
    conn: &mut PgConnection,
    booking_ref: &str,
    planned: &[PlannedNotification],
) -> QueryResult<()> {
    if planned.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewNotification> = planned
        .iter()
        .map(|p| NewNotification {
            user_id: p.user_id,
            booking_ref: booking_ref.to_string(),
            kind: p.kind,
            message: p.message.clone(),
            is_read: false,
            created_at: Utc::now(),
        })
        .collect();
    diesel::insert_into(crate::schema::notifications::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

impl BookingStore for PgStore {
    fn upsert_vehicle(&self, vehicle: Vehicle) -> StoreResult<()> {
        use crate::schema::vehicles::dsl as v_q;
        use diesel::upsert::excluded;
        let mut conn = self.conn()?;
        diesel::insert_into(v_q::vehicles)
            .values(&vehicle)
            .on_conflict(v_q::id)
            .do_update()
            .set((
                v_q::host_id.eq(excluded(v_q::host_id)),
                v_q::daily_rate.eq(excluded(v_q::daily_rate)),
                v_q::is_approved.eq(excluded(v_q::is_approved)),
                v_q::updated_at.eq(excluded(v_q::updated_at)),
            ))
            .execute(&mut conn)
            .map_err(map_db_err)?;
        Ok(())
    }

    fn find_vehicle(&self, vehicle_id: i32) -> StoreResult<Option<Vehicle>> {
        use crate::schema::vehicles::dsl as v_q;
        let mut conn = self.conn()?;
        v_q::vehicles
            .find(vehicle_id)
            .first::<Vehicle>(&mut conn)
            .optional()
            .map_err(map_db_err)
    }

    fn find_booking(&self, target_ref: &str) -> StoreResult<Option<Booking>> {
        use crate::schema::bookings::dsl as b_q;
        let mut conn = self.conn()?;
        b_q::bookings
            .filter(b_q::booking_ref.eq(target_ref))
            .first::<Booking>(&mut conn)
            .optional()
            .map_err(map_db_err)
    }

    fn find_booking_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Booking>> {
        use crate::schema::bookings::dsl as b_q;
        let mut conn = self.conn()?;
        b_q::bookings
            .filter(b_q::idempotency_key.eq(key))
            .first::<Booking>(&mut conn)
            .optional()
            .map_err(map_db_err)
    }

    fn reserve_booking(
        &self,
        new: NewBooking,
        planned: Vec<PlannedNotification>,
    ) -> StoreResult<Result<Booking, DateConflict>> {
        let mut conn = self.conn()?;
        conn.transaction::<Result<Booking, DateConflict>, diesel::result::Error, _>(|conn| {
            set_local_lock_timeout(conn)?;
            lock_vehicle(conn, new.vehicle_id)?;

            // Replays return the stored row unchanged.
            {
                use crate::schema::bookings::dsl as b_q;
                if let Some(existing) = b_q::bookings
                    .filter(b_q::idempotency_key.eq(&new.idempotency_key))
                    .first::<Booking>(conn)
                    .optional()?
                {
                    return Ok(Ok(existing));
                }
            }

            let conflict: bool = {
                use crate::schema::booking_intervals::dsl as iv_q;
                diesel::select(diesel::dsl::exists(
                    iv_q::booking_intervals
                        .filter(iv_q::vehicle_id.eq(new.vehicle_id))
                        .filter(iv_q::start_date.lt(new.end_date))
                        .filter(iv_q::end_date.gt(new.start_date)),
                ))
                .get_result::<bool>(conn)?
            };
            if conflict {
                return Ok(Err(DateConflict));
            }

            let booking = diesel::insert_into(crate::schema::bookings::table)
                .values(&new)
                .get_result::<Booking>(conn)?;
            let interval = NewInterval {
                vehicle_id: new.vehicle_id,
                start_date: new.start_date,
                end_date: new.end_date,
                booking_ref: booking.booking_ref.clone(),
            };
            diesel::insert_into(crate::schema::booking_intervals::table)
                .values(&interval)
                .execute(conn)?;
            insert_planned_notifications(conn, &booking.booking_ref, &planned)?;
            Ok(Ok(booking))
        })
        .map_err(map_db_err)
    }

    fn apply_transition(
        &self,
        target_ref: &str,
        decide: &dyn Fn(&Booking) -> Result<TransitionPlan, TransitionRejected>,
        ledger: Option<ProcessedEvent>,
    ) -> StoreResult<TransitionApplied> {
        let mut conn = self.conn()?;
        let result = conn.transaction::<TransitionApplied, diesel::result::Error, _>(|conn| {
            use crate::schema::bookings::dsl as b_q;
            set_local_lock_timeout(conn)?;

            let current = b_q::bookings
                .filter(b_q::booking_ref.eq(target_ref))
                .for_update()
                .first::<Booking>(conn)
                .optional()?;
            let Some(current) = current else {
                return Ok(TransitionApplied::NotFound);
            };

            if let Some(ev) = &ledger {
                use crate::schema::payment_events::dsl as ev_q;
                let seen: bool = diesel::select(diesel::dsl::exists(
                    ev_q::payment_events
                        .filter(ev_q::provider_event_id.eq(&ev.provider_event_id)),
                ))
                .get_result::<bool>(conn)?;
                if seen {
                    return Ok(TransitionApplied::DuplicateEvent);
                }
            }

            let plan = match decide(&current) {
                Ok(plan) => plan,
                Err(rejected) => return Ok(TransitionApplied::Rejected(rejected)),
            };

            let updated = diesel::update(b_q::bookings.filter(b_q::booking_ref.eq(target_ref)))
                .set((
                    b_q::status.eq(plan.status),
                    b_q::payment_status.eq(plan.payment_status),
                    b_q::cancellation_reason.eq(plan.cancellation_reason.clone()),
                    b_q::cancellation_fee.eq(plan.cancellation_fee),
                    b_q::updated_at.eq(Utc::now()),
                ))
                .get_result::<Booking>(conn)?;

            if plan.release_interval {
                use crate::schema::booking_intervals::dsl as iv_q;
                diesel::delete(
                    iv_q::booking_intervals.filter(iv_q::booking_ref.eq(target_ref)),
                )
                .execute(conn)?;
            }

            insert_planned_notifications(conn, target_ref, &plan.notifications)?;

            if let Some(ev) = ledger {
                let row = NewPaymentEvent {
                    provider_event_id: ev.provider_event_id,
                    booking_ref: target_ref.to_string(),
                    kind: ev.kind,
                    amount: ev.amount,
                    disposition: EventDisposition::Processed,
                    note: None,
                    received_at: Utc::now(),
                };
                diesel::insert_into(crate::schema::payment_events::table)
                    .values(&row)
                    .execute(conn)?;
            }

            Ok(TransitionApplied::Applied {
                booking: updated,
                notifications: plan.notifications,
            })
        });

        match result {
            Ok(applied) => Ok(applied),
            // A concurrent delivery of the same event won the ledger insert.
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => Ok(TransitionApplied::DuplicateEvent),
            Err(e) => Err(map_db_err(e)),
        }
    }

    fn payment_event_seen(&self, event_id: &str) -> StoreResult<bool> {
        use crate::schema::payment_events::dsl as ev_q;
        let mut conn = self.conn()?;
        diesel::select(diesel::dsl::exists(
            ev_q::payment_events.filter(ev_q::provider_event_id.eq(event_id)),
        ))
        .get_result::<bool>(&mut conn)
        .map_err(map_db_err)
    }

    fn record_unmatched_event(
        &self,
        event_id: &str,
        target_ref: &str,
        kind: PaymentEventKind,
        amount: f64,
        note: &str,
    ) -> StoreResult<bool> {
        use crate::schema::payment_events::dsl as ev_q;
        let mut conn = self.conn()?;
        let row = NewPaymentEvent {
            provider_event_id: event_id.to_string(),
            booking_ref: target_ref.to_string(),
            kind,
            amount,
            disposition: EventDisposition::Unmatched,
            note: Some(note.to_string()),
            received_at: Utc::now(),
        };
        let inserted = diesel::insert_into(ev_q::payment_events)
            .values(&row)
            .on_conflict(ev_q::provider_event_id)
            .do_nothing()
            .execute(&mut conn)
            .map_err(map_db_err)?;
        Ok(inserted > 0)
    }

    fn overlaps(&self, vehicle: i32, range_start: NaiveDate, range_end: NaiveDate) -> StoreResult<bool> {
        use crate::schema::booking_intervals::dsl as iv_q;
        let mut conn = self.conn()?;
        diesel::select(diesel::dsl::exists(
            iv_q::booking_intervals
                .filter(iv_q::vehicle_id.eq(vehicle))
                .filter(iv_q::start_date.lt(range_end))
                .filter(iv_q::end_date.gt(range_start)),
        ))
        .get_result::<bool>(&mut conn)
        .map_err(map_db_err)
    }

    fn active_intervals(
        &self,
        vehicle: i32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Interval>> {
        use crate::schema::booking_intervals::dsl as iv_q;
        let mut conn = self.conn()?;
        iv_q::booking_intervals
            .filter(iv_q::vehicle_id.eq(vehicle))
            .filter(iv_q::start_date.lt(to))
            .filter(iv_q::end_date.gt(from))
            .order(iv_q::start_date.asc())
            .load::<Interval>(&mut conn)
            .map_err(map_db_err)
    }

    fn notifications_for_user(&self, target_user: i32) -> StoreResult<Vec<Notification>> {
        use crate::schema::notifications::dsl as n_q;
        let mut conn = self.conn()?;
        n_q::notifications
            .filter(n_q::user_id.eq(target_user))
            .order(n_q::created_at.desc())
            .load::<Notification>(&mut conn)
            .map_err(map_db_err)
    }

    fn mark_notification_read(&self, notification_id: i32, target_user: i32) -> StoreResult<bool> {
        use crate::schema::notifications::dsl as n_q;
        let mut conn = self.conn()?;
        let updated = diesel::update(
            n_q::notifications
                .filter(n_q::id.eq(notification_id))
                .filter(n_q::user_id.eq(target_user)),
        )
        .set(n_q::is_read.eq(true))
        .execute(&mut conn)
        .map_err(map_db_err)?;
        Ok(updated > 0)
    }

    fn pending_unpaid_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        use crate::schema::bookings::dsl as b_q;
        let mut conn = self.conn()?;
        b_q::bookings
            .filter(b_q::status.eq(BookingStatus::Pending))
            .filter(b_q::payment_status.eq_any(vec![
                PaymentStatus::Pending,
                PaymentStatus::Failed,
            ]))
            .filter(b_q::created_at.lt(cutoff))
            .select(b_q::booking_ref)
            .load::<String>(&mut conn)
            .map_err(map_db_err)
    }
}
