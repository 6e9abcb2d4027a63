use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

// Diesel requires us to define a custom mapping between the Rust enum
// and the database type, if we are not using string.
use crate::schema::*;
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::{AsExpression, FromSqlRow};
use std::io::Write;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::BookingStatusEnum)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// `completed` and `cancelled` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::PaymentStatusEnum)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Normalized payment-provider event kinds. Signature verification and
/// transport specifics live upstream of this service.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::PaymentEventKindEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventKind {
    Complete,
    Failed,
    Refunded,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::EventDispositionEnum)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    Processed,
    Unmatched,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::NotificationKindEnum)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingApproved,
    BookingActivated,
    BookingCompleted,
    BookingCancelled,
    PaymentReceived,
    PaymentFailed,
    PaymentRefunded,
}

//This is for postgres. For other databases the type might be different.
impl ToSql<sql_types::BookingStatusEnum, Pg> for BookingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            BookingStatus::Pending => out.write_all(b"pending")?,
            BookingStatus::Approved => out.write_all(b"approved")?,
            BookingStatus::Active => out.write_all(b"active")?,
            BookingStatus::Completed => out.write_all(b"completed")?,
            BookingStatus::Cancelled => out.write_all(b"cancelled")?,
        }
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<sql_types::BookingStatusEnum, Pg> for BookingStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(BookingStatus::Pending),
            b"approved" => Ok(BookingStatus::Approved),
            b"active" => Ok(BookingStatus::Active),
            b"completed" => Ok(BookingStatus::Completed),
            b"cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<sql_types::PaymentStatusEnum, Pg> for PaymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            PaymentStatus::Pending => out.write_all(b"pending")?,
            PaymentStatus::Paid => out.write_all(b"paid")?,
            PaymentStatus::Failed => out.write_all(b"failed")?,
            PaymentStatus::Refunded => out.write_all(b"refunded")?,
        }
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<sql_types::PaymentStatusEnum, Pg> for PaymentStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(PaymentStatus::Pending),
            b"paid" => Ok(PaymentStatus::Paid),
            b"failed" => Ok(PaymentStatus::Failed),
            b"refunded" => Ok(PaymentStatus::Refunded),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<sql_types::PaymentEventKindEnum, Pg> for PaymentEventKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            PaymentEventKind::Complete => out.write_all(b"complete")?,
            PaymentEventKind::Failed => out.write_all(b"failed")?,
            PaymentEventKind::Refunded => out.write_all(b"refunded")?,
        }
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<sql_types::PaymentEventKindEnum, Pg> for PaymentEventKind {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"complete" => Ok(PaymentEventKind::Complete),
            b"failed" => Ok(PaymentEventKind::Failed),
            b"refunded" => Ok(PaymentEventKind::Refunded),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<sql_types::EventDispositionEnum, Pg> for EventDisposition {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            EventDisposition::Processed => out.write_all(b"processed")?,
            EventDisposition::Unmatched => out.write_all(b"unmatched")?,
        }
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<sql_types::EventDispositionEnum, Pg> for EventDisposition {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"processed" => Ok(EventDisposition::Processed),
            b"unmatched" => Ok(EventDisposition::Unmatched),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<sql_types::NotificationKindEnum, Pg> for NotificationKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            NotificationKind::BookingCreated => out.write_all(b"booking_created")?,
            NotificationKind::BookingApproved => out.write_all(b"booking_approved")?,
            NotificationKind::BookingActivated => out.write_all(b"booking_activated")?,
            NotificationKind::BookingCompleted => out.write_all(b"booking_completed")?,
            NotificationKind::BookingCancelled => out.write_all(b"booking_cancelled")?,
            NotificationKind::PaymentReceived => out.write_all(b"payment_received")?,
            NotificationKind::PaymentFailed => out.write_all(b"payment_failed")?,
            NotificationKind::PaymentRefunded => out.write_all(b"payment_refunded")?,
        }
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<sql_types::NotificationKindEnum, Pg> for NotificationKind {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"booking_created" => Ok(NotificationKind::BookingCreated),
            b"booking_approved" => Ok(NotificationKind::BookingApproved),
            b"booking_activated" => Ok(NotificationKind::BookingActivated),
            b"booking_completed" => Ok(NotificationKind::BookingCompleted),
            b"booking_cancelled" => Ok(NotificationKind::BookingCancelled),
            b"payment_received" => Ok(NotificationKind::PaymentReceived),
            b"payment_failed" => Ok(NotificationKind::PaymentFailed),
            b"payment_refunded" => Ok(NotificationKind::PaymentRefunded),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

/// Read-only reference data owned by the listing service, mirrored here
/// through the sync endpoint.
#[derive(Queryable, Insertable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = vehicles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Vehicle {
    pub id: i32,
    pub host_id: i32,
    pub daily_rate: f64,
    pub is_approved: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Booking {
    pub id: i32,
    pub booking_ref: String,
    pub confirmation: String,
    pub idempotency_key: String,
    pub renter_id: i32,
    pub host_id: i32,
    pub vehicle_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_price: f64,
    pub service_fee: f64,
    pub insurance_fee: f64,
    pub total_price: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancellation_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn to_publish_booking(&self) -> PublishBooking {
        PublishBooking {
            booking_ref: self.booking_ref.clone(),
            confirmation: self.confirmation.clone(),
            renter_id: self.renter_id,
            host_id: self.host_id,
            vehicle_id: self.vehicle_id,
            start_date: self.start_date,
            end_date: self.end_date,
            base_price: self.base_price,
            service_fee: self.service_fee,
            insurance_fee: self.insurance_fee,
            total_price: self.total_price,
            status: self.status,
            payment_status: self.payment_status,
            cancellation_reason: self.cancellation_reason.clone(),
            cancellation_fee: self.cancellation_fee,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Wire view of a booking. The idempotency key and the row id stay internal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishBooking {
    pub booking_ref: String,
    pub confirmation: String,
    pub renter_id: i32,
    pub host_id: i32,
    pub vehicle_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_price: f64,
    pub service_fee: f64,
    pub insurance_fee: f64,
    pub total_price: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancellation_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewBooking {
    pub booking_ref: String,
    pub confirmation: String,
    pub idempotency_key: String,
    pub renter_id: i32,
    pub host_id: i32,
    pub vehicle_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_price: f64,
    pub service_fee: f64,
    pub insurance_fee: f64,
    pub total_price: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancellation_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A held date range. Rows exist only for bookings in a non-cancelled
/// state; cancellation deletes the row inside the same transaction.
#[derive(Queryable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = booking_intervals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Interval {
    pub id: i32,
    pub vehicle_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub booking_ref: String,
}

impl Interval {
    pub fn to_publish_interval(&self) -> PublishInterval {
        PublishInterval {
            vehicle_id: self.vehicle_id,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishInterval {
    pub vehicle_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = booking_intervals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewInterval {
    pub vehicle_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub booking_ref: String,
}

/// Dedup ledger for provider deliveries. Every received event lands here:
/// applied ones as `processed`, anomalies as `unmatched` with a note for
/// manual reconciliation.
#[derive(Queryable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = payment_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEvent {
    pub id: i32,
    pub provider_event_id: String,
    pub booking_ref: String,
    pub kind: PaymentEventKind,
    pub amount: f64,
    pub disposition: EventDisposition,
    pub note: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = payment_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewPaymentEvent {
    pub provider_event_id: String,
    pub booking_ref: String,
    pub kind: PaymentEventKind,
    pub amount: f64,
    pub disposition: EventDisposition,
    pub note: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Queryable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub booking_ref: String,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewNotification {
    pub user_id: i32,
    pub booking_ref: String,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
