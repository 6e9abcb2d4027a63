pub mod booking_ref;
pub mod intervals;
pub mod notifier;
pub mod pricing;
pub mod reconciler;
pub mod reservation;
pub mod standard_replies;
pub mod transitions;
