use crate::methods::intervals;
use chrono::NaiveDate;

/// Snapshot of a booking's price, computed once at creation. Later rate
/// changes on the vehicle never touch existing bookings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBreakdown {
    pub base_price: f64,
    pub service_fee: f64,
    pub insurance_fee: f64,
    pub total_price: f64,
}

pub fn quote(
    daily_rate: f64,
    start: NaiveDate,
    end: NaiveDate,
    service_fee_percent: f64,
    insurance_fee_percent: f64,
) -> PriceBreakdown {
    let days = intervals::rental_days(start, end) as f64;
    let base_price = round_cents(days * daily_rate);
    let service_fee = round_cents(base_price * service_fee_percent / 100.0);
    let insurance_fee = round_cents(base_price * insurance_fee_percent / 100.0);
    PriceBreakdown {
        base_price,
        service_fee,
        insurance_fee,
        total_price: round_cents(base_price + service_fee + insurance_fee),
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Provider amounts come back through at least one float conversion, so the
/// match is within a configured tolerance rather than exact.
pub fn amounts_match(reported: f64, expected: f64, tolerance: f64) -> bool {
    (reported - expected).abs() <= tolerance
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn three_day_quote_with_percent_fees() {
        let q = quote(100.0, d("2024-06-01"), d("2024-06-04"), 10.0, 5.0);
        assert_eq!(q.base_price, 300.0);
        assert_eq!(q.service_fee, 30.0);
        assert_eq!(q.insurance_fee, 15.0);
        assert_eq!(q.total_price, 345.0);
    }

    #[test]
    fn fees_round_to_cents() {
        let q = quote(33.33, d("2024-06-01"), d("2024-06-02"), 10.0, 5.0);
        assert_eq!(q.base_price, 33.33);
        assert_eq!(q.service_fee, 3.33);
        assert_eq!(q.insurance_fee, 1.67);
        assert_eq!(q.total_price, 38.33);
    }

    #[test]
    fn amount_match_respects_tolerance() {
        assert!(amounts_match(345.0, 345.0, 0.01));
        assert!(amounts_match(344.995, 345.0, 0.01));
        assert!(!amounts_match(344.0, 345.0, 0.01));
    }
}
