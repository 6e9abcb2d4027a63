use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

/// Runtime knobs. Fee percentages are product configuration, not business
/// logic, so they are never re-derived in code.
#[derive(Debug, Clone)]
pub struct Config {
    /// Percent of the base price charged as the platform service fee.
    pub service_fee_percent: f64,
    /// Percent of the base price charged as the insurance fee.
    pub insurance_fee_percent: f64,
    /// Percent of the total price withheld when an approved booking is
    /// cancelled. Pending-stage cancellations are free.
    pub cancellation_fee_percent: f64,
    /// Absolute tolerance when matching a provider amount against the
    /// booking's price snapshot.
    pub amount_tolerance: f64,
    /// How long a pending booking may stay unpaid before the sweeper
    /// cancels it.
    pub pending_payment_window_hours: i64,
    /// Upper bound on waiting for a vehicle or booking lock.
    pub lock_timeout_ms: u64,
    /// Bounded retries on lock timeout before surfacing the error.
    pub lock_retry_attempts: u32,
    pub port: u16,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

impl Config {
    pub fn from_env() -> Config {
        dotenv().ok();
        Config {
            service_fee_percent: env_or("SERVICE_FEE_PERCENT", 10.0),
            insurance_fee_percent: env_or("INSURANCE_FEE_PERCENT", 5.0),
            cancellation_fee_percent: env_or("CANCELLATION_FEE_PERCENT", 20.0),
            amount_tolerance: env_or("PAYMENT_AMOUNT_TOLERANCE", 0.01),
            pending_payment_window_hours: env_or("PENDING_PAYMENT_WINDOW_HOURS", 24),
            lock_timeout_ms: env_or("RESERVATION_LOCK_TIMEOUT_MS", 2000),
            lock_retry_attempts: env_or("RESERVATION_LOCK_RETRY_ATTEMPTS", 3),
            port: env_or("HTTPD_PORT", 3030),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            eprintln!("config: could not parse {}, using default", key);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_unset_keys() {
        let cfg = Config::from_env();
        assert!(cfg.service_fee_percent >= 0.0);
        assert!(cfg.lock_timeout_ms > 0);
        assert!(cfg.lock_retry_attempts > 0);
    }
}
