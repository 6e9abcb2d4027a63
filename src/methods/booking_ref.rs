use rand::Rng;
use uuid::Uuid;

/// Opaque globally-unique booking identity. This token, not the row id, is
/// what clients hold and what retries are keyed on.
pub fn generate_booking_ref() -> String {
    Uuid::new_v4().to_string()
}

/// Short human-facing confirmation code printed on receipts and read over
/// the phone. Digits and uppercase letters only.
pub fn generate_confirmation() -> String {
    let charset: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::rng();
    (0..8)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_refs_are_unique_and_uuid_shaped() {
        let a = generate_booking_ref();
        let b = generate_booking_ref();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn confirmation_is_eight_alnum_chars() {
        let code = generate_confirmation();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
