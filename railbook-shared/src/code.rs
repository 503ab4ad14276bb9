use chrono::Utc;
use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a human-readable booking code: date prefix plus a random
/// suffix from an ambiguity-free alphabet (no 0/O, 1/I).
///
/// Uniqueness is enforced by the store; the date prefix plus 6 random
/// characters (32^6 combinations per day) makes collisions negligible.
pub fn booking_code() -> String {
    let date = Utc::now().format("%y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("BK{}{}", date, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_shape() {
        let code = booking_code();
        assert_eq!(code.len(), 2 + 6 + 6);
        assert!(code.starts_with("BK"));
        assert!(code[2..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn codes_differ() {
        let a = booking_code();
        let b = booking_code();
        // Same date prefix, different random suffix (overwhelmingly likely).
        assert_eq!(&a[..8], &b[..8]);
        assert_ne!(a, b);
    }
}
