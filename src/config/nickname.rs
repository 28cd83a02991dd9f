//! Fallback nickname for configs that do not set one.

use rand::RngExt;

/// `guest` followed by four random digits, e.g. `guest0427`.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let num: u16 = rng.random_range(0..10_000);
    format!("guest{:04}", num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_nickname_shape() {
        for _ in 0..50 {
            let nick = generate_nickname();
            assert_eq!(nick.len(), 9);
            let digits = nick.strip_prefix("guest").unwrap();
            assert!(digits.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
