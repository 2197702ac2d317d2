//! Seeded random values for test resource names
//!
//! Names like `tf-test-%{random_suffix}` end up in request URLs and bodies,
//! so a replay has to regenerate exactly the suffixes the recording used.
//! The seed is stored in the cassette.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Characters used for random suffixes (lowercase alphanumerics, valid in
/// nearly every GCP resource name)
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Deterministic random source for one test
pub struct SeededRandom {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// A fresh, unpredictable seed for record and live runs
    pub fn fresh_seed() -> u64 {
        rand::thread_rng().gen()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random lowercase alphanumeric string of length `len`
    pub fn rand_string(&self, len: usize) -> String {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (0..len)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }

    /// Random integer in `0..upper`
    pub fn rand_int(&self, upper: u64) -> u64 {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..upper.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let a = SeededRandom::new(99);
        let b = SeededRandom::new(99);
        assert_eq!(a.rand_string(10), b.rand_string(10));
        assert_eq!(a.rand_string(4), b.rand_string(4));
        assert_eq!(a.rand_int(1000), b.rand_int(1000));
    }

    #[test]
    fn test_charset_and_length() {
        let s = SeededRandom::new(1).rand_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_rand_int_zero_upper() {
        assert_eq!(SeededRandom::new(5).rand_int(0), 0);
    }
}
