//! Deterministic pseudo-randomness for query generation.
//!
//! A plain 64-bit linear congruential generator; quality does not matter
//! here, reproducibility from a seed does.

const MULTIPLIER: u64 = 6364136223846793005;
const INCREMENT: u64 = 1442695040888963407;

const FNV_OFFSET: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// Seedable linear congruential generator.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT),
        }
    }

    /// Seed from a string via FNV-1a, so test names can act as seeds.
    pub fn from_seed_str(seed: &str) -> Self {
        let mut hash = FNV_OFFSET;
        for byte in seed.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        Self::new(hash)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        // upper bits have the longest period
        self.state >> 11
    }

    /// Uniform-ish value in `0..n`. `n` must be non-zero.
    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    /// True roughly once per `denominator` calls.
    pub fn one_in(&mut self, denominator: u64) -> bool {
        self.below(denominator) == 0
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len() as u64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Lcg::from_seed_str("hello");
        let mut b = Lcg::from_seed_str("hello");
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = Lcg::from_seed_str("hello");
        let mut b = Lcg::from_seed_str("world");
        let same = (0..100).filter(|_| a.next_u64() == b.next_u64()).count();
        assert!(same < 5);
    }

    #[test]
    fn test_below_stays_in_range() {
        let mut rng = Lcg::new(42);
        for _ in 0..1000 {
            assert!(rng.below(7) < 7);
        }
    }
}
