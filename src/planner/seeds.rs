// Seed derivation for replicate runs
use rand::Rng;

pub const SEED_MIN: u64 = 1;
pub const SEED_MAX: u64 = 999_999;

/// Draw a base seed uniformly from `[SEED_MIN, SEED_MAX]`.
pub fn random_base_seed() -> u64 {
    rand::thread_rng().gen_range(SEED_MIN..=SEED_MAX)
}

/// Contiguous seeds `base, base + 1, ..` of length `count`.
///
/// Returns `None` if the last seed would overflow.
pub fn offset_seeds(base: u64, count: usize) -> Option<Vec<u64>> {
    (0..count as u64).map(|i| base.checked_add(i)).collect()
}

/// Seeds for `count` replicates. An explicit seed makes this pure; without
/// one a single random base is drawn and offset, never re-rolled per replicate.
pub fn derive_seeds(explicit_seed: Option<u64>, count: usize) -> Vec<u64> {
    let base = explicit_seed.unwrap_or_else(random_base_seed);
    (0..count as u64).map(|i| base.saturating_add(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_seed_is_deterministic() {
        assert_eq!(derive_seeds(Some(42), 3), vec![42, 43, 44]);
        assert_eq!(derive_seeds(Some(42), 3), derive_seeds(Some(42), 3));
    }

    #[test]
    fn test_random_seeds_share_one_base() {
        for _ in 0..20 {
            let seeds = derive_seeds(None, 3);
            assert_eq!(seeds.len(), 3);
            let base = seeds[0];
            assert!((SEED_MIN..=SEED_MAX).contains(&base));
            for (i, seed) in seeds.iter().enumerate() {
                assert_eq!(seed - i as u64, base);
            }
        }
    }

    #[test]
    fn test_zero_count() {
        assert!(derive_seeds(Some(7), 0).is_empty());
    }

    #[test]
    fn test_offset_overflow_detected() {
        assert_eq!(offset_seeds(5, 2), Some(vec![5, 6]));
        assert_eq!(offset_seeds(u64::MAX, 2), None);
    }
}
