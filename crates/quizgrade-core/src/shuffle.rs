//! Deterministic option shuffling.
//!
//! The permutation a student sees is a pure function of the set's seed and
//! the quiz's 1-based position in the set, so grading can rebuild it at any
//! time without storing it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Shuffle `items` in place for the quiz at `quiz_index` in a set seeded with
/// `seed`.
///
/// Each call uses a fresh generator seeded with `seed + quiz_index`
/// (wrapping), followed by `rand`'s Fisher–Yates slice shuffle.
pub fn shuffle_options<T>(items: &mut [T], seed: i64, quiz_index: i32) {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i64::from(quiz_index)) as u64);
    items.shuffle(&mut rng);
}

/// Shuffled copy of `items`.
pub fn shuffled<T: Clone>(items: &[T], seed: i64, quiz_index: i32) -> Vec<T> {
    let mut out = items.to_vec();
    shuffle_options(&mut out, seed, quiz_index);
    out
}

/// Parse a persisted seed.
pub fn parse_seed(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Fresh non-negative seed for a new quiz set.
pub fn generate_seed() -> i64 {
    rand::thread_rng().gen_range(0..i64::MAX)
}
