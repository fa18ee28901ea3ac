//! Growth policy for scaling filters.
//!
//! A scaling filter is an unbounded stack of generations sharing one key
//! prefix. Every inserted element bumps a shared counter; the counter value
//! decides which generation receives the element's bits. Generation `index`
//! is sized for `capacity` elements at a false-positive budget of
//! `rate * 0.5^index`, so the summed error over all generations stays below
//! `rate` no matter how many generations exist.
use crate::hash::{double_hash, optimal_bits_for_ln, optimal_hash_count};
use std::f64::consts::LN_2;

/// Generation that the element which moved the counter to `counter` belongs to.
///
/// Returns 0 for an empty filter.
pub fn generation_for(counter: u64, capacity: usize) -> u64 {
    counter.div_ceil(capacity as u64)
}

/// Key holding the shared insertion counter.
pub fn counter_key(key_name: &str) -> String {
    format!("{key_name}:count")
}

/// Key holding generation `index`'s bit array.
pub fn generation_key(key_name: &str, index: u64) -> String {
    format!("{key_name}:{index}")
}

/// Sizing of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    pub index: u64,
    pub num_bits: u64,
    pub num_hashes: usize,
}

impl Generation {
    pub fn new(index: u64, capacity: usize, rate: f64) -> Self {
        // ln(rate * 0.5^index), kept in log space so deep generations don't underflow
        let ln_budget = rate.ln() - index as f64 * LN_2;
        let num_bits = optimal_bits_for_ln(capacity, ln_budget).max(1);
        let num_hashes = optimal_hash_count(capacity, num_bits);

        Self {
            index,
            num_bits,
            num_hashes,
        }
    }

    pub fn false_positive_budget(&self, rate: f64) -> f64 {
        rate * 0.5f64.powf(self.index as f64)
    }

    /// Bit positions of a value with SHA-1 words `h` inside this generation.
    pub fn positions<'a>(&self, h: &'a [u32; 4]) -> impl Iterator<Item = u64> + 'a {
        let num_bits = self.num_bits;
        double_hash(h)
            .take(self.num_hashes)
            .map(move |raw| raw % num_bits)
    }
}

/// Iterates generations `1..=highest` in ascending order.
pub fn generations(
    highest: u64,
    capacity: usize,
    rate: f64,
) -> impl Iterator<Item = Generation> {
    (1..=highest).map(move |index| Generation::new(index, capacity, rate))
}
