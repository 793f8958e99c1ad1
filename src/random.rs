// =============================================================================
// Random Source — injectable uniform number provider
// =============================================================================
//
// The engine never touches a global RNG. Every draw goes through a
// `RandomSource`, so tests can replace it with a fixed sequence and pin
// durations, labels and bounds.
// =============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::runtime_config::DurationRange;

/// Provider of uniform values in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

/// `StdRng`-backed source used in production.
pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn from_os() -> Self {
        Self(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Seeded when `seed` is set, OS entropy otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_os(),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

/// Uniform draw in `[min, max)`. Returns `min` when the range is empty.
pub fn uniform(source: &mut dyn RandomSource, min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    let value = source.next_unit() * (max - min) + min;
    // Rounding can land exactly on `max` for values just below 1.0.
    if value >= max {
        min.max(max - f64::EPSILON * max.abs())
    } else {
        value
    }
}

/// Whole seconds drawn from `range`.
pub fn uniform_secs(source: &mut dyn RandomSource, range: DurationRange) -> u32 {
    if range.max_secs <= range.min_secs {
        return range.min_secs;
    }
    let secs = uniform(source, range.min_secs as f64, range.max_secs as f64).floor() as u32;
    secs.clamp(range.min_secs, range.max_secs - 1)
}

/// Uniform index in `0..len`. `len` must be > 0.
pub fn uniform_index(source: &mut dyn RandomSource, len: usize) -> usize {
    let idx = (source.next_unit() * len as f64).floor() as usize;
    idx.min(len.saturating_sub(1))
}

/// Cycles through a fixed list of values. Test-only.
#[cfg(test)]
pub struct FixedSequence {
    values: Vec<f64>,
    pos: usize,
}

#[cfg(test)]
impl FixedSequence {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let values = values.into();
        assert!(!values.is_empty(), "sequence must not be empty");
        Self { values, pos: 0 }
    }
}

#[cfg(test)]
impl RandomSource for FixedSequence {
    fn next_unit(&mut self) -> f64 {
        let value = self.values[self.pos % self.values.len()];
        self.pos += 1;
        value
    }
}
