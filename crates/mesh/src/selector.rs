//! Pluggable source of random indices.
//!
//! Gateway selection, destination choice and the emergency relay all pick
//! "one of n". Routing those picks through [`IndexSource`] lets tests drive
//! the node with a seeded or fully scripted sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait IndexSource {
    /// Index in `0..len`. Callers pass `len > 0`; `len` of 0 or 1 yields 0.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform picks backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct RngIndices<R = StdRng> {
    rng: R,
}

impl RngIndices<StdRng> {
    /// Deterministic generator for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng> RngIndices<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> IndexSource for RngIndices<R> {
    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Replays a fixed script of picks, cycling when exhausted.
///
/// Each scripted value is reduced modulo the requested length.
#[derive(Debug, Clone)]
pub struct ScriptedIndices {
    script: Vec<usize>,
    position: usize,
}

impl ScriptedIndices {
    pub fn new(script: Vec<usize>) -> Self {
        Self {
            script,
            position: 0,
        }
    }

    /// Always picks the first element.
    pub fn first() -> Self {
        Self::new(vec![0])
    }
}

impl IndexSource for ScriptedIndices {
    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 || self.script.is_empty() {
            return 0;
        }
        let value = self.script[self.position % self.script.len()];
        self.position += 1;
        value % len
    }
}
