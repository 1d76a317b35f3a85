//! Random draws for quote injection.
//!
//! Draws go through [`RandomSource`] so tests can script them.

use rand::Rng;

pub trait RandomSource: Send {
    /// Uniform draw in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn next_index(&mut self, len: usize) -> usize {
        let index = (self.next_unit() * len as f64) as usize;
        index.min(len.saturating_sub(1))
    }
}

/// Thread-local generator from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_unit(&mut self) -> f64 {
        rand::rng().random::<f64>()
    }

    fn next_index(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len.max(1))
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    draws: Vec<f64>,
    position: usize,
}

impl ScriptedRandom {
    pub fn new(draws: impl Into<Vec<f64>>) -> Self {
        Self {
            draws: draws.into(),
            position: 0,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        if self.draws.is_empty() {
            return 0.0;
        }
        let value = self.draws[self.position % self.draws.len()];
        self.position += 1;
        value.clamp(0.0, 0.999_999)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_random_stays_in_unit_interval() {
        let mut random = OsRandom;
        for _ in 0..256 {
            let draw = random.next_unit();
            assert!((0.0..1.0).contains(&draw));
        }
    }

    #[test]
    fn os_random_indices_stay_in_range() {
        let mut random = OsRandom;
        for _ in 0..256 {
            assert!(random.next_index(5) < 5);
        }
        assert_eq!(random.next_index(1), 0);
    }

    #[test]
    fn next_index_never_reaches_len() {
        let mut random = ScriptedRandom::new(vec![0.0, 0.5, 0.999_999_9, 1.0]);
        for _ in 0..4 {
            assert!(random.next_index(3) < 3);
        }
    }

    #[test]
    fn scripted_random_cycles() {
        let mut random = ScriptedRandom::new(vec![0.1, 0.2]);
        assert_eq!(random.next_unit(), 0.1);
        assert_eq!(random.next_unit(), 0.2);
        assert_eq!(random.next_unit(), 0.1);
    }
}
