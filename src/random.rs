//! Reproducible random numbers for evolutionary runs.
//!
//! Every stochastic decision in the engine draws from a [`Randy`]. Reseeding
//! with the same value restarts the identical sequence of draws, whatever
//! happened before.
//!
//! Most draws accept a `strength` in `[0, 1]`: `1.0` draws uniformly over the
//! whole range, `0.0` returns the current location unchanged, and anything in
//! between samples a normal distribution centred on the location and
//! truncated to the range.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Values closer than this to the bounds of `(0, 1)` are clipped.
const SMALL_NUMBER: f64 = 1e-9;

/// Rejection-sampling attempts before a perturbed draw falls back to uniform.
const MAX_REJECTIONS: usize = 100;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct Randy {
    generator: StdRng,
    seed: u64,
    calls: u64,
}

impl Default for Randy {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Randy {
    pub fn new(seed: u64) -> Self {
        Self {
            generator: StdRng::seed_from_u64(seed),
            seed,
            calls: 0,
        }
    }

    /// Restart the generator; subsequent draws replay the sequence of `seed`.
    pub fn seed(&mut self, seed: u64) {
        self.generator = StdRng::seed_from_u64(seed);
        self.seed = seed;
        self.calls = 0;
    }

    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    /// Number of draws since the last (re)seed.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Stretch a strength in `[0, 1]` onto a standard deviation in `]0, ~20.7[`.
    pub fn strength_to_sigma(strength: f64) -> f64 {
        let x = (strength.clamp(0.0, 1.0) / 2.0 + 0.5).min(1.0 - SMALL_NUMBER);
        let sigma = (x / (1.0 - x)).ln();
        if sigma.abs() < SMALL_NUMBER {
            SMALL_NUMBER
        } else {
            sigma
        }
    }

    /// A float in the half-open range `[a, b)`, optionally perturbing `loc`.
    pub fn random_float(&mut self, a: f64, b: f64, loc: Option<f64>, strength: f64) -> f64 {
        self.calls += 1;
        if b <= a {
            return a;
        }
        match loc {
            Some(loc) if strength <= 0.0 => loc,
            Some(loc) if strength < 1.0 => self.truncated_normal(a, b, loc, strength),
            _ => self.generator.gen_range(a..b),
        }
    }

    /// An integer in the half-open range `[a, b)`, optionally perturbing `loc`.
    pub fn random_int(&mut self, a: i64, b: i64, loc: Option<i64>, strength: f64) -> i64 {
        self.calls += 1;
        if b <= a {
            return a;
        }
        match loc {
            Some(loc) if strength <= 0.0 => loc,
            Some(loc) if strength < 1.0 => {
                let centre = loc as f64 + 0.5;
                let value = self.truncated_normal(a as f64, b as f64, centre, strength);
                (value.floor() as i64).clamp(a, b - 1)
            }
            _ => self.generator.gen_range(a..b),
        }
    }

    /// An index in `[0, len)`, perturbing `loc` with the given strength.
    pub fn sigma_index(&mut self, len: usize, loc: Option<usize>, strength: f64) -> usize {
        if len == 0 {
            return 0;
        }
        let loc = loc.map(|l| l.min(len - 1) as i64);
        self.random_int(0, len as i64, loc, strength) as usize
    }

    /// A uniformly chosen element, or `None` when `seq` is empty.
    pub fn choice<'a, T>(&mut self, seq: &'a [T]) -> Option<&'a T> {
        self.calls += 1;
        seq.choose(&mut self.generator)
    }

    /// An element chosen by perturbing the index `loc`.
    pub fn sigma_choice<'a, T>(&mut self, seq: &'a [T], loc: Option<usize>, strength: f64) -> Option<&'a T> {
        if seq.is_empty() {
            return None;
        }
        let index = self.sigma_index(seq.len(), loc, strength);
        seq.get(index)
    }

    /// Index drawn according to the (not necessarily normalized) weights.
    pub fn weighted_choice(&mut self, weights: &[f64]) -> Option<usize> {
        self.calls += 1;
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if weights.is_empty() || total <= 0.0 {
            return None;
        }
        let mut spin = self.generator.gen::<f64>() * total;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            spin -= w;
            if spin < 0.0 {
                return Some(i);
            }
        }
        weights.iter().rposition(|w| *w > 0.0)
    }

    /// `true` with probability `p_true`.
    pub fn boolean(&mut self, p_true: f64) -> bool {
        self.calls += 1;
        self.generator.gen::<f64>() < p_true.clamp(0.0, 1.0)
    }

    pub fn shuffle<T>(&mut self, seq: &mut [T]) {
        self.calls += 1;
        seq.shuffle(&mut self.generator);
    }

    fn truncated_normal(&mut self, a: f64, b: f64, loc: f64, strength: f64) -> f64 {
        let sigma = Self::strength_to_sigma(strength);
        if let Ok(normal) = Normal::new(loc.clamp(a, b), sigma) {
            for _ in 0..MAX_REJECTIONS {
                let value = normal.sample(&mut self.generator);
                if value >= a && value < b {
                    return value;
                }
            }
        }
        self.generator.gen_range(a..b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut r1 = Randy::new(42);
        let mut r2 = Randy::new(7);
        r2.random_int(0, 10, None, 1.0);
        r2.seed(42);

        let a: Vec<i64> = (0..20).map(|_| r1.random_int(0, 1000, None, 1.0)).collect();
        let b: Vec<i64> = (0..20).map(|_| r2.random_int(0, 1000, None, 1.0)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_strength_zero_returns_loc() {
        let mut r = Randy::new(1);
        assert_eq!(r.random_int(0, 100, Some(37), 0.0), 37);
        assert_eq!(r.random_float(0.0, 1.0, Some(0.25), 0.0), 0.25);
    }

    #[test]
    fn test_perturbed_draws_stay_in_range() {
        let mut r = Randy::new(3);
        for strength in [0.01, 0.3, 0.7, 0.99] {
            for _ in 0..200 {
                let v = r.random_int(-5, 5, Some(4), strength);
                assert!((-5..5).contains(&v));
                let f = r.random_float(0.0, 1.0, Some(0.0), strength);
                assert!((0.0..1.0).contains(&f));
            }
        }
    }

    #[test]
    fn test_low_strength_stays_local() {
        let mut r = Randy::new(11);
        let close = (0..500)
            .map(|_| r.random_int(0, 10_000, Some(5_000), 0.05))
            .filter(|v| (v - 5_000).abs() <= 2)
            .count();
        assert!(close > 450);
    }

    #[test]
    fn test_strength_to_sigma_is_monotonic() {
        let s1 = Randy::strength_to_sigma(0.1);
        let s2 = Randy::strength_to_sigma(0.5);
        let s3 = Randy::strength_to_sigma(0.9);
        assert!(s1 > 0.0 && s1 < s2 && s2 < s3);
    }

    #[test]
    fn test_weighted_choice_skips_zero_weights() {
        let mut r = Randy::new(5);
        for _ in 0..100 {
            assert_eq!(r.weighted_choice(&[0.0, 2.0, 0.0]), Some(1));
        }
        assert_eq!(r.weighted_choice(&[]), None);
    }

    #[test]
    fn test_choice_on_empty_slice() {
        let mut r = Randy::new(5);
        let empty: [u8; 0] = [];
        assert!(r.choice(&empty).is_none());
        assert!(r.sigma_choice(&empty, None, 0.5).is_none());
    }

    proptest! {
        #[test]
        fn prop_int_draws_respect_bounds(
            seed in any::<u64>(),
            a in -1000i64..1000,
            width in 1i64..500,
            offset in 0i64..500,
            strength in 0.0f64..=1.0,
        ) {
            let mut r = Randy::new(seed);
            let b = a + width;
            let loc = a + offset % width;
            let v = r.random_int(a, b, Some(loc), strength);
            prop_assert!((a..b).contains(&v));
        }
    }
}
