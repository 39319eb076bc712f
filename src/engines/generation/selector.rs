//! Adaptive operator selection.
//!
//! A successive-elimination bandit: every arm keeps a confidence interval
//! on its mean reward, and arms whose upper bound falls below the best
//! lower bound among all arms are dropped from the candidate set. Dropped
//! arms come back as soon as their upper bound clears that mark again, and
//! the whole set is restored periodically.
//!
//! The selector also owns the temperature used as mutation strength: it
//! cools while the operators keep producing fitter offspring and warms back
//! up when they stall.

use crate::config::SelectorConfig;
use crate::engines::generation::registry::{OperatorRegistry, OperatorStats};
use crate::random::Randy;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone)]
pub struct OperatorSelector {
    config: SelectorConfig,
    horizon: usize,
    time: usize,
    arms: Vec<String>,
    candidates: Vec<String>,
    temperature: f64,
    seen_calls: u64,
    seen_successes: u64,
}

impl OperatorSelector {
    /// Arms are the non-initializer operators of `registry`; `max_generation`
    /// is the horizon unless the configuration sets one.
    pub fn new(registry: &OperatorRegistry, config: SelectorConfig, max_generation: usize) -> Self {
        let arms: Vec<String> = registry.variation_operators().map(|o| o.name.clone()).collect();
        let horizon = config.horizon.unwrap_or(max_generation).max(1);
        let (seen_calls, seen_successes) = totals(registry, &arms);
        Self {
            temperature: config.temperature,
            config,
            horizon,
            time: 0,
            candidates: arms.clone(),
            arms,
            seen_calls,
            seen_successes,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn time(&self) -> usize {
        self.time
    }

    /// Mutation strength for the next generation.
    pub fn sigma(&self) -> f64 {
        self.temperature
    }

    /// Pick one of the surviving arms uniformly.
    pub fn take(&self, rng: &mut Randy) -> Option<&str> {
        rng.choice(&self.candidates).map(String::as_str)
    }

    /// Confidence interval of an arm; arms never called are unbounded above.
    pub fn bounds(&self, stats: &OperatorStats) -> Bounds {
        if stats.calls == 0 {
            return Bounds {
                mean: 0.0,
                lower: 0.0,
                upper: f64::INFINITY,
            };
        }
        let calls = stats.calls as f64;
        let mean = (stats.successes as f64 * self.config.success_reward
            + stats.offspring as f64 * self.config.offspring_reward)
            / calls;
        let radius = (2.0 * (self.horizon as f64).ln().max(0.0) / calls).sqrt();
        Bounds {
            mean,
            lower: mean - radius,
            upper: mean + radius,
        }
    }

    /// Advance one step and recompute the temperature and the candidate set
    /// from the registry statistics; call once per generation.
    pub fn update(&mut self, registry: &OperatorRegistry) {
        self.time += 1;
        self.adapt_temperature(registry);

        let bounds: Vec<(String, Bounds)> = self
            .arms
            .iter()
            .filter_map(|name| registry.get(name).map(|o| (name.clone(), self.bounds(&o.stats))))
            .collect();
        let best_lower = bounds.iter().map(|(_, b)| b.lower).fold(0.0, f64::max);
        let survivors: Vec<String> = bounds
            .into_iter()
            .filter(|(_, b)| b.upper > best_lower)
            .map(|(name, _)| name)
            .collect();

        let period = (self.horizon / self.config.reset_divisor).max(1);
        if self.time % period == 0 {
            debug!("Operator selector reset at step {}", self.time);
            self.candidates = self.arms.clone();
        } else if survivors.is_empty() {
            self.candidates = self.arms.clone();
        } else {
            if survivors != self.candidates {
                debug!("Operator selector candidates: {}", survivors.join(", "));
            }
            self.candidates = survivors;
        }
    }

    fn adapt_temperature(&mut self, registry: &OperatorRegistry) {
        let (calls, successes) = totals(registry, &self.arms);
        let new_calls = calls.saturating_sub(self.seen_calls);
        let new_successes = successes.saturating_sub(self.seen_successes);
        self.seen_calls = calls;
        self.seen_successes = successes;
        if new_calls == 0 {
            return;
        }

        let rate = new_successes as f64 / new_calls as f64;
        let floor = self.config.temperature * self.config.min_temperature_ratio;
        self.temperature = if rate >= self.config.exploit_success_rate {
            if self.temperature > floor {
                self.temperature * self.config.cooling
            } else {
                self.temperature * self.config.warming
            }
        } else {
            (self.temperature * self.config.warming).min(self.config.temperature)
        };
        debug!(
            "Success rate {:.3} over {} calls, temperature {:.4}",
            rate, new_calls, self.temperature
        );
    }
}

fn totals(registry: &OperatorRegistry, arms: &[String]) -> (u64, u64) {
    arms.iter()
        .filter_map(|name| registry.get(name))
        .fold((0, 0), |(calls, successes), o| (calls + o.stats.calls, successes + o.stats.successes))
}
