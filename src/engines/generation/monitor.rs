use log::warn;

/// Rolling failure rate of one operator.
///
/// A call fails when it yields no valid offspring. Once the failure rate
/// exceeds `threshold` at a checkpoint (100, 1000, 10000... calls) a single
/// warning is emitted; evolution is never interrupted.
#[derive(Debug, Clone)]
pub struct FailureRate {
    calls: u64,
    failures: u64,
    threshold: f64,
    warned: bool,
}

impl Default for FailureRate {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl FailureRate {
    pub fn new(threshold: f64) -> Self {
        Self {
            calls: 0,
            failures: 0,
            threshold,
            warned: false,
        }
    }

    /// Record one call; returns `true` when the advisory fires.
    pub fn record(&mut self, operator: &str, failed: bool) -> bool {
        self.calls += 1;
        if failed {
            self.failures += 1;
        }
        if self.warned || !is_checkpoint(self.calls) || self.rate() <= self.threshold {
            return false;
        }
        self.warned = true;
        warn!(
            "Operator {} failed {} times out of {} calls ({:.1}%): check its preconditions",
            operator,
            self.failures,
            self.calls,
            100.0 * self.rate()
        );
        true
    }

    pub fn rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.failures as f64 / self.calls as f64
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

fn is_checkpoint(calls: u64) -> bool {
    let mut n = calls;
    if n < 100 {
        return false;
    }
    while n % 10 == 0 {
        n /= 10;
    }
    n == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints() {
        assert!(!is_checkpoint(10));
        assert!(is_checkpoint(100));
        assert!(!is_checkpoint(200));
        assert!(is_checkpoint(1000));
    }

    #[test]
    fn test_advisory_fires_once() {
        let mut monitor = FailureRate::default();
        let fired: Vec<bool> = (0..2000).map(|_| monitor.record("broken", true)).collect();
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
        assert!(fired[99]);
        assert_eq!(monitor.rate(), 1.0);
    }

    #[test]
    fn test_healthy_operator_is_quiet() {
        let mut monitor = FailureRate::default();
        for i in 0..1000 {
            assert!(!monitor.record("fine", i % 2 == 0));
        }
    }
}
