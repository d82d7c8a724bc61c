//! Convergence progress estimation for clustering runs.
//!
//! A display-only heuristic: the percent reported is the log-scaled share
//! of the distance from the early-iteration movement baseline down to the
//! convergence threshold. It never gates correctness.

/// Tracks movement reports and yields a monotonically non-decreasing
/// percentage in `[0, 100]`.
#[derive(Debug, Clone)]
pub struct ConvergenceProgress {
    threshold: f64,
    baseline: Option<f64>,
    observed: usize,
    percent: f64,
}

impl ConvergenceProgress {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.max(f64::MIN_POSITIVE),
            baseline: None,
            observed: 0,
            percent: 0.0,
        }
    }

    /// Feed one iteration's centroid movement; returns the new percent.
    pub fn observe(&mut self, movement: f64) -> f64 {
        self.observed += 1;
        if self.observed <= 2 {
            // The baseline is the larger of the first two movements.
            let seen = self.baseline.unwrap_or(0.0);
            self.baseline = Some(seen.max(movement.max(0.0)));
        }
        let raw = self.estimate(movement);
        self.percent = raw.clamp(self.percent, 100.0);
        self.percent
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    fn estimate(&self, movement: f64) -> f64 {
        if movement <= self.threshold {
            return 100.0;
        }
        let baseline = match self.baseline {
            Some(baseline) if baseline > self.threshold => baseline,
            // Converged from the start, or nothing to scale against.
            _ => return 100.0,
        };
        if movement >= baseline {
            return 0.0;
        }
        let span = (baseline / self.threshold).ln();
        let travelled = (baseline / movement).ln();
        100.0 * travelled / span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_monotonically_non_decreasing() {
        let mut progress = ConvergenceProgress::new(0.01);
        let movements = [100.0, 80.0, 40.0, 60.0, 10.0, 1.0, 0.5];
        let mut last = 0.0;
        for movement in movements {
            let percent = progress.observe(movement);
            assert!(percent >= last, "{percent} < {last}");
            assert!((0.0..=100.0).contains(&percent));
            last = percent;
        }
    }

    #[test]
    fn reaching_the_threshold_reports_completion() {
        let mut progress = ConvergenceProgress::new(0.05);
        progress.observe(10.0);
        progress.observe(5.0);
        assert_eq!(progress.observe(0.04), 100.0);
    }

    #[test]
    fn halfway_in_log_space_is_half_of_the_bar() {
        // baseline 100, threshold 1: movement 10 sits at 50% in log scale.
        let mut progress = ConvergenceProgress::new(1.0);
        progress.observe(100.0);
        progress.observe(100.0);
        let percent = progress.observe(10.0);
        assert!((percent - 50.0).abs() < 1e-9, "got {percent}");
    }

    #[test]
    fn movement_above_baseline_does_not_regress_the_bar() {
        let mut progress = ConvergenceProgress::new(0.01);
        progress.observe(10.0);
        progress.observe(1.0);
        let before = progress.percent();
        let after = progress.observe(50.0);
        assert_eq!(before, after);
    }

    #[test]
    fn immediate_convergence_is_complete() {
        let mut progress = ConvergenceProgress::new(0.5);
        assert_eq!(progress.observe(0.2), 100.0);
    }
}
