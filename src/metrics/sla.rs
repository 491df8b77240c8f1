use tracing::debug;

use crate::error::SimulationError;
use crate::model::Cloudlet;

/// Service-level objective on completion time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaPolicy {
    threshold: f64,
}

impl SlaPolicy {
    pub fn new(threshold: f64) -> Result<Self, SimulationError> {
        if threshold.is_finite() && threshold > 0.0 {
            Ok(Self { threshold })
        } else {
            Err(SimulationError::invalid(format!(
                "SLA threshold must be positive, got {threshold}"
            )))
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Relative overrun of `execution_time` past the threshold, 0 when met.
    pub fn violation(&self, execution_time: f64) -> f64 {
        if execution_time > self.threshold {
            (execution_time - self.threshold) / self.threshold
        } else {
            0.0
        }
    }

    /// Cloudlets whose submission-to-finish time exceeds the threshold.
    pub fn violated_cloudlets<'a>(
        &self,
        cloudlets: impl IntoIterator<Item = &'a Cloudlet>,
    ) -> usize {
        let count = cloudlets
            .into_iter()
            .filter_map(Cloudlet::response_time)
            .filter(|&response| response > self.threshold)
            .count();
        debug!("{} cloudlets over the {}s SLA", count, self.threshold);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_violation_within_threshold() {
        let sla = SlaPolicy::new(2.0).unwrap();
        assert_eq!(sla.violation(0.0), 0.0);
        assert_eq!(sla.violation(1.5), 0.0);
        assert_eq!(sla.violation(2.0), 0.0);
    }

    #[test]
    fn overrun_is_relative_to_threshold() {
        for (threshold, time) in [(2.0, 3.0), (0.95, 1.0), (10.0, 45.0), (0.5, 0.75)] {
            let sla = SlaPolicy::new(threshold).unwrap();
            assert_eq!(sla.violation(time), (time - threshold) / threshold);
        }
        assert_eq!(SlaPolicy::new(2.0).unwrap().violation(3.0), 0.5);
    }

    #[test]
    fn rejects_non_positive_threshold() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                SlaPolicy::new(threshold),
                Err(SimulationError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn counts_late_cloudlets() {
        let mut on_time = Cloudlet::new(0, 1000, 1, 300, 300);
        on_time.finish_time = Some(1.0);
        let mut late = Cloudlet::new(1, 1000, 1, 300, 300).with_submission_time(0.5);
        late.finish_time = Some(2.0);
        let unfinished = Cloudlet::new(2, 1000, 1, 300, 300);
        let sla = SlaPolicy::new(1.0).unwrap();
        assert_eq!(sla.violated_cloudlets(&[on_time, late, unfinished]), 1);
    }
}
