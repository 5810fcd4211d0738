//! Weights of the built-in factors.

use serde::{Deserialize, Serialize};

/// Sums outside this range are logged before normalization.
pub(crate) const WEIGHT_SUM_TOLERANCE: (f64, f64) = (0.9, 1.1);

/// Relative weights of the four built-in factors.
///
/// Weights need not sum to one: they are normalized at evaluation time.
/// Negative or non-finite weights count as zero, and an all-zero set falls
/// back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Device factor weight.
    pub device: f64,
    /// Geo factor weight.
    pub geo: f64,
    /// Network factor weight.
    pub network: f64,
    /// Velocity factor weight.
    pub velocity: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            device: 0.30,
            geo: 0.25,
            network: 0.25,
            velocity: 0.20,
        }
    }
}

impl RiskWeights {
    /// Creates a weight set.
    pub fn new(device: f64, geo: f64, network: f64, velocity: f64) -> Self {
        Self {
            device,
            geo,
            network,
            velocity,
        }
    }

    /// Returns the weights scaled to sum to one.
    pub fn normalized(&self) -> Self {
        let cleaned = Self {
            device: non_negative(self.device),
            geo: non_negative(self.geo),
            network: non_negative(self.network),
            velocity: non_negative(self.velocity),
        };
        let sum = cleaned.device + cleaned.geo + cleaned.network + cleaned.velocity;

        if sum <= 0.0 {
            tracing::warn!(weights = ?self, "All risk weights are zero; using defaults");
            return Self::default();
        }
        warn_if_unbalanced(sum);

        Self {
            device: cleaned.device / sum,
            geo: cleaned.geo / sum,
            network: cleaned.network / sum,
            velocity: cleaned.velocity / sum,
        }
    }
}

/// Maps negative and non-finite weights to zero.
pub(crate) fn non_negative(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

pub(crate) fn warn_if_unbalanced(sum: f64) {
    let (low, high) = WEIGHT_SUM_TOLERANCE;
    if !(low..=high).contains(&sum) {
        tracing::warn!(sum, "Risk weights do not sum to 1.0; normalizing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(w: &RiskWeights) -> f64 {
        w.device + w.geo + w.network + w.velocity
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = RiskWeights::default();
        assert!((sum(&w) - 1.0).abs() < 1e-9);
        assert!((w.normalized().device - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_normalizes_unbalanced_weights() {
        let w = RiskWeights::new(2.0, 1.0, 1.0, 0.0).normalized();
        assert!((w.device - 0.5).abs() < 1e-9);
        assert!((sum(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights_count_as_zero() {
        let w = RiskWeights::new(-1.0, f64::NAN, 1.0, f64::INFINITY).normalized();
        assert_eq!(w.device, 0.0);
        assert_eq!(w.geo, 0.0);
        assert_eq!(w.network, 1.0);
        assert_eq!(w.velocity, 0.0);
    }

    #[test]
    fn test_all_zero_falls_back_to_defaults() {
        let w = RiskWeights::new(0.0, 0.0, 0.0, 0.0).normalized();
        assert_eq!(w, RiskWeights::default());
    }

    #[test]
    fn test_partial_json() {
        let w: RiskWeights = serde_json::from_str(r#"{"device": 1.0}"#).unwrap();
        assert_eq!(w.device, 1.0);
        assert_eq!(w.geo, 0.25);
    }
}
