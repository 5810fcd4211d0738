//! Risk levels and the actions they map to.

use crate::core::{DecisionAction, DecisionHint, RiskLevel};

use serde::{Deserialize, Serialize};

/// Score thresholds separating the risk levels.
///
/// A score at or above `critical` is critical, at or above `high` is high,
/// at or above `medium` is medium, anything lower is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RiskThresholds {
    /// Lowest medium score.
    pub medium: u8,
    /// Lowest high score.
    pub high: u8,
    /// Lowest critical score.
    pub critical: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 30,
            high: 60,
            critical: 80,
        }
    }
}

impl RiskThresholds {
    /// Creates thresholds, falling back to defaults unless
    /// `0 < medium <= high <= critical <= 100`.
    pub fn new(medium: u8, high: u8, critical: u8) -> Self {
        Self {
            medium,
            high,
            critical,
        }
        .validated()
    }

    /// Returns `self` if ordered and in range, else the defaults.
    pub fn validated(self) -> Self {
        if self.medium > 0
            && self.medium <= self.high
            && self.high <= self.critical
            && self.critical <= 100
        {
            self
        } else {
            tracing::warn!(
                medium = self.medium,
                high = self.high,
                critical = self.critical,
                "Invalid risk thresholds; using defaults"
            );
            Self::default()
        }
    }

    /// Returns the level for a score.
    pub fn level_for(&self, score: u8) -> RiskLevel {
        let t = self.validated();
        if score >= t.critical {
            RiskLevel::Critical
        } else if score >= t.high {
            RiskLevel::High
        } else if score >= t.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Returns the action for a level: low allows, medium challenges,
/// high and critical block.
pub fn action_for(level: RiskLevel) -> DecisionAction {
    match level {
        RiskLevel::Low => DecisionAction::Allow,
        RiskLevel::Medium => DecisionAction::Mfa,
        RiskLevel::High | RiskLevel::Critical => DecisionAction::Block,
    }
}

/// Returns the decision hint for a level.
pub fn decision_hint_for(level: RiskLevel) -> DecisionHint {
    match action_for(level) {
        DecisionAction::Allow => DecisionHint::allow(),
        DecisionAction::Mfa => DecisionHint::mfa(),
        DecisionAction::Block => DecisionHint::block(format!("risk level {}", level)),
    }
}
