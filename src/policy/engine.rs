//! Local rule engine.

use crate::core::{DeviceType, RiskLevel};
use crate::policy::rules::{Condition, LocalRule, RuleContext, RuleId};
use crate::scoring::HIGH_RISK_COUNTRIES;

use serde::{Deserialize, Serialize};

/// The result of local rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluation {
    /// Rules that fired, highest priority first.
    pub triggered: Vec<RuleId>,

    /// Highest escalation among the fired rules.
    pub escalation: Option<RiskLevel>,
}

impl RuleEvaluation {
    /// Returns `true` if no rule fired.
    pub fn is_empty(&self) -> bool {
        self.triggered.is_empty()
    }
}

/// Evaluates every enabled local rule against a [`RuleContext`].
///
/// Unlike a first-match policy, all matching rules are reported; the
/// strongest escalation wins.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    /// Rules, highest priority first.
    rules: Vec<LocalRule>,
}

impl RuleEngine {
    /// Creates an engine without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule to the engine.
    pub fn add_rule(&mut self, rule: LocalRule) {
        self.rules.push(rule);
        // Sort by priority (highest first); stable for equal priority
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Adds a rule and returns self for chaining.
    pub fn with_rule(mut self, rule: LocalRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Returns the number of rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns a reference to the rules.
    pub fn rules(&self) -> &[LocalRule] {
        &self.rules
    }

    /// Clears all rules.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Evaluates all rules against the context.
    pub fn evaluate(&self, context: &RuleContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation::default();

        for rule in self.rules.iter().filter(|r| r.matches(context)) {
            tracing::debug!(
                rule_id = %rule.id,
                rule_name = %rule.name,
                escalate_to = %rule.escalate_to,
                "Local rule matched"
            );
            evaluation.triggered.push(rule.id.clone());
            evaluation.escalation = evaluation.escalation.max(Some(rule.escalate_to));
        }

        evaluation
    }

    /// Creates the standard login rule set.
    ///
    /// - Tor exit nodes and very poor reputation escalate to high
    /// - High-risk countries and velocity bursts escalate to high
    /// - VPNs, proxies, country changes and unknown devices escalate to medium
    pub fn default_rules() -> Self {
        Self::new()
            .with_rule(
                LocalRule::new(RuleId::TorExitNode, RiskLevel::High)
                    .with_name("Tor Exit Node")
                    .with_condition(Condition::IsTor)
                    .with_priority(100),
            )
            .with_rule(
                LocalRule::new(RuleId::LowReputation, RiskLevel::High)
                    .with_name("Very Low IP Reputation")
                    .with_condition(Condition::ReputationBelow { threshold: 10.0 })
                    .with_priority(90),
            )
            .with_rule(
                LocalRule::new(RuleId::HighRiskCountry, RiskLevel::High)
                    .with_name("High-Risk Country")
                    .with_condition(Condition::country_in(HIGH_RISK_COUNTRIES.iter().copied()))
                    .with_priority(80),
            )
            .with_rule(
                LocalRule::new(RuleId::HighVelocity, RiskLevel::High)
                    .with_name("Attempt Burst")
                    .with_condition(Condition::VelocityAbove { threshold: 80.0 })
                    .with_priority(70),
            )
            .with_rule(
                LocalRule::new(RuleId::GeoMismatch, RiskLevel::Medium)
                    .with_name("Country Changed Since Last Login")
                    .with_condition(Condition::CountryMismatch)
                    .with_priority(50),
            )
            .with_rule(
                LocalRule::new(RuleId::VpnDetected, RiskLevel::Medium)
                    .with_name("VPN")
                    .with_condition(Condition::IsVpn)
                    .with_priority(40),
            )
            .with_rule(
                LocalRule::new(RuleId::ProxyDetected, RiskLevel::Medium)
                    .with_name("Open Proxy")
                    .with_condition(Condition::IsProxy)
                    .with_priority(40),
            )
            .with_rule(
                LocalRule::new(RuleId::UnknownDevice, RiskLevel::Medium)
                    .with_name("Unknown Device")
                    .with_condition(Condition::DeviceTypeIs {
                        device_type: DeviceType::Unknown,
                    })
                    .with_priority(10),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceInfo, GeoInfo, RiskSignals};

    fn desktop() -> DeviceInfo {
        DeviceInfo::new("dev-1", DeviceType::Desktop)
            .with_os("macos")
            .with_browser("firefox")
    }

    #[test]
    fn test_clean_context_triggers_nothing() {
        let engine = RuleEngine::default_rules();
        let evaluation = engine.evaluate(&RuleContext::new(desktop()));
        assert!(evaluation.is_empty());
        assert_eq!(evaluation.escalation, None);
    }

    #[test]
    fn test_tor_escalates_to_high() {
        let engine = RuleEngine::default_rules();
        let ctx = RuleContext::new(desktop())
            .with_signals(RiskSignals::new().with_tor(true).with_vpn(true));
        let evaluation = engine.evaluate(&ctx);

        assert_eq!(
            evaluation.triggered,
            vec![RuleId::TorExitNode, RuleId::VpnDetected]
        );
        assert_eq!(evaluation.escalation, Some(RiskLevel::High));
    }

    #[test]
    fn test_geo_rules() {
        let engine = RuleEngine::default_rules();
        let ctx = RuleContext::new(desktop())
            .with_geo(GeoInfo::country("KP"))
            .with_signals(RiskSignals::new().with_previous_geo(GeoInfo::country("IR")));
        let evaluation = engine.evaluate(&ctx);

        assert_eq!(
            evaluation.triggered,
            vec![RuleId::HighRiskCountry, RuleId::GeoMismatch]
        );
        assert_eq!(evaluation.escalation, Some(RiskLevel::High));
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let engine = RuleEngine::new().with_rule(
            LocalRule::new(RuleId::VpnDetected, RiskLevel::Medium)
                .with_condition(Condition::IsVpn)
                .with_enabled(false),
        );
        let ctx = RuleContext::new(desktop()).with_signals(RiskSignals::new().with_vpn(true));
        assert!(engine.evaluate(&ctx).is_empty());
    }

    #[test]
    fn test_custom_rule_priority_order() {
        let engine = RuleEngine::new()
            .with_rule(
                LocalRule::new(RuleId::custom("low"), RiskLevel::Medium)
                    .with_condition(Condition::Always)
                    .with_priority(1),
            )
            .with_rule(
                LocalRule::new(RuleId::custom("high"), RiskLevel::Critical)
                    .with_condition(Condition::Always)
                    .with_priority(5),
            );

        let evaluation = engine.evaluate(&RuleContext::new(desktop()));
        assert_eq!(
            evaluation.triggered,
            vec![RuleId::custom("high"), RuleId::custom("low")]
        );
        assert_eq!(evaluation.escalation, Some(RiskLevel::Critical));
        assert_eq!(engine.rule_count(), 2);
    }
}
