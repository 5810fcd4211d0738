//! Local rules and conditions.

use crate::core::{DeviceInfo, DeviceType, GeoInfo, RiskLevel, RiskSignals};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a local rule, reported in
/// [`RiskAssessmentResult::triggered_rules`](crate::core::RiskAssessmentResult::triggered_rules).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    /// The client is a Tor exit node.
    TorExitNode,
    /// The client is behind a VPN.
    VpnDetected,
    /// The client is behind an open proxy.
    ProxyDetected,
    /// IP reputation is very poor.
    LowReputation,
    /// Burst of attempts from the client.
    HighVelocity,
    /// The device type could not be determined.
    UnknownDevice,
    /// The client is in a high-risk country.
    HighRiskCountry,
    /// The country differs from the previous login.
    GeoMismatch,
    /// A rule added by the embedding service.
    Custom(String),
}

impl RuleId {
    /// Creates a custom rule id.
    pub fn custom(id: impl Into<String>) -> Self {
        Self::Custom(id.into())
    }

    /// Returns the rule id as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TorExitNode => "tor_exit_node",
            Self::VpnDetected => "vpn_detected",
            Self::ProxyDetected => "proxy_detected",
            Self::LowReputation => "low_reputation",
            Self::HighVelocity => "high_velocity",
            Self::UnknownDevice => "unknown_device",
            Self::HighRiskCountry => "high_risk_country",
            Self::GeoMismatch => "geo_mismatch",
            Self::Custom(id) => id,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything local rules can look at.
///
/// Built by the pipeline after scoring; `extend_rule_context` plugin hooks
/// may add `attributes` or adjust signals before the rules run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleContext {
    /// The device being assessed.
    pub device: DeviceInfo,
    /// Effective geolocation.
    pub geo: Option<GeoInfo>,
    /// Effective IP.
    pub ip: Option<String>,
    /// Final (merged) signals.
    pub signals: RiskSignals,
    /// Weighted risk score.
    pub risk_score: u8,
    /// The attempted operation.
    pub operation: String,
    /// Free-form facts added by plugins.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl RuleContext {
    /// Creates a rule context for a device with empty signals.
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            device,
            geo: None,
            ip: None,
            signals: RiskSignals::default(),
            risk_score: 0,
            operation: "login".to_string(),
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the geolocation.
    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Sets the signals.
    pub fn with_signals(mut self, signals: RiskSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Sets the risk score.
    pub fn with_risk_score(mut self, score: u8) -> Self {
        self.risk_score = score;
        self
    }

    /// Sets the operation.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    fn country(&self) -> Option<String> {
        self.geo.as_ref().and_then(GeoInfo::normalized_country)
    }
}

/// A local rule: when every condition matches, the rule fires and raises
/// the risk level to at least `escalate_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRule {
    /// Rule identifier.
    pub id: RuleId,

    /// Human-readable name for the rule.
    pub name: String,

    /// Conditions that must all match for this rule to fire.
    pub conditions: Vec<Condition>,

    /// Minimum risk level once the rule fires.
    pub escalate_to: RiskLevel,

    /// Priority of the rule (higher = reported first).
    pub priority: i32,

    /// Whether this rule is enabled.
    pub enabled: bool,
}

impl LocalRule {
    /// Creates a new rule.
    pub fn new(id: RuleId, escalate_to: RiskLevel) -> Self {
        Self {
            name: id.as_str().to_string(),
            id,
            conditions: Vec::new(),
            escalate_to,
            priority: 0,
            enabled: true,
        }
    }

    /// Sets the name of the rule.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables the rule.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns `true` if the rule is enabled and all conditions match.
    ///
    /// A rule without conditions never fires.
    pub fn matches(&self, context: &RuleContext) -> bool {
        self.enabled
            && !self.conditions.is_empty()
            && self.conditions.iter().all(|c| c.matches(context))
    }
}

/// A condition evaluated against a [`RuleContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Matches Tor exit nodes.
    IsTor,

    /// Matches VPN clients.
    IsVpn,

    /// Matches open proxies.
    IsProxy,

    /// Matches if a reputation is known and below the threshold.
    ReputationBelow {
        /// Exclusive upper bound.
        threshold: f64,
    },

    /// Matches if a velocity is known and above the threshold.
    VelocityAbove {
        /// Exclusive lower bound.
        threshold: f64,
    },

    /// Matches if the risk score is at least the given value.
    ScoreAtLeast {
        /// Inclusive lower bound.
        score: u8,
    },

    /// Matches a device type.
    DeviceTypeIs {
        /// The device type to match.
        device_type: DeviceType,
    },

    /// Matches if the country is in the list (case-insensitive).
    CountryIn {
        /// ISO country codes.
        countries: Vec<String>,
    },

    /// Matches if the country differs from the previous login's country.
    CountryMismatch,

    /// Matches devices without an OS.
    MissingOs,

    /// Matches the attempted operation.
    OperationEquals {
        /// Operation name.
        operation: String,
    },

    /// Matches if a plugin attribute equals the value.
    AttributeEquals {
        /// Attribute key.
        key: String,
        /// Expected value.
        value: serde_json::Value,
    },

    /// Always matches.
    Always,

    /// Never matches.
    Never,

    /// Logical AND of multiple conditions.
    And {
        /// Conditions that must all match.
        conditions: Vec<Condition>,
    },

    /// Logical OR of multiple conditions.
    Or {
        /// Conditions where at least one must match.
        conditions: Vec<Condition>,
    },

    /// Logical NOT of a condition.
    Not {
        /// Condition to negate.
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Creates a condition that matches countries in the list.
    pub fn country_in<I, S>(countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CountryIn {
            countries: countries.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a condition that matches a plugin attribute.
    pub fn attribute_equals(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::AttributeEquals {
            key: key.into(),
            value,
        }
    }

    /// Evaluates this condition against the context.
    pub fn matches(&self, context: &RuleContext) -> bool {
        let signals = &context.signals;
        match self {
            Self::IsTor => signals.is_tor == Some(true),
            Self::IsVpn => signals.is_vpn == Some(true),
            Self::IsProxy => signals.is_proxy == Some(true),

            Self::ReputationBelow { threshold } => signals
                .reputation_score
                .filter(|r| r.is_finite())
                .map(|r| r < *threshold)
                .unwrap_or(false),

            Self::VelocityAbove { threshold } => signals
                .velocity_score
                .filter(|v| v.is_finite())
                .map(|v| v > *threshold)
                .unwrap_or(false),

            Self::ScoreAtLeast { score } => context.risk_score >= *score,

            Self::DeviceTypeIs { device_type } => context.device.device_type == *device_type,

            Self::CountryIn { countries } => context
                .country()
                .map(|c| countries.iter().any(|x| x.eq_ignore_ascii_case(&c)))
                .unwrap_or(false),

            Self::CountryMismatch => {
                let previous = signals
                    .previous_geo
                    .as_ref()
                    .and_then(GeoInfo::normalized_country);
                match (context.country(), previous) {
                    (Some(current), Some(previous)) => current != previous,
                    _ => false,
                }
            }

            Self::MissingOs => context
                .device
                .os
                .as_deref()
                .map(|os| os.trim().is_empty())
                .unwrap_or(true),

            Self::OperationEquals { operation } => context.operation == *operation,

            Self::AttributeEquals { key, value } => context.attributes.get(key) == Some(value),

            Self::Always => true,

            Self::Never => false,

            Self::And { conditions } => conditions.iter().all(|c| c.matches(context)),

            Self::Or { conditions } => conditions.iter().any(|c| c.matches(context)),

            Self::Not { condition } => !condition.matches(context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RuleContext {
        RuleContext::new(DeviceInfo::new("dev-1", DeviceType::Desktop).with_os("linux"))
    }

    #[test]
    fn test_signal_conditions() {
        let ctx = context().with_signals(RiskSignals::new().with_tor(true));
        assert!(Condition::IsTor.matches(&ctx));
        assert!(!Condition::IsVpn.matches(&ctx));
        assert!(!Condition::IsProxy.matches(&ctx));
    }

    #[test]
    fn test_reputation_below_ignores_missing_and_nan() {
        let below = Condition::ReputationBelow { threshold: 10.0 };
        assert!(!below.matches(&context()));

        let ctx = context().with_signals(RiskSignals::new().with_reputation(f64::NAN));
        assert!(!below.matches(&ctx));

        let ctx = context().with_signals(RiskSignals::new().with_reputation(3.0));
        assert!(below.matches(&ctx));
    }

    #[test]
    fn test_country_conditions() {
        let ctx = context()
            .with_geo(GeoInfo::country("kp"))
            .with_signals(RiskSignals::new().with_previous_geo(GeoInfo::country("IR")));

        assert!(Condition::country_in(["KP", "IR"]).matches(&ctx));
        assert!(Condition::CountryMismatch.matches(&ctx));

        let same = context()
            .with_geo(GeoInfo::country("DE"))
            .with_signals(RiskSignals::new().with_previous_geo(GeoInfo::country("de")));
        assert!(!Condition::CountryMismatch.matches(&same));
    }

    #[test]
    fn test_missing_os() {
        let ctx = RuleContext::new(DeviceInfo::new("dev-1", DeviceType::Mobile));
        assert!(Condition::MissingOs.matches(&ctx));
        assert!(!Condition::MissingOs.matches(&context()));
    }

    #[test]
    fn test_attribute_and_logic() {
        let ctx = context().with_attribute("impossible_travel", json!(true));
        let condition = Condition::And {
            conditions: vec![
                Condition::attribute_equals("impossible_travel", json!(true)),
                Condition::Not {
                    condition: Box::new(Condition::IsTor),
                },
            ],
        };
        assert!(condition.matches(&ctx));
        assert!(!Condition::Or {
            conditions: vec![Condition::Never, Condition::IsVpn]
        }
        .matches(&ctx));
    }

    #[test]
    fn test_rule_requires_all_conditions() {
        let rule = LocalRule::new(RuleId::custom("tor-on-admin"), RiskLevel::Critical)
            .with_condition(Condition::IsTor)
            .with_condition(Condition::OperationEquals {
                operation: "admin".to_string(),
            });

        let ctx = context().with_signals(RiskSignals::new().with_tor(true));
        assert!(!rule.matches(&ctx));
        assert!(rule.matches(&ctx.with_operation("admin")));
        assert!(!LocalRule::new(RuleId::custom("empty"), RiskLevel::High).matches(&context()));
    }

    #[test]
    fn test_condition_serde() {
        let condition: Condition =
            serde_json::from_str(r#"{"type": "reputation_below", "threshold": 20}"#).unwrap();
        assert_eq!(condition, Condition::ReputationBelow { threshold: 20.0 });
        assert_eq!(RuleId::TorExitNode.to_string(), "tor_exit_node");
        assert_eq!(
            serde_json::to_string(&RuleId::GeoMismatch).unwrap(),
            "\"geo_mismatch\""
        );
    }
}
