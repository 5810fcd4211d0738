//! Context builder plugins.
//!
//! A [`ContextBuilderPlugin`] can adjust the three contexts the pipeline
//! builds for one request:
//!
//! - the scoring context, before the remote stage and scoring run;
//! - the rule context, before local rules are evaluated;
//! - the assessment context, before the decision is made.
//!
//! Hooks run in ascending `priority` order; plugins without a priority run
//! last, in registration order. A hook that returns an error or panics
//! fails the request closed.

use crate::core::{RiskError, RiskLevel, RiskSignals, ScoringContext};
use crate::policy::{RuleContext, RuleId};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Longest accepted plugin id.
pub const MAX_PLUGIN_ID_LEN: usize = 64;

/// Highest accepted plugin priority.
pub const MAX_PLUGIN_PRIORITY: i32 = 100;

/// Hook over the scoring context.
pub type ScoringContextHook =
    Arc<dyn Fn(&ScoringContext) -> Result<ScoringContext, RiskError> + Send + Sync>;

/// Hook over the rule context.
pub type RuleContextHook = Arc<dyn Fn(&RuleContext) -> Result<RuleContext, RiskError> + Send + Sync>;

/// Hook over the assessment context.
pub type AssessmentContextHook =
    Arc<dyn Fn(&AssessmentContext) -> Result<AssessmentContext, RiskError> + Send + Sync>;

/// The assessment as plugins see it, after scoring and local rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentContext {
    /// The risk score. Must end up finite and within `[0, 100]`.
    pub risk_score: f64,
    /// Rules that fired so far.
    pub triggered_rules: Vec<RuleId>,
    /// A floor for the final risk level.
    pub minimum_level: Option<RiskLevel>,
    /// The final signals.
    pub signals: RiskSignals,
    /// Attributes carried over from the rule context.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl AssessmentContext {
    /// Raises the level floor to at least `level`.
    pub fn require_at_least(&mut self, level: RiskLevel) {
        self.minimum_level = Some(self.minimum_level.map_or(level, |current| current.max(level)));
    }
}

/// A plugin extending the pipeline's contexts.
///
/// # Example
///
/// ```rust,ignore
/// use riskgate::pipeline::ContextBuilderPlugin;
///
/// let plugin = ContextBuilderPlugin::new("geo-fence")
///     .with_priority(10)
///     .with_rule_hook(|ctx| {
///         let mut ctx = ctx.clone();
///         ctx.attributes.insert("fenced".into(), serde_json::json!(true));
///         Ok(ctx)
///     });
/// ```
#[derive(Clone)]
pub struct ContextBuilderPlugin {
    /// Unique id of `[A-Za-z0-9._-]`, at most 64 characters.
    pub id: String,
    /// Ordering key in `[0, 100]`; lower runs first.
    pub priority: Option<i32>,
    /// Scoring context hook.
    pub extend_scoring_context: Option<ScoringContextHook>,
    /// Rule context hook.
    pub extend_rule_context: Option<RuleContextHook>,
    /// Assessment context hook.
    pub extend_assessment_context: Option<AssessmentContextHook>,
}

impl ContextBuilderPlugin {
    /// Creates a plugin without hooks.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: None,
            extend_scoring_context: None,
            extend_rule_context: None,
            extend_assessment_context: None,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the scoring context hook.
    pub fn with_scoring_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ScoringContext) -> Result<ScoringContext, RiskError> + Send + Sync + 'static,
    {
        self.extend_scoring_context = Some(Arc::new(hook));
        self
    }

    /// Sets the rule context hook.
    pub fn with_rule_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RuleContext) -> Result<RuleContext, RiskError> + Send + Sync + 'static,
    {
        self.extend_rule_context = Some(Arc::new(hook));
        self
    }

    /// Sets the assessment context hook.
    pub fn with_assessment_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AssessmentContext) -> Result<AssessmentContext, RiskError> + Send + Sync + 'static,
    {
        self.extend_assessment_context = Some(Arc::new(hook));
        self
    }

    /// Returns `true` if at least one hook is set.
    pub fn has_hooks(&self) -> bool {
        self.extend_scoring_context.is_some()
            || self.extend_rule_context.is_some()
            || self.extend_assessment_context.is_some()
    }
}

impl fmt::Debug for ContextBuilderPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilderPlugin")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("scoring_hook", &self.extend_scoring_context.is_some())
            .field("rule_hook", &self.extend_rule_context.is_some())
            .field("assessment_hook", &self.extend_assessment_context.is_some())
            .finish()
    }
}

/// Checks a plugin list against the registration limits.
pub fn validate_plugins(
    plugins: &[ContextBuilderPlugin],
    max_plugins: usize,
) -> Result<(), RiskError> {
    if plugins.len() > max_plugins {
        return Err(RiskError::configuration(format!(
            "{} plugins registered, at most {} allowed",
            plugins.len(),
            max_plugins
        )));
    }

    let mut seen = HashSet::new();
    for plugin in plugins {
        if !is_valid_plugin_id(&plugin.id) {
            return Err(RiskError::configuration(format!(
                "invalid plugin id '{}'",
                plugin.id
            )));
        }
        if !seen.insert(plugin.id.as_str()) {
            return Err(RiskError::configuration(format!(
                "duplicate plugin id '{}'",
                plugin.id
            )));
        }
        if let Some(priority) = plugin.priority {
            if !(0..=MAX_PLUGIN_PRIORITY).contains(&priority) {
                return Err(RiskError::configuration(format!(
                    "plugin '{}' priority {} outside [0, {}]",
                    plugin.id, priority, MAX_PLUGIN_PRIORITY
                )));
            }
        }
        if !plugin.has_hooks() {
            tracing::debug!(plugin_id = %plugin.id, "Plugin has no hooks and will be skipped");
        }
    }
    Ok(())
}

/// Returns `true` for ids of 1 to 64 characters of `[A-Za-z0-9._-]`.
pub fn is_valid_plugin_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PLUGIN_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Orders plugins by ascending priority, unprioritized last. Stable.
pub fn sort_plugins(plugins: &mut [ContextBuilderPlugin]) {
    plugins.sort_by_key(|p| (p.priority.is_none(), p.priority.unwrap_or(0)));
}

/// Runs one hook, converting a panic into a plugin error.
pub(crate) fn run_hook<C, H>(plugin_id: &str, hook: &H, context: &C) -> Result<C, RiskError>
where
    H: Fn(&C) -> Result<C, RiskError> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| hook(context))) {
        Ok(Ok(next)) => Ok(next),
        Ok(Err(e)) => Err(match e {
            RiskError::Plugin { .. } => e,
            other => RiskError::plugin(plugin_id, other.to_string()),
        }),
        Err(payload) => Err(RiskError::plugin(
            plugin_id,
            format!("hook panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

/// Renders a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Finds the first non-finite number in a signal set.
pub(crate) fn non_finite_signal(signals: &RiskSignals) -> Option<(&'static str, f64)> {
    let geo = signals.previous_geo.as_ref();
    [
        ("reputation_score", signals.reputation_score),
        ("velocity_score", signals.velocity_score),
        ("previous_geo.lat", geo.and_then(|g| g.lat)),
        ("previous_geo.lng", geo.and_then(|g| g.lng)),
    ]
    .into_iter()
    .find_map(|(field, value)| value.filter(|v| !v.is_finite()).map(|v| (field, v)))
}

/// Development-mode check of a plugin's signal output.
pub(crate) fn check_plugin_signals(
    plugin_id: &str,
    signals: Option<&RiskSignals>,
) -> Result<(), RiskError> {
    let Some(signals) = signals else {
        return Ok(());
    };
    if let Some((field, value)) = non_finite_signal(signals) {
        return Err(RiskError::plugin(
            plugin_id,
            format!("produced non-finite {}: {}", field, value),
        ));
    }
    for (field, value) in [
        ("reputation_score", signals.reputation_score),
        ("velocity_score", signals.velocity_score),
    ] {
        if let Some(value) = value.filter(|v| !(0.0..=100.0).contains(v)) {
            return Err(RiskError::plugin(
                plugin_id,
                format!("produced out-of-range {}: {}", field, value),
            ));
        }
    }
    Ok(())
}

/// Development-mode check of a plugin's assessment output.
pub(crate) fn check_plugin_assessment(
    plugin_id: &str,
    context: &AssessmentContext,
) -> Result<(), RiskError> {
    let score = context.risk_score;
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(RiskError::plugin(
            plugin_id,
            format!("produced invalid risk score: {}", score),
        ));
    }
    check_plugin_signals(plugin_id, Some(&context.signals))
}
