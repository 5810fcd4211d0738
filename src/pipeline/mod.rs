//! Security pipeline orchestration.
//!
//! The [`SecurityPipeline`] drives one login attempt through four steps
//! (fingerprint, risk assessment, plugin extension, decision) and always
//! produces a decision. Failures are converted into a critical block
//! unless fail-closed mode is turned off.
//!
//! Integrations extend the pipeline through [`ContextBuilderPlugin`]
//! hooks, and operators can degrade it at runtime through
//! [`RuntimeOverrides`] read from an [`OverrideSource`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use riskgate::pipeline::{ContextBuilderPlugin, SecurityPipeline, SecurityPipelineConfig};
//!
//! let pipeline = SecurityPipeline::builder()
//!     .with_config(SecurityPipelineConfig::new().with_development_mode(true))
//!     .with_fingerprint_provider(fingerprinter)
//!     .with_remote_stage(stage)
//!     .add_plugin(
//!         ContextBuilderPlugin::new("vip-accounts")
//!             .with_priority(10)
//!             .with_rule_hook(|ctx| Ok(ctx.clone().with_attribute("vip", true.into()))),
//!     )
//!     .build()?;
//!
//! let result = pipeline.execute(&attempt).await?;
//! ```

mod orchestrator;
mod overrides;
mod plugins;

pub use orchestrator::{
    SecurityPipeline, SecurityPipelineBuilder, SecurityPipelineConfig, DEFAULT_MAX_PLUGINS,
};
pub use overrides::{
    parse_flag, ArcOverrideSource, EnvOverrides, OverrideSource, RuntimeOverrides,
    ENV_DISABLE_REMOTE_PROVIDER, ENV_FORCE_FAIL_OPEN, ENV_FORCE_LOCAL_RULES_ONLY,
};
pub use plugins::{
    is_valid_plugin_id, sort_plugins, validate_plugins, AssessmentContext,
    AssessmentContextHook, ContextBuilderPlugin, RuleContextHook, ScoringContextHook,
    MAX_PLUGIN_ID_LEN, MAX_PLUGIN_PRIORITY,
};
