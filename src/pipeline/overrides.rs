//! Operator switches read once per pipeline execution.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Environment variable for [`RuntimeOverrides::force_local_rules_only`].
pub const ENV_FORCE_LOCAL_RULES_ONLY: &str = "RISKGATE_FORCE_LOCAL_RULES_ONLY";
/// Environment variable for [`RuntimeOverrides::disable_remote_provider`].
pub const ENV_DISABLE_REMOTE_PROVIDER: &str = "RISKGATE_DISABLE_REMOTE_PROVIDER";
/// Environment variable for [`RuntimeOverrides::force_fail_open`].
pub const ENV_FORCE_FAIL_OPEN: &str = "RISKGATE_FORCE_FAIL_OPEN";

/// Switches that degrade the pipeline to a simpler mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeOverrides {
    /// Skip the remote provider and configured custom factors.
    pub force_local_rules_only: bool,
    /// Skip the remote provider.
    pub disable_remote_provider: bool,
    /// Run the remote stage fail-open regardless of its configuration.
    pub force_fail_open: bool,
}

impl RuntimeOverrides {
    /// No overrides.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets `force_local_rules_only`.
    pub fn with_force_local_rules_only(mut self, enabled: bool) -> Self {
        self.force_local_rules_only = enabled;
        self
    }

    /// Sets `disable_remote_provider`.
    pub fn with_disable_remote_provider(mut self, enabled: bool) -> Self {
        self.disable_remote_provider = enabled;
        self
    }

    /// Sets `force_fail_open`.
    pub fn with_force_fail_open(mut self, enabled: bool) -> Self {
        self.force_fail_open = enabled;
        self
    }

    /// Returns `true` if the remote provider may be called.
    pub fn remote_allowed(&self) -> bool {
        !self.force_local_rules_only && !self.disable_remote_provider
    }

    /// Returns `true` if configured scoring factors may be used.
    pub fn custom_factors_allowed(&self) -> bool {
        !self.force_local_rules_only
    }
}

/// Where the pipeline reads its overrides from.
pub trait OverrideSource: Send + Sync + Debug {
    /// Reads the current overrides.
    fn read(&self) -> RuntimeOverrides;
}

/// An arc-wrapped override source for shared ownership.
pub type ArcOverrideSource = Arc<dyn OverrideSource>;

/// Fixed overrides.
impl OverrideSource for RuntimeOverrides {
    fn read(&self) -> RuntimeOverrides {
        *self
    }
}

/// Reads the `RISKGATE_*` environment variables on every call.
///
/// A variable is on when set to `1`, `true`, `yes` or `on` (any case).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides;

impl EnvOverrides {
    /// Builds overrides from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> RuntimeOverrides
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).as_deref().is_some_and(parse_flag);
        RuntimeOverrides {
            force_local_rules_only: flag(ENV_FORCE_LOCAL_RULES_ONLY),
            disable_remote_provider: flag(ENV_DISABLE_REMOTE_PROVIDER),
            force_fail_open: flag(ENV_FORCE_FAIL_OPEN),
        }
    }
}

impl OverrideSource for EnvOverrides {
    fn read(&self) -> RuntimeOverrides {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Parses an on/off switch value.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
