//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_MINIMUM_REQUEST_COUNT: u32 = 10;
const DEFAULT_FAILURE_RATE_THRESHOLD_PERCENT: f64 = 50.0;
const DEFAULT_OPEN_STATE_COOLDOWN_MS: u64 = 30_000;
const DEFAULT_HALF_OPEN_PROBE_LIMIT: u32 = 1;
const DEFAULT_ERROR_BUDGET_PER_WINDOW: u32 = 20;
const DEFAULT_ERROR_BUDGET_WINDOW_MS: u64 = 60_000;

const MINIMUM_REQUEST_COUNT_RANGE: (u32, u32) = (1, 10_000);
const FAILURE_RATE_RANGE: (f64, f64) = (1.0, 100.0);
const COOLDOWN_RANGE_MS: (u64, u64) = (100, 3_600_000);
const PROBE_LIMIT_RANGE: (u32, u32) = (1, 100);
const ERROR_BUDGET_RANGE: (u32, u32) = (1, 100_000);
const ERROR_WINDOW_RANGE_MS: (u64, u64) = (1_000, 86_400_000);

/// Configuration for a circuit breaker.
///
/// Values are validated lazily: every breaker operation works on
/// [`CircuitBreakerConfig::clamped`], which replaces any out-of-range field
/// with its default. A breaker therefore cannot be configured into an
/// always-open or always-closed state by a bad value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Requests observed in the closed state before the failure rate is judged.
    pub minimum_request_count: u32,

    /// Failure rate (percent) at or above which the circuit opens.
    pub failure_rate_threshold_percent: f64,

    /// How long the circuit stays open before probing.
    pub open_state_cooldown_ms: u64,

    /// Probes granted while half-open.
    pub half_open_probe_limit: u32,

    /// Failures tolerated per error-budget window, in any state.
    pub error_budget_per_window: u32,

    /// Length of the error-budget window.
    pub error_budget_window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            minimum_request_count: DEFAULT_MINIMUM_REQUEST_COUNT,
            failure_rate_threshold_percent: DEFAULT_FAILURE_RATE_THRESHOLD_PERCENT,
            open_state_cooldown_ms: DEFAULT_OPEN_STATE_COOLDOWN_MS,
            half_open_probe_limit: DEFAULT_HALF_OPEN_PROBE_LIMIT,
            error_budget_per_window: DEFAULT_ERROR_BUDGET_PER_WINDOW,
            error_budget_window_ms: DEFAULT_ERROR_BUDGET_WINDOW_MS,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum request count.
    pub fn with_minimum_request_count(mut self, count: u32) -> Self {
        self.minimum_request_count = count;
        self
    }

    /// Sets the failure-rate threshold in percent.
    pub fn with_failure_rate_threshold_percent(mut self, percent: f64) -> Self {
        self.failure_rate_threshold_percent = percent;
        self
    }

    /// Sets the open-state cooldown.
    pub fn with_open_state_cooldown_ms(mut self, ms: u64) -> Self {
        self.open_state_cooldown_ms = ms;
        self
    }

    /// Sets the half-open probe limit.
    pub fn with_half_open_probe_limit(mut self, limit: u32) -> Self {
        self.half_open_probe_limit = limit;
        self
    }

    /// Sets the error budget per window.
    pub fn with_error_budget_per_window(mut self, budget: u32) -> Self {
        self.error_budget_per_window = budget;
        self
    }

    /// Sets the error-budget window length.
    pub fn with_error_budget_window_ms(mut self, ms: u64) -> Self {
        self.error_budget_window_ms = ms;
        self
    }

    /// Creates a configuration for a critical dependency that should be
    /// cut off quickly and probed cautiously.
    pub fn strict() -> Self {
        Self {
            minimum_request_count: 5,
            failure_rate_threshold_percent: 25.0,
            open_state_cooldown_ms: 60_000,
            half_open_probe_limit: 1,
            error_budget_per_window: 10,
            error_budget_window_ms: 60_000,
        }
    }

    /// Returns a copy with every out-of-range field replaced by its default.
    pub fn clamped(&self) -> Self {
        Self {
            minimum_request_count: in_range_or(
                self.minimum_request_count,
                MINIMUM_REQUEST_COUNT_RANGE,
                DEFAULT_MINIMUM_REQUEST_COUNT,
            ),
            failure_rate_threshold_percent: finite_in_range_or(
                self.failure_rate_threshold_percent,
                FAILURE_RATE_RANGE,
                DEFAULT_FAILURE_RATE_THRESHOLD_PERCENT,
            ),
            open_state_cooldown_ms: in_range_or(
                self.open_state_cooldown_ms,
                COOLDOWN_RANGE_MS,
                DEFAULT_OPEN_STATE_COOLDOWN_MS,
            ),
            half_open_probe_limit: in_range_or(
                self.half_open_probe_limit,
                PROBE_LIMIT_RANGE,
                DEFAULT_HALF_OPEN_PROBE_LIMIT,
            ),
            error_budget_per_window: in_range_or(
                self.error_budget_per_window,
                ERROR_BUDGET_RANGE,
                DEFAULT_ERROR_BUDGET_PER_WINDOW,
            ),
            error_budget_window_ms: in_range_or(
                self.error_budget_window_ms,
                ERROR_WINDOW_RANGE_MS,
                DEFAULT_ERROR_BUDGET_WINDOW_MS,
            ),
        }
    }

    /// Builds a configuration from loosely typed numbers (JSON, env), such
    /// that NaN, infinities, negatives and fractions fall back to defaults.
    pub fn from_raw(raw: &RawCircuitBreakerConfig) -> Self {
        let defaults = Self::default();
        Self {
            minimum_request_count: raw
                .minimum_request_count
                .and_then(whole_u32)
                .unwrap_or(defaults.minimum_request_count),
            failure_rate_threshold_percent: raw
                .failure_rate_threshold_percent
                .unwrap_or(defaults.failure_rate_threshold_percent),
            open_state_cooldown_ms: raw
                .open_state_cooldown_ms
                .and_then(whole_u64)
                .unwrap_or(defaults.open_state_cooldown_ms),
            half_open_probe_limit: raw
                .half_open_probe_limit
                .and_then(whole_u32)
                .unwrap_or(defaults.half_open_probe_limit),
            error_budget_per_window: raw
                .error_budget_per_window
                .and_then(whole_u32)
                .unwrap_or(defaults.error_budget_per_window),
            error_budget_window_ms: raw
                .error_budget_window_ms
                .and_then(whole_u64)
                .unwrap_or(defaults.error_budget_window_ms),
        }
        .clamped()
    }
}

/// Untyped circuit breaker settings as read from configuration sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawCircuitBreakerConfig {
    /// See [`CircuitBreakerConfig::minimum_request_count`].
    pub minimum_request_count: Option<f64>,
    /// See [`CircuitBreakerConfig::failure_rate_threshold_percent`].
    pub failure_rate_threshold_percent: Option<f64>,
    /// See [`CircuitBreakerConfig::open_state_cooldown_ms`].
    pub open_state_cooldown_ms: Option<f64>,
    /// See [`CircuitBreakerConfig::half_open_probe_limit`].
    pub half_open_probe_limit: Option<f64>,
    /// See [`CircuitBreakerConfig::error_budget_per_window`].
    pub error_budget_per_window: Option<f64>,
    /// See [`CircuitBreakerConfig::error_budget_window_ms`].
    pub error_budget_window_ms: Option<f64>,
}

fn in_range_or<T: PartialOrd + Copy>(value: T, (min, max): (T, T), default: T) -> T {
    if value >= min && value <= max {
        value
    } else {
        default
    }
}

fn finite_in_range_or(value: f64, range: (f64, f64), default: f64) -> f64 {
    if value.is_finite() {
        in_range_or(value, range, default)
    } else {
        default
    }
}

fn whole_u64(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64)
        .then_some(value as u64)
}

fn whole_u32(value: f64) -> Option<u32> {
    whole_u64(value).and_then(|v| u32::try_from(v).ok())
}
