//! Local rules and the level-to-action policy.
//!
//! Local rules look at the final signals of a request and escalate its
//! risk level; [`RiskThresholds`] turn a score into a level, and
//! [`decision_hint_for`] turns the final level into allow, mfa or block.

mod action;
mod engine;
mod rules;

pub use action::{action_for, decision_hint_for, RiskThresholds};
pub use engine::{RuleEngine, RuleEvaluation};
pub use rules::{Condition, LocalRule, RuleContext, RuleId};
