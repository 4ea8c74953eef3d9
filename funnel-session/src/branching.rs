//! Branching rule evaluation
//!
//! Pure, deterministic mapping from a rule list and a response set to the
//! next content path. No clocks, no I/O, no call-order sensitivity, so the
//! same inputs always replay to the same output.

use funnel_common::models::{Answer, BranchingRule};

/// Condition string that matches unconditionally
pub const DEFAULT_CONDITION: &str = "default";

/// First matching rule wins; rules are evaluated in list order.
///
/// A `"default"` condition always matches and is the expected safety net at
/// the end of a rule list. If no rule matches at all, the caller-supplied
/// fallback path is returned rather than failing.
pub fn evaluate(rules: &[BranchingRule], responses: &[Answer], fallback: &str) -> String {
    for rule in rules {
        if condition_matches(&rule.condition, responses) {
            return rule.target_path.clone();
        }
    }
    fallback.to_string()
}

/// `"default"` matches anything; `"<question_id>:<expected>"` matches iff a
/// response to that question equals the expected value exactly. Malformed
/// conditions match nothing.
fn condition_matches(condition: &str, responses: &[Answer]) -> bool {
    if condition == DEFAULT_CONDITION {
        return true;
    }
    match condition.split_once(':') {
        Some((question_id, expected)) => responses
            .iter()
            .any(|a| a.question_id == question_id && a.value == expected),
        None => false,
    }
}
