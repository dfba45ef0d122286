//! Rule Matcher
//!
//! First-match-wins selection of a forwarding rule for an inbound message.

use super::rule_types::ForwardingRule;

/// Whether both filter predicates of `rule` hold for the message.
///
/// Each filter is a case-sensitive substring test and an empty filter
/// matches anything, so a rule with both filters empty matches every message.
pub fn rule_matches(rule: &ForwardingRule, sender: &str, body: &str) -> bool {
    let number_match = rule.filter_number.is_empty() || sender.contains(&rule.filter_number);
    let word_match = rule.filter_word.is_empty() || body.contains(&rule.filter_word);

    number_match && word_match
}

/// Return the lowest-index rule matching the message, if any.
///
/// Later rules are never inspected once a match is found.
pub fn find<'a>(sender: &str, body: &str, rules: &'a [ForwardingRule]) -> Option<&'a ForwardingRule> {
    rules.iter().find(|rule| rule_matches(rule, sender, body))
}
