//! Message Rewriter
//!
//! Applies a rule's single textual substitution (`"before -> after"`) to an
//! outbound message body.

use log::debug;

const SEPARATOR: &str = "->";

/// A parsed `before -> after` substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution<'a> {
    pub before: &'a str,
    pub after: &'a str,
}

impl<'a> Substitution<'a> {
    /// Parse a substitution pattern.
    ///
    /// Returns `None` unless the pattern contains exactly one `->` separator
    /// and the trimmed `before` side is non-empty.
    pub fn parse(pattern: &'a str) -> Option<Self> {
        let mut parts = pattern.split(SEPARATOR);
        let before = parts.next()?.trim();
        let after = parts.next()?.trim();

        if parts.next().is_some() || before.is_empty() {
            return None;
        }

        Some(Self { before, after })
    }

    /// Replace every non-overlapping occurrence of `before` with `after`
    pub fn apply(&self, body: &str) -> String {
        body.replace(self.before, self.after)
    }
}

/// Produce the outbound body for `body` under `substitution_rule`.
///
/// A malformed or empty pattern is a no-op, never an error.
pub fn apply(body: &str, substitution_rule: &str) -> String {
    match Substitution::parse(substitution_rule) {
        Some(substitution) => substitution.apply(body),
        None => {
            if !substitution_rule.trim().is_empty() {
                debug!("Ignoring malformed substitution rule: {:?}", substitution_rule);
            }
            body.to_string()
        }
    }
}
