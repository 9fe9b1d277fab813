//! Topic routing keys and binding-pattern matching.
//!
//! Keys and patterns are dot-separated words. In a pattern, `*` stands for
//! exactly one word and `#` for zero or more words.

use std::fmt;

/// True if `routing_key` is selected by the binding `pattern`.
///
/// ```ignore
/// assert!(matches("log.*", "log.INFO"));
/// assert!(matches("#", "log.INFO"));
/// assert!(!matches("mail.*", "log.INFO"));
/// ```
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}

/// A `"<category>.<severity>"` routing key, e.g. `log.INFO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub category: String,
    pub severity: String,
}

impl RoutingKey {
    pub fn new(category: impl Into<String>, severity: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            severity: severity.into(),
        }
    }

    /// Split `category.severity`. Returns `None` unless there are exactly two
    /// non-empty words.
    pub fn parse(key: &str) -> Option<Self> {
        let (category, severity) = key.split_once('.')?;
        if category.is_empty() || severity.is_empty() || severity.contains('.') {
            return None;
        }
        Some(Self::new(category, severity))
    }
}

impl Default for RoutingKey {
    fn default() -> Self {
        Self::new("log", "INFO")
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.severity)
    }
}
