//! Intent classification for the demo agents.
//!
//! The relay never consults a classifier; agents that route on user text
//! take one as a plug-in.

/// Maps user text to an intent name.
pub trait IntentClassifier: Send + Sync {
    /// The matched intent, or `None` when nothing matched.
    fn classify(&self, text: &str) -> Option<&str>;
}

#[derive(Debug, Clone)]
enum Matcher {
    Prefix(String),
    /// Any one group matches if all its keywords occur.
    Keywords(Vec<Vec<String>>),
}

impl Matcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Prefix(prefix) => text.starts_with(prefix.as_str()),
            Matcher::Keywords(groups) => groups
                .iter()
                .any(|group| group.iter().all(|keyword| text.contains(keyword.as_str()))),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    intent: String,
    matcher: Matcher,
}

/// Ordered keyword rules; the first matching rule wins.
///
/// Matching is case-insensitive on trimmed text.
///
/// ```
/// use tapwire_core::classify::{IntentClassifier, KeywordClassifier};
///
/// let classifier = KeywordClassifier::new()
///     .prefix("set_name", "my name is")
///     .any_of("reset", &[&["reset", "memory"], &["reset", "state"]]);
///
/// assert_eq!(classifier.classify("My name is Ada"), Some("set_name"));
/// assert_eq!(classifier.classify("please reset your memory"), Some("reset"));
/// assert_eq!(classifier.classify("reset"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    rules: Vec<Rule>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match text that starts with `prefix`.
    pub fn prefix(mut self, intent: impl Into<String>, prefix: &str) -> Self {
        self.rules.push(Rule {
            intent: intent.into(),
            matcher: Matcher::Prefix(prefix.to_lowercase()),
        });
        self
    }

    /// Match text containing `keyword`.
    pub fn contains(self, intent: impl Into<String>, keyword: &str) -> Self {
        self.any_of(intent, &[&[keyword]])
    }

    /// Match text containing every keyword of at least one group.
    pub fn any_of(mut self, intent: impl Into<String>, groups: &[&[&str]]) -> Self {
        let groups = groups
            .iter()
            .map(|group| group.iter().map(|k| k.to_lowercase()).collect())
            .collect();
        self.rules.push(Rule {
            intent: intent.into(),
            matcher: Matcher::Keywords(groups),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Option<&str> {
        let text = text.trim().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&text))
            .map(|rule| rule.intent.as_str())
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
