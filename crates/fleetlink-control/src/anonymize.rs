//! Device topic anonymization.
//!
//! Device topics are rewritten with an ordered list of string replacements
//! before they leave the platform. Results are cached per raw topic; the
//! cache is cleared whenever the rule list changes so a cached value always
//! equals a fresh computation.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::config::TopicReplaceRule;

/// Apply `rules` to `raw` in order.
#[must_use]
pub fn anonymize(raw: &str, rules: &[TopicReplaceRule]) -> String {
    rules
        .iter()
        .filter(|rule| !rule.from.is_empty())
        .fold(raw.to_string(), |topic, rule| {
            topic.replace(&rule.from, &rule.to)
        })
}

/// Cached topic anonymizer.
#[derive(Debug, Default)]
pub struct TopicAnonymizer {
    rules: RwLock<Vec<TopicReplaceRule>>,
    cache: RwLock<HashMap<String, String>>,
}

impl TopicAnonymizer {
    /// Create an anonymizer with the given rules.
    #[must_use]
    pub fn new(rules: Vec<TopicReplaceRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the rule list. The cache is cleared if the rules differ.
    pub fn set_rules(&self, rules: Vec<TopicReplaceRule>) {
        let mut current = self.rules.write();
        if *current != rules {
            *current = rules;
            self.cache.write().clear();
            tracing::debug!(rules = current.len(), "Topic replace rules changed");
        }
    }

    /// The anonymized form of `raw`.
    pub fn anonymize(&self, raw: &str) -> String {
        if let Some(hit) = self.cache.read().get(raw) {
            return hit.clone();
        }

        let rules = self.rules.read();
        let anon = anonymize(raw, &rules);
        self.cache.write().insert(raw.to_string(), anon.clone());
        anon
    }

    /// Number of cached topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(from: &str, to: &str) -> TopicReplaceRule {
        TopicReplaceRule {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn rules_apply_in_order() {
        let rules = vec![rule("campus", "c1"), rule("c1/building1", "b")];
        assert_eq!(anonymize("campus/building1/ahu", &rules), "b/ahu");
    }

    #[test]
    fn empty_from_is_ignored() {
        assert_eq!(anonymize("campus", &[rule("", "x")]), "campus");
    }

    #[test]
    fn cached_value_is_stable() {
        let anon = TopicAnonymizer::new(vec![rule("campus", "site")]);
        let first = anon.anonymize("campus/building1");
        anon.anonymize("campus/building2");
        let again = anon.anonymize("campus/building1");

        assert_eq!(first, "site/building1");
        assert_eq!(first, again);
        assert_eq!(again, anonymize("campus/building1", &[rule("campus", "site")]));
        assert_eq!(anon.len(), 2);
    }

    #[test]
    fn rule_change_clears_cache() {
        let anon = TopicAnonymizer::new(vec![rule("campus", "site")]);
        anon.anonymize("campus/building1");

        anon.set_rules(vec![rule("campus", "site")]);
        assert_eq!(anon.len(), 1);

        anon.set_rules(vec![rule("building1", "b1")]);
        assert!(anon.is_empty());
        assert_eq!(anon.anonymize("campus/building1"), "campus/b1");
    }
}
