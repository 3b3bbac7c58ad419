//! Hierarchical topic names and subscription filters
//!
//! Topic names are slash-delimited and immutable once constructed; a child
//! topic is always `parent + "/" + suffix`. The multi-level wildcard `#` is
//! valid only in subscription filters, never in publish topics.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for topic names and filters
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic cannot be empty")]
    Empty,
    #[error("topic contains empty segment: '{0}'")]
    EmptySegment(String),
    #[error("wildcard '{wildcard}' is not allowed in publish topic '{topic}'")]
    WildcardInTopic { topic: String, wildcard: char },
    #[error("'#' must be the final segment of filter '{0}'")]
    MisplacedWildcard(String),
}

fn check_segments(name: &str) -> Result<(), TopicError> {
    if name.is_empty() {
        return Err(TopicError::Empty);
    }
    if name.split('/').any(str::is_empty) {
        return Err(TopicError::EmptySegment(name.to_string()));
    }
    Ok(())
}

/// A publishable topic name, e.g. `sensor/trellis/buttons`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Validate and construct a topic name. Wildcards are rejected here;
    /// they belong to [`TopicFilter`] only.
    pub fn new<S: Into<String>>(name: S) -> Result<Self, TopicError> {
        let name = name.into();
        check_segments(&name)?;
        for wildcard in ['#', '+'] {
            if name.contains(wildcard) {
                return Err(TopicError::WildcardInTopic {
                    topic: name,
                    wildcard,
                });
            }
        }
        Ok(Topic(name))
    }

    /// Derive a child topic at `self + "/" + suffix`. `self` is untouched.
    pub fn join(&self, suffix: &str) -> Result<Topic, TopicError> {
        check_segments(suffix)?;
        Topic::new(format!("{}/{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slash-separated path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// A subscription pattern: either an exact topic or a prefix followed by
/// the multi-level wildcard `#`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopicFilter {
    Exact(Topic),
    /// `prefix/#`: matches the prefix itself and every descendant.
    Tree(Topic),
    /// Bare `#`: matches every topic.
    All,
}

impl TopicFilter {
    /// Parse a filter string such as `a/b`, `a/b/#` or `#`.
    pub fn parse(pattern: &str) -> Result<Self, TopicError> {
        if pattern == "#" {
            return Ok(TopicFilter::All);
        }
        if let Some(prefix) = pattern.strip_suffix("/#") {
            let topic = Topic::new(prefix)?;
            return Ok(TopicFilter::Tree(topic));
        }
        if pattern.contains('#') {
            return Err(TopicError::MisplacedWildcard(pattern.to_string()));
        }
        Ok(TopicFilter::Exact(Topic::new(pattern)?))
    }

    /// Exact-name subscriptions match only identical topics; tree filters
    /// match any topic sharing the prefix, including the prefix itself.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicFilter::Exact(t) => t.as_str() == topic,
            TopicFilter::Tree(prefix) => {
                topic == prefix.as_str()
                    || topic
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            TopicFilter::All => true,
        }
    }

    /// Wire representation handed to the broker on subscribe.
    pub fn as_pattern(&self) -> String {
        match self {
            TopicFilter::Exact(t) => t.as_str().to_string(),
            TopicFilter::Tree(prefix) => format!("{}/#", prefix.as_str()),
            TopicFilter::All => "#".to_string(),
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_pattern())
    }
}

impl From<Topic> for TopicFilter {
    fn from(topic: Topic) -> Self {
        TopicFilter::Exact(topic)
    }
}

/// Map a dotted name to a `/`-delimited path under `root`, e.g. the logger
/// name `shell.mqtt` under `log` becomes `log/shell/mqtt`.
pub fn dotted_topic(root: &Topic, dotted: &str) -> Result<Topic, TopicError> {
    root.join(&dotted.replace('.', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_child_derivation() {
        let parent = Topic::new("sensor/trellis").unwrap();
        let child = parent.join("buttons").unwrap();
        assert_eq!(child.as_str(), "sensor/trellis/buttons");
        // Deriving a child never mutates the parent.
        assert_eq!(parent.as_str(), "sensor/trellis");
    }

    #[test]
    fn test_wildcards_rejected_in_publish_topics() {
        assert!(matches!(
            Topic::new("a/#"),
            Err(TopicError::WildcardInTopic { wildcard: '#', .. })
        ));
        assert!(matches!(
            Topic::new("a/+/b"),
            Err(TopicError::WildcardInTopic { wildcard: '+', .. })
        ));
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(Topic::new(""), Err(TopicError::Empty));
        assert!(matches!(Topic::new("a//b"), Err(TopicError::EmptySegment(_))));
        assert!(matches!(Topic::new("/a"), Err(TopicError::EmptySegment(_))));
        assert!(matches!(Topic::new("a/"), Err(TopicError::EmptySegment(_))));
    }

    #[test]
    fn test_tree_filter_matching() {
        let filter = TopicFilter::parse("a/#").unwrap();
        assert!(filter.matches("a"));
        assert!(filter.matches("a/b"));
        assert!(filter.matches("a/b/c"));
        assert!(!filter.matches("ab"));
        assert!(!filter.matches("b/a"));
    }

    #[test]
    fn test_exact_filter_matching() {
        let filter = TopicFilter::parse("a/b").unwrap();
        assert!(filter.matches("a/b"));
        assert!(!filter.matches("a/b/c"));
        assert!(!filter.matches("a"));
    }

    #[test]
    fn test_all_filter() {
        let filter = TopicFilter::parse("#").unwrap();
        assert!(filter.matches("a"));
        assert!(filter.matches("log/shell/mqtt"));
        assert_eq!(filter.as_pattern(), "#");
    }

    #[test]
    fn test_misplaced_wildcard() {
        assert!(matches!(
            TopicFilter::parse("a/#/b"),
            Err(TopicError::MisplacedWildcard(_))
        ));
    }

    #[test]
    fn test_dotted_topic() {
        let root = Topic::new("log").unwrap();
        let topic = dotted_topic(&root, "shell.mqtt").unwrap();
        assert_eq!(topic.as_str(), "log/shell/mqtt");
    }

    proptest! {
        #[test]
        fn tree_filter_matches_all_descendants(
            prefix in "[a-z]{1,8}(/[a-z]{1,8}){0,3}",
            suffix in "[a-z]{1,8}(/[a-z]{1,8}){0,3}",
        ) {
            let filter = TopicFilter::parse(&format!("{prefix}/#")).unwrap();
            prop_assert!(filter.matches(&prefix));
            let descendant = format!("{prefix}/{suffix}");
            prop_assert!(filter.matches(&descendant));
        }

        #[test]
        fn filter_pattern_round_trips(
            pattern in "[a-z]{1,8}(/[a-z]{1,8}){0,3}(/#)?",
        ) {
            let filter = TopicFilter::parse(&pattern).unwrap();
            prop_assert_eq!(filter.as_pattern(), pattern);
        }
    }
}
