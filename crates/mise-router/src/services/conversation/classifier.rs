//! Query topic classification
//! Maps a raw query plus the session's previous topic to a topic label.
//! Keyword tables are ordered; the first topic with a hit wins.

use tracing::{debug, warn};

use crate::config::KeywordRule;
use crate::models::chat::Topic;

pub trait QueryClassifier: Send + Sync {
    /// Must be a pure function of its inputs
    fn classify(&self, query: &str, fallback: Option<Topic>) -> Topic;
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(Topic, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new(rules: Vec<(Topic, Vec<String>)>) -> Self {
        let rules = rules
            .into_iter()
            .map(|(topic, keywords)| {
                (
                    topic,
                    keywords.into_iter().map(|k| k.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { rules }
    }

    /// Build from configured rules; falls back to the built-in table when
    /// none are configured. Rules naming an unknown topic are skipped.
    pub fn from_rules(rules: &[KeywordRule]) -> Self {
        if rules.is_empty() {
            return Self::default();
        }

        let parsed = rules
            .iter()
            .filter_map(|rule| match rule.topic.parse::<Topic>() {
                Ok(topic) => Some((topic, rule.keywords.clone())),
                Err(e) => {
                    warn!("Ignoring classifier rule: {}", e);
                    None
                }
            })
            .collect();

        Self::new(parsed)
    }

    fn default_rules() -> Vec<(Topic, Vec<String>)> {
        let table: [(Topic, &[&str]); 4] = [
            (
                Topic::Coding,
                &[
                    "javascript",
                    "typescript",
                    "code",
                    "function",
                    "debug",
                    "api",
                    "react",
                    "node",
                ],
            ),
            (
                Topic::Mlb,
                &["baseball", "mlb", "stats", "game", "player", "pitch", "batting"],
            ),
            (
                Topic::Cooking,
                &["recipe", "cook", "ingredient", "kitchen", "food", "chef"],
            ),
            (
                Topic::Fitness,
                &["workout", "exercise", "kettlebell", "fitness", "training", "gym"],
            ),
        ];

        table
            .into_iter()
            .map(|(topic, words)| (topic, words.iter().map(|w| w.to_string()).collect()))
            .collect()
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl QueryClassifier for KeywordClassifier {
    fn classify(&self, query: &str, fallback: Option<Topic>) -> Topic {
        let query_lower = query.to_lowercase();

        for (topic, keywords) in &self.rules {
            if let Some(keyword) = keywords.iter().find(|k| query_lower.contains(k.as_str())) {
                debug!("Classified query as {}: matched '{}'", topic, keyword);
                return *topic;
            }
        }

        let topic = fallback.unwrap_or(Topic::General);
        debug!("No keyword matched, using {}", topic);
        topic
    }
}
