use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::models::chat::{Message, Topic};
use super::compressor::ContextCompressor;

pub struct ContextBuilder {
    system_prompts: HashMap<Topic, String>,
    compressor: ContextCompressor,
    max_context_tokens: usize,
}

impl ContextBuilder {
    pub fn new(compressor: ContextCompressor, max_context_tokens: usize) -> Self {
        Self {
            system_prompts: Self::default_system_prompts(),
            compressor,
            max_context_tokens,
        }
    }

    /// Replace built-in system prompts; keys are topic names
    pub fn with_prompt_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (name, prompt) in overrides {
            match name.parse::<Topic>() {
                Ok(topic) => {
                    self.system_prompts.insert(topic, prompt.clone());
                }
                Err(e) => warn!("Ignoring prompt override: {}", e),
            }
        }
        self
    }

    pub fn default_system_prompts() -> HashMap<Topic, String> {
        [
            (
                Topic::Coding,
                "You are an expert TypeScript/JavaScript developer. Provide accurate, production-ready code solutions.",
            ),
            (
                Topic::Mlb,
                "You are knowledgeable about baseball and MLB. Provide accurate statistics and insights.",
            ),
            (
                Topic::Cooking,
                "You are an experienced chef. Provide practical cooking advice and recipes.",
            ),
            (
                Topic::Fitness,
                "You are a fitness expert specializing in kettlebells and strength training.",
            ),
            (
                Topic::General,
                "You are a helpful AI assistant. Provide accurate and useful information.",
            ),
        ]
        .into_iter()
        .map(|(topic, prompt)| (topic, prompt.to_string()))
        .collect()
    }

    /// System prompt for `topic`, falling back to the general one
    pub fn system_prompt(&self, topic: Topic) -> &str {
        self.system_prompts
            .get(&topic)
            .or_else(|| self.system_prompts.get(&Topic::General))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Build the prompt sent to the model. `history` must not yet contain
    /// the current query.
    pub fn build_prompt(&self, query: &str, history: &[Message], topic: Topic) -> String {
        let recent = self.compressor.compress(history, self.max_context_tokens);

        let context = recent
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            "Built prompt for topic {} with {}/{} history messages",
            topic,
            recent.len(),
            history.len()
        );

        let previous = if context.is_empty() {
            String::new()
        } else {
            format!("Previous conversation:\n{}\n\n", context)
        };

        format!(
            "{}\n\n{}User: {}\nAssistant:",
            self.system_prompt(topic),
            previous,
            query
        )
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(ContextCompressor::default(), 2048)
    }
}
