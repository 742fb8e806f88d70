use tracing::debug;

use crate::config::ModelsConfig;
use crate::models::chat::Topic;

/// Picks a backend model from the query topic and size
#[derive(Debug, Clone)]
pub struct ModelSelector {
    config: ModelsConfig,
}

impl ModelSelector {
    pub fn new(config: ModelsConfig) -> Self {
        Self { config }
    }

    pub fn select(&self, topic: Topic, query_length: usize) -> String {
        let model = if topic == Topic::Coding {
            &self.config.code_model
        } else if query_length > self.config.long_query_threshold || topic == Topic::Complex {
            &self.config.large_model
        } else {
            &self.config.default_model
        };

        debug!(
            "Selected model {} for topic={} length={}",
            model, topic, query_length
        );
        model.clone()
    }

    /// Caller-supplied model wins; blank overrides are ignored
    pub fn resolve(&self, requested: Option<&str>, topic: Topic, query_length: usize) -> String {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => model.to_string(),
            None => self.select(topic, query_length),
        }
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new(ModelsConfig::default())
    }
}
