//! Conversation state management
//!
//! - Write-back session cache (DashMap + per-session locks)
//! - Query classification and model selection
//! - History compression and prompt building

mod cache;
pub mod classifier;
mod compressor;
mod context_builder;
mod model_selector;
pub mod types;

pub use cache::SessionCache;
pub use classifier::{KeywordClassifier, QueryClassifier};
pub use compressor::ContextCompressor;
pub use context_builder::ContextBuilder;
pub use model_selector::ModelSelector;
pub use types::CachedSession;
