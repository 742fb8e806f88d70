pub mod conversation;
pub mod llm_service;
pub mod router_service;
pub mod stream_relay;

pub use llm_service::{GenerationClient, OllamaService};
pub use router_service::{PreparedRequest, RouterService};
pub use stream_relay::StreamRelay;
