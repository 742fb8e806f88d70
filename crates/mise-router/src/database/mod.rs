pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use memory::InMemoryContextStore;
pub use models::{MessageRow, SessionRow};
pub use pool::DbPool;
pub use repository::SessionRepository;
pub use store::ContextStore;

#[cfg(test)]
pub use store::MockContextStore;
