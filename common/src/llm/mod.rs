pub mod model;
pub mod ollama;

pub use model::{Message, MessageRole};
pub use ollama::OllamaClient;

use crate::error::Result;
use async_trait::async_trait;

/// turns a conversation into one read-only sql string
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    /// fails with `AskDbError::Model` on transport errors, bad status,
    /// malformed envelopes or unusable content
    async fn generate_sql(&self, messages: &[Message]) -> Result<String>;
}
