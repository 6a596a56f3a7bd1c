pub mod llm_client;

pub use llm_client::{CompletionRequest, ConnectionReport, Embedding, LlmClient};
