//! Candidate SQL generation

pub mod config;
pub mod openai;

use async_trait::async_trait;

pub use config::LlmConfig;
pub use openai::OpenAiGenerator;

/// Produces one candidate statement per call
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// `hint` is empty on the first attempt
    async fn generate(
        &self,
        schema: &str,
        question: &str,
        hint: &str,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0}")]
    Configuration(String),

    #[error("OpenAI quota exceeded (check billing at platform.openai.com).")]
    QuotaExceeded,

    #[error("LLM did not return a SQL query.")]
    EmptyResponse,

    #[error("LLM request failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("LLM request failed: {0}")]
    Network(String),

    #[error("Invalid LLM response: {0}")]
    Deserialization(String),
}
