pub mod cache;
pub mod classifier;
pub mod extract;
pub mod orchestrator;
pub mod repair;
pub mod scan;
pub mod validator;

pub use cache::{CacheStats, TranslationCache};
pub use classifier::{ErrorClass, ErrorClassifier, ErrorHint, RetryReason};
pub use extract::extract_statement;
pub use orchestrator::{Attempt, CancellationFlag, Orchestrator, OrchestratorConfig, RunOutcome};
pub use repair::{RepairPipeline, RepairRule, Repaired};
pub use validator::{SafetyValidator, SafetyViolation, ValidationVerdict};

use crate::llm::GenerationError;
use crate::store::ExecutionError;

/// Extract, repair and validate one raw generator response
pub fn prepare_candidate(
    raw: &str,
    pipeline: &RepairPipeline,
    validator: &SafetyValidator,
) -> Result<Repaired, SafetyViolation> {
    let extracted = extract_statement(raw);
    let repaired = pipeline.repair(&extracted);
    validator.validate(&repaired.sql)?;
    Ok(repaired)
}

/// Outcome taxonomy of one natural-language request
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    InputValidation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    GenerationFailure(String),

    #[error(transparent)]
    SafetyViolation(#[from] SafetyViolation),

    #[error("{message}")]
    SqlExecution { message: String, sql: String },

    #[error("{last_error}")]
    RetryBoundExceeded {
        attempts: u32,
        last_error: String,
        last_sql: String,
    },

    #[error("Query was cancelled.")]
    Cancelled,
}

impl PipelineError {
    /// Stable machine-readable name
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InputValidation(_) => "input_validation",
            PipelineError::Configuration(_) => "configuration",
            PipelineError::GenerationFailure(_) => "generation_failure",
            PipelineError::SafetyViolation(_) => "safety_violation",
            PipelineError::SqlExecution { .. } => "sql_execution",
            PipelineError::RetryBoundExceeded { .. } => "retry_bound_exceeded",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

impl From<GenerationError> for PipelineError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Configuration(message) => PipelineError::Configuration(message),
            other => PipelineError::GenerationFailure(other.to_string()),
        }
    }
}

impl PipelineError {
    /// Execution failure of `sql` that is not retried
    pub fn from_execution(err: ExecutionError, sql: &str) -> Self {
        match err {
            ExecutionError::Database(message) | ExecutionError::Decode(message) => {
                PipelineError::SqlExecution {
                    message,
                    sql: sql.to_string(),
                }
            }
            other @ (ExecutionError::Unavailable(_) | ExecutionError::NotConfigured) => {
                PipelineError::Configuration(other.to_string())
            }
        }
    }
}
