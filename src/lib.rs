//! sqlmend: Natural-Language Questions over a Clinic Database
//!
//! Turns a question into one read-only PostgreSQL statement and runs it.
//! Candidates come from a chat-completions model; every candidate is
//! extracted from the model's prose, passed through a fixed list of
//! rewrite rules, checked for safety and executed. Database errors that
//! look like model mistakes are fed back as a correction hint for the next
//! attempt, up to a bounded number of attempts.
//!
//! # Components
//!
//! - **Schema**: the six clinic tables and the prompt text built from them
//! - **Extraction**: pull the statement out of fenced or chatty responses
//! - **Repair**: deterministic, idempotent rewrites of known mistakes
//! - **Safety**: SELECT/WITH only, no data-modifying keywords
//! - **Classification**: database message → retry reason and hint
//! - **Orchestration**: the generate → repair → validate → execute loop
//!
//! # Example
//!
//! ```
//! use sqlmend::query::{repair, SafetyValidator};
//!
//! let fixed = repair::repair("SELECT `d`.`first_name` FROM doctors d");
//! assert_eq!(fixed.sql, "SELECT d.first_name FROM doctors d");
//! assert!(SafetyValidator.validate(&fixed.sql).is_ok());
//! ```

/// Compile a regex once per call site
macro_rules! regex {
    ($re:expr $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

pub mod api;
pub mod llm;
pub mod query;
pub mod schema;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use query::{Orchestrator, OrchestratorConfig, PipelineError, RepairPipeline, SafetyValidator};
pub use store::{Executor, RowSet};
