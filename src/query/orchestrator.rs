//! Generation → repair → validation → execution loop with feedback retries
//!
//! Attempts run strictly one after another: each retry carries the hint
//! built from every earlier database failure. Validation failures and
//! non-retryable execution failures end the run at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::classifier::ErrorClassifier;
use super::extract::extract_statement;
use super::repair::{RepairPipeline, Repaired};
use super::validator::SafetyValidator;
use super::{prepare_candidate, PipelineError};
use crate::llm::CandidateGenerator;
use crate::schema::SchemaContext;
use crate::store::{ExecutionError, Executor, RowSet};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Send the one-paragraph schema instead of the full authoring text
    pub compact_schema: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            compact_schema: false,
        }
    }
}

impl OrchestratorConfig {
    /// SQLMEND_MAX_ATTEMPTS=5 (clamped to 1..=10)
    /// SQLMEND_COMPACT_SCHEMA=false
    pub fn from_env() -> Self {
        let max_attempts = std::env::var("SQLMEND_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .clamp(1, 10);
        let compact_schema = std::env::var("SQLMEND_COMPACT_SCHEMA")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Self {
            max_attempts,
            compact_schema,
        }
    }
}

/// Shared flag that stops a run before its next attempt
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestration state, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Generating,
    Extracting,
    Repairing,
    Validating,
    Executing,
    Retrying,
    Success,
    Fatal,
}

/// One generate-and-execute round
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub index: u32,
    pub sql: String,
    pub error: Option<String>,
    pub repairs: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub sql: String,
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub attempts: Vec<Attempt>,
}

pub struct Orchestrator {
    generator: Arc<dyn CandidateGenerator>,
    executor: Arc<dyn Executor>,
    schema: &'static SchemaContext,
    pipeline: RepairPipeline,
    validator: SafetyValidator,
    classifier: ErrorClassifier,
    config: OrchestratorConfig,
}

struct Run {
    state: State,
}

impl Run {
    fn enter(&mut self, next: State, attempt: u32) {
        tracing::trace!(from = ?self.state, to = ?next, attempt, "Orchestrator transition");
        self.state = next;
    }
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn CandidateGenerator>,
        executor: Arc<dyn Executor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            schema: SchemaContext::global(),
            pipeline: RepairPipeline::standard(),
            validator: SafetyValidator,
            classifier: ErrorClassifier,
            config,
        }
    }

    fn schema_text(&self) -> &'static str {
        if self.config.compact_schema {
            self.schema.compact()
        } else {
            self.schema.text()
        }
    }

    /// Answer a question end to end, retrying retryable database failures
    pub async fn run(
        &self,
        question: &str,
        cancel: &CancellationFlag,
    ) -> Result<RunOutcome, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InputValidation("Query is required.".to_string()));
        }

        let mut run = Run { state: State::Idle };
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut hint = String::new();

        for index in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                tracing::info!(attempt = index, "Run cancelled");
                return Err(PipelineError::Cancelled);
            }

            run.enter(State::Generating, index);
            let raw = match self.generator.generate(self.schema_text(), question, &hint).await {
                Ok(raw) => raw,
                Err(e) => {
                    run.enter(State::Fatal, index);
                    return Err(e.into());
                }
            };

            run.enter(State::Extracting, index);
            let extracted = extract_statement(&raw);

            run.enter(State::Repairing, index);
            let Repaired { sql, applied } = self.pipeline.repair(&extracted);
            if !applied.is_empty() {
                tracing::debug!(attempt = index, rules = ?applied, "Candidate repaired");
            }

            run.enter(State::Validating, index);
            if let Err(violation) = self.validator.validate(&sql) {
                run.enter(State::Fatal, index);
                tracing::warn!(attempt = index, %violation, sql = %sql, "Candidate rejected");
                return Err(violation.into());
            }

            run.enter(State::Executing, index);
            match self.executor.execute(&sql).await {
                Ok(RowSet { columns, rows }) => {
                    run.enter(State::Success, index);
                    tracing::info!(attempt = index, rows = rows.len(), "Query succeeded");
                    attempts.push(Attempt {
                        index,
                        sql: sql.clone(),
                        error: None,
                        repairs: applied,
                    });
                    return Ok(RunOutcome {
                        sql,
                        rows,
                        columns,
                        attempts,
                    });
                }
                Err(ExecutionError::Database(message)) => {
                    attempts.push(Attempt {
                        index,
                        sql: sql.clone(),
                        error: Some(message.clone()),
                        repairs: applied,
                    });
                    let Some(correction) = self.classifier.extract_hint(&message) else {
                        run.enter(State::Fatal, index);
                        tracing::warn!(attempt = index, error = %message, "Non-retryable execution failure");
                        return Err(PipelineError::SqlExecution { message, sql });
                    };

                    tracing::warn!(
                        attempt = index,
                        reason = ?correction.reason,
                        error = %message,
                        "Retryable execution failure"
                    );
                    if !hint.is_empty() {
                        hint.push_str("\n\n");
                    }
                    hint.push_str(&format!("Attempt {} failed.\n{}", index, correction.render()));
                    run.enter(State::Retrying, index);
                }
                Err(other) => {
                    run.enter(State::Fatal, index);
                    tracing::error!(attempt = index, error = %other, "Execution unavailable");
                    return Err(PipelineError::from_execution(other, &sql));
                }
            }
        }

        let (last_error, last_sql) = attempts
            .last()
            .map(|a| (a.error.clone().unwrap_or_default(), a.sql.clone()))
            .unwrap_or_default();
        tracing::warn!(attempts = self.config.max_attempts, error = %last_error, "Retry bound exceeded");
        Err(PipelineError::RetryBoundExceeded {
            attempts: self.config.max_attempts,
            last_error,
            last_sql,
        })
    }

    /// Generate, repair and validate once without executing
    pub async fn translate(&self, question: &str) -> Result<Repaired, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InputValidation("Query is required.".to_string()));
        }
        let raw = self.generator.generate(self.schema_text(), question, "").await?;
        Ok(prepare_candidate(&raw, &self.pipeline, &self.validator)?)
    }

    /// Validate and execute caller-supplied SQL once, without repair or retry
    pub async fn execute_sql(&self, sql: &str) -> Result<RowSet, PipelineError> {
        let sql = sql.trim();
        self.validator.validate(sql)?;
        self.executor.execute(sql).await.map_err(|err| match err {
            ExecutionError::Database(message) if needs_statement_context(&message) => {
                PipelineError::SqlExecution {
                    message: format!("{}\n\nQuery:\n{}", message, sql),
                    sql: sql.to_string(),
                }
            }
            other => PipelineError::from_execution(other, sql),
        })
    }
}

/// Messages that point at a position in the statement text
fn needs_statement_context(message: &str) -> bool {
    regex!(r"(?i)syntax error|at or near|aggregate function|GROUP BY").is_match(message)
}
