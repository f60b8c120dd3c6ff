//! Scripted collaborators for orchestrator and router tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::llm::{CandidateGenerator, GenerationError};
use crate::query::CancellationFlag;
use crate::store::{ExecutionError, Executor, RowSet};

/// Replays queued responses and records every hint it was given
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    last: Mutex<Option<String>>,
    hints: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn failing(err: GenerationError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(err)])),
            ..Self::default()
        }
    }

    pub fn hints(&self) -> Vec<String> {
        self.hints.lock().clone()
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _schema: &str,
        _question: &str,
        hint: &str,
    ) -> Result<String, GenerationError> {
        self.hints.lock().push(hint.to_string());
        // the last successful response repeats once the script runs out
        match self.responses.lock().pop_front() {
            Some(Ok(sql)) => {
                *self.last.lock() = Some(sql.clone());
                Ok(sql)
            }
            Some(Err(err)) => Err(err),
            None => self.last.lock().clone().ok_or(GenerationError::EmptyResponse),
        }
    }
}

/// Replays queued execution results and records executed statements
#[derive(Default)]
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<RowSet, ExecutionError>>>,
    executed: Mutex<Vec<String>>,
    /// Set on every execution, standing in for a caller that gives up
    cancel: Option<CancellationFlag>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<Result<RowSet, ExecutionError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    /// Fails every statement with the same database message
    pub fn always_failing(message: &str, times: usize) -> Self {
        Self::new(
            (0..times)
                .map(|_| Err(ExecutionError::Database(message.to_string())))
                .collect(),
        )
    }

    /// Cancels `flag` while the first statement is running
    pub fn cancelling(flag: CancellationFlag, results: Vec<Result<RowSet, ExecutionError>>) -> Self {
        Self {
            cancel: Some(flag),
            ..Self::new(results)
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> Result<RowSet, ExecutionError> {
        self.executed.lock().push(sql.to_string());
        if let Some(flag) = &self.cancel {
            flag.cancel();
        }
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RowSet::default()))
    }
}

/// Single-column rows
pub fn rows(column: &str, values: &[Value]) -> RowSet {
    RowSet::from_rows(
        values
            .iter()
            .map(|v| {
                let mut row = Map::new();
                row.insert(column.to_string(), v.clone());
                row
            })
            .collect(),
    )
}

pub fn doctor_rows() -> RowSet {
    let row = |first: &str, last: &str, visits: i64| {
        json!({ "first_name": first, "last_name": last, "visits": visits })
            .as_object()
            .cloned()
            .unwrap_or_default()
    };
    RowSet::from_rows(vec![row("Ada", "Ng", 12), row("Bo", "Oz", 7)])
}
