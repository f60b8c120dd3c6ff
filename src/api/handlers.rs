use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::query::{
    Attempt, CacheStats, CancellationFlag, Orchestrator, PipelineError, TranslationCache,
};
use crate::schema::{Table, TABLES};
use crate::store::row_count_query;

pub const MAX_QUESTION_CHARS: usize = 2000;
pub const MAX_SQL_CHARS: usize = 50_000;

/// Application state shared across handlers
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub cache: TranslationCache,
    /// Wall-clock budget for one `/query/run` request, all attempts included
    pub query_timeout: Duration,
}

// ============================================================================
// Input Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("{field} is required.")]
    Empty { field: &'static str },

    #[error("{field} is too long (max {max} characters).")]
    TooLong { field: &'static str, max: usize },
}

fn validate_input<'a>(
    text: &'a str,
    field: &'static str,
    max: usize,
) -> Result<&'a str, InputError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(InputError::TooLong { field, max });
    }
    Ok(trimmed)
}

pub fn validate_question(question: &str) -> Result<&str, InputError> {
    validate_input(question, "Query", MAX_QUESTION_CHARS)
}

pub fn validate_sql(sql: &str) -> Result<&str, InputError> {
    validate_input(sql, "SQL", MAX_SQL_CHARS)
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Natural Language
// ============================================================================

#[derive(Deserialize)]
pub struct QuestionRequest {
    pub query: String,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    pub sql: String,
    pub cached: bool,
    pub repairs: Vec<&'static str>,
}

pub async fn translate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let question = validate_question(&request.query)?;

    if let Some(sql) = state.cache.get(question) {
        tracing::debug!("Translation cache hit");
        return Ok(Json(TranslateResponse {
            sql,
            cached: true,
            repairs: Vec::new(),
        }));
    }

    let repaired = state.orchestrator.translate(question).await?;
    state.cache.put(question, repaired.sql.clone());

    Ok(Json(TranslateResponse {
        sql: repaired.sql,
        cached: false,
        repairs: repaired.applied,
    }))
}

#[derive(Serialize)]
pub struct RunResponse {
    pub sql: String,
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub attempts: Vec<Attempt>,
}

pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let question = validate_question(&request.query)?;
    let cancel = CancellationFlag::new();

    let outcome = tokio::time::timeout(
        state.query_timeout,
        state.orchestrator.run(question, &cancel),
    )
    .await
    .map_err(|_| {
        cancel.cancel();
        ApiError::Timeout(state.query_timeout)
    })??;

    Ok(Json(RunResponse {
        sql: outcome.sql,
        rows: outcome.rows,
        columns: outcome.columns,
        attempts: outcome.attempts,
    }))
}

// ============================================================================
// Raw SQL
// ============================================================================

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let sql = validate_sql(&request.sql)?;
    let result = state.orchestrator.execute_sql(sql).await?;

    Ok(Json(ExecuteResponse {
        row_count: result.len(),
        columns: result.columns,
        rows: result.rows,
    }))
}

// ============================================================================
// Schema & Stats
// ============================================================================

#[derive(Serialize)]
pub struct SchemaResponse {
    pub tables: &'static [Table],
}

pub async fn schema() -> Json<SchemaResponse> {
    Json(SchemaResponse { tables: TABLES })
}

#[derive(Serialize)]
pub struct StatsResponse {
    /// Row count per table
    pub tables: Map<String, Value>,
    pub cache: CacheStats,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let counts = state.orchestrator.execute_sql(&row_count_query()).await?;

    Ok(Json(StatsResponse {
        tables: counts.rows.into_iter().next().unwrap_or_default(),
        cache: state.cache.stats(),
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Input(InputError),
    Pipeline(PipelineError),
    Timeout(Duration),
}

impl From<InputError> for ApiError {
    fn from(err: InputError) -> Self {
        ApiError::Input(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind, message, sql) = match self {
            ApiError::Input(err) => (
                StatusCode::BAD_REQUEST,
                "input_validation",
                err.to_string(),
                None,
            ),
            ApiError::Timeout(budget) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                format!("Query timed out after {} seconds.", budget.as_secs()),
                None,
            ),
            ApiError::Pipeline(err) => {
                let status = match &err {
                    PipelineError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
                    PipelineError::RetryBoundExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    PipelineError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_REQUEST,
                };
                let sql = match &err {
                    PipelineError::RetryBoundExceeded { last_sql, .. } => Some(last_sql.clone()),
                    _ => None,
                };
                (status, err.kind(), err.to_string(), sql)
            }
        };

        if status.is_server_error() {
            tracing::error!(kind, error = %message, "Request failed");
        } else {
            tracing::warn!(kind, error = %message, "Request rejected");
        }

        let mut body = serde_json::json!({
            "error": message,
            "kind": kind,
        });
        if let Some(sql) = sql {
            body["sql"] = Value::String(sql);
        }

        (status, Json(body)).into_response()
    }
}
