//! Statement execution against the clinic database

pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::schema::TABLES;

pub use postgres::PgExecutor;

/// Result rows as ordered column → value objects
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl RowSet {
    /// Build from rows in database order; columns come from the first row
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    /// Parse rows encoded as JSON arrays of `[column, value]` pairs, in
    /// select-list order. Repeated output names get a numeric suffix so no
    /// column is lost: `first_name, first_name` becomes `first_name, first_name_2`.
    pub fn from_json_rows<I, S>(rows: I) -> Result<Self, ExecutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|text| {
                let pairs = serde_json::from_str::<Vec<(String, Value)>>(text.as_ref())
                    .map_err(|e| ExecutionError::Decode(e.to_string()))?;
                let (names, values): (Vec<String>, Vec<Value>) = pairs.into_iter().unzip();
                Ok(unique_names(names).into_iter().zip(values).collect())
            })
            .collect::<Result<Vec<Map<String, Value>>, ExecutionError>>()?;
        Ok(Self::from_rows(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn unique_names(names: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut n = 1;
        while unique.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", name, n);
        }
        unique.push(candidate);
    }
    unique
}

/// Runs one read-only statement
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<RowSet, ExecutionError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// Message reported by the database server for this statement
    #[error("{0}")]
    Database(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("DATABASE_URL is not set. Set it in .env.")]
    NotConfigured,

    #[error("Could not decode result row: {0}")]
    Decode(String),
}

/// One-row statement counting every catalogue table
pub fn row_count_query() -> String {
    let counts: Vec<String> = TABLES
        .iter()
        .map(|t| format!("(SELECT COUNT(*) FROM {name}) AS {name}", name = t.name))
        .collect();
    format!("SELECT {}", counts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_follow_select_order() {
        let rows = RowSet::from_json_rows([
            r#"[["last_name","Ng"],["first_name","Ada"],["visits",3]]"#,
            r#"[["last_name","Oz"],["first_name","Bo"],["visits",1]]"#,
        ])
        .unwrap();
        assert_eq!(rows.columns, vec!["last_name", "first_name", "visits"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows[1]["visits"], 1);
    }

    #[test]
    fn test_repeated_output_names_are_kept() {
        let rows = RowSet::from_json_rows([
            r#"[["first_name","Ada"],["first_name","Sam"],["first_name_2","x"]]"#,
        ])
        .unwrap();
        assert_eq!(rows.columns, vec!["first_name", "first_name_2", "first_name_2_2"]);
        assert_eq!(rows.rows[0]["first_name"], "Ada");
        assert_eq!(rows.rows[0]["first_name_2"], "Sam");
    }

    #[test]
    fn test_empty_result_has_no_columns() {
        let rows = RowSet::from_json_rows(Vec::<String>::new()).unwrap();
        assert!(rows.is_empty());
        assert!(rows.columns.is_empty());
    }

    #[test]
    fn test_bad_row_is_decode_error() {
        let err = RowSet::from_json_rows(["not json"]).unwrap_err();
        assert!(matches!(err, ExecutionError::Decode(_)));
        let err = RowSet::from_json_rows([r#"{"first_name":"Ada"}"#]).unwrap_err();
        assert!(matches!(err, ExecutionError::Decode(_)));
    }

    #[test]
    fn test_row_count_query_covers_catalogue() {
        let sql = row_count_query();
        assert!(sql.starts_with("SELECT (SELECT COUNT(*) FROM organizations) AS organizations"));
        for table in TABLES {
            assert!(sql.contains(&format!("FROM {})", table.name)));
        }
        assert!(crate::query::validator::assert_read_only(&sql).is_ok());
    }
}
