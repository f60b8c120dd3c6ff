//! Execution error classification and correction hints
//!
//! A failure is retryable when the database message points at a defect the
//! generator can plausibly fix (grouping, syntax, unknown identifiers).
//! Everything else (connectivity, permissions, configuration) is fatal.

use std::fmt::Write;

/// Why a failure is worth another generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Non-aggregated column missing from GROUP BY, or aggregate misuse
    Grouping,
    /// Alias used without being introduced in FROM/JOIN
    MissingFromEntry,
    UnknownColumn,
    UnknownRelation,
    Syntax,
}

impl RetryReason {
    fn guidance(&self) -> &'static str {
        match self {
            RetryReason::Grouping => {
                "Add the columns below to GROUP BY or wrap them in an aggregate function; \
                 aggregate conditions belong in HAVING, never in WHERE."
            }
            RetryReason::MissingFromEntry => {
                "Every alias used in the query must be introduced in FROM or JOIN."
            }
            RetryReason::UnknownColumn => {
                "Use only columns that exist in the schema and qualify them with the right alias."
            }
            RetryReason::UnknownRelation => "Use only the tables listed in the schema.",
            RetryReason::Syntax => "Return one syntactically valid PostgreSQL SELECT statement.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable(RetryReason),
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Retryable(_))
    }
}

/// Identifiers pulled out of a failure message, used to steer the next prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorHint {
    pub reason: RetryReason,
    pub message: String,
    pub identifiers: Vec<String>,
}

impl ErrorHint {
    /// Correction paragraph appended to the next generation prompt
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "The previous query failed with this database error:");
        let _ = writeln!(out, "{}", self.message.trim());
        if !self.identifiers.is_empty() {
            let _ = writeln!(out, "Identifiers involved: {}", self.identifiers.join(", "));
        }
        out.push_str(self.reason.guidance());
        out
    }
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "LIMIT", "OFFSET", "JOIN",
    "LEFT", "RIGHT", "INNER", "OUTER", "ON", "AS", "AND", "OR", "NOT", "NULL", "IN", "IS",
    "DISTINCT", "COUNT", "SUM", "AVG", "MIN", "MAX", "EXTRACT", "CASE", "WHEN", "THEN", "ELSE",
    "END", "WITH", "UNION", "TABLE", "COLUMN", "RELATION", "ASC", "DESC", "LIKE", "ILIKE",
    "BETWEEN", "OVER", "PARTITION",
];

fn is_keyword(word: &str) -> bool {
    SQL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Stateless classifier for execution failure messages
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(&self, message: &str) -> ErrorClass {
        let grouping = regex!(r"(?i)must appear in the GROUP BY clause|aggregate function");
        let missing_from = regex!(r"(?i)missing FROM-clause entry");
        let unknown_column =
            regex!(r"(?i)\bcolumn\s+\S+\s+does not exist|unknown column|no such column");
        let unknown_relation =
            regex!(r"(?i)\b(?:relation|table)\s+\S+\s+does not exist|no such table|unknown table");
        let syntax = regex!(r"(?i)syntax error|at or near");

        let reason = if grouping.is_match(message) {
            RetryReason::Grouping
        } else if missing_from.is_match(message) {
            RetryReason::MissingFromEntry
        } else if unknown_column.is_match(message) {
            RetryReason::UnknownColumn
        } else if unknown_relation.is_match(message) {
            RetryReason::UnknownRelation
        } else if syntax.is_match(message) {
            RetryReason::Syntax
        } else {
            return ErrorClass::Fatal;
        };
        ErrorClass::Retryable(reason)
    }

    /// Hint for a retryable message, `None` for fatal ones
    pub fn extract_hint(&self, message: &str) -> Option<ErrorHint> {
        let ErrorClass::Retryable(reason) = self.classify(message) else {
            return None;
        };
        Some(ErrorHint {
            reason,
            message: message.trim().to_string(),
            identifiers: extract_identifiers(message),
        })
    }
}

/// Quoted identifiers plus `column X must/does` and `table X` mentions,
/// keywords removed, first occurrence order
pub fn extract_identifiers(message: &str) -> Vec<String> {
    let quoted = regex!(r#""([^"]+)""#);
    let column = regex!(r#"(?i)\bcolumn\s+"?([\w.]+)"?\s+(?:must|does)\b"#);
    let table = regex!(r#"(?i)\btable\s+"?([\w.]+)"?"#);

    let mut found: Vec<String> = Vec::new();
    let candidates = quoted
        .captures_iter(message)
        .chain(column.captures_iter(message))
        .chain(table.captures_iter(message))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()));

    for candidate in candidates {
        if candidate.is_empty() || is_keyword(&candidate) || found.contains(&candidate) {
            continue;
        }
        found.push(candidate);
    }
    found
}

pub fn classify(message: &str) -> ErrorClass {
    ErrorClassifier.classify(message)
}

pub fn extract_hint(message: &str) -> Option<ErrorHint> {
    ErrorClassifier.extract_hint(message)
}
