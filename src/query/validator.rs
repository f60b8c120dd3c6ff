//! Read-only statement enforcement
//!
//! Matching is purely textual and deliberately not literal-aware: a
//! forbidden word inside a string literal still rejects the statement.

use std::sync::OnceLock;

use regex::RegexSet;

/// Reason a statement was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyViolation {
    #[error("Query is empty or does not contain a SELECT statement.")]
    InvalidStatement,

    #[error("Only SELECT queries are allowed.")]
    NotReadOnly,

    #[error("Query contains forbidden operation ({0}). Only read-only SELECT is allowed.")]
    ForbiddenOperation(&'static str),
}

/// Pass/fail outcome of validation
pub type ValidationVerdict = Result<(), SafetyViolation>;

const FORBIDDEN: &[(&str, &str)] = &[
    ("DROP", r"(?i)\bDROP\b"),
    ("TRUNCATE", r"(?i)\bTRUNCATE\b"),
    ("DELETE FROM", r"(?i)\bDELETE\s+FROM\b"),
    ("INSERT INTO", r"(?i)\bINSERT\s+INTO\b"),
    ("UPDATE SET", r"(?i)\bUPDATE\s+\w+\s+SET\b"),
    ("ALTER", r"(?i)\bALTER\b"),
    ("CREATE", r"(?i)\bCREATE\b"),
    ("GRANT", r"(?i)\bGRANT\b"),
    ("REVOKE", r"(?i)\bREVOKE\b"),
    ("stacked statement", r"(?i);\s*SELECT"),
    ("comment after terminator", r";\s*--"),
    ("comment before SELECT", r"(?i)--.*\n.*SELECT"),
];

fn forbidden_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(FORBIDDEN.iter().map(|(_, pattern)| *pattern))
            .expect("forbidden patterns are valid")
    })
}

/// Enforces that a candidate is a single read-only statement
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        let trimmed = sql.trim();
        if trimmed.is_empty() || !regex!(r"(?i)\b(SELECT|WITH)\b").is_match(trimmed) {
            return Err(SafetyViolation::InvalidStatement);
        }

        let upper = trimmed.to_ascii_uppercase();
        if !upper.starts_with("SELECT") && !upper.starts_with("WITH") {
            return Err(SafetyViolation::NotReadOnly);
        }

        if let Some(index) = forbidden_set().matches(sql).iter().next() {
            return Err(SafetyViolation::ForbiddenOperation(FORBIDDEN[index].0));
        }

        Ok(())
    }
}

/// Validate with the default validator
pub fn assert_read_only(sql: &str) -> ValidationVerdict {
    SafetyValidator.validate(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_select_and_cte() {
        assert!(assert_read_only("SELECT d.first_name FROM doctors d").is_ok());
        assert!(assert_read_only("  with x as (select 1) select * from x").is_ok());
        assert!(assert_read_only("SELECT v.created_at, v.updated_at FROM visits v").is_ok());
    }

    #[test]
    fn test_rejects_non_select_prefix() {
        assert_eq!(
            assert_read_only("EXPLAIN SELECT 1"),
            Err(SafetyViolation::NotReadOnly)
        );
    }

    #[test]
    fn test_rejects_text_without_statement() {
        assert_eq!(assert_read_only("   "), Err(SafetyViolation::InvalidStatement));
        assert_eq!(
            assert_read_only("DROP TABLE patients;"),
            Err(SafetyViolation::InvalidStatement)
        );
    }

    #[test]
    fn test_rejects_drop_behind_select() {
        assert_eq!(
            assert_read_only("SELECT * FROM patients; DROP TABLE patients;"),
            Err(SafetyViolation::ForbiddenOperation("DROP"))
        );
        assert_eq!(
            assert_read_only("select 1; drop table patients"),
            Err(SafetyViolation::ForbiddenOperation("DROP"))
        );
    }

    #[test]
    fn test_rejects_write_keywords() {
        let cases = [
            ("SELECT 1 WHERE 1 = 1; DELETE FROM visits", "DELETE FROM"),
            ("SELECT 1; INSERT INTO visits VALUES (1)", "INSERT INTO"),
            ("SELECT 1; UPDATE doctors SET phone = ''", "UPDATE SET"),
            ("SELECT 1 FROM t; ALTER TABLE t ADD x int", "ALTER"),
            ("WITH x AS (SELECT 1) SELECT * FROM x; GRANT ALL ON t TO u", "GRANT"),
            ("SELECT 1; TRUNCATE visits", "TRUNCATE"),
        ];
        for (sql, expected) in cases {
            assert_eq!(
                assert_read_only(sql),
                Err(SafetyViolation::ForbiddenOperation(expected)),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_rejects_stacked_and_comment_smuggling() {
        assert_eq!(
            assert_read_only("SELECT 1; SELECT 2"),
            Err(SafetyViolation::ForbiddenOperation("stacked statement"))
        );
        assert_eq!(
            assert_read_only("SELECT 1; -- trailing"),
            Err(SafetyViolation::ForbiddenOperation("comment after terminator"))
        );
        assert_eq!(
            assert_read_only("SELECT 1 -- note\nUNION SELECT password FROM users"),
            Err(SafetyViolation::ForbiddenOperation("comment before SELECT"))
        );
    }

    #[test]
    fn test_literal_content_is_not_exempt() {
        assert!(assert_read_only("SELECT * FROM visits v WHERE v.notes = 'please drop by'").is_err());
    }
}
