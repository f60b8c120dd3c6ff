//! Punctuation-level repairs: quoting, stray terminators, clause-removal debris
//! and the missing CTE header.

use crate::query::scan::{matches_outside_literals, replace_outside_literals};

// ============================================================================
// Identifier quotes
// ============================================================================

pub fn has_backticks(sql: &str) -> bool {
    sql.contains('`')
}

/// PostgreSQL has no backtick quoting; drop them all
pub fn strip_backticks(sql: &str) -> Option<String> {
    Some(sql.replace('`', ""))
}

// ============================================================================
// Comma / parenthesis debris
// ============================================================================

fn debris_patterns() -> [(&'static regex::Regex, &'static str); 5] {
    [
        (regex!(r",\s*\)"), ")"),
        (regex!(r",\s*,"), ","),
        (regex!(r"(?i),\s*FROM\b"), " FROM"),
        (regex!(r"(?i)\bGROUP\s+BY\s*,\s*"), "GROUP BY "),
        (regex!(r"(?i)\bSELECT\s*,\s*"), "SELECT "),
    ]
}

pub fn has_debris(sql: &str) -> bool {
    debris_patterns()
        .iter()
        .any(|(re, _)| matches_outside_literals(sql, re))
}

/// Remove double commas, commas before `FROM` or `)`, and commas right after
/// `SELECT`/`GROUP BY`, repeating until nothing changes.
pub fn tidy(sql: &str) -> String {
    let mut current = sql.to_string();
    // every effective pass removes at least one comma
    loop {
        let mut next = current.clone();
        for (re, replacement) in debris_patterns() {
            next = replace_outside_literals(&next, re, replacement);
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn remove_debris(sql: &str) -> Option<String> {
    Some(tidy(sql))
}

// ============================================================================
// Stray terminator before GROUP BY
// ============================================================================

pub fn has_semicolon_before_group_by(sql: &str) -> bool {
    matches_outside_literals(sql, regex!(r"(?i);\s*GROUP\s+BY\b"))
}

pub fn merge_semicolon_before_group_by(sql: &str) -> Option<String> {
    Some(replace_outside_literals(
        sql,
        regex!(r"(?i)\s*;\s*GROUP\s+BY\b"),
        " GROUP BY",
    ))
}

// ============================================================================
// Missing `WITH cte AS (`
// ============================================================================

pub fn lacks_cte_header(sql: &str) -> bool {
    let starts_with_with = regex!(r"(?i)^\s*WITH\s").is_match(sql);
    !starts_with_with
        && regex!(r"(?is)\)\s*SELECT\s").is_match(sql)
        && regex!(r"(?i)\bFROM\s+cte\b").is_match(sql)
}

pub fn prepend_cte_header(sql: &str) -> Option<String> {
    Some(format!("WITH cte AS ({}", sql.trim_start()))
}
