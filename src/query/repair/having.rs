//! Aggregate comparisons written in WHERE are moved to HAVING.

use crate::query::scan::{is_alias_word, splice, Clause, Clauses, Layout};
use crate::schema;

pub fn has_aggregate_in_where(sql: &str) -> bool {
    regex!(r"(?i)\bWHERE\b").is_match(sql)
        && regex!(concat!(
            r"(?i)\b(?:COUNT|SUM|AVG|MIN|MAX)\s*\([^)]*\)",
            r"\s*(?:>=|<=|!=|<>|>|<|=)\s*(?:'[^']*'|\(\d+(?:\.\d+)?\)|\d+(?:\.\d+)?)"
        ))
        .is_match(sql)
}

fn is_aggregate_comparison(conjunct: &str) -> bool {
    let anchored = regex!(concat!(
        r"(?i)^(?:COUNT|SUM|AVG|MIN|MAX)\s*\([^)]*\)",
        r"\s*(?:>=|<=|!=|<>|>|<|=)\s*(?:'[^']*'|\(\d+(?:\.\d+)?\)|\d+(?:\.\d+)?)$"
    ));
    anchored.is_match(conjunct)
}

/// Split the top-level WHERE condition out, move its aggregate conjuncts into
/// HAVING (creating GROUP BY on the first FROM alias when needed).
///
/// Gives up on top-level `OR` and on aggregates whose alias is not bound by
/// the outer FROM/JOIN list, since those belong to a subquery.
pub fn move_to_having(sql: &str) -> Option<String> {
    let clauses = Clauses::parse(sql);
    let where_span = clauses.get(Clause::Where)?.clone();
    let condition = clauses.body(sql, Clause::Where)?;
    let condition = unwrap_parens(condition);

    let layout = Layout::new(condition);
    if regex!(r"(?i)\bOR\b")
        .find_iter(condition)
        .any(|m| layout.is_top_level(m.start()))
    {
        return None;
    }

    let mut kept = Vec::new();
    let mut moved = Vec::new();
    for conjunct in split_conjuncts(condition) {
        let bare = unwrap_parens(&conjunct);
        if is_aggregate_comparison(bare) {
            moved.push(bare.to_string());
        } else {
            kept.push(conjunct);
        }
    }
    if moved.is_empty() {
        return None;
    }

    for condition in &moved {
        if let Some(caps) = regex!(r"\b(\w+)\.\w+").captures(condition) {
            if !alias_bound_at_top_level(sql, &clauses, &caps[1]) {
                return None;
            }
        }
    }
    let group_key = first_from_alias(sql, &clauses)?;

    // WHERE without the moved conjuncts
    let head = sql[..where_span.keyword.start].trim_end();
    let tail = sql[where_span.body.end..].trim_start();
    let mut stripped = head.to_string();
    if !kept.is_empty() {
        stripped.push_str(" WHERE ");
        stripped.push_str(&kept.join(" AND "));
    }
    if !tail.is_empty() && !tail.starts_with(';') {
        stripped.push(' ');
    }
    stripped.push_str(tail);

    let having = moved.join(" AND ");
    let clauses = Clauses::parse(&stripped);
    let (at, text) = if let Some(range) = clauses.body_range(&stripped, Clause::Having) {
        (range.end, format!(" AND {}", having))
    } else if let Some(range) = clauses.body_range(&stripped, Clause::GroupBy) {
        (range.end, format!(" HAVING {}", having))
    } else {
        let at = clauses.insertion_point(
            &stripped,
            &[Clause::OrderBy, Clause::Limit, Clause::Offset],
        );
        (at, format!(" GROUP BY {}.id HAVING {}", group_key, having))
    };
    Some(splice(&stripped, at..at, &text))
}

/// Remove parentheses that wrap the whole expression
fn unwrap_parens(expr: &str) -> &str {
    let mut expr = expr.trim();
    while expr.starts_with('(') && expr.ends_with(')') {
        let layout = Layout::new(expr);
        // the opening paren must close at the very end
        let closes_early = (1..expr.len() - 1).any(|i| layout.depth_at(i) == Some(0));
        if closes_early {
            break;
        }
        expr = expr[1..expr.len() - 1].trim();
    }
    expr
}

/// Split on top-level `AND`, keeping `BETWEEN x AND y` together
fn split_conjuncts(condition: &str) -> Vec<String> {
    let layout = Layout::new(condition);
    let between = regex!(r"(?i)\bBETWEEN\b");
    let mut parts = Vec::new();
    let mut start = 0;
    let mut pending_between = 0usize;

    for m in regex!(r"(?i)\bAND\b").find_iter(condition) {
        if !layout.is_top_level(m.start()) {
            continue;
        }
        let segment = &condition[start..m.start()];
        let opened = between
            .find_iter(segment)
            .filter(|b| layout.is_top_level(start + b.start()))
            .count();
        if opened > pending_between {
            pending_between += 1;
            continue;
        }
        parts.push(segment.trim().to_string());
        start = m.end();
        pending_between = 0;
    }
    parts.push(condition[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// True if `alias` is introduced by the outermost FROM/JOIN list. Aliases
/// with a conventional table are only accepted for that table.
pub(super) fn alias_bound_at_top_level(sql: &str, clauses: &Clauses, alias: &str) -> bool {
    let Some(from) = clauses.get(Clause::From) else {
        return false;
    };
    let pattern = match schema::table_for_alias(alias) {
        Some(table) => format!(
            r"(?i)\b{}\s+(?:AS\s+)?{}\b",
            regex::escape(table.name),
            regex::escape(alias)
        ),
        None => format!(
            r"(?i)\b(?:FROM|JOIN)\s+\w+\s+(?:AS\s+)?{}\b",
            regex::escape(alias)
        ),
    };
    let Ok(re) = regex::Regex::new(&pattern) else {
        return false;
    };

    let layout = Layout::new(sql);
    let base = from.keyword.start;
    let bound = re
        .find_iter(&sql[base..from.body.end])
        .any(|m| layout.is_top_level(base + m.start()));
    bound
}

/// Alias (or bare table name) of the first FROM entry
fn first_from_alias(sql: &str, clauses: &Clauses) -> Option<String> {
    let from = clauses.body(sql, Clause::From)?;
    let caps = regex!(r"(?i)^(\w+)(?:\s+(?:AS\s+)?(\w+))?").captures(from)?;
    let alias = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|word| is_alias_word(word))
        .unwrap_or(&caps[1]);
    Some(alias.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sql: &str) -> Option<String> {
        assert!(has_aggregate_in_where(sql));
        move_to_having(sql)
    }

    #[test]
    fn test_sole_condition_gets_group_by() {
        assert_eq!(
            apply("SELECT v.id FROM visits v WHERE COUNT(v.id) > 5").unwrap(),
            "SELECT v.id FROM visits v GROUP BY v.id HAVING COUNT(v.id) > 5"
        );
    }

    #[test]
    fn test_mixed_conditions_keep_row_filter() {
        let sql = "SELECT d.first_name, COUNT(v.id) AS n FROM doctors d JOIN visits v ON v.doctor_id = d.id \
                   WHERE v.reason = 'Checkup' AND COUNT(v.id) >= 3 GROUP BY d.first_name ORDER BY n DESC";
        assert_eq!(
            apply(sql).unwrap(),
            "SELECT d.first_name, COUNT(v.id) AS n FROM doctors d JOIN visits v ON v.doctor_id = d.id \
             WHERE v.reason = 'Checkup' GROUP BY d.first_name HAVING COUNT(v.id) >= 3 ORDER BY n DESC"
        );
    }

    #[test]
    fn test_existing_having_is_extended() {
        let sql = "SELECT p.id FROM patients p JOIN visits v ON v.patient_id = p.id \
                   WHERE (SUM(v.id) < 100) GROUP BY p.id HAVING COUNT(v.id) > 1 LIMIT 5;";
        assert_eq!(
            apply(sql).unwrap(),
            "SELECT p.id FROM patients p JOIN visits v ON v.patient_id = p.id \
             GROUP BY p.id HAVING COUNT(v.id) > 1 AND SUM(v.id) < 100 LIMIT 5;"
        );
    }

    #[test]
    fn test_between_stays_in_where() {
        let sql = "SELECT v.id FROM visits v WHERE v.visit_date BETWEEN '2024-01-01' AND '2024-12-31' AND COUNT(v.id) > 2 ORDER BY v.id";
        assert_eq!(
            apply(sql).unwrap(),
            "SELECT v.id FROM visits v WHERE v.visit_date BETWEEN '2024-01-01' AND '2024-12-31' GROUP BY v.id HAVING COUNT(v.id) > 2 ORDER BY v.id"
        );
    }

    #[test]
    fn test_subquery_alias_is_left_alone() {
        let sql = "SELECT f.name FROM facilities f WHERE f.id IN (SELECT d.facility_id FROM doctors d) AND COUNT(d.id) > 2";
        assert_eq!(apply(sql), None);
    }

    #[test]
    fn test_alias_bound_only_at_top_level() {
        let sql = "SELECT f.name FROM facilities f JOIN (SELECT d.facility_id FROM doctors d) x ON x.facility_id = f.id";
        let clauses = Clauses::parse(sql);
        assert!(alias_bound_at_top_level(sql, &clauses, "f"));
        assert!(!alias_bound_at_top_level(sql, &clauses, "d"));
    }

    #[test]
    fn test_mismatched_alias_is_left_alone() {
        let sql = "SELECT v.id FROM doctors v WHERE COUNT(v.id) > 5";
        assert_eq!(apply(sql), None);
    }

    #[test]
    fn test_top_level_or_is_left_alone() {
        let sql = "SELECT v.id FROM visits v WHERE v.reason = 'x' OR COUNT(v.id) > 5";
        assert_eq!(apply(sql), None);
    }

    #[test]
    fn test_nested_aggregate_is_not_moved() {
        let sql = "SELECT d.id FROM doctors d WHERE d.id IN (SELECT v.doctor_id FROM visits v GROUP BY v.doctor_id HAVING COUNT(v.id) > 3)";
        assert_eq!(apply(sql), None);
    }
}
