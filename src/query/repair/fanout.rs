//! Rewrites for facility rollups whose joins multiply rows.
//!
//! Both rules are narrow: they only fire on the exact query shapes the
//! generator keeps producing for "per facility" questions.

use crate::query::scan::{normalize, split_items, Clause, Clauses, SelectList};

fn joins(sql: &str, table: &str, alias: &str) -> bool {
    regex::Regex::new(&format!(r"(?i)\bJOIN\s+{}\s+{}\b", table, alias))
        .map(|re| re.is_match(sql))
        .unwrap_or(false)
}

fn from_facilities(sql: &str) -> bool {
    regex!(r"(?i)\bFROM\s+facilities\s+f\b").is_match(sql)
}

fn limit_suffix(sql: &str) -> String {
    regex!(r"(?i)\bLIMIT\s+(\d+)\s*;?\s*$")
        .captures(sql)
        .map(|caps| format!(" LIMIT {}", &caps[1]))
        .unwrap_or_default()
}

// ============================================================================
// Top child value per facility
// ============================================================================

pub fn ranks_children_per_facility(sql: &str) -> bool {
    !regex!(r"(?i)^\s*WITH\s").is_match(sql)
        && from_facilities(sql)
        && joins(sql, "doctors", "d")
        && joins(sql, "visits", "v")
        && regex!(r"(?i)\bGROUP\s+BY\b").is_match(sql)
        && regex!(r"(?i)\bORDER\s+BY\b").is_match(sql)
}

/// `SELECT f.name, d.specialty, COUNT(v.id) ... GROUP BY f.name ORDER BY
/// count DESC` does not group by the child column. It becomes a ranked CTE
/// that keeps the top child value of every facility.
pub fn rank_top_child(sql: &str) -> Option<String> {
    let clauses = Clauses::parse(sql);
    let list = SelectList::of(sql, &clauses)?;
    if !list.prefix.is_empty() || list.items.len() != 3 {
        return None;
    }

    let parent = regex!(r"(?i)^f\.name(?:\s+(?:AS\s+)?(\w+))?$").captures(&list.items[0])?;
    let parent_out = parent.get(1).map_or("name", |m| m.as_str()).to_string();

    let child = regex!(r"(?i)^(\w+)\.(\w+)(?:\s+(?:AS\s+)?(\w+))?$").captures(&list.items[1])?;
    let (child_alias, child_column) = (&child[1], &child[2]);
    if child_alias.eq_ignore_ascii_case("f")
        || ["id", "first_name", "last_name"]
            .iter()
            .any(|c| c.eq_ignore_ascii_case(child_column))
    {
        return None;
    }
    let child_expr = format!("{}.{}", child_alias, child_column);
    let child_out = child.get(3).map_or(child_column, |m| m.as_str()).to_string();

    let count = regex!(r"(?i)^(COUNT\s*\(\s*(?:\w+\.id|\*)\s*\))(?:\s+(?:AS\s+)?(\w+))?$")
        .captures(&list.items[2])?;
    let count_expr = count[1].to_string();
    let count_out = count.get(2).map_or("count", |m| m.as_str()).to_string();

    if parent_out.eq_ignore_ascii_case(&child_out) || child_out.eq_ignore_ascii_case(&count_out) {
        return None;
    }

    let from = clauses.body(sql, Clause::From)?;
    if !regex!(r"(?i)^facilities\s+f\b").is_match(from) {
        return None;
    }

    let group_items = split_items(clauses.body(sql, Clause::GroupBy)?);
    let parent_keys = [normalize("f.name"), normalize("f.id")];
    if group_items.iter().any(|item| !parent_keys.contains(&normalize(item))) {
        return None;
    }

    let order_items = split_items(clauses.body(sql, Clause::OrderBy)?);
    let first_order = normalize(order_items.first()?);
    let by_count = [
        format!("{} DESC", count_out),
        format!("{} DESC", count_expr),
        "3 DESC".to_string(),
    ];
    if !by_count.iter().any(|o| normalize(o) == first_order) {
        return None;
    }

    let mut inner = format!(
        "SELECT f.name AS {parent_out}, {child_expr} AS {child_out}, {count_expr} AS {count_out}, \
         ROW_NUMBER() OVER (PARTITION BY f.id ORDER BY {count_expr} DESC) AS rn FROM {from}"
    );
    if let Some(condition) = clauses.body(sql, Clause::Where) {
        inner.push_str(&format!(" WHERE {}", condition));
    }
    inner.push_str(&format!(" GROUP BY f.id, f.name, {}", child_expr));
    if let Some(condition) = clauses.body(sql, Clause::Having) {
        inner.push_str(&format!(" HAVING {}", condition));
    }

    let limit = clauses
        .body(sql, Clause::Limit)
        .map(|n| format!(" LIMIT {}", n))
        .unwrap_or_default();

    Some(format!(
        "WITH ranked AS ({inner}) SELECT {parent_out}, {child_out}, {count_out} FROM ranked \
         WHERE rn = 1 ORDER BY {count_out} DESC{limit}"
    ))
}

// ============================================================================
// Independent counts per facility
// ============================================================================

fn triple_count() -> &'static regex::Regex {
    regex!(
        r"(?is)SELECT\s+f\.name\s*,\s*COUNT\s*\(\s*d\.id\s*\)(?:\s+AS\s+(\w+))?\s*,\s*COUNT\s*\(\s*p\.id\s*\)(?:\s+AS\s+(\w+))?\s*,\s*COUNT\s*\(\s*v\.id\s*\)(?:\s+AS\s+(\w+))?"
    )
}

pub fn counts_across_fanout(sql: &str) -> bool {
    from_facilities(sql)
        && joins(sql, "doctors", "d")
        && joins(sql, "patients", "p")
        && joins(sql, "visits", "v")
        && regex!(r"(?i)\bGROUP\s+BY\s+f\.(?:name|id)\b").is_match(sql)
}

/// Doctors, patients and visits joined onto one facility row multiply each
/// other; every count becomes its own correlated subquery.
pub fn split_into_subqueries(sql: &str) -> Option<String> {
    let wrong_join = regex!(r"(?i)\b(?:f\.id\s*=\s*v\.doctor_id|v\.doctor_id\s*=\s*f\.id)\b");
    let counts = triple_count().captures(sql);
    if !wrong_join.is_match(sql) && counts.is_none() {
        return None;
    }

    let name = |i: usize, default: &'static str| {
        counts
            .as_ref()
            .and_then(|caps| caps.get(i))
            .map_or(default, |m| m.as_str())
            .to_string()
    };
    let doctors = name(1, "num_doctors");
    let patients = name(2, "num_patients");
    let visits = name(3, "num_visits");

    Some(format!(
        "SELECT f.name, \
         (SELECT COUNT(*) FROM doctors d WHERE d.facility_id = f.id) AS {doctors}, \
         (SELECT COUNT(*) FROM patients p WHERE p.facility_id = f.id) AS {patients}, \
         (SELECT COUNT(*) FROM visits v JOIN doctors d ON v.doctor_id = d.id WHERE d.facility_id = f.id) AS {visits} \
         FROM facilities f ORDER BY {visits} DESC{}",
        limit_suffix(sql)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_SPECIALTY: &str = "SELECT f.name AS facility, d.specialty, COUNT(v.id) AS visit_count \
        FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN visits v ON v.doctor_id = d.id \
        GROUP BY f.name ORDER BY visit_count DESC LIMIT 5";

    #[test]
    fn test_ranked_cte_rewrite() {
        assert!(ranks_children_per_facility(TOP_SPECIALTY));
        assert_eq!(
            rank_top_child(TOP_SPECIALTY).unwrap(),
            "WITH ranked AS (SELECT f.name AS facility, d.specialty AS specialty, COUNT(v.id) AS visit_count, \
             ROW_NUMBER() OVER (PARTITION BY f.id ORDER BY COUNT(v.id) DESC) AS rn \
             FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN visits v ON v.doctor_id = d.id \
             GROUP BY f.id, f.name, d.specialty) \
             SELECT facility, specialty, visit_count FROM ranked WHERE rn = 1 ORDER BY visit_count DESC LIMIT 5"
        );
    }

    #[test]
    fn test_ranked_cte_keeps_where() {
        let sql = "SELECT f.name, d.specialty, COUNT(v.id) FROM facilities f JOIN doctors d ON d.facility_id = f.id \
                   JOIN visits v ON v.doctor_id = d.id WHERE v.reason = 'Flu' GROUP BY f.id, f.name ORDER BY COUNT(v.id) DESC";
        let fixed = rank_top_child(sql).unwrap();
        assert!(fixed.contains("WHERE v.reason = 'Flu' GROUP BY f.id, f.name, d.specialty)"));
        assert!(fixed.ends_with("SELECT name, specialty, count FROM ranked WHERE rn = 1 ORDER BY count DESC"));
    }

    #[test]
    fn test_ranked_cte_ignores_grouped_child() {
        let sql = "SELECT f.name, d.specialty, COUNT(v.id) AS n FROM facilities f JOIN doctors d ON d.facility_id = f.id \
                   JOIN visits v ON v.doctor_id = d.id GROUP BY f.name, d.specialty ORDER BY n DESC";
        assert!(ranks_children_per_facility(sql));
        assert_eq!(rank_top_child(sql), None);
    }

    #[test]
    fn test_ranked_cte_ignores_person_names() {
        let sql = "SELECT f.name, d.last_name, COUNT(v.id) AS n FROM facilities f JOIN doctors d ON d.facility_id = f.id \
                   JOIN visits v ON v.doctor_id = d.id GROUP BY f.name ORDER BY n DESC";
        assert_eq!(rank_top_child(sql), None);
    }

    #[test]
    fn test_subquery_split_on_triple_count() {
        let sql = "SELECT f.name, COUNT(d.id) AS doctors, COUNT(p.id) AS patients, COUNT(v.id) AS visits \
                   FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN patients p ON p.facility_id = f.id \
                   JOIN visits v ON v.doctor_id = d.id GROUP BY f.name LIMIT 3;";
        assert!(counts_across_fanout(sql));
        assert_eq!(
            split_into_subqueries(sql).unwrap(),
            "SELECT f.name, \
             (SELECT COUNT(*) FROM doctors d WHERE d.facility_id = f.id) AS doctors, \
             (SELECT COUNT(*) FROM patients p WHERE p.facility_id = f.id) AS patients, \
             (SELECT COUNT(*) FROM visits v JOIN doctors d ON v.doctor_id = d.id WHERE d.facility_id = f.id) AS visits \
             FROM facilities f ORDER BY visits DESC LIMIT 3"
        );
    }

    #[test]
    fn test_subquery_split_on_wrong_join_uses_default_names() {
        let sql = "SELECT f.name, COUNT(DISTINCT d.id), COUNT(DISTINCT p.id), COUNT(DISTINCT v.id) \
                   FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN patients p ON p.facility_id = f.id \
                   JOIN visits v ON f.id = v.doctor_id GROUP BY f.id";
        let fixed = split_into_subqueries(sql).unwrap();
        assert!(fixed.contains("AS num_doctors"));
        assert!(fixed.ends_with("FROM facilities f ORDER BY num_visits DESC"));
    }

    #[test]
    fn test_distinct_counts_with_correct_joins_untouched() {
        let sql = "SELECT f.name, COUNT(DISTINCT d.id), COUNT(DISTINCT p.id), COUNT(DISTINCT v.id) \
                   FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN patients p ON p.facility_id = f.id \
                   JOIN visits v ON v.doctor_id = d.id GROUP BY f.id";
        assert!(counts_across_fanout(sql));
        assert_eq!(split_into_subqueries(sql), None);
    }
}
