//! GROUP BY repairs around derived time buckets and person names

use super::cleanup::tidy;
use super::having::alias_bound_at_top_level;
use crate::query::scan::{
    matches_outside_literals, normalize, replace_outside_literals, splice, split_items, Clause,
    Clauses, Layout, SelectList,
};
use crate::schema;

macro_rules! extract_visit_date {
    () => {
        r"EXTRACT\s*\(\s*(\w+)\s+FROM\s+(v|visits)\s*\.\s*visit_date\s*\)"
    };
}

macro_rules! trunc_visit_date {
    () => {
        r"DATE_TRUNC\s*\(\s*'\w+'\s*,\s*(v|visits)\s*\.\s*visit_date\s*\)"
    };
}

fn derived_time() -> &'static regex::Regex {
    regex!(concat!("(?i)", extract_visit_date!(), "|", trunc_visit_date!()))
}

fn raw_visit_date() -> &'static regex::Regex {
    regex!(r"(?i)\b(?:v|visits)\s*\.\s*visit_date\b")
}

fn aggregate_call() -> &'static regex::Regex {
    regex!(r"(?i)\b(?:COUNT|SUM|AVG|MIN|MAX)\s*\(")
}

fn group_by_keyword() -> &'static regex::Regex {
    regex!(r"(?i)\bGROUP\s+BY\b")
}

/// `v.visit_date` as a whole SELECT item, optionally aliased
fn is_raw_visit_date_item(item: &str) -> bool {
    regex!(r"(?i)^(?:v|visits)\s*\.\s*visit_date(?:\s+(?:AS\s+)?\w+)?$").is_match(item)
}

// ============================================================================
// Derived time expression without GROUP BY
// ============================================================================

pub fn lacks_time_group_by(sql: &str) -> bool {
    !group_by_keyword().is_match(sql)
        && derived_time().is_match(sql)
        && aggregate_call().is_match(sql)
}

/// Group by every derived time expression of the SELECT list and turn
/// `COUNT(DISTINCT <time expr>)` into a row count.
pub fn add_time_group_by(sql: &str) -> Option<String> {
    let clauses = Clauses::parse(sql);
    let select = clauses.body(sql, Clause::Select)?;

    let mut seen = Vec::new();
    let mut keys = Vec::new();
    for m in derived_time().find_iter(select) {
        let key = normalize(m.as_str());
        if !seen.contains(&key) {
            seen.push(key);
            keys.push(m.as_str().to_string());
        }
    }
    if keys.is_empty() {
        return None;
    }

    let at = clauses.insertion_point(
        sql,
        &[Clause::Having, Clause::OrderBy, Clause::Limit, Clause::Offset],
    );
    let grouped = splice(sql, at..at, &format!(" GROUP BY {}", keys.join(", ")));

    let distinct_count = regex!(concat!(
        r"(?i)COUNT\s*\(\s*DISTINCT\s+(?:",
        extract_visit_date!(),
        "|",
        trunc_visit_date!(),
        r")\s*\)"
    ));
    let collapsed = distinct_count.replace_all(&grouped, |caps: &regex::Captures| {
        let qualifier = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or("v");
        format!("COUNT({}.id)", qualifier)
    });
    Some(collapsed.into_owned())
}

// ============================================================================
// Raw date next to a derived bucket
// ============================================================================

pub fn has_raw_date_conflict(sql: &str) -> bool {
    group_by_keyword().is_match(sql)
        && derived_time().is_match(sql)
        && raw_visit_date().is_match(sql)
}

/// Drop raw `v.visit_date` SELECT items when grouping by a derived bucket
pub fn drop_raw_date_items(sql: &str) -> Option<String> {
    let clauses = Clauses::parse(sql);
    let group_by = clauses.body(sql, Clause::GroupBy)?;
    if !derived_time().is_match(group_by) {
        return None;
    }

    let mut list = SelectList::of(sql, &clauses)?;
    let before = list.items.len();
    list.items.retain(|item| !is_raw_visit_date_item(item));
    if list.items.len() == before || list.items.is_empty() {
        return None;
    }
    Some(tidy(&list.write_back(sql)))
}

// ============================================================================
// Category grouped together with the raw date
// ============================================================================

pub fn has_dimension_with_raw_date(sql: &str) -> bool {
    group_by_keyword().is_match(sql)
        && regex!(r"(?i)\b(?:v|visits)\s*\.\s*(?:reason|diagnosis)\b").is_match(sql)
        && raw_visit_date().is_match(sql)
}

/// `GROUP BY v.reason, v.visit_date` counting per reason: the date splits
/// every category into per-day rows, so it goes from GROUP BY and SELECT.
pub fn collapse_to_dimension(sql: &str) -> Option<String> {
    let clauses = Clauses::parse(sql);
    let group_range = clauses.body_range(sql, Clause::GroupBy)?;
    let group_items = split_items(&sql[group_range.clone()]);

    let dimension = regex!(r"(?i)^(?:v|visits)\s*\.\s*(?:reason|diagnosis)$");
    let date = regex!(r"(?i)^(?:v|visits)\s*\.\s*visit_date$");
    if !group_items.iter().any(|item| dimension.is_match(item))
        || !group_items.iter().any(|item| date.is_match(item))
    {
        return None;
    }

    let mut list = SelectList::of(sql, &clauses)?;
    if !list.items.iter().any(|item| regex!(r"(?i)\bCOUNT\s*\(").is_match(item)) {
        return None;
    }

    let remaining: Vec<&str> = group_items
        .iter()
        .filter(|item| !date.is_match(item))
        .map(String::as_str)
        .collect();
    // GROUP BY comes after the SELECT list, so edit it first
    let regrouped = splice(sql, group_range, &remaining.join(", "));

    list.items.retain(|item| !is_raw_visit_date_item(item));
    if list.items.is_empty() {
        return Some(regrouped);
    }
    Some(list.write_back(&regrouped))
}

// ============================================================================
// Person names need their identity columns in GROUP BY
// ============================================================================

pub fn groups_person_names(sql: &str) -> bool {
    group_by_keyword().is_match(sql)
        && regex!(r"(?i)\b\w+\s*\.\s*(?:first_name|last_name)\b").is_match(sql)
        && !ungrouped_person_aliases(sql).is_empty()
}

/// Doctor/patient aliases whose names are selected without aggregation
/// while GROUP BY holds none of that alias's `id`, `first_name` or
/// `last_name`.
fn ungrouped_person_aliases(sql: &str) -> Vec<&'static str> {
    let clauses = Clauses::parse(sql);
    let (Some(group_range), Some(list)) = (
        clauses.body_range(sql, Clause::GroupBy),
        SelectList::of(sql, &clauses),
    ) else {
        return Vec::new();
    };
    let grouped: Vec<String> = split_items(&sql[group_range])
        .iter()
        .map(|item| normalize(item))
        .collect();

    schema::person_tables()
        .map(|table| table.alias)
        .filter(|alias| {
            let Ok(name_ref) = regex::Regex::new(&format!(
                r"(?i)\b{}\s*\.\s*(?:first_name|last_name)\b",
                regex::escape(alias)
            )) else {
                return false;
            };
            let selects_names = list
                .items
                .iter()
                .any(|item| name_ref.is_match(item) && !aggregate_call().is_match(item));
            let identity_grouped = ["id", "first_name", "last_name"]
                .iter()
                .any(|column| grouped.contains(&normalize(&format!("{}.{}", alias, column))));
            selects_names && !identity_grouped && alias_bound_at_top_level(sql, &clauses, alias)
        })
        .collect()
}

/// Append `<alias>.id, <alias>.first_name, <alias>.last_name` to GROUP BY
/// for every person alias returned by `ungrouped_person_aliases`. Existing
/// grouping keys are never removed.
pub fn add_identity_columns(sql: &str) -> Option<String> {
    let aliases = ungrouped_person_aliases(sql);
    if aliases.is_empty() {
        return None;
    }
    let group_range = Clauses::parse(sql).body_range(sql, Clause::GroupBy)?;

    let additions: Vec<String> = aliases
        .iter()
        .flat_map(|alias| {
            ["id", "first_name", "last_name"]
                .into_iter()
                .map(move |column| format!("{}.{}", alias, column))
        })
        .collect();
    let at = group_range.end;
    Some(splice(sql, at..at, &format!(", {}", additions.join(", "))))
}

// ============================================================================
// Time bucket aliases
// ============================================================================

pub fn has_unaliased_time_part(sql: &str) -> bool {
    regex!(r"(?i)EXTRACT\s*\(\s*(?:MONTH|YEAR)\s+FROM\s+(?:v|visits)\s*\.\s*visit_date\s*\)")
        .is_match(sql)
}

/// `EXTRACT(MONTH FROM v.visit_date)` selected bare becomes `... AS month`
/// (`AS year` likewise) unless that output name is already taken.
pub fn alias_time_parts(sql: &str) -> Option<String> {
    let clauses = Clauses::parse(sql);
    let mut list = SelectList::of(sql, &clauses)?;
    let bare = regex!(
        r"(?i)^EXTRACT\s*\(\s*(MONTH|YEAR)\s+FROM\s+(?:v|visits)\s*\.\s*visit_date\s*\)$"
    );
    let output_name = regex!(r"(?i)(?:\bAS\s+|\s)(\w+)$");

    let mut taken: Vec<String> = list
        .items
        .iter()
        .filter(|item| !bare.is_match(item))
        .filter_map(|item| output_name.captures(item))
        .map(|caps| caps[1].to_ascii_lowercase())
        .collect();

    let mut changed = false;
    for item in list.items.iter_mut() {
        let Some(caps) = bare.captures(item) else {
            continue;
        };
        let alias = caps[1].to_ascii_lowercase();
        if taken.contains(&alias) {
            continue;
        }
        item.push_str(&format!(" AS {}", alias));
        taken.push(alias);
        changed = true;
    }

    changed.then(|| list.write_back(sql))
}

// ============================================================================
// Output alias inside a comparison
// ============================================================================

fn aliased_comparison() -> &'static regex::Regex {
    regex!(r"(?i)\b(EXTRACT\s*\(\s*(?:MONTH|YEAR)\s+FROM\s+[^)]+\))\s+AS\s+\w+\s*=\s*")
}

pub fn has_aliased_comparison(sql: &str) -> bool {
    matches_outside_literals(sql, aliased_comparison())
}

/// `EXTRACT(YEAR FROM v.visit_date) AS year = 2024` loses the alias
pub fn drop_comparison_alias(sql: &str) -> Option<String> {
    Some(replace_outside_literals(sql, aliased_comparison(), "${1} = "))
}

// ============================================================================
// Output aliases inside GROUP BY
// ============================================================================

pub fn has_group_by_alias(sql: &str) -> bool {
    group_by_keyword().is_match(sql) && regex!(r"(?i)\)\s+AS\s+\w+").is_match(sql)
}

/// Remove `AS name` after a parenthesised GROUP BY key, in the outer query
/// and in every subquery. Only aliases at the GROUP BY's own depth count, so
/// `CAST(... AS type)` survives.
pub fn strip_group_by_aliases(sql: &str) -> Option<String> {
    let layout = Layout::new(sql);
    let stop = regex!(
        r"(?i)\b(?:HAVING|ORDER\s+BY|LIMIT|OFFSET|UNION|INTERSECT|EXCEPT|WINDOW)\b|;"
    );
    let alias = regex!(r"(?i)\)\s+AS\s+\w+");

    let mut edits = Vec::new();
    for keyword in group_by_keyword().find_iter(sql) {
        let Some(depth) = layout.depth_at(keyword.start()) else {
            continue;
        };
        let start = keyword.end();
        let mut end = (start..sql.len())
            .find(|&i| matches!(layout.depth_at(i), Some(d) if d < depth))
            .unwrap_or(sql.len());
        if let Some(m) = stop
            .find_iter(&sql[start..end])
            .find(|m| layout.depth_at(start + m.start()) == Some(depth))
        {
            end = start + m.start();
        }

        for m in alias.find_iter(&sql[start..end]) {
            let at = start + m.start();
            if layout.depth_at(at) == Some(depth) {
                edits.push(at..start + m.end());
            }
        }
    }

    if edits.is_empty() {
        return None;
    }
    let mut out = sql.to_string();
    for range in edits.into_iter().rev() {
        out = splice(&out, range.start..range.end, ")");
    }
    Some(out)
}
