//! Prompt text describing the schema to the candidate generator
//!
//! The table and relationship sections are rendered from the typed catalogue
//! so the prompt and the repair rules never disagree about aliases.

use std::fmt::Write;
use std::sync::OnceLock;

use super::tables::{Table, TABLES};

const PREAMBLE: &str = "\
You are a SQL expert. Generate valid PostgreSQL SELECT queries only.

Output: return ONLY the SQL query. No explanation, no comment, no markdown, no text \
before or after. One single statement (semicolon optional).
";

const RULES: &str = "\
=== RULES ===

1) Aliases and JOINs
   Use the table aliases listed above and qualify every column with its alias (d.first_name, v.visit_date).
   Every alias used in SELECT/WHERE/HAVING must be introduced in FROM or JOIN.
   Join parent before child: FROM facilities f JOIN doctors d ON d.facility_id = f.id.

2) People have no name column
   doctors and patients have first_name and last_name only. For a full name use
   first_name || ' ' || last_name AS name (or doctor_name, patient_name).

3) Aggregates
   Never put COUNT/SUM/AVG/MIN/MAX in WHERE. Conditions on aggregates belong in HAVING after GROUP BY.

4) GROUP BY
   Every non-aggregated SELECT column must appear in GROUP BY. When grouping by an expression such as
   EXTRACT(MONTH FROM v.visit_date), do not also select the raw column.
   For \"one row per X with the Y that maximizes Z\" use a CTE with
   ROW_NUMBER() OVER (PARTITION BY X ORDER BY Z DESC) and keep rn = 1.

5) Listing entities
   For plain lists (doctors, patients, ...) return one row per entity with SELECT DISTINCT on identifying columns.
   When results are about doctors (counts, rankings, top N) always select d.first_name and d.last_name.

6) Independent counts under one parent
   Never join doctors, patients and visits together under one facility: the join multiplies the counts.
   Use one scalar subquery per count instead:
   SELECT f.name,
     (SELECT COUNT(*) FROM doctors d WHERE d.facility_id = f.id) AS num_doctors,
     (SELECT COUNT(*) FROM patients p WHERE p.facility_id = f.id) AS num_patients,
     (SELECT COUNT(*) FROM visits v JOIN doctors d ON v.doctor_id = d.id WHERE d.facility_id = f.id) AS num_visits
   FROM facilities f
   ORDER BY num_visits DESC;
   Visits reach a facility only through doctors. Never write f.id = v.doctor_id.

7) Single-dimension grouping
   For \"most frequent reason\" or \"top N by count\" GROUP BY only that column.
   GROUP BY cannot use column aliases: repeat the full expression
   (GROUP BY EXTRACT(MONTH FROM v.visit_date), EXTRACT(YEAR FROM v.visit_date)).

8) Dates
   Last week: v.visit_date >= CURRENT_DATE - INTERVAL '7 days' AND v.visit_date < CURRENT_DATE + INTERVAL '1 day'.
   This month: EXTRACT(MONTH FROM v.visit_date) = EXTRACT(MONTH FROM CURRENT_DATE)
   AND EXTRACT(YEAR FROM v.visit_date) = EXTRACT(YEAR FROM CURRENT_DATE).
   AS is only valid in SELECT; never write \"EXTRACT(...) AS month = ...\" in WHERE.
   Visits have no facility_id: FROM visits v JOIN doctors d ON v.doctor_id = d.id JOIN facilities f ON d.facility_id = f.id.

9) Search
   Person by name: (d.first_name = 'X' OR d.last_name = 'X') or first_name || ' ' || last_name ILIKE '%X%'.
   For \"top N\" add ORDER BY ... LIMIT N.

10) Read-only
    Only SELECT (and WITH for CTEs). No INSERT, UPDATE, DELETE, DROP, TRUNCATE, ALTER, CREATE, GRANT, REVOKE.
";

/// Immutable schema description handed verbatim to the generator
#[derive(Debug)]
pub struct SchemaContext {
    full: String,
    compact: String,
}

impl SchemaContext {
    /// Process-wide instance
    pub fn global() -> &'static SchemaContext {
        static CONTEXT: OnceLock<SchemaContext> = OnceLock::new();
        CONTEXT.get_or_init(|| SchemaContext::render(TABLES))
    }

    fn render(tables: &[Table]) -> Self {
        Self {
            full: render_full(tables),
            compact: render_compact(tables),
        }
    }

    /// Complete description with column types, relationships and authoring rules
    pub fn text(&self) -> &str {
        &self.full
    }

    /// One-paragraph description for small-context models
    pub fn compact(&self) -> &str {
        &self.compact
    }
}

fn render_full(tables: &[Table]) -> String {
    let mut out = String::from(PREAMBLE);
    out.push_str("\n=== DATABASE SCHEMA (PostgreSQL) ===\n");

    for table in tables {
        let _ = writeln!(out, "\nTable: {} (alias: {})", table.name, table.alias);
        for column in table.columns {
            let reference = table
                .foreign_keys
                .iter()
                .find(|fk| fk.column == column.name)
                .map(|fk| format!(" REFERENCES {}(id)", fk.references))
                .unwrap_or_default();
            let key = if column.name == "id" { " PRIMARY KEY" } else { "" };
            let _ = writeln!(
                out,
                "  {:<16} {}{}{}",
                column.name, column.data_type, key, reference
            );
        }
    }

    out.push_str("\n=== RELATIONSHIPS ===\n");
    for (parent, child, via) in relationships(tables) {
        let _ = writeln!(out, "  {} 1 --< {}  via {}", parent, child, via);
    }

    out.push('\n');
    out.push_str(RULES);
    out
}

fn render_compact(tables: &[Table]) -> String {
    let aliases: Vec<&str> = tables.iter().map(|t| t.alias).collect();
    let listing: Vec<String> = tables
        .iter()
        .map(|t| {
            let cols: Vec<&str> = t.columns.iter().map(|c| c.name).collect();
            format!("{}({}): {}", t.name, t.alias, cols.join(","))
        })
        .collect();
    let edges: Vec<String> = relationships(tables).into_iter().map(|(_, _, via)| via).collect();

    format!(
        "PostgreSQL schema (SELECT only). Use aliases {}. Qualify columns (e.g. d.first_name). \
         No d.name/p.name: use first_name || ' ' || last_name AS name.\n\
         Tables: {}.\n\
         FK: {}. Aggregates in HAVING not WHERE. GROUP BY every non-aggregated SELECT column or expression.",
        aliases.join(","),
        listing.join(" | "),
        edges.join(", ")
    )
}

/// (parent, child, join condition) for every foreign key
fn relationships(tables: &[Table]) -> Vec<(String, String, String)> {
    let mut edges = Vec::new();
    for child in tables {
        for fk in child.foreign_keys {
            let Some(parent) = tables.iter().find(|t| t.name == fk.references) else {
                continue;
            };
            edges.push((
                format!("{} ({})", parent.name, parent.alias),
                format!("{} ({})", child.name, child.alias),
                format!("{}.{} = {}.id", child.alias, fk.column, parent.alias),
            ));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_context_lists_every_table() {
        let text = SchemaContext::global().text();
        for table in TABLES {
            assert!(text.contains(&format!("Table: {} (alias: {})", table.name, table.alias)));
        }
        assert!(text.contains("visit_date"));
        assert!(text.contains("REFERENCES facilities(id)"));
    }

    #[test]
    fn test_relationships_rendered_from_foreign_keys() {
        let text = SchemaContext::global().text();
        assert!(text.contains("v.doctor_id = d.id"));
        assert!(text.contains("i.patient_id = p.id"));
        assert!(text.contains("f.organization_id = o.id"));
    }

    #[test]
    fn test_compact_context() {
        let compact = SchemaContext::global().compact();
        assert!(compact.contains("Use aliases o,f,d,p,i,v"));
        assert!(compact.contains("visits(v): id,doctor_id"));
        assert!(compact.len() < SchemaContext::global().text().len());
    }
}
