//! Deterministic repair of generated SQL
//!
//! Each rule is a guard plus a transform over the statement text. Rules run
//! in a fixed order, every rule sees the output of the previous one, and a
//! rule whose guard does not hold leaves the text alone. The pipeline is
//! idempotent: repairing already-repaired SQL changes nothing.

mod cleanup;
mod fanout;
mod grouping;
mod having;
mod joins;

/// One named rewrite
#[derive(Clone, Copy)]
pub struct RepairRule {
    pub name: &'static str,
    guard: fn(&str) -> bool,
    transform: fn(&str) -> Option<String>,
}

impl RepairRule {
    pub const fn new(
        name: &'static str,
        guard: fn(&str) -> bool,
        transform: fn(&str) -> Option<String>,
    ) -> Self {
        Self {
            name,
            guard,
            transform,
        }
    }

    /// Rewritten text, or `None` if the rule does not apply
    pub fn apply(&self, sql: &str) -> Option<String> {
        if !(self.guard)(sql) {
            return None;
        }
        (self.transform)(sql).filter(|fixed| fixed != sql)
    }
}

impl std::fmt::Debug for RepairRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairRule").field("name", &self.name).finish()
    }
}

/// Repaired statement plus the rules that changed it, in application order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub sql: String,
    pub applied: Vec<&'static str>,
}

impl Repaired {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Ordered rule list
#[derive(Debug, Clone)]
pub struct RepairPipeline {
    rules: Vec<RepairRule>,
}

impl Default for RepairPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl RepairPipeline {
    pub fn new(rules: Vec<RepairRule>) -> Self {
        Self { rules }
    }

    /// The production rule order
    pub fn standard() -> Self {
        Self::new(vec![
            RepairRule::new("strip_backticks", cleanup::has_backticks, cleanup::strip_backticks),
            RepairRule::new("trailing_debris", cleanup::has_debris, cleanup::remove_debris),
            RepairRule::new("cte_header", cleanup::lacks_cte_header, cleanup::prepend_cte_header),
            RepairRule::new(
                "aggregate_where_to_having",
                having::has_aggregate_in_where,
                having::move_to_having,
            ),
            RepairRule::new(
                "derived_time_group_by",
                grouping::lacks_time_group_by,
                grouping::add_time_group_by,
            ),
            RepairRule::new(
                "raw_date_conflict",
                grouping::has_raw_date_conflict,
                grouping::drop_raw_date_items,
            ),
            RepairRule::new(
                "dimension_collapse",
                grouping::has_dimension_with_raw_date,
                grouping::collapse_to_dimension,
            ),
            RepairRule::new(
                "identity_columns",
                grouping::groups_person_names,
                grouping::add_identity_columns,
            ),
            RepairRule::new(
                "time_part_aliases",
                grouping::has_unaliased_time_part,
                grouping::alias_time_parts,
            ),
            RepairRule::new(
                "comparison_alias",
                grouping::has_aliased_comparison,
                grouping::drop_comparison_alias,
            ),
            RepairRule::new(
                "semicolon_before_group_by",
                cleanup::has_semicolon_before_group_by,
                cleanup::merge_semicolon_before_group_by,
            ),
            RepairRule::new(
                "group_by_alias",
                grouping::has_group_by_alias,
                grouping::strip_group_by_aliases,
            ),
            RepairRule::new(
                "facility_join_chain",
                joins::has_broken_facility_join,
                joins::rewrite_facility_join,
            ),
            RepairRule::new(
                "ranked_child_per_facility",
                fanout::ranks_children_per_facility,
                fanout::rank_top_child,
            ),
            RepairRule::new(
                "fanout_subqueries",
                fanout::counts_across_fanout,
                fanout::split_into_subqueries,
            ),
            RepairRule::new("trailing_debris", cleanup::has_debris, cleanup::remove_debris),
        ])
    }

    pub fn rules(&self) -> &[RepairRule] {
        &self.rules
    }

    pub fn repair(&self, sql: &str) -> Repaired {
        let mut current = sql.to_string();
        let mut applied = Vec::new();
        for rule in &self.rules {
            if let Some(fixed) = rule.apply(&current) {
                tracing::debug!(rule = rule.name, before = %current, after = %fixed, "Repair rule applied");
                current = fixed;
                applied.push(rule.name);
            }
        }
        Repaired {
            sql: current,
            applied,
        }
    }
}

/// Repair with the standard rule order
pub fn repair(sql: &str) -> Repaired {
    RepairPipeline::standard().repair(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Statements the generator has produced, with their repaired form
    const GOLDEN: &[(&str, &str)] = &[
        (
            "SELECT v.id FROM visits v WHERE COUNT(v.id) > 5",
            "SELECT v.id FROM visits v GROUP BY v.id HAVING COUNT(v.id) > 5",
        ),
        (
            "SELECT `d`.`first_name`, `d`.`last_name`, COUNT(v.id) AS visits FROM doctors d \
             JOIN visits v ON v.doctor_id = d.id GROUP BY v.doctor_id ORDER BY visits DESC",
            "SELECT d.first_name, d.last_name, COUNT(v.id) AS visits FROM doctors d \
             JOIN visits v ON v.doctor_id = d.id GROUP BY v.doctor_id, d.id, d.first_name, d.last_name ORDER BY visits DESC",
        ),
        (
            "SELECT EXTRACT(MONTH FROM v.visit_date), COUNT(v.id) FROM visits v ORDER BY 1",
            "SELECT EXTRACT(MONTH FROM v.visit_date) AS month, COUNT(v.id) FROM visits v \
             GROUP BY EXTRACT(MONTH FROM v.visit_date) ORDER BY 1",
        ),
        (
            "SELECT v.reason, COUNT(*) AS n FROM visits v; GROUP BY v.reason ORDER BY n DESC",
            "SELECT v.reason, COUNT(*) AS n FROM visits v GROUP BY v.reason ORDER BY n DESC",
        ),
        (
            "SELECT EXTRACT(YEAR FROM v.visit_date) AS year, COUNT(*) FROM visits v \
             GROUP BY EXTRACT(YEAR FROM v.visit_date) AS year",
            "SELECT EXTRACT(YEAR FROM v.visit_date) AS year, COUNT(*) FROM visits v \
             GROUP BY EXTRACT(YEAR FROM v.visit_date)",
        ),
        (
            "SELECT f.name, d.specialty, COUNT(v.id) AS visit_count FROM visits v \
             JOIN facilities f ON v.doctor_id = d.id JOIN doctors d ON d.facility_id = f.id \
             GROUP BY f.name ORDER BY visit_count DESC",
            "WITH ranked AS (SELECT f.name AS name, d.specialty AS specialty, COUNT(v.id) AS visit_count, \
             ROW_NUMBER() OVER (PARTITION BY f.id ORDER BY COUNT(v.id) DESC) AS rn \
             FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN visits v ON v.doctor_id = d.id \
             GROUP BY f.id, f.name, d.specialty) \
             SELECT name, specialty, visit_count FROM ranked WHERE rn = 1 ORDER BY visit_count DESC",
        ),
        (
            "SELECT d.id, COUNT(v.id) AS n FROM doctors d JOIN visits v ON v.doctor_id = d.id GROUP BY d.id, ) \
             SELECT * FROM cte ORDER BY n DESC",
            "WITH cte AS (SELECT d.id, COUNT(v.id) AS n FROM doctors d JOIN visits v ON v.doctor_id = d.id GROUP BY d.id) \
             SELECT * FROM cte ORDER BY n DESC",
        ),
        (
            "SELECT v.visit_date, EXTRACT(MONTH FROM v.visit_date) AS month, COUNT(v.id) FROM visits v \
             GROUP BY EXTRACT(MONTH FROM v.visit_date)",
            "SELECT EXTRACT(MONTH FROM v.visit_date) AS month, COUNT(v.id) FROM visits v \
             GROUP BY EXTRACT(MONTH FROM v.visit_date)",
        ),
        (
            "SELECT v.reason, v.visit_date, COUNT(*) AS n FROM visits v GROUP BY v.reason, v.visit_date \
             ORDER BY n DESC LIMIT 1",
            "SELECT v.reason, COUNT(*) AS n FROM visits v GROUP BY v.reason ORDER BY n DESC LIMIT 1",
        ),
        (
            "SELECT COUNT(*) FROM visits v WHERE EXTRACT(YEAR FROM v.visit_date) AS year = 2024",
            "SELECT COUNT(*) FROM visits v WHERE EXTRACT(YEAR FROM v.visit_date) = 2024",
        ),
        (
            "SELECT f.name FROM visits v JOIN facilities f ON v.doctor_id = d.id AND v.facility_id = f.id \
             WHERE v.reason = 'Flu'",
            "SELECT f.name FROM visits v JOIN doctors d ON v.doctor_id = d.id JOIN facilities f ON d.facility_id = f.id \
             WHERE v.reason = 'Flu'",
        ),
        (
            "SELECT f.name, COUNT(d.id) AS doctors, COUNT(p.id) AS patients, COUNT(v.id) AS visits \
             FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN patients p ON p.facility_id = f.id \
             JOIN visits v ON v.doctor_id = d.id GROUP BY f.name LIMIT 3",
            "SELECT f.name, \
             (SELECT COUNT(*) FROM doctors d WHERE d.facility_id = f.id) AS doctors, \
             (SELECT COUNT(*) FROM patients p WHERE p.facility_id = f.id) AS patients, \
             (SELECT COUNT(*) FROM visits v JOIN doctors d ON v.doctor_id = d.id WHERE d.facility_id = f.id) AS visits \
             FROM facilities f ORDER BY visits DESC LIMIT 3",
        ),
    ];

    /// Valid statements no rule may touch
    const UNCHANGED: &[&str] = &[
        "SELECT p.first_name, p.last_name FROM patients p WHERE p.gender = 'F' ORDER BY p.last_name LIMIT 10",
        "SELECT p.first_name, COUNT(*) AS n FROM patients p GROUP BY p.first_name",
        "SELECT d.first_name, d.last_name, COUNT(v.id) AS n FROM doctors d \
         JOIN visits v ON v.doctor_id = d.id GROUP BY d.first_name, d.last_name",
        "SELECT f.name FROM visits v JOIN doctors d ON v.doctor_id = d.id JOIN facilities f ON d.facility_id = f.id",
    ];

    #[test]
    fn test_golden_repairs() {
        for (input, expected) in GOLDEN {
            assert_eq!(&repair(input).sql, expected, "input: {}", input);
        }
    }

    #[test]
    fn test_repair_is_idempotent() {
        for (input, _) in GOLDEN {
            let once = repair(input);
            let twice = repair(&once.sql);
            assert_eq!(twice.sql, once.sql, "input: {}", input);
            assert!(!twice.changed(), "rules fired twice: {:?}", twice.applied);
        }
    }

    #[test]
    fn test_valid_sql_passes_unchanged() {
        for sql in UNCHANGED {
            let repaired = repair(sql);
            assert_eq!(&repaired.sql, sql);
            assert!(repaired.applied.is_empty(), "rules fired: {:?}", repaired.applied);
        }
    }

    #[test]
    fn test_golden_covers_every_rule() {
        let mut fired: Vec<&str> = GOLDEN
            .iter()
            .flat_map(|(input, _)| repair(input).applied)
            .collect();
        fired.sort_unstable();
        fired.dedup();
        for rule in RepairPipeline::standard().rules() {
            assert!(fired.contains(&rule.name), "no golden case for {}", rule.name);
        }
    }

    #[test]
    fn test_applied_rules_are_reported_in_order() {
        let repaired = repair("SELECT `v`.`id` FROM visits v WHERE COUNT(v.id) > 5");
        assert_eq!(repaired.applied, vec!["strip_backticks", "aggregate_where_to_having"]);
    }

    #[test]
    fn test_literals_are_not_rewritten() {
        let sql = "SELECT v.id FROM visits v WHERE v.notes = 'a,, b; GROUP BY x'";
        assert_eq!(repair(sql).sql, sql);
    }

    #[test]
    fn test_custom_pipeline() {
        let pipeline = RepairPipeline::new(vec![RepairRule::new(
            "strip_backticks",
            cleanup::has_backticks,
            cleanup::strip_backticks,
        )]);
        assert_eq!(pipeline.rules().len(), 1);
        assert_eq!(pipeline.repair("SELECT `a` FROM t").sql, "SELECT a FROM t");
    }
}
