//! Join chain corrections for visits → doctors → facilities.
//!
//! visits has no facility_id; the only path to a facility goes through the
//! attending doctor.

use crate::query::scan::{matches_outside_literals, replace_outside_literals};

const FACILITY_VIA_DOCTOR: &str =
    "FROM visits v JOIN doctors d ON v.doctor_id = d.id JOIN facilities f ON d.facility_id = f.id";

fn forward_reference() -> &'static regex::Regex {
    // `d` is used in the first ON before doctors is joined
    regex!(
        r"(?is)\bFROM\s+visits\s+v\s+JOIN\s+facilities\s+f\s+ON\s+v\.doctor_id\s*=\s*d\.id\s+JOIN\s+doctors\s+d\s+ON\s+d\.facility_id\s*=\s*f\.id\b"
    )
}

fn phantom_facility_column() -> &'static regex::Regex {
    regex!(
        r"(?i)\bFROM\s+visits\s+v\s+JOIN\s+facilities\s+f\s+ON\s+v\.doctor_id\s*=\s*d\.id\s+(?:AND\s+)?v\.facility_id\s*=\s*f\.id\b"
    )
}

pub fn has_broken_facility_join(sql: &str) -> bool {
    matches_outside_literals(sql, forward_reference())
        || matches_outside_literals(sql, phantom_facility_column())
}

pub fn rewrite_facility_join(sql: &str) -> Option<String> {
    let fixed = replace_outside_literals(
        sql,
        forward_reference(),
        "FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN visits v ON v.doctor_id = d.id",
    );
    Some(replace_outside_literals(
        &fixed,
        phantom_facility_column(),
        FACILITY_VIA_DOCTOR,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_reference_reordered() {
        let sql = "SELECT f.name, COUNT(v.id) FROM visits v JOIN facilities f ON v.doctor_id = d.id JOIN doctors d ON d.facility_id = f.id GROUP BY f.name";
        assert!(has_broken_facility_join(sql));
        assert_eq!(
            rewrite_facility_join(sql).unwrap(),
            "SELECT f.name, COUNT(v.id) FROM facilities f JOIN doctors d ON d.facility_id = f.id JOIN visits v ON v.doctor_id = d.id GROUP BY f.name"
        );
    }

    #[test]
    fn test_phantom_facility_column_replaced() {
        let sql = "SELECT f.name FROM visits v JOIN facilities f ON v.doctor_id = d.id AND v.facility_id = f.id WHERE v.reason = 'Flu'";
        assert!(has_broken_facility_join(sql));
        assert_eq!(
            rewrite_facility_join(sql).unwrap(),
            "SELECT f.name FROM visits v JOIN doctors d ON v.doctor_id = d.id JOIN facilities f ON d.facility_id = f.id WHERE v.reason = 'Flu'"
        );
    }

    #[test]
    fn test_correct_chain_is_untouched() {
        let sql = "SELECT f.name FROM visits v JOIN doctors d ON v.doctor_id = d.id JOIN facilities f ON d.facility_id = f.id";
        assert!(!has_broken_facility_join(sql));
    }
}
