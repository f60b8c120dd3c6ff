//! Typed catalogue of the clinic schema

use serde::Serialize;

/// Column definition
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Column {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub data_type: &'static str,
}

/// Foreign-key edge from `column` to `references`.id
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
}

/// Table definition with its canonical short alias
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Table {
    pub name: &'static str,
    pub alias: &'static str,
    pub columns: &'static [Column],
    pub foreign_keys: &'static [ForeignKey],
}

impl Table {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
    }
}

const fn col(name: &'static str, data_type: &'static str) -> Column {
    Column { name, data_type }
}

const fn fk(column: &'static str, references: &'static str) -> ForeignKey {
    ForeignKey { column, references }
}

pub const TABLES: &[Table] = &[
    Table {
        name: "organizations",
        alias: "o",
        columns: &[
            col("id", "SERIAL"),
            col("name", "VARCHAR(255)"),
            col("address", "TEXT"),
            col("phone", "VARCHAR(20)"),
            col("created_at", "TIMESTAMP"),
            col("updated_at", "TIMESTAMP"),
        ],
        foreign_keys: &[],
    },
    Table {
        name: "facilities",
        alias: "f",
        columns: &[
            col("id", "SERIAL"),
            col("organization_id", "INTEGER"),
            col("name", "VARCHAR(255)"),
            col("address", "TEXT"),
            col("phone", "VARCHAR(20)"),
            col("created_at", "TIMESTAMP"),
            col("updated_at", "TIMESTAMP"),
        ],
        foreign_keys: &[fk("organization_id", "organizations")],
    },
    Table {
        name: "doctors",
        alias: "d",
        columns: &[
            col("id", "SERIAL"),
            col("facility_id", "INTEGER"),
            col("first_name", "VARCHAR(100)"),
            col("last_name", "VARCHAR(100)"),
            col("email", "VARCHAR(255)"),
            col("phone", "VARCHAR(20)"),
            col("specialty", "VARCHAR(100)"),
            col("created_at", "TIMESTAMP"),
            col("updated_at", "TIMESTAMP"),
        ],
        foreign_keys: &[fk("facility_id", "facilities")],
    },
    Table {
        name: "patients",
        alias: "p",
        columns: &[
            col("id", "SERIAL"),
            col("facility_id", "INTEGER"),
            col("first_name", "VARCHAR(100)"),
            col("last_name", "VARCHAR(100)"),
            col("email", "VARCHAR(255)"),
            col("phone", "VARCHAR(20)"),
            col("date_of_birth", "DATE"),
            col("address", "TEXT"),
            col("created_at", "TIMESTAMP"),
            col("updated_at", "TIMESTAMP"),
        ],
        foreign_keys: &[fk("facility_id", "facilities")],
    },
    Table {
        name: "insurances",
        alias: "i",
        columns: &[
            col("id", "SERIAL"),
            col("patient_id", "INTEGER"),
            col("provider_name", "VARCHAR(255)"),
            col("policy_number", "VARCHAR(100)"),
            col("group_number", "VARCHAR(100)"),
            col("effective_date", "DATE"),
            col("expiration_date", "DATE"),
            col("created_at", "TIMESTAMP"),
            col("updated_at", "TIMESTAMP"),
        ],
        foreign_keys: &[fk("patient_id", "patients")],
    },
    Table {
        name: "visits",
        alias: "v",
        columns: &[
            col("id", "SERIAL"),
            col("doctor_id", "INTEGER"),
            col("patient_id", "INTEGER"),
            col("visit_date", "TIMESTAMP"),
            col("reason", "TEXT"),
            col("diagnosis", "TEXT"),
            col("notes", "TEXT"),
            col("created_at", "TIMESTAMP"),
            col("updated_at", "TIMESTAMP"),
        ],
        foreign_keys: &[fk("doctor_id", "doctors"), fk("patient_id", "patients")],
    },
];

/// Table bound to a canonical alias (`v` → visits)
pub fn table_for_alias(alias: &str) -> Option<&'static Table> {
    TABLES.iter().find(|t| t.alias.eq_ignore_ascii_case(alias))
}

/// Canonical alias of a table (`visits` → `v`)
pub fn alias_for_table(name: &str) -> Option<&'static str> {
    table(name).map(|t| t.alias)
}

/// Table by name
pub fn table(name: &str) -> Option<&'static Table> {
    TABLES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Tables that carry person name columns (first_name/last_name)
pub fn person_tables() -> impl Iterator<Item = &'static Table> {
    TABLES
        .iter()
        .filter(|t| t.has_column("first_name") && t.has_column("last_name"))
}
