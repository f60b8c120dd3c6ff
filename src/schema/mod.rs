pub mod context;
pub mod tables;

pub use context::SchemaContext;
pub use tables::{alias_for_table, person_tables, table, table_for_alias, Column, ForeignKey, Table, TABLES};
