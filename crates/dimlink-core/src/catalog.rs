//! Nested catalog of column types
//!
//! Shape: `database → schema → table → column → DimensionType`. Serializes
//! transparently as nested JSON objects.

use crate::dimension::DimensionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column name → dimension type for one table
pub type TableColumns = BTreeMap<String, DimensionType>;

/// Table name → columns
pub type SchemaTables = BTreeMap<String, TableColumns>;

/// Schema name → tables
pub type DatabaseSchemas = BTreeMap<String, SchemaTables>;

/// Type information for a set of warehouse tables
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseCatalog {
    databases: BTreeMap<String, DatabaseSchemas>,
}

impl WarehouseCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the type of one column, creating intermediate levels as needed
    pub fn insert(
        &mut self,
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        dimension_type: DimensionType,
    ) {
        self.databases
            .entry(database.into())
            .or_default()
            .entry(schema.into())
            .or_default()
            .entry(table.into())
            .or_default()
            .insert(column.into(), dimension_type);
    }

    /// Columns of one table, if present
    pub fn table(&self, database: &str, schema: &str, table: &str) -> Option<&TableColumns> {
        self.databases.get(database)?.get(schema)?.get(table)
    }

    /// Type of one column, if present
    pub fn column_type(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Option<DimensionType> {
        self.table(database, schema, table)?.get(column).copied()
    }

    /// Database level view
    pub fn databases(&self) -> &BTreeMap<String, DatabaseSchemas> {
        &self.databases
    }

    /// Number of tables across all databases and schemas
    pub fn table_count(&self) -> usize {
        self.databases
            .values()
            .flat_map(|schemas| schemas.values())
            .map(|tables| tables.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn insert_and_lookup() {
        let mut catalog = WarehouseCatalog::new();
        assert!(catalog.is_empty());

        catalog.insert("analytics", "public", "users", "id", DimensionType::Number);
        catalog.insert("analytics", "public", "users", "email", DimensionType::String);
        catalog.insert("analytics", "sales", "orders", "placed_at", DimensionType::Timestamp);

        assert!(!catalog.is_empty());
        assert_eq!(catalog.table_count(), 2);
        assert_eq!(
            catalog.column_type("analytics", "public", "users", "id"),
            Some(DimensionType::Number)
        );
        assert_eq!(catalog.table("analytics", "public", "users").map(|t| t.len()), Some(2));
        assert!(catalog.column_type("analytics", "public", "users", "missing").is_none());
        assert!(catalog.table("other", "public", "users").is_none());
    }

    #[test]
    fn serializes_as_nested_objects() {
        let mut catalog = WarehouseCatalog::new();
        catalog.insert("db", "public", "events", "happened_on", DimensionType::Date);
        catalog.insert("db", "public", "events", "is_test", DimensionType::Boolean);

        let value = serde_json::to_value(&catalog).unwrap();
        assert_eq!(
            value,
            json!({
                "db": {
                    "public": {
                        "events": {
                            "happened_on": "DATE",
                            "is_test": "BOOLEAN"
                        }
                    }
                }
            })
        );

        let parsed: WarehouseCatalog = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, catalog);
    }
}
