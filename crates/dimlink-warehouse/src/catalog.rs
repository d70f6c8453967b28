//! Catalog reduction over `information_schema.columns` rows

use crate::client::TableIdentifier;
use crate::types::dimension_type_for_name;
use dimlink_core::WarehouseCatalog;
use std::collections::BTreeSet;

/// Columns query, filtered by the distinct names of the requested tables
///
/// The three `ANY` filters over-select (their cross product); rows are
/// narrowed to the exact requested tuples by [`reduce_catalog`].
pub const CATALOG_QUERY: &str = r#"
    SELECT
        table_catalog::text,
        table_schema::text,
        table_name::text,
        column_name::text,
        data_type::text
    FROM information_schema.columns
    WHERE table_catalog::text = ANY($1::text[])
      AND table_schema::text = ANY($2::text[])
      AND table_name::text = ANY($3::text[])
    ORDER BY table_catalog, table_schema, table_name, ordinal_position
"#;

/// One row of the columns query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub table_catalog: String,
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

impl CatalogRow {
    pub fn new(
        table_catalog: impl Into<String>,
        table_schema: impl Into<String>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            table_catalog: table_catalog.into(),
            table_schema: table_schema.into(),
            table_name: table_name.into(),
            column_name: column_name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Distinct database, schema and table names across a set of requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFilter {
    pub databases: Vec<String>,
    pub schemas: Vec<String>,
    pub tables: Vec<String>,
}

impl CatalogFilter {
    /// Collect the filter sets, or `None` when any of them is empty
    pub fn from_requests(requests: &[TableIdentifier]) -> Option<Self> {
        let mut databases = BTreeSet::new();
        let mut schemas = BTreeSet::new();
        let mut tables = BTreeSet::new();

        for request in requests {
            if !request.database.is_empty() {
                databases.insert(request.database.clone());
            }
            if !request.schema.is_empty() {
                schemas.insert(request.schema.clone());
            }
            if !request.table.is_empty() {
                tables.insert(request.table.clone());
            }
        }

        if databases.is_empty() || schemas.is_empty() || tables.is_empty() {
            return None;
        }

        Some(Self {
            databases: databases.into_iter().collect(),
            schemas: schemas.into_iter().collect(),
            tables: tables.into_iter().collect(),
        })
    }
}

/// Fold columns rows into a nested catalog
///
/// Rows whose `(catalog, schema, table)` is not one of `requests` are
/// dropped.
pub fn reduce_catalog<I>(requests: &[TableIdentifier], rows: I) -> WarehouseCatalog
where
    I: IntoIterator<Item = CatalogRow>,
{
    let mut catalog = WarehouseCatalog::new();

    for row in rows {
        let requested = requests
            .iter()
            .any(|r| r.matches(&row.table_catalog, &row.table_schema, &row.table_name));
        if !requested {
            continue;
        }

        let dimension_type = dimension_type_for_name(&row.data_type);
        catalog.insert(
            row.table_catalog,
            row.table_schema,
            row.table_name,
            row.column_name,
            dimension_type,
        );
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimlink_core::DimensionType;
    use pretty_assertions::assert_eq;

    fn rows() -> Vec<CatalogRow> {
        vec![
            CatalogRow::new("analytics", "public", "users", "id", "integer"),
            CatalogRow::new("analytics", "public", "users", "signed_up", "date"),
            CatalogRow::new("analytics", "public", "users", "is_admin", "boolean"),
            CatalogRow::new("analytics", "public", "orders", "amount", "numeric"),
            CatalogRow::new("analytics", "sales", "users", "region", "character varying"),
            CatalogRow::new("analytics", "sales", "orders", "placed_at", "timestamp with time zone"),
        ]
    }

    #[test]
    fn filter_collects_distinct_names() {
        let requests = vec![
            TableIdentifier::new("analytics", "public", "users"),
            TableIdentifier::new("analytics", "sales", "orders"),
        ];
        let filter = CatalogFilter::from_requests(&requests).unwrap();

        assert_eq!(filter.databases, vec!["analytics"]);
        assert_eq!(filter.schemas, vec!["public", "sales"]);
        assert_eq!(filter.tables, vec!["orders", "users"]);
    }

    #[test]
    fn filter_is_none_when_any_set_is_empty() {
        assert!(CatalogFilter::from_requests(&[]).is_none());
        assert!(CatalogFilter::from_requests(&[TableIdentifier::new("", "public", "users")]).is_none());
        assert!(CatalogFilter::from_requests(&[TableIdentifier::new("db", "", "users")]).is_none());
        assert!(CatalogFilter::from_requests(&[TableIdentifier::new("db", "public", "")]).is_none());
    }

    #[test]
    fn reduce_keeps_only_requested_tuples() {
        let requests = vec![
            TableIdentifier::new("analytics", "public", "users"),
            TableIdentifier::new("analytics", "sales", "orders"),
        ];

        let catalog = reduce_catalog(&requests, rows());

        assert_eq!(catalog.table_count(), 2);
        // Cross-product rows that the ANY filters let through are excluded
        assert!(catalog.table("analytics", "public", "orders").is_none());
        assert!(catalog.table("analytics", "sales", "users").is_none());

        assert_eq!(
            catalog.column_type("analytics", "public", "users", "id"),
            Some(DimensionType::Number)
        );
        assert_eq!(
            catalog.column_type("analytics", "public", "users", "signed_up"),
            Some(DimensionType::Date)
        );
        assert_eq!(
            catalog.column_type("analytics", "public", "users", "is_admin"),
            Some(DimensionType::Boolean)
        );
        assert_eq!(
            catalog.column_type("analytics", "sales", "orders", "placed_at"),
            Some(DimensionType::Timestamp)
        );
    }

    #[test]
    fn reduce_with_no_requests_is_empty() {
        let catalog = reduce_catalog(&[], rows());
        assert!(catalog.is_empty());
    }

    #[test]
    fn reduce_matches_case_sensitively() {
        let requests = vec![TableIdentifier::new("analytics", "public", "Users")];
        let catalog = reduce_catalog(&requests, rows());
        assert!(catalog.is_empty());
    }

    #[test]
    fn unknown_column_types_are_strings() {
        let requests = vec![TableIdentifier::new("db", "public", "events")];
        let catalog = reduce_catalog(
            &requests,
            vec![
                CatalogRow::new("db", "public", "events", "payload", "jsonb"),
                CatalogRow::new("db", "public", "events", "tags", "ARRAY"),
            ],
        );

        let mut expected = WarehouseCatalog::new();
        expected.insert("db", "public", "events", "payload", DimensionType::String);
        expected.insert("db", "public", "events", "tags", DimensionType::String);
        assert_eq!(catalog, expected);
    }
}
