//! Test fixtures for warehouse client integration tests
//!
//! `information_schema.columns` rows and query results modelled on a small
//! analytics warehouse with two schemas.

#![allow(dead_code)]

use dimlink_core::{DimensionType, FieldMeta, QueryResult, Row};
use dimlink_warehouse::{CatalogRow, MockClient, MockClientBuilder, TableIdentifier};
use serde_json::json;

pub const DATABASE: &str = "analytics";

/// Columns of `analytics.public.users`
pub fn users_rows() -> Vec<CatalogRow> {
    vec![
        CatalogRow::new(DATABASE, "public", "users", "id", "bigint"),
        CatalogRow::new(DATABASE, "public", "users", "email", "character varying"),
        CatalogRow::new(DATABASE, "public", "users", "signed_up_on", "date"),
        CatalogRow::new(DATABASE, "public", "users", "last_seen_at", "timestamp with time zone"),
        CatalogRow::new(DATABASE, "public", "users", "is_active", "boolean"),
    ]
}

/// Columns of `analytics.public.orders`
pub fn orders_rows() -> Vec<CatalogRow> {
    vec![
        CatalogRow::new(DATABASE, "public", "orders", "id", "integer"),
        CatalogRow::new(DATABASE, "public", "orders", "user_id", "bigint"),
        CatalogRow::new(DATABASE, "public", "orders", "total", "numeric"),
        CatalogRow::new(DATABASE, "public", "orders", "placed_at", "timestamp without time zone"),
        CatalogRow::new(DATABASE, "public", "orders", "metadata", "jsonb"),
    ]
}

/// A `sales.users` table that shares a name with `public.users`
pub fn sales_users_rows() -> Vec<CatalogRow> {
    vec![
        CatalogRow::new(DATABASE, "sales", "users", "region", "text"),
        CatalogRow::new(DATABASE, "sales", "users", "quota", "double precision"),
    ]
}

/// A `sales.orders` table that shares a name with `public.orders`
pub fn sales_orders_rows() -> Vec<CatalogRow> {
    vec![
        CatalogRow::new(DATABASE, "sales", "orders", "closed_at", "time with time zone"),
        CatalogRow::new(DATABASE, "sales", "orders", "discount", "money"),
    ]
}

pub fn all_rows() -> Vec<CatalogRow> {
    let mut rows = users_rows();
    rows.extend(orders_rows());
    rows.extend(sales_users_rows());
    rows.extend(sales_orders_rows());
    rows
}

pub fn users_table() -> TableIdentifier {
    TableIdentifier::new(DATABASE, "public", "users")
}

pub fn sales_orders_table() -> TableIdentifier {
    TableIdentifier::new(DATABASE, "sales", "orders")
}

/// Result of `SELECT id, email, is_active FROM users`
pub fn users_query_result() -> QueryResult {
    let rows = vec![
        row(json!({ "id": 1, "email": "ada@example.com", "is_active": true })),
        row(json!({ "id": 2, "email": "grace@example.com", "is_active": false })),
        row(json!({ "id": 3, "email": null, "is_active": true })),
    ];

    QueryResult::new(
        vec![
            FieldMeta::new("id", DimensionType::Number, "int8"),
            FieldMeta::new("email", DimensionType::String, "varchar"),
            FieldMeta::new("is_active", DimensionType::Boolean, "bool"),
        ],
        rows,
    )
}

/// A mock warehouse loaded with every fixture table
pub fn mock_warehouse() -> MockClient {
    MockClientBuilder::new()
        .with_name("PostgreSQL")
        .with_catalog_rows(all_rows())
        .with_result("SELECT id, email, is_active FROM users", users_query_result())
        .build()
}

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}
