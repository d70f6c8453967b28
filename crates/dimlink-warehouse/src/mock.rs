//! Mock warehouse client for testing
//!
//! This client answers from canned data without connecting to any warehouse.
//! It's useful for:
//! - Unit testing code written against [`WarehouseClient`]
//! - Exercising the CLI without credentials
//! - Simulating connection and query failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dimlink_warehouse::{CatalogRow, MockClient, TableIdentifier, WarehouseClient};
//!
//! let client = MockClient::new();
//! client.add_catalog_row(CatalogRow::new("db", "public", "users", "id", "integer")).await;
//!
//! let catalog = client
//!     .get_catalog(&[TableIdentifier::new("db", "public", "users")])
//!     .await?;
//! ```
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Every operation fails with a connection error
//! let client = MockClient::new().with_connection_failure();
//! assert!(client.test().await.is_err());
//!
//! // Simulate network latency
//! let client = MockClient::new().with_latency(100); // 100ms delay
//! ```

use crate::catalog::{reduce_catalog, CatalogFilter, CatalogRow};
use crate::client::{TableIdentifier, WarehouseClient, WarehouseError};
use dimlink_core::{QueryResult, WarehouseCatalog};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock warehouse client for testing
///
/// Query results are keyed by SQL text (surrounding whitespace ignored).
/// Catalog requests are answered from a list of `information_schema.columns`
/// rows, filtered the same way the real catalog query filters them.
pub struct MockClient {
    /// Canned results by SQL
    results: Arc<RwLock<HashMap<String, QueryResult>>>,

    /// Errors to return for specific SQL
    errors: Arc<RwLock<HashMap<String, WarehouseError>>>,

    /// Columns rows served to catalog requests
    catalog_rows: Arc<RwLock<Vec<CatalogRow>>>,

    /// Number of catalog lookups that reached the "warehouse"
    catalog_queries: Arc<AtomicUsize>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    client_name: &'static str,
}

impl MockClient {
    /// Create a new mock client with no canned data
    pub fn new() -> Self {
        MockClientBuilder::new().build()
    }

    /// Register the result returned for `sql`
    pub async fn add_result(&self, sql: &str, result: QueryResult) {
        self.results.write().await.insert(sql_key(sql), result);
    }

    /// Register an error returned for `sql`
    ///
    /// Errors take precedence over results registered for the same SQL.
    pub async fn add_error(&self, sql: &str, error: WarehouseError) {
        self.errors.write().await.insert(sql_key(sql), error);
    }

    /// Add a column to the simulated `information_schema.columns`
    pub async fn add_catalog_row(&self, row: CatalogRow) {
        self.catalog_rows.write().await.push(row);
    }

    /// Configure every operation to fail with a connection error
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set a custom client name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.client_name = name;
        self
    }

    /// Number of catalog requests that issued a columns query
    pub fn catalog_query_count(&self) -> usize {
        self.catalog_queries.load(Ordering::SeqCst)
    }

    /// Clear all canned results and errors
    pub async fn clear(&self) {
        self.results.write().await.clear();
        self.errors.write().await.clear();
        self.catalog_rows.write().await.clear();
    }

    async fn connect(&self) -> Result<(), WarehouseError> {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        if self.fail_connection {
            Err(WarehouseError::Connection(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn sql_key(sql: &str) -> String {
    sql.trim().to_string()
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockClient {
    fn clone(&self) -> Self {
        Self {
            results: Arc::clone(&self.results),
            errors: Arc::clone(&self.errors),
            catalog_rows: Arc::clone(&self.catalog_rows),
            catalog_queries: Arc::clone(&self.catalog_queries),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            client_name: self.client_name,
        }
    }
}

#[async_trait::async_trait]
impl WarehouseClient for MockClient {
    fn name(&self) -> &'static str {
        self.client_name
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.connect().await?;

        let key = sql_key(sql);
        if let Some(error) = self.errors.read().await.get(&key) {
            return Err(error.clone());
        }

        self.results
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| WarehouseError::Query(format!("No canned result for: {}", key)))
    }

    async fn get_catalog(&self, requests: &[TableIdentifier]) -> Result<WarehouseCatalog, WarehouseError> {
        let Some(filter) = CatalogFilter::from_requests(requests) else {
            return Ok(WarehouseCatalog::new());
        };

        self.connect().await?;
        self.catalog_queries.fetch_add(1, Ordering::SeqCst);

        let rows: Vec<CatalogRow> = self
            .catalog_rows
            .read()
            .await
            .iter()
            .filter(|row| {
                filter.databases.contains(&row.table_catalog)
                    && filter.schemas.contains(&row.table_schema)
                    && filter.tables.contains(&row.table_name)
            })
            .cloned()
            .collect();

        Ok(reduce_catalog(requests, rows))
    }

    async fn test(&self) -> Result<(), WarehouseError> {
        self.connect().await
    }
}

/// Builder for creating a MockClient with canned data
///
/// # Example
///
/// ```rust,ignore
/// let client = MockClientBuilder::new()
///     .with_result("SELECT 1", QueryResult::default())
///     .with_catalog_row(CatalogRow::new("db", "public", "users", "id", "integer"))
///     .with_latency(50)
///     .build();
/// ```
pub struct MockClientBuilder {
    results: HashMap<String, QueryResult>,
    errors: HashMap<String, WarehouseError>,
    catalog_rows: Vec<CatalogRow>,
    fail_connection: bool,
    latency_ms: u64,
    client_name: &'static str,
}

impl MockClientBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            errors: HashMap::new(),
            catalog_rows: Vec::new(),
            fail_connection: false,
            latency_ms: 0,
            client_name: "Mock",
        }
    }

    pub fn with_result(mut self, sql: &str, result: QueryResult) -> Self {
        self.results.insert(sql_key(sql), result);
        self
    }

    pub fn with_error(mut self, sql: &str, error: WarehouseError) -> Self {
        self.errors.insert(sql_key(sql), error);
        self
    }

    pub fn with_catalog_row(mut self, row: CatalogRow) -> Self {
        self.catalog_rows.push(row);
        self
    }

    pub fn with_catalog_rows(mut self, rows: impl IntoIterator<Item = CatalogRow>) -> Self {
        self.catalog_rows.extend(rows);
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set client name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.client_name = name;
        self
    }

    /// Build the MockClient
    pub fn build(self) -> MockClient {
        MockClient {
            results: Arc::new(RwLock::new(self.results)),
            errors: Arc::new(RwLock::new(self.errors)),
            catalog_rows: Arc::new(RwLock::new(self.catalog_rows)),
            catalog_queries: Arc::new(AtomicUsize::new(0)),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            client_name: self.client_name,
        }
    }
}

impl Default for MockClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimlink_core::{DimensionType, FieldMeta};
    use serde_json::{json, Map, Value};

    fn one_row_result() -> QueryResult {
        let mut row = Map::new();
        row.insert("answer".to_string(), json!(42));
        QueryResult::new(
            vec![FieldMeta::new("answer", DimensionType::Number, "int4")],
            vec![row],
        )
    }

    #[tokio::test]
    async fn test_mock_client_basic() {
        let client = MockClient::new();
        assert_eq!(client.name(), "Mock");

        client.add_result("SELECT 42 AS answer", one_row_result()).await;

        let result = client.run_query("  SELECT 42 AS answer\n").await.unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0].get("answer"), Some(&Value::from(42)));
    }

    #[tokio::test]
    async fn test_unknown_sql_is_query_error() {
        let client = MockClient::new();
        let err = client.run_query("SELECT nope").await.unwrap_err();
        assert!(matches!(err, WarehouseError::Query(_)));
    }

    #[tokio::test]
    async fn test_error_takes_precedence() {
        let client = MockClient::new();
        client.add_result("SELECT 1", one_row_result()).await;
        client
            .add_error("SELECT 1", WarehouseError::Query("permission denied".to_string()))
            .await;

        let err = client.run_query("SELECT 1").await.unwrap_err();
        assert_eq!(err, WarehouseError::Query("permission denied".to_string()));
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let client = MockClient::new().with_connection_failure();

        assert!(matches!(client.test().await, Err(WarehouseError::Connection(_))));
        assert!(matches!(
            client.run_query("SELECT 1").await,
            Err(WarehouseError::Connection(_))
        ));
        assert!(matches!(
            client
                .get_catalog(&[TableIdentifier::new("db", "public", "users")])
                .await,
            Err(WarehouseError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_test_does_not_need_canned_result() {
        let client = MockClient::new();
        assert!(client.test().await.is_ok());
    }

    #[tokio::test]
    async fn test_catalog_filters_requested_tables() {
        let client = MockClientBuilder::new()
            .with_catalog_rows(vec![
                CatalogRow::new("db", "public", "users", "id", "integer"),
                CatalogRow::new("db", "public", "orders", "total", "numeric"),
                CatalogRow::new("db", "sales", "users", "name", "text"),
                CatalogRow::new("db", "sales", "orders", "placed_on", "date"),
            ])
            .build();

        let catalog = client
            .get_catalog(&[
                TableIdentifier::new("db", "public", "users"),
                TableIdentifier::new("db", "sales", "orders"),
            ])
            .await
            .unwrap();

        assert_eq!(catalog.table_count(), 2);
        assert_eq!(
            catalog.column_type("db", "public", "users", "id"),
            Some(DimensionType::Number)
        );
        assert_eq!(
            catalog.column_type("db", "sales", "orders", "placed_on"),
            Some(DimensionType::Date)
        );
        assert!(catalog.table("db", "public", "orders").is_none());
        assert_eq!(client.catalog_query_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_catalog_request_skips_query() {
        let client = MockClientBuilder::new()
            .with_catalog_row(CatalogRow::new("db", "public", "users", "id", "integer"))
            .with_connection_failure()
            .build();

        // No connection is attempted, so the simulated failure never fires
        let catalog = client.get_catalog(&[]).await.unwrap();
        assert!(catalog.is_empty());
        assert_eq!(client.catalog_query_count(), 0);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let client = MockClient::new().with_name("PostgreSQL");
        let cloned = client.clone();

        client.add_result("SELECT 1", one_row_result()).await;
        assert!(cloned.run_query("SELECT 1").await.is_ok());
        assert_eq!(cloned.name(), "PostgreSQL");

        cloned.clear().await;
        assert!(client.run_query("SELECT 1").await.is_err());
    }

    #[tokio::test]
    async fn test_latency() {
        let client = MockClient::new().with_latency(50);

        let start = std::time::Instant::now();
        client.test().await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(50));
    }
}
