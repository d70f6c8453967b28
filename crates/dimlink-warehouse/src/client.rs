//! Warehouse client trait and shared types

use dimlink_core::{ConfigError, QueryResult, WarehouseCatalog};
use std::fmt;
use std::str::FromStr;

/// Identifies a table in a warehouse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdentifier {
    /// Database (catalog) name
    pub database: String,

    /// Schema name
    pub schema: String,

    /// Table name
    pub table: String,
}

impl TableIdentifier {
    /// Create a new table identifier
    pub fn new(database: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.table)
    }

    /// Whether this identifier names the given triple exactly
    pub fn matches(&self, database: &str, schema: &str, table: &str) -> bool {
        self.database == database && self.schema == schema && self.table == table
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

impl FromStr for TableIdentifier {
    type Err = WarehouseError;

    /// Parse `database.schema.table`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [database, schema, table]
                if !database.is_empty() && !schema.is_empty() && !table.is_empty() =>
            {
                Ok(Self::new(*database, *schema, *table))
            }
            _ => Err(WarehouseError::Config(format!(
                "Invalid table identifier '{}', expected database.schema.table",
                s
            ))),
        }
    }
}

/// Errors raised by warehouse clients
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WarehouseError {
    /// Establishing the tunnel or the database connection failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Executing a query or decoding its result failed
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ConfigError> for WarehouseError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Uniform interface over warehouse connections
#[async_trait::async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Get the client name (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Execute SQL and return column metadata plus rows
    async fn run_query(&self, sql: &str) -> Result<QueryResult, WarehouseError>;

    /// Fetch column types for the requested tables
    ///
    /// Returns an empty catalog when the requests name no database, schema
    /// or table. Columns of tables that were not requested are never
    /// included.
    async fn get_catalog(&self, requests: &[TableIdentifier]) -> Result<WarehouseCatalog, WarehouseError>;

    /// Liveness check
    async fn test(&self) -> Result<(), WarehouseError> {
        self.run_query("SELECT 1").await.map(|_| ())
    }
}
