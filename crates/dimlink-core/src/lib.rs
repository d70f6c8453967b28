//! dimlink core
//!
//! Domain types shared by the warehouse adapter and the CLI: the dimension
//! type taxonomy, query results, the nested column catalog and configuration.

pub mod dimension;
pub mod result;
pub mod catalog;
pub mod config;

pub use dimension::{DimensionType, ParseDimensionTypeError};
pub use result::{FieldMeta, QueryResult, Row};
pub use catalog::{WarehouseCatalog, TableColumns, SchemaTables, DatabaseSchemas};
pub use config::{Config, ConfigError, WarehouseConfig, WarehouseKind, SslMode, SshTunnelConfig};
