//! Warehouse clients for PostgreSQL-protocol warehouses
//!
//! This crate connects to PostgreSQL and Redshift, runs ad-hoc SQL and reads
//! column types from `information_schema.columns`, mapping every warehouse
//! type onto a [`dimlink_core::DimensionType`].
//!
//! Connections honor the seven libpq-style SSL modes and can be routed
//! through an SSH tunnel (see [`tunnel`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use dimlink_warehouse::{PostgresClient, TableIdentifier, WarehouseClient};
//!
//! let client = PostgresClient::new(config.warehouse()?.clone())?;
//! client.test().await?;
//!
//! let table = TableIdentifier::new("analytics", "public", "users");
//! let catalog = client.get_catalog(&[table]).await?;
//! ```

pub mod catalog;
pub mod client;
pub mod decode;
pub mod mock;
pub mod postgres;
pub mod ssl;
pub mod tunnel;
pub mod types;

pub use catalog::{reduce_catalog, CatalogFilter, CatalogRow, CATALOG_QUERY};
pub use client::{TableIdentifier, WarehouseClient, WarehouseError};
pub use mock::{MockClient, MockClientBuilder};
pub use postgres::PostgresClient;
pub use tunnel::SshTunnel;
pub use types::{dimension_type_for_name, dimension_type_for_oid};
