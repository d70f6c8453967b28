//! PostgreSQL / Redshift warehouse client
//!
//! Every operation opens its own connection (and SSH tunnel, when
//! configured) and closes both when it finishes: the connection first,
//! then the tunnel once the connection driver has stopped. Nothing is
//! pooled or reused across calls.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut config = WarehouseConfig::new("db.internal", "analyst", "analytics");
//! config.sslmode = Some("verify-full".to_string());
//!
//! let client = PostgresClient::new(config)?;
//! client.test().await?;
//!
//! let result = client.run_query("SELECT id, created_at FROM users").await?;
//! let catalog = client
//!     .get_catalog(&[TableIdentifier::new("analytics", "public", "users")])
//!     .await?;
//! ```
//!
//! Reference: https://www.postgresql.org/docs/current/information-schema-columns.html

use crate::catalog::{reduce_catalog, CatalogFilter, CatalogRow, CATALOG_QUERY};
use crate::client::{TableIdentifier, WarehouseClient, WarehouseError};
use crate::decode::{decode_row, decode_text_row, has_binary_decoder};
use crate::ssl::{pg_ssl_mode, tls_connector};
use crate::tunnel::SshTunnel;
use crate::types::dimension_type_for_oid;
use dimlink_core::{FieldMeta, QueryResult, SslMode, WarehouseCatalog, WarehouseConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, NoTls, SimpleQueryMessage, Socket};

const DEFAULT_APPLICATION_NAME: &str = "dimlink";

/// How long a closed connection's driver gets to finish before it is aborted
const DRIVER_SHUTDOWN: Duration = Duration::from_secs(5);

/// PostgreSQL-protocol warehouse client
pub struct PostgresClient {
    config: WarehouseConfig,
    ssl_mode: SslMode,
}

/// One open connection, plus the tunnel it runs through
struct Session {
    client: Client,
    driver: JoinHandle<()>,
    tunnel: Option<SshTunnel>,
}

impl Session {
    /// Close the connection, wait for its driver, then stop the tunnel
    async fn close(self) {
        let Session {
            client,
            driver,
            tunnel,
        } = self;

        drop(client);
        if !wait_for_driver(driver, DRIVER_SHUTDOWN).await {
            tracing::warn!("Connection driver did not stop in time, aborted it");
        }
        drop(tunnel);
    }
}

/// Wait up to `grace` for a connection driver to finish, aborting it after
///
/// Returns whether the driver finished on its own.
async fn wait_for_driver(mut driver: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut driver).await {
        Ok(_) => true,
        Err(_) => {
            driver.abort();
            false
        }
    }
}

impl PostgresClient {
    /// Create a client from connection settings
    ///
    /// Fails with a configuration error for an unrecognized SSL mode or an
    /// incomplete SSH tunnel section. No connection is opened.
    pub fn new(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let ssl_mode = config.ssl_mode()?;

        if let Some(tunnel) = &config.ssh_tunnel {
            if tunnel.host.is_empty() || tunnel.user.is_empty() {
                return Err(WarehouseError::Config(
                    "SSH tunnel requires both host and user".to_string(),
                ));
            }
            if tunnel.private_key.is_some() && tunnel.private_key_path.is_some() {
                return Err(WarehouseError::Config(
                    "SSH tunnel accepts private_key or private_key_path, not both".to_string(),
                ));
            }
        }

        Ok(Self { config, ssl_mode })
    }

    /// Connection settings
    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn ssl_mode(&self) -> SslMode {
        self.ssl_mode
    }

    /// tokio-postgres settings, optionally redirected through a tunnel port
    ///
    /// With a tunnel the TCP connection goes to the loopback port while the
    /// configured host is still used for TLS hostname verification.
    fn pg_config(&self, tunnel_port: Option<u16>) -> PgConfig {
        let mut pg = PgConfig::new();
        pg.host(&self.config.host)
            .user(&self.config.user)
            .dbname(&self.config.dbname)
            .ssl_mode(pg_ssl_mode(self.ssl_mode))
            .application_name(
                self.config
                    .application_name
                    .as_deref()
                    .unwrap_or(DEFAULT_APPLICATION_NAME),
            );

        match tunnel_port {
            Some(port) => {
                pg.hostaddr(IpAddr::V4(Ipv4Addr::LOCALHOST)).port(port);
            }
            None => {
                pg.port(self.config.port());
            }
        }

        if let Some(password) = &self.config.password {
            pg.password(password);
        }
        if let Some(secs) = self.config.connect_timeout_secs {
            pg.connect_timeout(Duration::from_secs(secs));
        }

        pg
    }

    async fn connect(&self) -> Result<Session, WarehouseError> {
        let tunnel = match &self.config.ssh_tunnel {
            Some(tunnel_config) => Some(
                SshTunnel::open(tunnel_config, &self.config.host, self.config.port()).await?,
            ),
            None => None,
        };

        let pg = self.pg_config(tunnel.as_ref().map(|t| t.local_port()));
        let label = format!("{}:{}", self.config.host, self.config.port());

        tracing::debug!(
            warehouse = self.name(),
            server = %label,
            sslmode = %self.ssl_mode,
            tunneled = tunnel.is_some(),
            "Connecting"
        );

        let (client, driver) = match tls_connector(self.ssl_mode, &self.config)? {
            Some(tls) => open(&pg, tls, label).await?,
            None => open(&pg, NoTls, label).await?,
        };
        let session = Session {
            client,
            driver,
            tunnel,
        };

        if let Some(setup) = session_setup_sql(&self.config) {
            if let Err(e) = session.client.batch_execute(&setup).await {
                session.close().await;
                return Err(WarehouseError::Connection(format!(
                    "Session setup failed: {}",
                    describe(&e)
                )));
            }
        }

        Ok(session)
    }
}

/// Connect and spawn the connection driver
async fn open<T>(
    pg: &PgConfig,
    tls: T,
    label: String,
) -> Result<(Client, JoinHandle<()>), WarehouseError>
where
    T: MakeTlsConnect<Socket> + Send + Sync + 'static,
    T::Stream: Send + Sync + 'static,
    T::TlsConnect: Send + Sync,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, connection) = pg.connect(tls).await.map_err(|e| {
        WarehouseError::Connection(format!("Failed to connect to {}: {}", label, describe(&e)))
    })?;

    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(server = %label, "Connection error: {}", e);
        }
    });

    Ok((client, driver))
}

/// `SET` statements for the configured schema and statement timeout
///
/// Sent after connecting rather than as startup options, which Redshift
/// does not accept.
pub(crate) fn session_setup_sql(config: &WarehouseConfig) -> Option<String> {
    let mut statements = Vec::new();

    if let Some(schema) = config.schema.as_deref().filter(|s| !s.is_empty()) {
        statements.push(format!("SET search_path TO {}", quote_ident(schema)));
    }
    if let Some(secs) = config.query_timeout_secs {
        statements.push(format!("SET statement_timeout TO {}", secs.saturating_mul(1000)));
    }

    if statements.is_empty() {
        None
    } else {
        Some(statements.join(";\n"))
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Prefer the server's message over tokio-postgres' generic "db error"
fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => err.to_string(),
    }
}

fn query_error(err: tokio_postgres::Error) -> WarehouseError {
    WarehouseError::Query(describe(&err))
}

#[async_trait::async_trait]
impl WarehouseClient for PostgresClient {
    fn name(&self) -> &'static str {
        self.config.kind.display_name()
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let session = self.connect().await?;
        let result = fetch_query(&session.client, sql).await;
        session.close().await;
        result
    }

    async fn get_catalog(&self, requests: &[TableIdentifier]) -> Result<WarehouseCatalog, WarehouseError> {
        let Some(filter) = CatalogFilter::from_requests(requests) else {
            return Ok(WarehouseCatalog::new());
        };

        let session = self.connect().await?;

        tracing::debug!(tables = requests.len(), "Fetching catalog");

        let rows = fetch_catalog_rows(&session.client, &filter).await;
        session.close().await;

        Ok(reduce_catalog(requests, rows?))
    }
}

/// Run one statement and decode its rows
///
/// Results whose columns all have binary decoders are read over the extended
/// protocol. Any other result is read again over the simple query protocol,
/// which returns every cell in text form.
async fn fetch_query(client: &Client, sql: &str) -> Result<QueryResult, WarehouseError> {
    tracing::debug!(sql, "Running query");

    let statement = client.prepare(sql).await.map_err(query_error)?;
    let fields: Vec<FieldMeta> = statement
        .columns()
        .iter()
        .map(|column| {
            let ty = column.type_();
            FieldMeta::new(column.name(), dimension_type_for_oid(ty.oid()), ty.name())
        })
        .collect();
    let type_oids: Vec<u32> = statement
        .columns()
        .iter()
        .map(|column| column.type_().oid())
        .collect();

    let rows = if type_oids.iter().all(|oid| has_binary_decoder(*oid)) {
        client
            .query(&statement, &[])
            .await
            .map_err(query_error)?
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?
    } else {
        tracing::debug!("Reading result in text format");

        client
            .simple_query(sql)
            .await
            .map_err(query_error)?
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .map(|row| decode_text_row(row, &type_oids))
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?
    };

    tracing::debug!(columns = fields.len(), rows = rows.len(), "Query finished");

    Ok(QueryResult::new(fields, rows))
}

async fn fetch_catalog_rows(
    client: &Client,
    filter: &CatalogFilter,
) -> Result<Vec<CatalogRow>, WarehouseError> {
    let rows = client
        .query(
            CATALOG_QUERY,
            &[&filter.databases, &filter.schemas, &filter.tables],
        )
        .await
        .map_err(query_error)?;

    rows.iter()
        .map(|row| -> Result<CatalogRow, tokio_postgres::Error> {
            Ok(CatalogRow {
                table_catalog: row.try_get(0)?,
                table_schema: row.try_get(1)?,
                table_name: row.try_get(2)?,
                column_name: row.try_get(3)?,
                data_type: row.try_get(4)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_error)
}

impl std::fmt::Debug for PostgresClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresClient")
            .field("config", &self.config)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}
