//! SSL mode → tokio-postgres / native-tls settings

use crate::client::WarehouseError;
use dimlink_core::{SslMode, WarehouseConfig};
use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use std::path::Path;
use tokio_postgres::config::SslMode as PgSslMode;

/// Connection-level SSL mode for tokio-postgres
///
/// tokio-postgres has no `allow`; it behaves like `prefer` here.
pub fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow | SslMode::Prefer => PgSslMode::Prefer,
        SslMode::NoVerify | SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            PgSslMode::Require
        }
    }
}

/// TLS connector for the given mode, or `None` for `disable`
pub fn tls_connector(
    mode: SslMode,
    config: &WarehouseConfig,
) -> Result<Option<MakeTlsConnector>, WarehouseError> {
    if !mode.uses_tls() {
        return Ok(None);
    }

    let mut builder = TlsConnector::builder();
    builder
        .danger_accept_invalid_certs(!mode.verifies_certificate())
        .danger_accept_invalid_hostnames(!mode.verifies_hostname());

    if let Some(root_cert) = &config.ssl_root_cert {
        let pem = read_pem(root_cert, "root certificate")?;
        let cert = Certificate::from_pem(&pem).map_err(|e| {
            WarehouseError::Config(format!(
                "Invalid root certificate {}: {}",
                root_cert.display(),
                e
            ))
        })?;
        builder.add_root_certificate(cert);
    }

    match (&config.ssl_cert, &config.ssl_key) {
        (Some(cert_path), Some(key_path)) => {
            let cert = read_pem(cert_path, "client certificate")?;
            let key = read_pem(key_path, "client key")?;
            let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
                WarehouseError::Config(format!("Invalid client certificate or key: {}", e))
            })?;
            builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(WarehouseError::Config(
                "ssl_cert and ssl_key must be set together".to_string(),
            ))
        }
    }

    let connector = builder
        .build()
        .map_err(|e| WarehouseError::Config(format!("Failed to create TLS connector: {}", e)))?;

    Ok(Some(MakeTlsConnector::new(connector)))
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>, WarehouseError> {
    std::fs::read(path).map_err(|e| {
        WarehouseError::Config(format!("Cannot read {} {}: {}", what, path.display(), e))
    })
}
