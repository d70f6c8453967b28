//! Configuration schema (dimlink.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Warehouse flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    /// PostgreSQL
    Postgres,

    /// Amazon Redshift (PostgreSQL wire protocol)
    Redshift,
}

impl WarehouseKind {
    /// Port used when the config does not set one
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Redshift => 5439,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Redshift => "Redshift",
        }
    }
}

impl Default for WarehouseKind {
    fn default() -> Self {
        Self::Postgres
    }
}

/// SSL mode, using libpq's names plus `no-verify`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SslMode {
    /// Plain TCP
    Disable,

    /// Require TLS, accept any certificate
    NoVerify,

    /// TLS if the server offers it, no verification
    Allow,

    /// TLS if the server offers it, no verification
    Prefer,

    /// Require TLS, no verification
    Require,

    /// Require TLS, verify the certificate chain but not the hostname
    VerifyCa,

    /// Require TLS, verify chain and hostname
    VerifyFull,
}

impl SslMode {
    pub const ALL: [SslMode; 7] = [
        Self::Disable,
        Self::NoVerify,
        Self::Allow,
        Self::Prefer,
        Self::Require,
        Self::VerifyCa,
        Self::VerifyFull,
    ];

    /// Mode string as written in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::NoVerify => "no-verify",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Whether the connection uses TLS at all
    pub fn uses_tls(&self) -> bool {
        !matches!(self, Self::Disable)
    }

    /// Whether the server certificate chain is checked
    pub fn verifies_certificate(&self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    /// Whether the server hostname is checked against its certificate
    pub fn verifies_hostname(&self) -> bool {
        matches!(self, Self::VerifyFull)
    }
}

impl Default for SslMode {
    fn default() -> Self {
        Self::Prefer
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidSslMode(s.to_string()))
    }
}

/// SSH bastion used to reach the warehouse
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SshTunnelConfig {
    /// Bastion hostname
    pub host: String,

    /// Bastion SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// SSH user
    pub user: String,

    /// Inline private key (PEM / OpenSSH format)
    #[serde(default)]
    pub private_key: Option<String>,

    /// Path to a private key file
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Verify the bastion's host key against known_hosts
    #[serde(default)]
    pub strict_host_key_checking: bool,

    /// Seconds to wait for the forwarded port to come up
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_ssh_port() -> u16 {
    22
}

impl std::fmt::Debug for SshTunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTunnelConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("strict_host_key_checking", &self.strict_host_key_checking)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Warehouse connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Warehouse flavour
    #[serde(rename = "type", default)]
    pub kind: WarehouseKind,

    pub host: String,

    /// Port (defaults per warehouse kind)
    #[serde(default)]
    pub port: Option<u16>,

    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Database to connect to
    pub dbname: String,

    /// Default schema, applied as the session search_path
    #[serde(default)]
    pub schema: Option<String>,

    /// SSL mode string, validated when a client is built
    #[serde(default)]
    pub sslmode: Option<String>,

    /// PEM file with an extra trusted root certificate
    #[serde(default)]
    pub ssl_root_cert: Option<PathBuf>,

    /// PEM client certificate
    #[serde(default)]
    pub ssl_cert: Option<PathBuf>,

    /// PEM (PKCS#8) client key
    #[serde(default)]
    pub ssl_key: Option<PathBuf>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Server side statement timeout
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,

    #[serde(default)]
    pub application_name: Option<String>,

    /// Optional SSH tunnel
    #[serde(default)]
    pub ssh_tunnel: Option<SshTunnelConfig>,
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .field("schema", &self.schema)
            .field("sslmode", &self.sslmode)
            .field("ssh_tunnel", &self.ssh_tunnel)
            .finish_non_exhaustive()
    }
}

impl WarehouseConfig {
    /// Minimal config for a host/user/database triple
    pub fn new(host: impl Into<String>, user: impl Into<String>, dbname: impl Into<String>) -> Self {
        Self {
            kind: WarehouseKind::default(),
            host: host.into(),
            port: None,
            user: user.into(),
            password: None,
            dbname: dbname.into(),
            schema: None,
            sslmode: None,
            ssl_root_cert: None,
            ssl_cert: None,
            ssl_key: None,
            connect_timeout_secs: None,
            query_timeout_secs: None,
            application_name: None,
            ssh_tunnel: None,
        }
    }

    /// Effective port
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }

    /// Parsed SSL mode; an unrecognized string is an error
    pub fn ssl_mode(&self) -> Result<SslMode, ConfigError> {
        match self.sslmode.as_deref() {
            Some(mode) => mode.parse(),
            None => Ok(SslMode::default()),
        }
    }

    /// Override settings from `DIMLINK_*` variables
    ///
    /// `lookup` is normally `std::env::var(..).ok()`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DIMLINK_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("DIMLINK_PORT") {
            let parsed = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("DIMLINK_PORT={}", port)))?;
            self.port = Some(parsed);
        }
        if let Some(user) = lookup("DIMLINK_USER") {
            self.user = user;
        }
        if let Some(password) = lookup("DIMLINK_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(dbname) = lookup("DIMLINK_DBNAME") {
            self.dbname = dbname;
        }
        if let Some(sslmode) = lookup("DIMLINK_SSLMODE") {
            self.sslmode = Some(sslmode);
        }
        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse connection
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    /// Directory the config was loaded from, for resolving relative paths
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }
        config.resolve_paths();

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// The warehouse section, which every connecting command needs
    pub fn warehouse(&self) -> Result<&WarehouseConfig, ConfigError> {
        self.warehouse.as_ref().ok_or(ConfigError::MissingWarehouse)
    }

    /// Make certificate and key paths relative to the config file
    ///
    /// A leading `~` is expanded to the home directory first.
    fn resolve_paths(&mut self) {
        let root = self.project_root.clone();
        let home = dirs::home_dir();
        let resolve = |p: &mut Option<PathBuf>| {
            if let Some(path) = p.as_mut() {
                *path = expand_home(path, home.as_deref());
                if path.is_relative() && !root.as_os_str().is_empty() {
                    *path = root.join(&*path);
                }
            }
        };

        if let Some(warehouse) = self.warehouse.as_mut() {
            resolve(&mut warehouse.ssl_root_cert);
            resolve(&mut warehouse.ssl_cert);
            resolve(&mut warehouse.ssl_key);
            if let Some(tunnel) = warehouse.ssh_tunnel.as_mut() {
                resolve(&mut tunnel.private_key_path);
            }
        }
    }
}

/// Replace a leading `~` component with `home`
///
/// Paths are left as they are when no home directory is known.
fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid SSL mode '{0}'. Expected one of: disable, no-verify, allow, prefer, require, verify-ca, verify-full")]
    InvalidSslMode(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("No [warehouse] section in configuration")]
    MissingWarehouse,
}
