//! SSH local port forwarding through a bastion host
//!
//! The tunnel runs the system `ssh` client as a child process:
//!
//! ```text
//! ssh -N -L 127.0.0.1:<local>:<db host>:<db port> user@bastion
//! ```
//!
//! and is torn down (the child killed) when the [`SshTunnel`] is dropped.

use crate::client::WarehouseError;
use dimlink_core::SshTunnelConfig;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::Instant;

const SSH_PROGRAM: &str = "ssh";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Loopback address the forwarded port is bound to
pub const LOCAL_HOST: &str = "127.0.0.1";

/// A running SSH port forward
pub struct SshTunnel {
    child: Child,
    local_port: u16,
    // Inline keys live in a temp file for as long as ssh may read them
    _key_file: Option<NamedTempFile>,
}

impl SshTunnel {
    /// Forward a free local port to `target_host:target_port` via the bastion
    ///
    /// Returns once the local port accepts connections.
    pub async fn open(
        config: &SshTunnelConfig,
        target_host: &str,
        target_port: u16,
    ) -> Result<Self, WarehouseError> {
        Self::start(Command::new(SSH_PROGRAM), config, target_host, target_port).await
    }

    /// Append the forwarding arguments to `command`, spawn it and wait for
    /// the local port
    async fn start(
        mut command: Command,
        config: &SshTunnelConfig,
        target_host: &str,
        target_port: u16,
    ) -> Result<Self, WarehouseError> {
        let key_file = match &config.private_key {
            Some(key) => Some(write_key_file(key)?),
            None => None,
        };
        let key_path = key_file
            .as_ref()
            .map(|f| f.path())
            .or(config.private_key_path.as_deref());

        let local_port = free_local_port()?;
        let args = ssh_args(config, key_path, local_port, target_host, target_port);

        tracing::debug!(
            bastion = %config.host,
            local_port,
            forward = %format!("{}:{}", target_host, target_port),
            "Starting SSH tunnel"
        );

        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let child = command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WarehouseError::Connection(format!("Failed to start {}: {}", program, e))
            })?;

        let mut tunnel = Self {
            child,
            local_port,
            _key_file: key_file,
        };

        let timeout = config
            .connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        tunnel.wait_until_ready(timeout).await?;

        tracing::info!(
            bastion = %config.host,
            local_port,
            "SSH tunnel established"
        );

        Ok(tunnel)
    }

    /// Local port the database connection should use
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn local_host(&self) -> &'static str {
        LOCAL_HOST
    }

    async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), WarehouseError> {
        let deadline = Instant::now() + timeout;

        loop {
            let exited = self.child.try_wait().map_err(|e| {
                WarehouseError::Connection(format!("Failed to poll ssh process: {}", e))
            })?;

            if let Some(status) = exited {
                let stderr = self.read_stderr().await;
                return Err(WarehouseError::Connection(format!(
                    "SSH tunnel exited ({}): {}",
                    status,
                    stderr.trim()
                )));
            }

            if TcpStream::connect((LOCAL_HOST, self.local_port)).await.is_ok() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("Failed to stop ssh process: {}", e);
                }
                let stderr = self.read_stderr().await;
                return Err(WarehouseError::Connection(format!(
                    "SSH tunnel did not open local port {} within {}s: {}",
                    self.local_port,
                    timeout.as_secs(),
                    stderr.trim()
                )));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn read_stderr(&mut self) -> String {
        let mut output = String::new();
        if let Some(mut stderr) = self.child.stderr.take() {
            if let Err(e) = stderr.read_to_string(&mut output).await {
                tracing::warn!("Error reading ssh stderr: {}", e);
            }
        }
        output
    }
}

/// Command-line arguments for the forwarding `ssh` process
pub fn ssh_args(
    config: &SshTunnelConfig,
    key_path: Option<&Path>,
    local_port: u16,
    target_host: &str,
    target_port: u16,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-N".into(),
        "-o".into(),
        "BatchMode=yes".into(),
        "-o".into(),
        "ExitOnForwardFailure=yes".into(),
        "-o".into(),
        "ServerAliveInterval=30".into(),
        "-o".into(),
        "LogLevel=ERROR".into(),
    ];

    if config.strict_host_key_checking {
        args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
    } else {
        args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ]);
    }

    if let Some(key) = key_path {
        args.extend([
            "-i".to_string(),
            key.display().to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
        ]);
    }

    // IPv6 literals need brackets in a -L argument
    let target = if target_host.contains(':') {
        format!("[{}]", target_host)
    } else {
        target_host.to_string()
    };

    args.extend([
        "-p".to_string(),
        config.port.to_string(),
        "-L".to_string(),
        format!("{}:{}:{}:{}", LOCAL_HOST, local_port, target, target_port),
        format!("{}@{}", config.user, config.host),
    ]);

    args
}

fn free_local_port() -> Result<u16, WarehouseError> {
    let listener = std::net::TcpListener::bind((LOCAL_HOST, 0)).map_err(|e| {
        WarehouseError::Connection(format!("No free local port for SSH tunnel: {}", e))
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| WarehouseError::Connection(e.to_string()))?
        .port();
    Ok(port)
}

fn write_key_file(key: &str) -> Result<NamedTempFile, WarehouseError> {
    let mut file = NamedTempFile::new()
        .map_err(|e| WarehouseError::Config(format!("Cannot create key file: {}", e)))?;

    // ssh rejects keys without the trailing newline
    let mut contents = key.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }

    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| WarehouseError::Config(format!("Cannot write key file: {}", e)))?;

    Ok(file)
}
