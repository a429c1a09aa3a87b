//! Remote command execution capability consumed by the device drivers.
//!
//! A transport is a single shell session against one device: `open`,
//! any number of `send_command` calls, `close`. The tracer holds a
//! [`TransportFactory`] and builds one transport per hop; a session is
//! never shared between traces.

use crate::credentials::CredentialSet;
use crate::error::TraceError;
use crate::model::{ConnectionConfig, Device};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

#[async_trait]
pub trait Transport: Send {
    /// Establish the session. Authentication failures and unreachable
    /// hosts must be distinguishable (`TraceError::Auth` vs
    /// `TraceError::Connection`).
    async fn open(&mut self) -> Result<(), TraceError>;

    /// Run one command in the established session and return its output.
    async fn send_command(&mut self, command: &str) -> Result<String, TraceError>;

    /// Tear the session down. Must be safe to call on a never-opened or
    /// already-failed session.
    async fn close(&mut self);
}

/// Builds transports for devices; one factory serves every hop of every
/// trace and must therefore be shareable without locking.
pub trait TransportFactory: Send + Sync {
    fn transport(
        &self,
        device: &Device,
        credentials: &CredentialSet,
        config: &ConnectionConfig,
    ) -> Box<dyn Transport>;
}

/// Reference transport spawning the system `ssh` client in batch mode,
/// one process per command. Key or agent based authentication only;
/// platforms that need interactive password login require a different
/// `Transport` implementation behind the same trait.
pub struct SshTransport {
    host: String,
    display_name: String,
    username: String,
    key_file: Option<String>,
    connect_timeout: Duration,
    command_timeout: Duration,
    opened: bool,
}

impl SshTransport {
    pub fn new(device: &Device, credentials: &CredentialSet, config: &ConnectionConfig) -> Self {
        Self {
            host: device.management_ip.to_string(),
            display_name: device.hostname.clone(),
            username: credentials.username.clone(),
            key_file: credentials.ssh_key_file.clone(),
            connect_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
            opened: false,
        }
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        if let Some(key) = &self.key_file {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", self.username, self.host))
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, remote: &str, limit: Duration) -> Result<String, TraceError> {
        let output = timeout(limit, self.command(remote).output())
            .await
            .map_err(|_| TraceError::Command {
                host: self.display_name.clone(),
                command: remote.to_string(),
                reason: format!("timed out after {:?}", limit),
            })?
            .map_err(|e| TraceError::Connection {
                host: self.display_name.clone(),
                reason: format!("failed to spawn ssh: {}", e),
            })?;

        if output.status.success() {
            return String::from_utf8(output.stdout).map_err(|e| TraceError::Command {
                host: self.display_name.clone(),
                command: remote.to_string(),
                reason: format!("output was not UTF-8: {}", e),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if stderr.contains("Permission denied") || stderr.contains("Authentication failed") {
            return Err(TraceError::Auth {
                host: self.display_name.clone(),
                reason: stderr.trim().to_string(),
            });
        }
        // ssh itself exits 255 on transport-level failures; anything else
        // came from the remote command.
        if output.status.code() == Some(255) {
            return Err(TraceError::Connection {
                host: self.display_name.clone(),
                reason: stderr.trim().to_string(),
            });
        }
        Err(TraceError::Command {
            host: self.display_name.clone(),
            command: remote.to_string(),
            reason: stderr.trim().to_string(),
        })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&mut self) -> Result<(), TraceError> {
        // Validate reachability and authentication up front so that the
        // failure surfaces as a connect error, not a garbled first command.
        self.run("exit", self.connect_timeout).await.map(|_| ())?;
        self.opened = true;
        tracing::debug!(host = %self.display_name, "ssh session validated");
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> Result<String, TraceError> {
        if !self.opened {
            return Err(TraceError::Connection {
                host: self.display_name.clone(),
                reason: "session not open".to_string(),
            });
        }
        tracing::debug!(host = %self.display_name, %command, "executing");
        self.run(command, self.command_timeout).await
    }

    async fn close(&mut self) {
        self.opened = false;
    }
}

/// Default factory producing [`SshTransport`] sessions.
#[derive(Default)]
pub struct SshTransportFactory;

impl TransportFactory for SshTransportFactory {
    fn transport(
        &self,
        device: &Device,
        credentials: &CredentialSet,
        config: &ConnectionConfig,
    ) -> Box<dyn Transport> {
        Box::new(SshTransport::new(device, credentials, config))
    }
}

/// Scripted transport: a command → reply table, with every sent command
/// recorded. Used by driver unit tests and end-to-end scenario tests;
/// unscripted commands fail like a rejected remote command would, which
/// exercises the best-effort enrichment paths.
#[derive(Debug, Clone, Default)]
pub struct ReplayTransport {
    host: String,
    replies: HashMap<String, String>,
    refuse_connect: Option<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ReplayTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Script a reply for an exact command string.
    pub fn when(mut self, command: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies.insert(command.into(), reply.into());
        self
    }

    /// Make `open` fail with a connection error.
    pub fn unreachable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            refuse_connect: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Handle onto the commands sent so far; survives the transport being
    /// moved into a driver.
    pub fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn open(&mut self) -> Result<(), TraceError> {
        match &self.refuse_connect {
            Some(reason) => Err(TraceError::Connection {
                host: self.host.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<String, TraceError> {
        self.sent.lock().unwrap().push(command.to_string());
        match self.replies.get(command) {
            Some(reply) => Ok(reply.clone()),
            None => Err(TraceError::Command {
                host: self.host.clone(),
                command: command.to_string(),
                reason: "no scripted reply".to_string(),
            }),
        }
    }

    async fn close(&mut self) {}
}

/// Factory handing out scripted transports keyed by hostname.
#[derive(Debug, Clone, Default)]
pub struct ReplayFactory {
    by_host: HashMap<String, ReplayTransport>,
}

impl ReplayFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, hostname: impl Into<String>, transport: ReplayTransport) -> Self {
        self.by_host.insert(hostname.into(), transport);
        self
    }
}

impl TransportFactory for ReplayFactory {
    fn transport(
        &self,
        device: &Device,
        _credentials: &CredentialSet,
        _config: &ConnectionConfig,
    ) -> Box<dyn Transport> {
        match self.by_host.get(&device.hostname) {
            Some(transport) => Box::new(transport.clone()),
            None => Box::new(ReplayTransport::unreachable(
                device.hostname.clone(),
                "host not scripted",
            )),
        }
    }
}
