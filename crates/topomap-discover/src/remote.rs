//! Remote command execution over SSH.
//!
//! Host probes only see the [`RemoteExecutor`] / [`RemoteSession`] traits.
//! [`SshExecutor`] drives the system `ssh` binary through
//! `tokio::process::Command`, with a ControlMaster socket so repeated
//! commands against one host share a single connection.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;

use topomap_core::HostEndpoint;

use crate::config::SshConfig;
use crate::error::{DiscoverError, Result};

/// Opens sessions to hosts.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Connect to `endpoint`. Fails with [`DiscoverError::Connect`] when the
    /// host is unreachable or refuses authentication within the timeout.
    async fn open(&self, endpoint: &HostEndpoint) -> Result<Box<dyn RemoteSession>>;
}

/// An open session to one host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a command and return its standard output.
    async fn run(&mut self, command: &str) -> Result<String>;
}

/// `ssh` exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Wrapper around the ssh binary.
pub struct SshExecutor {
    config: Arc<SshConfig>,
    control_dir: Option<PathBuf>,
    /// Destinations with a live ControlMaster, and the options that reach it.
    masters: Mutex<BTreeMap<String, Vec<String>>>,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config: Arc::new(config),
            control_dir: None,
            masters: Mutex::new(BTreeMap::new()),
        }
    }

    /// Multiplex connections through ControlMaster sockets in `dir`.
    pub fn with_control_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.control_dir = Some(dir.into());
        self
    }

    /// Option arguments for one invocation, excluding destination and command.
    fn base_args(&self, endpoint: &HostEndpoint) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-p".to_string(),
            endpoint.port.unwrap_or(self.config.port).to_string(),
        ];

        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }

        if let Some(dir) = &self.control_dir {
            args.extend([
                "-o".to_string(),
                "ControlMaster=auto".to_string(),
                "-o".to_string(),
                format!("ControlPath={}/%C", dir.display()),
                "-o".to_string(),
                "ControlPersist=60".to_string(),
            ]);
        }

        for opt in &self.config.extra_options {
            args.push("-o".to_string());
            args.push(opt.clone());
        }

        args
    }

    /// Ask every ControlMaster opened so far to exit. Returns how many were
    /// asked. Must run before the control directory is removed.
    pub async fn close_masters(&self) -> usize {
        let masters = std::mem::take(&mut *self.masters.lock().await);
        let count = masters.len();

        for (destination, args) in masters {
            let result = Command::new(&self.config.binary)
                .args(&args)
                .args(["-O", "exit", "--"])
                .arg(&destination)
                .output()
                .await;
            match result {
                Ok(out) if out.status.success() => {
                    tracing::debug!(destination = %destination, "SSH master closed");
                }
                Ok(out) => tracing::debug!(
                    destination = %destination,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "SSH master did not acknowledge exit"
                ),
                Err(e) => tracing::debug!(destination = %destination, error = %e, "Could not close SSH master"),
            }
        }

        count
    }

    fn destination(&self, endpoint: &HostEndpoint) -> String {
        match endpoint.user.as_ref().or(self.config.user.as_ref()) {
            Some(user) => format!("{user}@{}", endpoint.address),
            None => endpoint.address.clone(),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn open(&self, endpoint: &HostEndpoint) -> Result<Box<dyn RemoteSession>> {
        let mut session = SshSession {
            binary: self.config.binary.clone(),
            args: self.base_args(endpoint),
            destination: self.destination(endpoint),
            host: endpoint.address.clone(),
        };

        // Establishes the master connection when multiplexing is on.
        session.run("true").await?;
        tracing::debug!(host = %session.host, "SSH session opened");

        if self.control_dir.is_some() {
            self.masters
                .lock()
                .await
                .entry(session.destination.clone())
                .or_insert_with(|| session.args.clone());
        }

        Ok(Box::new(session))
    }
}

struct SshSession {
    binary: String,
    args: Vec<String>,
    destination: String,
    host: String,
}

impl SshSession {
    /// Full argument list. `--` ends option parsing so the destination is
    /// never read as an option.
    fn command_line(&self, command: &str) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push("--".to_string());
        argv.push(self.destination.clone());
        argv.push(command.to_string());
        argv
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(self.command_line(command))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DiscoverError::Connect {
                host: self.host.clone(),
                message: format!("{}: {e}", self.binary),
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(SSH_CONNECTION_FAILURE) => Err(DiscoverError::Connect {
                host: self.host.clone(),
                message: stderr,
            }),
            code => Err(DiscoverError::Remote {
                host: self.host.clone(),
                message: format!(
                    "`{command}` exited with code {}: {stderr}",
                    code.unwrap_or(-1)
                ),
            }),
        }
    }
}
