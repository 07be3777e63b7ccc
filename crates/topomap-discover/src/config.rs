//! Configuration for a topomap run.

use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `topomap.toml` or
/// `TOPOMAP__DISCOVER__` environment variables; CLI flags override both.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Maximum concurrent host probes per scanner.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Create placeholder nodes for aliases no scanner claimed.
    #[serde(default)]
    pub include_unknown: bool,

    /// Keep service/protocol labels on edges.
    #[serde(default)]
    pub show_labels: bool,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub connections: ConnectionsConfig,

    /// Directory for persisted run reports. Reports are not stored when unset.
    #[serde(default)]
    pub report_dir: Option<String>,
}

/// Remote-execution settings shared by all host probes.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_binary")]
    pub binary: String,

    /// Login user when the host endpoint does not name one.
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub identity_file: Option<String>,

    /// Extra `-o Key=Value` options passed verbatim.
    #[serde(default)]
    pub extra_options: Vec<String>,
}

/// Cloud inventory (AWS CLI) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_cloud_binary")]
    pub binary: String,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub profile: Option<String>,

    /// Extra instance filters in CLI form, e.g. `Name=tag:env,Values=prod`.
    #[serde(default)]
    pub instance_filters: Vec<String>,
}

/// External renderer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_render_binary")]
    pub binary: String,

    /// Layout engine name passed as `-K<layout>`.
    #[serde(default = "default_layout")]
    pub layout: String,

    /// Output format passed as `-T<format>`.
    #[serde(default = "default_format")]
    pub format: String,
}

/// Connection-table scanner settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionsConfig {
    /// Service ports to keep. Empty keeps every established connection.
    #[serde(default)]
    pub ports: Vec<u16>,
}

impl DiscoverConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            concurrency: self.concurrency,
            include_unknown: self.include_unknown,
            show_labels: self.show_labels,
        }
    }

    /// Reject settings that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(DiscoverError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.ssh.connect_timeout_secs == 0 {
            return Err(DiscoverError::Config(
                "ssh.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a comma-separated port list such as `22,80,443`.
pub fn parse_ports(raw: &str) -> Result<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>()
                .map_err(|_| DiscoverError::Config(format!("Invalid port: {s}")))
        })
        .collect()
}

fn default_concurrency() -> usize {
    8
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_cloud_binary() -> String {
    "aws".to_string()
}

fn default_render_binary() -> String {
    "dot".to_string()
}

fn default_layout() -> String {
    "dot".to_string()
}

fn default_format() -> String {
    "png".to_string()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            include_unknown: false,
            show_labels: false,
            ssh: SshConfig::default(),
            cloud: CloudConfig::default(),
            render: RenderConfig::default(),
            connections: ConnectionsConfig::default(),
            report_dir: None,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: default_ssh_binary(),
            user: None,
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            identity_file: None,
            extra_options: Vec::new(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            binary: default_cloud_binary(),
            region: None,
            profile: None,
            instance_filters: Vec::new(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            binary: default_render_binary(),
            layout: default_layout(),
            format: default_format(),
        }
    }
}
