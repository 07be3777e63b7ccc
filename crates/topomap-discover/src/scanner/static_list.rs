//! Static host list discovery.
//!
//! File format, one host per line:
//! ```text
//! # comment
//! web1.example.com
//! deploy@10.0.0.7:2222  bastion
//! ```
//! The first field is an endpoint (`[user@]host[:port]`); an optional second
//! field overrides the display name.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;

use topomap_core::{alias, HostEndpoint, Node, ScanItem};

use crate::error::{DiscoverError, Result};
use crate::scanner::DiscoveryScanner;

/// One parsed line of a host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub endpoint: HostEndpoint,
    pub name: Option<String>,
}

/// Parse host list text. Errors name the offending line.
pub fn parse_host_list(text: &str) -> Result<Vec<HostEntry>> {
    let mut entries = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(raw) = fields.next() else {
            continue;
        };
        let endpoint = HostEndpoint::parse(raw)
            .map_err(|e| DiscoverError::parse("host list", format!("line {}: {e}", lineno + 1)))?;
        let rest: Vec<&str> = fields.collect();
        let name = (!rest.is_empty()).then(|| rest.join(" "));

        entries.push(HostEntry { endpoint, name });
    }

    Ok(entries)
}

pub struct StaticListScanner {
    path: PathBuf,
    resolve_names: bool,
}

impl StaticListScanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolve_names: true,
        }
    }

    /// Skip DNS lookups; hostnames only get a `host:` alias.
    pub fn without_resolution(mut self) -> Self {
        self.resolve_names = false;
        self
    }

    async fn entry_node(&self, entry: &HostEntry) -> Node {
        let address = entry.endpoint.address.clone();
        let name = entry.name.clone().unwrap_or_else(|| address.clone());
        let mut node = Node::host(&address, name, entry.endpoint.clone());

        if address.parse::<IpAddr>().is_ok() {
            node.add_alias(alias::ip(&address));
            return node;
        }

        node.add_alias(alias::host(&address));
        if self.resolve_names {
            let port = entry.endpoint.port.unwrap_or(22);
            match tokio::net::lookup_host((address.as_str(), port)).await {
                Ok(addrs) => {
                    for addr in addrs {
                        node.add_alias(alias::ip(&addr.ip().to_string()));
                    }
                }
                Err(e) => {
                    tracing::warn!(host = %address, error = %e, "Could not resolve host; ip alias omitted");
                }
            }
        }
        node
    }
}

#[async_trait]
impl DiscoveryScanner for StaticListScanner {
    fn name(&self) -> &str {
        "static"
    }

    async fn list(&self) -> Result<Vec<ScanItem>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let entries = parse_host_list(&text)?;

        let mut items = Vec::with_capacity(entries.len());
        for entry in &entries {
            items.push(ScanItem::Node(self.entry_node(entry).await));
        }

        tracing::info!(path = %self.path.display(), hosts = items.len(), "Static host list loaded");
        Ok(items)
    }
}
