//! Login history probe: every remote address that logged into a host
//! becomes a relationship pointing at that host.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use topomap_core::{alias, Node, NodeKind, ProbeFact};

use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::scanner::{ProbeScanner, RemoteCommand, HOSTS_ONLY};

const LAST_COMMAND: &str = "last -i -w";
const LOGIN_LABEL: &str = "ssh";

/// Extract distinct remote login addresses from `last -i` output.
pub fn parse_last_output(output: &str) -> Vec<IpAddr> {
    let mut sources = Vec::new();

    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let Some(user) = fields.next() else {
            continue;
        };
        if matches!(user, "reboot" | "shutdown" | "wtmp" | "btmp") {
            continue;
        }

        let Some(ip) = fields.find_map(|f| f.parse::<IpAddr>().ok()) else {
            continue;
        };
        if ip.is_unspecified() || ip.is_loopback() {
            continue;
        }

        if !sources.contains(&ip) {
            sources.push(ip);
        }
    }

    sources
}

pub struct LoginScanner {
    remote: RemoteCommand,
}

impl LoginScanner {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            remote: RemoteCommand { executor },
        }
    }
}

#[async_trait]
impl ProbeScanner for LoginScanner {
    fn name(&self) -> &str {
        "logins"
    }

    fn applicable_kinds(&self) -> &[NodeKind] {
        HOSTS_ONLY
    }

    fn accepts(&self, node: &Node) -> bool {
        node.endpoint().is_some()
    }

    async fn list(&self, node: &Node) -> Result<Vec<ProbeFact>> {
        let output = self.remote.run(node, LAST_COMMAND).await?;
        Ok(parse_last_output(&output)
            .into_iter()
            .map(|ip| ProbeFact::reverse(node.id(), alias::ip(&ip.to_string())).with_label(LOGIN_LABEL))
            .collect())
    }
}
