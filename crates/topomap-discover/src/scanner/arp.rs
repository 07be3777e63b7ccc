//! ARP cache probe: every resolved neighbour of a host becomes a forward,
//! unlabeled relationship.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use topomap_core::{alias, Node, NodeKind, ProbeFact};

use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::scanner::{ProbeScanner, RemoteCommand, HOSTS_ONLY};

const ARP_COMMAND: &str = "arp -an";

/// Extract neighbour addresses from `arp -an` output.
///
/// Handles both the net-tools form
/// `? (10.0.0.2) at 0a:1b:2c:3d:4e:5f [ether] on eth0` and the BSD form
/// `? (10.0.0.2) at 0:1b:2c:3d:4e:5f on en0 ifscope [ethernet]`.
/// Incomplete entries are skipped.
pub fn parse_arp_output(output: &str) -> Vec<IpAddr> {
    let mut neighbours = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        let (Some(open), Some(close)) = (line.find('('), line.find(')')) else {
            continue;
        };
        if close <= open {
            continue;
        }
        let Ok(ip) = line[open + 1..close].parse::<IpAddr>() else {
            continue;
        };

        let Some(at_pos) = line.find(" at ") else {
            continue;
        };
        let mac = line[at_pos + 4..].split_whitespace().next().unwrap_or("");
        if !mac.contains(':') || mac == "00:00:00:00:00:00" {
            continue;
        }

        if !neighbours.contains(&ip) {
            neighbours.push(ip);
        }
    }

    neighbours
}

pub struct ArpScanner {
    remote: RemoteCommand,
}

impl ArpScanner {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            remote: RemoteCommand { executor },
        }
    }
}

#[async_trait]
impl ProbeScanner for ArpScanner {
    fn name(&self) -> &str {
        "arp"
    }

    fn applicable_kinds(&self) -> &[NodeKind] {
        HOSTS_ONLY
    }

    fn accepts(&self, node: &Node) -> bool {
        node.endpoint().is_some()
    }

    async fn list(&self, node: &Node) -> Result<Vec<ProbeFact>> {
        let output = self.remote.run(node, ARP_COMMAND).await?;
        Ok(parse_arp_output(&output)
            .into_iter()
            .map(|ip| ProbeFact::forward(node.id(), alias::ip(&ip.to_string())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testing::FakeExecutor;
    use topomap_core::HostEndpoint;

    const LINUX: &str = "\
? (10.0.0.2) at 0a:1b:2c:3d:4e:5f [ether] on eth0
? (10.0.0.3) at <incomplete> on eth0
gateway (10.0.0.1) at 0a:00:00:00:00:01 [ether] on eth0
? (10.0.0.2) at 0a:1b:2c:3d:4e:5f [ether] on eth1
";

    const MACOS: &str = "\
? (192.168.1.1) at 0:1a:2b:3c:4d:5e on en0 ifscope [ethernet]
? (192.168.1.9) at (incomplete) on en0 ifscope [ethernet]
";

    #[test]
    fn test_parse_linux_arp() {
        let ips = parse_arp_output(LINUX);
        let expected: Vec<IpAddr> = vec!["10.0.0.2".parse().unwrap(), "10.0.0.1".parse().unwrap()];
        assert_eq!(ips, expected);
    }

    #[test]
    fn test_parse_macos_arp() {
        let ips = parse_arp_output(MACOS);
        assert_eq!(ips, vec!["192.168.1.1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_arp_output("").is_empty());
        assert!(parse_arp_output("arp: in6_addr lookup failed\n(bogus) at aa:bb").is_empty());
    }

    #[tokio::test]
    async fn test_probe_yields_forward_facts() {
        let executor = FakeExecutor::default().with_output("10.0.0.10", ARP_COMMAND, LINUX);
        let scanner = ArpScanner::new(Arc::new(executor));
        let node = Node::host("i-1", "web", HostEndpoint::new("10.0.0.10"));

        let facts = scanner.list(&node).await.unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0], ProbeFact::forward(node.id(), "ip:10.0.0.2"));
        assert!(facts.iter().all(|f| f.forward && f.label.is_none()));
    }

    #[tokio::test]
    async fn test_unreachable_host_errors() {
        let executor = FakeExecutor::default().with_unreachable("10.0.0.10");
        let scanner = ArpScanner::new(Arc::new(executor));
        let node = Node::host("i-1", "web", HostEndpoint::new("10.0.0.10"));

        assert!(scanner.list(&node).await.is_err());
    }
}
