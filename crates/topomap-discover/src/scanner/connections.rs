//! Connection table probe.
//!
//! Parses established TCP connections from `netstat -tn` and decides, per
//! row, whether the host is serving (peer → host) or calling out
//! (host → peer). The edge label names the service port.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;

use topomap_core::{alias, Node, NodeKind, ProbeFact};

use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::scanner::{ProbeScanner, RemoteCommand, HOSTS_ONLY};

const NETSTAT_COMMAND: &str = "netstat -tn";

/// One established TCP connection as seen from the probed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

/// Which way a connection points relative to the probed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Peer connected to a service on this host.
    Inbound { service_port: u16 },
    /// This host connected to a service on the peer.
    Outbound { service_port: u16 },
}

/// Parse `host:port` as printed by netstat, unwrapping v4-mapped v6 addresses.
fn parse_socket(raw: &str) -> Option<SocketAddr> {
    let (host, port) = raw.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let ip = match host.parse::<IpAddr>().ok()? {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };
    Some(SocketAddr::new(ip, port))
}

/// Extract `ESTABLISHED` TCP rows from `netstat -tn` output.
pub fn parse_netstat_output(output: &str) -> Vec<Connection> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 || !fields[0].starts_with("tcp") || fields[5] != "ESTABLISHED" {
                return None;
            }
            Some(Connection {
                local: parse_socket(fields[3])?,
                peer: parse_socket(fields[4])?,
            })
        })
        .collect()
}

/// Classify a connection against the service port allow-list.
///
/// With an empty allow-list the lower port is taken to be the service side.
/// With a non-empty list, rows where neither side is allowed are dropped.
pub fn classify(conn: &Connection, ports: &[u16]) -> Option<Direction> {
    let local = conn.local.port();
    let peer = conn.peer.port();

    if ports.is_empty() {
        return Some(if local < peer {
            Direction::Inbound { service_port: local }
        } else {
            Direction::Outbound { service_port: peer }
        });
    }

    if ports.contains(&local) {
        Some(Direction::Inbound { service_port: local })
    } else if ports.contains(&peer) {
        Some(Direction::Outbound { service_port: peer })
    } else {
        None
    }
}

/// Well-known service name for a port, or the port number.
pub fn service_name(port: u16) -> String {
    let name = match port {
        21 => "ftp",
        22 => "ssh",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        389 => "ldap",
        443 => "https",
        636 => "ldaps",
        1433 => "mssql",
        2049 => "nfs",
        3306 => "mysql",
        5432 => "postgres",
        5672 => "amqp",
        6379 => "redis",
        8080 => "http-alt",
        9092 => "kafka",
        9200 => "elasticsearch",
        11211 => "memcached",
        27017 => "mongodb",
        _ => return port.to_string(),
    };
    name.to_string()
}

pub struct ConnectionScanner {
    remote: RemoteCommand,
    ports: Vec<u16>,
}

impl ConnectionScanner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, ports: Vec<u16>) -> Self {
        Self {
            remote: RemoteCommand { executor },
            ports,
        }
    }
}

#[async_trait]
impl ProbeScanner for ConnectionScanner {
    fn name(&self) -> &str {
        "connections"
    }

    fn applicable_kinds(&self) -> &[NodeKind] {
        HOSTS_ONLY
    }

    fn accepts(&self, node: &Node) -> bool {
        node.endpoint().is_some()
    }

    async fn list(&self, node: &Node) -> Result<Vec<ProbeFact>> {
        let output = self.remote.run(node, NETSTAT_COMMAND).await?;

        let mut facts = Vec::new();
        for conn in parse_netstat_output(&output) {
            if conn.peer.ip().is_loopback() {
                continue;
            }
            let target = alias::ip(&conn.peer.ip().to_string());
            let fact = match classify(&conn, &self.ports) {
                Some(Direction::Inbound { service_port }) => {
                    ProbeFact::reverse(node.id(), target).with_label(service_name(service_port))
                }
                Some(Direction::Outbound { service_port }) => {
                    ProbeFact::forward(node.id(), target).with_label(service_name(service_port))
                }
                None => continue,
            };
            if !facts.contains(&fact) {
                facts.push(fact);
            }
        }

        Ok(facts)
    }
}
