//! Core value types for the topology graph.
//!
//! Nodes and edges are plain values: they are created during one aggregation
//! pass, never mutated once inserted into a [`crate::TopologyGraph`], and
//! discarded after serialization.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::alias;
use crate::error::{CoreError, Result};

// ── Node Types ────────────────────────────────────────────────────

/// Opaque, run-unique node identifier (instance id, LB name, hostname, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The closed set of node categories. Probe scanners declare which of these
/// they accept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Placeholder for an entity only known through an alias.
    Unknown,
    Host,
    Elb,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Host => "host",
            Self::Elb => "elb",
        };
        f.write_str(s)
    }
}

/// Where a remote session for a host should connect.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HostEndpoint {
    pub address: String,
    pub port: Option<u16>,
    pub user: Option<String>,
}

impl HostEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: None,
            user: None,
        }
    }

    /// Parse `[user@]address[:port]`. Bracketed IPv6 (`[fe80::1]:22`) is accepted.
    ///
    /// A user or address starting with `-` is rejected so it can never be
    /// read as a command-line option downstream.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || CoreError::InvalidEndpoint(raw.to_string());

        let (user, rest) = match raw.split_once('@') {
            Some((u, r)) if !u.is_empty() => (Some(u.to_string()), r),
            Some(_) => return Err(invalid()),
            None => (None, raw),
        };

        let (address, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let (addr, tail) = stripped.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(p.parse::<u16>().map_err(|_| invalid())?),
                None if tail.is_empty() => None,
                None => return Err(invalid()),
            };
            (addr.to_string(), port)
        } else if rest.matches(':').count() == 1 {
            let (addr, p) = rest.split_once(':').ok_or_else(invalid)?;
            (addr.to_string(), Some(p.parse::<u16>().map_err(|_| invalid())?))
        } else {
            (rest.to_string(), None)
        };

        if address.is_empty() || address.starts_with('-') {
            return Err(invalid());
        }
        if user.as_deref().is_some_and(|u| u.starts_with('-')) {
            return Err(invalid());
        }

        Ok(Self {
            address,
            port,
            user,
        })
    }
}

/// Variant-specific payload of a node.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeVariant {
    Unknown,
    /// `endpoint` is `None` when the host has no known address.
    Host { endpoint: Option<HostEndpoint> },
    Elb { dns_name: Option<String> },
}

/// An entity in the topology.
///
/// Equality and hashing use `id` alone: two nodes with the same id are
/// interchangeable regardless of name, variant, or aliases. Only the
/// constructors below build nodes, so `id:<id>` is always among the aliases.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    id: NodeId,
    pub name: String,
    pub variant: NodeVariant,
    aliases: BTreeSet<String>,
}

impl Node {
    fn with_variant(id: impl Into<String>, name: impl Into<String>, variant: NodeVariant) -> Self {
        let id = id.into();
        let mut aliases = BTreeSet::new();
        aliases.insert(alias::id(&id));
        Self {
            id: NodeId(id),
            name: name.into(),
            variant,
            aliases,
        }
    }

    /// A host reachable through `endpoint`.
    pub fn host(id: impl Into<String>, name: impl Into<String>, endpoint: HostEndpoint) -> Self {
        Self::with_variant(
            id,
            name,
            NodeVariant::Host {
                endpoint: Some(endpoint),
            },
        )
    }

    /// A host nothing can connect to; remote probes skip it.
    pub fn unreachable_host(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_variant(id, name, NodeVariant::Host { endpoint: None })
    }

    /// A load-balancer front end.
    pub fn elb(id: impl Into<String>, name: impl Into<String>, dns_name: Option<String>) -> Self {
        Self::with_variant(id, name, NodeVariant::Elb { dns_name })
    }

    /// Placeholder for an unresolved alias: `id = name = alias`, and the node
    /// owns the alias itself.
    pub fn placeholder(alias: &str) -> Self {
        Self::with_variant(alias, alias, NodeVariant::Unknown).with_alias(alias)
    }

    /// Add an alias (builder style).
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn add_alias(&mut self, alias: impl Into<String>) {
        self.aliases.insert(alias.into());
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        match self.variant {
            NodeVariant::Unknown => NodeKind::Unknown,
            NodeVariant::Host { .. } => NodeKind::Host,
            NodeVariant::Elb { .. } => NodeKind::Elb,
        }
    }

    /// All aliases, including `id:<id>`.
    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }

    pub fn endpoint(&self) -> Option<&HostEndpoint> {
        match &self.variant {
            NodeVariant::Host { endpoint } => endpoint.as_ref(),
            _ => None,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ── Edge Types ────────────────────────────────────────────────────

/// A directed relationship. The whole struct is the dedup key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: Option<String>,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, label: Option<String>) -> Self {
        Self { from, to, label }
    }
}

// ── Scanner output ────────────────────────────────────────────────

/// An unresolved relationship from a known node to whatever node owns
/// `target`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct ProbeFact {
    pub source: NodeId,
    pub target: String,
    /// `true`: source → target. `false`: target → source.
    pub forward: bool,
    pub label: Option<String>,
}

impl ProbeFact {
    pub fn forward(source: &NodeId, target: impl Into<String>) -> Self {
        Self {
            source: source.clone(),
            target: target.into(),
            forward: true,
            label: None,
        }
    }

    pub fn reverse(source: &NodeId, target: impl Into<String>) -> Self {
        Self {
            forward: false,
            ..Self::forward(source, target)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One item yielded by a scanner.
#[derive(Debug, Clone)]
pub enum ScanItem {
    Node(Node),
    Fact(ProbeFact),
}

impl From<Node> for ScanItem {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<ProbeFact> for ScanItem {
    fn from(fact: ProbeFact) -> Self {
        Self::Fact(fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_carries_id_alias() {
        let node = Node::host("i-abc123", "web", HostEndpoint::new("10.0.0.5"));
        assert!(node.aliases().contains("id:i-abc123"));
        assert_eq!(node.kind(), NodeKind::Host);
        assert_eq!(node.endpoint().map(|e| e.address.as_str()), Some("10.0.0.5"));
    }

    #[test]
    fn node_equality_is_by_id() {
        let a = Node::host("i-1", "first", HostEndpoint::new("10.0.0.1"));
        let b = Node::elb("i-1", "second", None).with_alias("ip:10.9.9.9");
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn placeholder_owns_its_alias() {
        let node = Node::placeholder("ip:10.0.0.9");
        assert_eq!(node.id().as_str(), "ip:10.0.0.9");
        assert_eq!(node.name, "ip:10.0.0.9");
        assert_eq!(node.kind(), NodeKind::Unknown);
        assert!(node.aliases().contains("ip:10.0.0.9"));
        assert!(node.aliases().contains("id:ip:10.0.0.9"));
    }

    #[test]
    fn edge_dedup_key_includes_label() {
        let plain = Edge::new("a".into(), "b".into(), None);
        let labeled = Edge::new("a".into(), "b".into(), Some("redis".into()));
        assert_ne!(plain, labeled);
        assert_eq!(plain, Edge::new("a".into(), "b".into(), None));
    }

    #[test]
    fn probe_fact_constructors() {
        let src = NodeId::from("i-1");
        let fwd = ProbeFact::forward(&src, "ip:10.0.0.2").with_label("ssh");
        assert!(fwd.forward);
        assert_eq!(fwd.label.as_deref(), Some("ssh"));
        assert!(!ProbeFact::reverse(&src, "ip:10.0.0.2").forward);
    }

    #[test]
    fn endpoint_parse_forms() {
        assert_eq!(HostEndpoint::parse("web1").unwrap(), HostEndpoint::new("web1"));

        let full = HostEndpoint::parse("deploy@10.0.0.5:2222").unwrap();
        assert_eq!(full.user.as_deref(), Some("deploy"));
        assert_eq!(full.address, "10.0.0.5");
        assert_eq!(full.port, Some(2222));

        let v6 = HostEndpoint::parse("[fe80::1]:22").unwrap();
        assert_eq!(v6.address, "fe80::1");
        assert_eq!(v6.port, Some(22));

        let bare_v6 = HostEndpoint::parse("fe80::1").unwrap();
        assert_eq!(bare_v6.address, "fe80::1");
        assert_eq!(bare_v6.port, None);
    }

    #[test]
    fn endpoint_parse_rejects_garbage() {
        assert!(HostEndpoint::parse("").is_err());
        assert!(HostEndpoint::parse("@host").is_err());
        assert!(HostEndpoint::parse("host:notaport").is_err());
        assert!(HostEndpoint::parse("[fe80::1]x").is_err());
    }

    #[test]
    fn endpoint_parse_rejects_option_like_values() {
        assert!(HostEndpoint::parse("-oProxyCommand=touch${IFS}/tmp/x").is_err());
        assert!(HostEndpoint::parse("-p").is_err());
        assert!(HostEndpoint::parse("-oProxyCommand=x@10.0.0.5").is_err());
        assert!(HostEndpoint::parse("[-oProxyCommand=x]:22").is_err());
        assert!(HostEndpoint::parse("web-1.internal").is_ok());
    }

    #[test]
    fn unreachable_host_has_no_endpoint() {
        let node = Node::unreachable_host("i-dark", "dark");
        assert_eq!(node.kind(), NodeKind::Host);
        assert!(node.endpoint().is_none());
        assert!(node.aliases().contains("id:i-dark"));
    }

    #[test]
    fn node_serializes_with_id_alias() {
        let node = Node::host("i-1", "web", HostEndpoint::new("10.0.0.1")).with_alias("ip:10.0.0.1");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], "i-1");
        assert_eq!(json["variant"]["kind"], "host");
        assert_eq!(json["variant"]["endpoint"]["address"], "10.0.0.1");
        assert_eq!(json["aliases"], serde_json::json!(["id:i-1", "ip:10.0.0.1"]));
    }

    #[test]
    fn node_kind_display() {
        assert_eq!(NodeKind::Unknown.to_string(), "unknown");
        assert_eq!(NodeKind::Host.to_string(), "host");
        assert_eq!(NodeKind::Elb.to_string(), "elb");
    }
}
