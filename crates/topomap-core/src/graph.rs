//! The deduplicated topology graph: node set, alias index, edge set.
//!
//! All mutation goes through [`TopologyGraph::add_node`] and
//! [`TopologyGraph::apply_fact`], which keep three invariants:
//! - no two nodes share an id,
//! - no two edges share `(from, to, label)`,
//! - every alias in the index resolves to a node in the node set.
//!
//! Nodes and edges live in ordered collections so that iteration (and
//! therefore serialized output) is stable for a given graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{Edge, Node, NodeId, NodeKind, ProbeFact};

/// Policy knobs applied during fact resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Synthesize a placeholder node for aliases nobody owns.
    pub include_unknown: bool,
    /// Keep edge labels. When false every label is stripped to `None`.
    pub show_labels: bool,
}

/// A later node tried to claim an alias already owned by another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasCollision {
    pub alias: String,
    pub owner: NodeId,
    pub rejected: NodeId,
}

/// Result of inserting a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeInsert {
    /// The node was added. Any aliases it lost to earlier owners are listed.
    Added { collisions: Vec<AliasCollision> },
    /// A node with the same id already exists; the new one was ignored.
    Duplicate,
}

/// What a fact would resolve to against the current graph state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The target alias belongs to an existing node.
    Existing(Edge),
    /// The target is unknown and a placeholder would be created for it.
    Placeholder { node: Node, edge: Edge },
    /// The target is unknown and unknown nodes are excluded.
    Unresolved { alias: String },
    /// The fact's source node is not in the graph.
    UnknownSource { source: NodeId },
}

/// What [`TopologyGraph::apply_fact`] did with a fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactOutcome {
    Inserted(Edge),
    /// The edge was already present under its dedup key.
    Duplicate(Edge),
    /// `collisions` lists placeholder aliases another node already owned.
    PlaceholderCreated {
        node: NodeId,
        edge: Edge,
        collisions: Vec<AliasCollision>,
    },
    Dropped { alias: String },
    UnknownSource { source: NodeId },
}

#[derive(Debug, Default, Clone)]
pub struct TopologyGraph {
    nodes: BTreeMap<NodeId, Node>,
    aliases: HashMap<String, NodeId>,
    edges: BTreeSet<Edge>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node and register its aliases, first writer wins.
    pub fn add_node(&mut self, node: Node) -> NodeInsert {
        if self.nodes.contains_key(node.id()) {
            tracing::debug!(node = %node.id(), "Duplicate node id ignored");
            return NodeInsert::Duplicate;
        }

        let mut collisions = Vec::new();
        for alias in node.aliases() {
            match self.aliases.get(alias) {
                Some(owner) => collisions.push(AliasCollision {
                    alias: alias.clone(),
                    owner: owner.clone(),
                    rejected: node.id().clone(),
                }),
                None => {
                    self.aliases.insert(alias.clone(), node.id().clone());
                }
            }
        }

        self.nodes.insert(node.id().clone(), node);
        NodeInsert::Added { collisions }
    }

    /// Resolve a fact against the current state without mutating anything.
    ///
    /// Calling this twice with the same fact and the same graph state always
    /// returns the same resolution.
    pub fn resolve(&self, fact: &ProbeFact, opts: ResolveOptions) -> Resolution {
        if !self.nodes.contains_key(&fact.source) {
            return Resolution::UnknownSource {
                source: fact.source.clone(),
            };
        }

        let label = if opts.show_labels {
            fact.label.clone()
        } else {
            None
        };

        let existing = self.aliases.get(&fact.target).cloned().or_else(|| {
            let as_id = NodeId(fact.target.clone());
            self.nodes.contains_key(&as_id).then_some(as_id)
        });

        match existing {
            Some(target) => Resolution::Existing(orient(fact, target, label)),
            None if opts.include_unknown => {
                let node = Node::placeholder(&fact.target);
                let edge = orient(fact, node.id().clone(), label);
                Resolution::Placeholder { node, edge }
            }
            None => Resolution::Unresolved {
                alias: fact.target.clone(),
            },
        }
    }

    /// Resolve a fact and merge the result into the graph.
    pub fn apply_fact(&mut self, fact: &ProbeFact, opts: ResolveOptions) -> FactOutcome {
        match self.resolve(fact, opts) {
            Resolution::Existing(edge) => self.insert_edge(edge),
            Resolution::Placeholder { node, edge } => {
                let id = node.id().clone();
                let collisions = match self.add_node(node) {
                    NodeInsert::Added { collisions } => collisions,
                    NodeInsert::Duplicate => Vec::new(),
                };
                self.edges.insert(edge.clone());
                FactOutcome::PlaceholderCreated {
                    node: id,
                    edge,
                    collisions,
                }
            }
            Resolution::Unresolved { alias } => FactOutcome::Dropped { alias },
            Resolution::UnknownSource { source } => FactOutcome::UnknownSource { source },
        }
    }

    fn insert_edge(&mut self, edge: Edge) -> FactOutcome {
        if self.edges.insert(edge.clone()) {
            FactOutcome::Inserted(edge)
        } else {
            FactOutcome::Duplicate(edge)
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The node that owns `alias`, if any.
    pub fn owner_of(&self, alias: &str) -> Option<&Node> {
        self.aliases.get(alias).and_then(|id| self.nodes.get(id))
    }

    /// Nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges ordered by `(from, to, label)`.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Snapshot of every node whose kind is in `kinds`.
    pub fn nodes_of_kind(&self, kinds: &[NodeKind]) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|n| kinds.contains(&n.kind()))
            .cloned()
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    /// BLAKE3 digest over node ids and edge keys, hex encoded.
    ///
    /// Independent of insertion order; two graphs with the same content
    /// produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for id in self.nodes.keys() {
            hasher.update(b"n\0");
            hasher.update(id.as_str().as_bytes());
            hasher.update(b"\n");
        }
        for edge in &self.edges {
            hasher.update(b"e\0");
            hasher.update(edge.from.as_str().as_bytes());
            hasher.update(b"\0");
            hasher.update(edge.to.as_str().as_bytes());
            hasher.update(b"\0");
            if let Some(label) = &edge.label {
                hasher.update(label.as_bytes());
            }
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn orient(fact: &ProbeFact, resolved: NodeId, label: Option<String>) -> Edge {
    if fact.forward {
        Edge::new(fact.source.clone(), resolved, label)
    } else {
        Edge::new(resolved, fact.source.clone(), label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostEndpoint;

    fn host(id: &str, ip: &str) -> Node {
        Node::host(id, id, HostEndpoint::new(ip)).with_alias(format!("ip:{ip}"))
    }

    fn labels() -> ResolveOptions {
        ResolveOptions {
            include_unknown: false,
            show_labels: true,
        }
    }

    #[test]
    fn test_add_node_registers_aliases() {
        let mut g = TopologyGraph::new();
        let outcome = g.add_node(host("i-1", "10.0.0.1"));

        assert_eq!(outcome, NodeInsert::Added { collisions: vec![] });
        assert_eq!(g.owner_of("ip:10.0.0.1").map(|n| n.id().as_str()), Some("i-1"));
        assert_eq!(g.owner_of("id:i-1").map(|n| n.id().as_str()), Some("i-1"));
        assert_eq!(g.alias_count(), 2);
    }

    #[test]
    fn test_duplicate_node_ignored() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));
        let outcome = g.add_node(host("i-1", "10.0.0.99"));

        assert_eq!(outcome, NodeInsert::Duplicate);
        assert_eq!(g.node_count(), 1);
        assert!(g.owner_of("ip:10.0.0.99").is_none());
    }

    #[test]
    fn test_alias_collision_first_writer_wins() {
        let mut g = TopologyGraph::new();
        g.add_node(host("web1", "10.0.0.5"));
        let outcome = g.add_node(host("i-abc", "10.0.0.5"));

        assert_eq!(
            outcome,
            NodeInsert::Added {
                collisions: vec![AliasCollision {
                    alias: "ip:10.0.0.5".to_string(),
                    owner: NodeId::from("web1"),
                    rejected: NodeId::from("i-abc"),
                }]
            }
        );
        assert_eq!(g.owner_of("ip:10.0.0.5").map(|n| n.id().as_str()), Some("web1"));
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn test_self_loop_inserted_once() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));
        let fact = ProbeFact::forward(&NodeId::from("i-1"), "ip:10.0.0.1");

        let first = g.apply_fact(&fact, ResolveOptions::default());
        let second = g.apply_fact(&fact, ResolveOptions::default());

        let expected = Edge::new("i-1".into(), "i-1".into(), None);
        assert_eq!(first, FactOutcome::Inserted(expected.clone()));
        assert_eq!(second, FactOutcome::Duplicate(expected));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_reverse_fact_orients_edge() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));
        g.add_node(host("i-2", "10.0.0.2"));

        let fact = ProbeFact::reverse(&NodeId::from("i-1"), "ip:10.0.0.2").with_label("ssh");
        g.apply_fact(&fact, labels());

        let edge = g.edges().next().unwrap();
        assert_eq!(edge.from.as_str(), "i-2");
        assert_eq!(edge.to.as_str(), "i-1");
        assert_eq!(edge.label.as_deref(), Some("ssh"));
    }

    #[test]
    fn test_labels_stripped_when_hidden() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));
        g.add_node(host("i-2", "10.0.0.2"));

        let src = NodeId::from("i-1");
        g.apply_fact(&ProbeFact::forward(&src, "id:i-2").with_label("redis"), ResolveOptions::default());
        g.apply_fact(&ProbeFact::forward(&src, "id:i-2").with_label("http"), ResolveOptions::default());

        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges().next().unwrap().label, None);
    }

    #[test]
    fn test_unknown_alias_dropped_without_include_unknown() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));

        let outcome = g.apply_fact(
            &ProbeFact::forward(&NodeId::from("i-1"), "ip:10.0.0.9"),
            ResolveOptions::default(),
        );

        assert_eq!(
            outcome,
            FactOutcome::Dropped {
                alias: "ip:10.0.0.9".to_string()
            }
        );
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_unknown_alias_materializes_placeholder() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));
        let opts = ResolveOptions {
            include_unknown: true,
            show_labels: false,
        };
        let fact = ProbeFact::forward(&NodeId::from("i-1"), "ip:10.0.0.9");

        let outcome = g.apply_fact(&fact, opts);
        assert!(matches!(outcome, FactOutcome::PlaceholderCreated { .. }));

        // Second occurrence resolves to the placeholder instead of creating another.
        let again = g.apply_fact(&fact, opts);
        assert!(matches!(again, FactOutcome::Duplicate(_)));

        let placeholder = g.node(&NodeId::from("ip:10.0.0.9")).unwrap();
        assert_eq!(placeholder.kind(), NodeKind::Unknown);
        assert_eq!(g.node_count(), 2);
        let touching = g
            .edges()
            .filter(|e| e.from.as_str() == "ip:10.0.0.9" || e.to.as_str() == "ip:10.0.0.9")
            .count();
        assert_eq!(touching, 1);
    }

    #[test]
    fn test_placeholder_reports_alias_collisions() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1").with_alias("id:ip:10.0.0.9"));
        let opts = ResolveOptions {
            include_unknown: true,
            show_labels: false,
        };

        let outcome = g.apply_fact(&ProbeFact::forward(&NodeId::from("i-1"), "ip:10.0.0.9"), opts);
        let FactOutcome::PlaceholderCreated { node, collisions, .. } = outcome else {
            panic!("expected placeholder, got {outcome:?}");
        };
        assert_eq!(node.as_str(), "ip:10.0.0.9");
        assert_eq!(
            collisions,
            vec![AliasCollision {
                alias: "id:ip:10.0.0.9".to_string(),
                owner: NodeId::from("i-1"),
                rejected: NodeId::from("ip:10.0.0.9"),
            }]
        );
        assert_eq!(g.owner_of("id:ip:10.0.0.9").map(|n| n.id().as_str()), Some("i-1"));
    }

    #[test]
    fn test_resolve_is_pure() {
        let mut g = TopologyGraph::new();
        g.add_node(host("i-1", "10.0.0.1"));
        let opts = ResolveOptions {
            include_unknown: true,
            show_labels: true,
        };
        let fact = ProbeFact::forward(&NodeId::from("i-1"), "ip:10.0.0.7").with_label("ssh");

        let a = g.resolve(&fact, opts);
        let b = g.resolve(&fact, opts);
        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let mut g = TopologyGraph::new();
        let outcome = g.apply_fact(
            &ProbeFact::forward(&NodeId::from("ghost"), "id:ghost"),
            ResolveOptions::default(),
        );
        assert_eq!(
            outcome,
            FactOutcome::UnknownSource {
                source: NodeId::from("ghost")
            }
        );
    }

    #[test]
    fn test_every_alias_resolves_to_present_node() {
        let mut g = TopologyGraph::new();
        g.add_node(host("a", "10.0.0.1"));
        g.add_node(host("b", "10.0.0.1"));
        g.apply_fact(
            &ProbeFact::forward(&NodeId::from("a"), "ip:10.9.9.9"),
            ResolveOptions {
                include_unknown: true,
                show_labels: false,
            },
        );

        for (alias, id) in &g.aliases {
            assert!(g.nodes.contains_key(id), "alias {alias} dangles");
        }
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let src = NodeId::from("a");
        let mut g1 = TopologyGraph::new();
        g1.add_node(host("a", "10.0.0.1"));
        g1.add_node(host("b", "10.0.0.2"));
        g1.apply_fact(&ProbeFact::forward(&src, "id:b"), ResolveOptions::default());
        g1.apply_fact(&ProbeFact::reverse(&src, "id:b"), ResolveOptions::default());

        let mut g2 = TopologyGraph::new();
        g2.add_node(host("b", "10.0.0.2"));
        g2.add_node(host("a", "10.0.0.1"));
        g2.apply_fact(&ProbeFact::reverse(&src, "id:b"), ResolveOptions::default());
        g2.apply_fact(&ProbeFact::forward(&src, "id:b"), ResolveOptions::default());

        assert_eq!(g1.fingerprint(), g2.fingerprint());
        assert_eq!(g1.fingerprint().len(), 64);

        g2.add_node(host("c", "10.0.0.3"));
        assert_ne!(g1.fingerprint(), g2.fingerprint());
    }
}
