//! topomap-core: Identity and graph model for infrastructure topology discovery.
//!
//! This crate provides the value types every scanner speaks:
//! - Nodes (placeholder, host, load balancer) with alias-based identity
//! - Edges keyed by `(from, to, label)`
//! - Probe facts: unresolved relationships awaiting alias resolution
//! - `TopologyGraph`: the deduplicated node set, alias index, and edge set

pub mod alias;
pub mod error;
pub mod graph;
pub mod types;

pub use error::CoreError;
pub use graph::{AliasCollision, FactOutcome, NodeInsert, Resolution, ResolveOptions, TopologyGraph};
pub use types::{Edge, HostEndpoint, Node, NodeId, NodeKind, NodeVariant, ProbeFact, ScanItem};
