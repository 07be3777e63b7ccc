//! topomap-discover: Infrastructure topology discovery.
//!
//! Seeds a graph from discovery scanners (cloud inventory, static host
//! lists), fans host probes (arp cache, login history, connection table)
//! out across every matching node over SSH, resolves the resulting facts
//! through the alias index, and writes the deduplicated graph as DOT for
//! an external renderer.

pub mod cloud;
pub mod config;
pub mod dot;
pub mod engine;
pub mod error;
pub mod remote;
pub mod render;
pub mod run;
pub mod scanner;

pub use engine::{Aggregator, EngineOptions, ScanOutcome, ScanSummary};
pub use error::DiscoverError;
