//! topomap-report: Run-scoped diagnostics for topology scans.
//!
//! A [`session::RunSession`] is created once per run and owned by the
//! coordinating task. It records phase timings and every recoverable
//! problem the engine swallows (failed probes, alias collisions, dropped
//! references), then finalizes into a [`RunReport`] that can be persisted
//! with a [`store::ReportStore`].

pub mod session;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use session::RunSession;
pub use store::{FileReportStore, ReportStore, StoreError};

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for one scan run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which engine phase a record belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovery,
    Probe,
    Output,
}

/// Category of a diagnostic event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A host probe raised and contributed zero facts.
    ProbeFailed,
    /// A node tried to claim an alias already owned by another node.
    AliasCollision,
    /// A node id was produced twice; the later one was ignored.
    DuplicateNode,
    /// A fact referenced an alias nobody owns and was dropped.
    UnresolvedAlias,
    /// A placeholder node was synthesized for an unknown alias.
    PlaceholderCreated,
    /// A fact named a source node that is not in the graph.
    UnknownSource,
    /// The external renderer failed.
    RendererFailed,
}

/// One recorded diagnostic event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub kind: EventKind,
    /// Scanner that produced the item, if known.
    pub scanner: Option<String>,
    /// Node the event concerns, if any.
    pub node: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Timing and volume of one scanner invocation (or one probe batch).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub scanner: String,
    /// Number of nodes probed (always 1 for discovery scanners).
    pub targets: usize,
    /// Items yielded (nodes plus facts).
    pub items: usize,
    pub failures: usize,
    pub duration_ms: u64,
}

/// Final shape of the graph produced by a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub placeholder_count: usize,
    /// Order-independent content digest of the graph.
    pub fingerprint: String,
}

/// The complete diagnostics record of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub id: RunId,
    /// Options the run was started with.
    pub context: serde_json::Value,
    pub phases: Vec<PhaseRecord>,
    pub events: Vec<RunEvent>,
    pub summary: Option<GraphSummary>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Number of events of the given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }
}
