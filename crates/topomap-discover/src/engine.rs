//! Aggregation engine.
//!
//! Runs discovery scanners one after another to seed the graph, then runs
//! each probe scanner against every matching node with a semaphore-bounded
//! set of tokio tasks. Workers only return facts; the coordinating task is
//! the only writer of the graph and the run session, so neither needs a lock.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use topomap_core::{AliasCollision, FactOutcome, Node, NodeInsert, ProbeFact, ResolveOptions, ScanItem, TopologyGraph};
use topomap_report::{EventKind, GraphSummary, Phase, RunSession};

use crate::error::Result;
use crate::scanner::{DiscoveryScanner, ProbeScanner};

/// Engine-wide knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Worker pool size for one probe batch.
    pub concurrency: usize,
    pub include_unknown: bool,
    pub show_labels: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            include_unknown: false,
            show_labels: false,
        }
    }
}

impl EngineOptions {
    fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            include_unknown: self.include_unknown,
            show_labels: self.show_labels,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub nodes: usize,
    pub edges: usize,
    pub placeholders: usize,
    pub dropped_facts: usize,
    pub failed_probes: usize,
    pub alias_collisions: usize,
}

/// The finished graph together with its counters.
#[derive(Debug)]
pub struct ScanOutcome {
    pub graph: TopologyGraph,
    pub summary: ScanSummary,
}

impl ScanOutcome {
    /// Summary in the shape stored in run reports.
    pub fn graph_summary(&self) -> GraphSummary {
        GraphSummary {
            node_count: self.summary.nodes,
            edge_count: self.summary.edges,
            placeholder_count: self.summary.placeholders,
            fingerprint: self.graph.fingerprint(),
        }
    }
}

/// Orchestrates scanners in declaration order.
pub struct Aggregator {
    options: EngineOptions,
    discovery: Vec<Box<dyn DiscoveryScanner>>,
    probes: Vec<Arc<dyn ProbeScanner>>,
}

impl Aggregator {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            discovery: Vec::new(),
            probes: Vec::new(),
        }
    }

    pub fn with_discovery(mut self, scanner: impl DiscoveryScanner + 'static) -> Self {
        self.discovery.push(Box::new(scanner));
        self
    }

    pub fn with_probe(mut self, scanner: impl ProbeScanner + 'static) -> Self {
        self.probes.push(Arc::new(scanner));
        self
    }

    pub fn add_discovery(&mut self, scanner: Box<dyn DiscoveryScanner>) {
        self.discovery.push(scanner);
    }

    pub fn add_probe(&mut self, scanner: Arc<dyn ProbeScanner>) {
        self.probes.push(scanner);
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run every configured scanner and build the graph.
    ///
    /// A discovery scanner error aborts the run. Probe errors (and panics)
    /// are logged, recorded in `session`, and count as zero facts.
    pub async fn run(&self, session: &mut RunSession) -> Result<ScanOutcome> {
        let mut state = MergeState {
            graph: TopologyGraph::new(),
            summary: ScanSummary::default(),
            resolve: self.options.resolve_options(),
            session,
        };

        // Discovery phase: sequential, nodes merged immediately.
        let mut queued: Vec<(String, ProbeFact)> = Vec::new();
        for scanner in &self.discovery {
            let start = Instant::now();
            tracing::info!(scanner = %scanner.name(), "Discovery scanner started");

            let items = match scanner.list().await {
                Ok(items) => items,
                Err(e) => {
                    tracing::error!(scanner = %scanner.name(), error = %e, "Discovery scanner failed");
                    return Err(e);
                }
            };

            let item_count = items.len();
            for item in items {
                match item {
                    ScanItem::Node(node) => state.merge_node(scanner.name(), node),
                    ScanItem::Fact(fact) => queued.push((scanner.name().to_string(), fact)),
                }
            }

            let duration_ms = start.elapsed().as_millis() as u64;
            state
                .session
                .record_phase(Phase::Discovery, scanner.name(), 1, item_count, 0, duration_ms);
            tracing::info!(
                scanner = %scanner.name(),
                items = item_count,
                nodes = state.graph.node_count(),
                duration_ms,
                "Discovery scanner complete"
            );
        }

        for (scanner, fact) in &queued {
            state.resolve_fact(scanner, fact);
        }

        // Probe phase: one bounded concurrent batch per scanner.
        for scanner in &self.probes {
            self.run_probe_batch(scanner, &mut state).await;
        }

        state.summary.nodes = state.graph.node_count();
        state.summary.edges = state.graph.edge_count();

        tracing::info!(
            nodes = state.summary.nodes,
            edges = state.summary.edges,
            placeholders = state.summary.placeholders,
            dropped_facts = state.summary.dropped_facts,
            failed_probes = state.summary.failed_probes,
            fingerprint = %state.graph.fingerprint(),
            "Aggregation complete"
        );

        Ok(ScanOutcome {
            graph: state.graph,
            summary: state.summary,
        })
    }

    async fn run_probe_batch(&self, scanner: &Arc<dyn ProbeScanner>, state: &mut MergeState<'_>) {
        let start = Instant::now();
        let (targets, skipped): (Vec<Node>, Vec<Node>) = state
            .graph
            .nodes_of_kind(scanner.applicable_kinds())
            .into_iter()
            .partition(|node| scanner.accepts(node));
        let target_count = targets.len();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        tracing::info!(
            scanner = %scanner.name(),
            targets = target_count,
            skipped = skipped.len(),
            concurrency = self.options.concurrency,
            "Probe batch started"
        );

        let mut handles = Vec::with_capacity(target_count);
        for node in targets {
            let id = node.id().clone();
            let scanner = scanner.clone();
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                scanner.list(&node).await
            });
            handles.push((id, handle));
        }

        // Collect the whole batch before touching the graph.
        let mut facts = Vec::new();
        let mut failures = 0;
        for (id, handle) in handles {
            let message = match handle.await {
                Ok(Ok(node_facts)) => {
                    tracing::debug!(scanner = %scanner.name(), node = %id, facts = node_facts.len(), "Probe complete");
                    facts.extend(node_facts);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("probe task failed: {e}"),
            };

            failures += 1;
            tracing::warn!(scanner = %scanner.name(), node = %id, error = %message, "Probe failed; no facts from this node");
            state.session.record_event(
                EventKind::ProbeFailed,
                Some(scanner.name()),
                Some(id.as_str()),
                &message,
            );
        }

        let fact_count = facts.len();
        for fact in &facts {
            state.resolve_fact(scanner.name(), fact);
        }
        state.summary.failed_probes += failures;

        let duration_ms = start.elapsed().as_millis() as u64;
        state.session.record_phase(
            Phase::Probe,
            scanner.name(),
            target_count,
            fact_count,
            failures,
            duration_ms,
        );
        tracing::info!(
            scanner = %scanner.name(),
            targets = target_count,
            facts = fact_count,
            failures,
            edges = state.graph.edge_count(),
            duration_ms,
            "Probe batch complete"
        );
    }
}

/// Graph plus bookkeeping, mutated only by the coordinating task.
struct MergeState<'a> {
    graph: TopologyGraph,
    summary: ScanSummary,
    resolve: ResolveOptions,
    session: &'a mut RunSession,
}

impl MergeState<'_> {
    fn merge_node(&mut self, scanner: &str, node: Node) {
        let id = node.id().clone();
        match self.graph.add_node(node) {
            NodeInsert::Added { collisions } => self.record_collisions(scanner, collisions),
            NodeInsert::Duplicate => {
                self.session.record_event(
                    EventKind::DuplicateNode,
                    Some(scanner),
                    Some(id.as_str()),
                    "node id already present; later node ignored",
                );
            }
        }
    }

    fn record_collisions(&mut self, scanner: &str, collisions: Vec<AliasCollision>) {
        for c in collisions {
            self.summary.alias_collisions += 1;
            tracing::warn!(
                scanner,
                alias = %c.alias,
                owner = %c.owner,
                rejected = %c.rejected,
                "Alias already claimed; keeping first owner"
            );
            self.session.record_event(
                EventKind::AliasCollision,
                Some(scanner),
                Some(c.rejected.as_str()),
                &format!("{} already owned by {}", c.alias, c.owner),
            );
        }
    }

    fn resolve_fact(&mut self, scanner: &str, fact: &ProbeFact) {
        match self.graph.apply_fact(fact, self.resolve) {
            FactOutcome::Inserted(_) | FactOutcome::Duplicate(_) => {}
            FactOutcome::PlaceholderCreated {
                node, collisions, ..
            } => {
                self.summary.placeholders += 1;
                tracing::debug!(scanner, node = %node, "Placeholder node created");
                self.session.record_event(
                    EventKind::PlaceholderCreated,
                    Some(scanner),
                    Some(node.as_str()),
                    &format!("referenced by {}", fact.source),
                );
                self.record_collisions(scanner, collisions);
            }
            FactOutcome::Dropped { alias } => {
                self.summary.dropped_facts += 1;
                tracing::debug!(scanner, source = %fact.source, alias = %alias, "Unresolved alias dropped");
                self.session.record_event(
                    EventKind::UnresolvedAlias,
                    Some(scanner),
                    Some(fact.source.as_str()),
                    &alias,
                );
            }
            FactOutcome::UnknownSource { source } => {
                self.summary.dropped_facts += 1;
                tracing::warn!(scanner, source = %source, "Fact from unknown source node dropped");
                self.session.record_event(
                    EventKind::UnknownSource,
                    Some(scanner),
                    Some(source.as_str()),
                    &fact.target,
                );
            }
        }
    }
}
