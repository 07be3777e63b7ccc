//! Builder-pattern recorder for one scan run.
//!
//! ```
//! # use topomap_report::{session::RunSession, EventKind, Phase};
//! let mut session = RunSession::new();
//! session.set_context(serde_json::json!({"concurrency": 8}));
//! session.record_phase(Phase::Probe, "arp", 3, 12, 1, 840);
//! session.record_event(EventKind::ProbeFailed, Some("arp"), Some("i-1"), "connection refused");
//! let report = session.finish(None);
//! assert_eq!(report.count(EventKind::ProbeFailed), 1);
//! ```

use chrono::Utc;

use crate::{EventKind, GraphSummary, Phase, PhaseRecord, RunEvent, RunId, RunReport};

/// Records a run incrementally; owned by the single coordinating task.
pub struct RunSession {
    report: RunReport,
}

impl RunSession {
    pub fn new() -> Self {
        Self {
            report: RunReport {
                id: RunId::new(),
                context: serde_json::Value::Null,
                phases: Vec::new(),
                events: Vec::new(),
                summary: None,
                started_at: Utc::now(),
                completed_at: None,
            },
        }
    }

    pub fn id(&self) -> RunId {
        self.report.id
    }

    pub fn set_context(&mut self, context: serde_json::Value) {
        self.report.context = context;
    }

    pub fn record_phase(
        &mut self,
        phase: Phase,
        scanner: &str,
        targets: usize,
        items: usize,
        failures: usize,
        duration_ms: u64,
    ) {
        self.report.phases.push(PhaseRecord {
            phase,
            scanner: scanner.to_string(),
            targets,
            items,
            failures,
            duration_ms,
        });
    }

    pub fn record_event(
        &mut self,
        kind: EventKind,
        scanner: Option<&str>,
        node: Option<&str>,
        message: &str,
    ) {
        self.report.events.push(RunEvent {
            kind,
            scanner: scanner.map(String::from),
            node: node.map(String::from),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Events recorded so far of the given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.report.count(kind)
    }

    /// Read-only view of the report under construction.
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Close the session: set `completed_at` and attach the graph summary.
    pub fn finish(mut self, summary: Option<GraphSummary>) -> RunReport {
        self.report.summary = summary;
        self.report.completed_at = Some(Utc::now());
        self.report
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_sets_completion_and_summary() {
        let mut session = RunSession::new();
        let id = session.id();
        session.record_phase(Phase::Discovery, "cloud", 1, 4, 0, 120);

        let report = session.finish(Some(GraphSummary {
            node_count: 3,
            edge_count: 1,
            placeholder_count: 0,
            fingerprint: "abc".to_string(),
        }));

        assert_eq!(report.id, id);
        assert!(report.is_finished());
        assert_eq!(report.phases.len(), 1);
        assert_eq!(report.summary.as_ref().map(|s| s.node_count), Some(3));
    }

    #[test]
    fn events_are_counted_by_kind() {
        let mut session = RunSession::new();
        session.record_event(EventKind::ProbeFailed, Some("arp"), Some("i-1"), "timeout");
        session.record_event(EventKind::ProbeFailed, Some("arp"), Some("i-2"), "refused");
        session.record_event(EventKind::AliasCollision, None, Some("i-3"), "ip:10.0.0.5");

        assert_eq!(session.count(EventKind::ProbeFailed), 2);
        assert_eq!(session.count(EventKind::AliasCollision), 1);
        assert_eq!(session.count(EventKind::RendererFailed), 0);
        assert_eq!(session.report().events[0].scanner.as_deref(), Some("arp"));
    }
}
