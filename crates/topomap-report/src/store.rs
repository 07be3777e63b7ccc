//! Run report storage — trait + directory-backed implementation.

use std::fs;
use std::path::PathBuf;

use crate::{RunId, RunReport};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Run report {0} is not finished")]
    NotFinished(RunId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence backend for run reports.
pub trait ReportStore {
    /// Store a finished report and return where it went.
    fn save(&self, report: &RunReport) -> Result<PathBuf, StoreError>;
}

/// Stores reports as pretty JSON files:
/// ```text
/// {root}/
///   2024/
///     01/
///       15/
///         {run_id}.json
/// ```
pub struct FileReportStore {
    root: PathBuf,
}

impl FileReportStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Where `report` is (or would be) stored.
    pub fn report_path(&self, report: &RunReport) -> PathBuf {
        let date = report.started_at.format("%Y/%m/%d");
        self.root.join(format!("{}/{}.json", date, report.id.0))
    }
}

impl ReportStore for FileReportStore {
    fn save(&self, report: &RunReport) -> Result<PathBuf, StoreError> {
        if !report.is_finished() {
            return Err(StoreError::NotFinished(report.id));
        }

        let path = self.report_path(report);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        tracing::debug!(run_id = %report.id, path = %path.display(), "Run report saved");

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RunSession;
    use crate::{EventKind, Phase};

    fn finished_report() -> RunReport {
        let mut session = RunSession::new();
        session.set_context(serde_json::json!({"include_unknown": true}));
        session.record_phase(Phase::Probe, "connections", 2, 7, 1, 300);
        session.record_event(EventKind::ProbeFailed, Some("connections"), Some("web1"), "exit 255");
        session.finish(None)
    }

    #[test]
    fn save_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path()).unwrap();
        let report = finished_report();

        let path = store.save(&report).unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(path, store.report_path(&report));

        let loaded: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.count(EventKind::ProbeFailed), 1);
    }

    #[test]
    fn save_rejects_unfinished() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path()).unwrap();
        let session = RunSession::new();

        let result = store.save(session.report());
        assert!(matches!(result, Err(StoreError::NotFinished(_))));
    }
}
