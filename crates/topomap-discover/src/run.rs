//! One complete discovery run: scanners → engine → DOT → image → report.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use topomap_report::{EventKind, FileReportStore, Phase, ReportStore, RunReport, RunSession};

use crate::cloud::AwsCliInventory;
use crate::config::DiscoverConfig;
use crate::dot::write_dot;
use crate::engine::Aggregator;
use crate::error::{DiscoverError, Result};
use crate::remote::{RemoteExecutor, SshExecutor};
use crate::render::{remediation, Renderer};
use crate::scanner::{ArpScanner, CloudScanner, ConnectionScanner, LoginScanner, StaticListScanner};

/// Where the graph description goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// `-` means standard output.
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            Self::Stdout
        } else {
            Self::File(PathBuf::from(raw))
        }
    }
}

/// Which scanners to run and where results go.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub cloud: bool,
    pub hosts: Option<PathBuf>,
    pub arp: bool,
    pub logins: bool,
    pub connections: bool,
    pub output: OutputTarget,
    pub image: Option<PathBuf>,
}

impl RunRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.cloud && self.hosts.is_none() {
            return Err(DiscoverError::Config(
                "no discovery source selected: pass --cloud and/or --hosts <file>".to_string(),
            ));
        }
        if self.image.is_some() && self.output == OutputTarget::Stdout {
            return Err(DiscoverError::Config(
                "--image needs the graph written to a file: pass -o <file>".to_string(),
            ));
        }
        Ok(())
    }

    fn has_probes(&self) -> bool {
        self.arp || self.logins || self.connections
    }
}

/// Build the engine with the scanners `request` selects.
///
/// Discovery order is cloud, then the static list. Probe order is arp,
/// logins, connections. Probes share one SSH executor.
pub fn build_aggregator(
    config: &DiscoverConfig,
    request: &RunRequest,
    executor: Option<Arc<dyn RemoteExecutor>>,
) -> Aggregator {
    let mut engine = Aggregator::new(config.engine_options());

    if request.cloud {
        let inventory = Arc::new(AwsCliInventory::new(config.cloud.clone()));
        engine.add_discovery(Box::new(CloudScanner::new(
            inventory,
            config.cloud.instance_filters.clone(),
        )));
    }
    if let Some(path) = &request.hosts {
        engine.add_discovery(Box::new(StaticListScanner::new(path)));
    }

    if request.has_probes() {
        let executor = executor
            .unwrap_or_else(|| Arc::new(SshExecutor::new(config.ssh.clone())) as Arc<dyn RemoteExecutor>);
        if request.arp {
            engine.add_probe(Arc::new(ArpScanner::new(executor.clone())));
        }
        if request.logins {
            engine.add_probe(Arc::new(LoginScanner::new(executor.clone())));
        }
        if request.connections {
            engine.add_probe(Arc::new(ConnectionScanner::new(
                executor.clone(),
                config.connections.ports.clone(),
            )));
        }
    }

    engine
}

/// Run everything `request` asks for with the stock collaborators.
pub async fn run_discovery(config: &DiscoverConfig, request: &RunRequest) -> Result<RunReport> {
    config.validate()?;
    request.validate()?;

    let control_dir = std::env::temp_dir().join(format!("topomap-{}", std::process::id()));
    let ssh = if request.has_probes() {
        tokio::fs::create_dir_all(&control_dir).await?;
        Some(Arc::new(
            SshExecutor::new(config.ssh.clone()).with_control_dir(&control_dir),
        ))
    } else {
        None
    };

    let executor = ssh.clone().map(|ssh| ssh as Arc<dyn RemoteExecutor>);
    let engine = build_aggregator(config, request, executor);
    let result = execute(&engine, config, request).await;

    if let Some(ssh) = ssh {
        // Masters must exit before their socket dir goes away.
        let closed = ssh.close_masters().await;
        tracing::debug!(closed, "SSH masters closed");
        if let Err(e) = tokio::fs::remove_dir_all(&control_dir).await {
            tracing::debug!(dir = %control_dir.display(), error = %e, "Could not remove control socket dir");
        }
    }
    result
}

/// Drive an already-built engine through output, rendering and report storage.
pub async fn execute(
    engine: &Aggregator,
    config: &DiscoverConfig,
    request: &RunRequest,
) -> Result<RunReport> {
    let mut session = RunSession::new();
    session.set_context(serde_json::json!({
        "request": request,
        "concurrency": engine.options().concurrency,
        "include_unknown": engine.options().include_unknown,
        "show_labels": engine.options().show_labels,
    }));
    tracing::info!(run_id = %session.id(), "Discovery run started");

    let outcome = match engine.run(&mut session).await {
        Ok(outcome) => outcome,
        Err(e) => {
            finalize_and_store(session.finish(None), config);
            return Err(e);
        }
    };

    let start = Instant::now();
    write_graph(&outcome.graph, &request.output)?;
    session.record_phase(
        Phase::Output,
        "dot",
        1,
        outcome.summary.nodes + outcome.summary.edges,
        0,
        start.elapsed().as_millis() as u64,
    );

    if let (Some(image), OutputTarget::File(graph_path)) = (&request.image, &request.output) {
        render_image(&Renderer::new(config.render.clone()), graph_path, image, &mut session).await;
    }

    let report = session.finish(Some(outcome.graph_summary()));
    finalize_and_store(report.clone(), config);

    tracing::info!(
        run_id = %report.id,
        nodes = outcome.summary.nodes,
        edges = outcome.summary.edges,
        failed_probes = outcome.summary.failed_probes,
        "Discovery run complete"
    );
    Ok(report)
}

fn write_graph(graph: &topomap_core::TopologyGraph, target: &OutputTarget) -> Result<()> {
    match target {
        OutputTarget::Stdout => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_dot(graph, &mut lock)?;
        }
        OutputTarget::File(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_dot(graph, &mut writer)?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "Graph written");
        }
    }
    Ok(())
}

/// Renderer failures never fail the run; the graph file is already on disk.
async fn render_image(renderer: &Renderer, graph: &Path, image: &Path, session: &mut RunSession) {
    if let Err(e) = renderer.render(graph, image).await {
        let hint = remediation(&e).unwrap_or_default();
        tracing::warn!(error = %e, hint = %hint, "Rendering failed");
        session.record_event(EventKind::RendererFailed, None, None, &e.to_string());
    }
}

fn finalize_and_store(report: RunReport, config: &DiscoverConfig) {
    let Some(dir) = &config.report_dir else {
        return;
    };
    let saved = FileReportStore::new(dir).and_then(|store| store.save(&report));
    match saved {
        Ok(path) => tracing::info!(path = %path.display(), run_id = %report.id, "Run report stored"),
        Err(e) => tracing::warn!(error = %e, run_id = %report.id, "Failed to store run report"),
    }
}
