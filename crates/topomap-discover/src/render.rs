//! External graph renderer (Graphviz by default).
//!
//! Invoked as `<binary> -K<layout> -T<format> -o <image> <graph file>`.

use std::io::ErrorKind;
use std::path::Path;

use tokio::process::Command;

use crate::config::RenderConfig;
use crate::error::{DiscoverError, Result};

pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    fn args(&self, graph: &Path, image: &Path) -> Vec<String> {
        vec![
            format!("-K{}", self.config.layout),
            format!("-T{}", self.config.format),
            "-o".to_string(),
            image.display().to_string(),
            graph.display().to_string(),
        ]
    }

    /// Render the DOT file at `graph` into `image`.
    pub async fn render(&self, graph: &Path, image: &Path) -> Result<()> {
        let args = self.args(graph, image);
        tracing::debug!(binary = %self.config.binary, ?args, "Invoking renderer");

        let output = Command::new(&self.config.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DiscoverError::RendererNotFound {
                    path: self.config.binary.clone(),
                },
                _ => DiscoverError::Io(e),
            })?;

        if !output.status.success() {
            return Err(DiscoverError::Render {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(image = %image.display(), layout = %self.config.layout, "Image rendered");
        Ok(())
    }
}

/// What the operator can do about a renderer failure.
pub fn remediation(err: &DiscoverError) -> Option<String> {
    match err {
        DiscoverError::RendererNotFound { path } => Some(format!(
            "install Graphviz or set render.binary (currently `{path}`); the graph file is still usable"
        )),
        DiscoverError::Render { .. } => Some(
            "check that the layout and format are supported by the renderer, or render the graph file by hand"
                .to_string(),
        ),
        _ => None,
    }
}
