//! Graphviz DOT serialization.

use std::io::Write;

use topomap_core::{Edge, Node, NodeKind, TopologyGraph};

use crate::error::Result;

const GRAPH_NAME: &str = "topology";

fn shape(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Unknown => "ellipse",
        NodeKind::Host => "box",
        NodeKind::Elb => "hexagon",
    }
}

/// Escape a value for use inside a double-quoted DOT string.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn node_statement(node: &Node) -> String {
    format!(
        "\"{}\" [label=\"{}\", shape={}];",
        escape(node.id().as_str()),
        escape(&node.name),
        shape(node.kind())
    )
}

fn edge_statement(edge: &Edge) -> String {
    let from = escape(edge.from.as_str());
    let to = escape(edge.to.as_str());
    match &edge.label {
        Some(label) => format!("\"{from}\" -> \"{to}\" [label=\"{}\"];", escape(label)),
        None => format!("\"{from}\" -> \"{to}\";"),
    }
}

/// Write `graph` as a complete `digraph`. Nodes come out sorted by id and
/// edges by `(from, to, label)`.
pub fn write_dot<W: Write>(graph: &TopologyGraph, out: &mut W) -> Result<()> {
    writeln!(out, "digraph {GRAPH_NAME} {{")?;
    writeln!(out, "    overlap=false;")?;
    for node in graph.nodes() {
        writeln!(out, "    {}", node_statement(node))?;
    }
    for edge in graph.edges() {
        writeln!(out, "    {}", edge_statement(edge))?;
    }
    writeln!(out, "}}")?;
    out.flush()?;
    Ok(())
}

pub fn to_dot_string(graph: &TopologyGraph) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_dot(graph, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
