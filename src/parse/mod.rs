//! Parse phase: exported graph JSON → Rust types + read-only graph view.

pub mod graph;
pub mod types;

pub use graph::{GraphRef, HostGraph};
pub use types::*;

use crate::error::PipelineError;

/// Deserialize an exported graph document.
pub fn parse(json: &str) -> Result<GraphDocument, Vec<PipelineError>> {
    serde_json::from_str::<GraphDocument>(json).map_err(|e| {
        vec![PipelineError::parse(
            "P001",
            format!("Failed to parse graph JSON: {}", e),
            None,
        )]
    })
}

/// Parse JSON and index the graph in one step.
pub fn parse_and_build(json: &str) -> Result<HostGraph, Vec<PipelineError>> {
    let document = parse(json)?;
    HostGraph::build(document)
}
