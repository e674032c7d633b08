//! Translate visual node graphs into source code.
//!
//! Pipeline: `walk` orders a graph from its entry nodes, `serialize` turns
//! each node into a record, `lower` assembles the records into an
//! `IrDocument`, `generate` sends the document to a code-generation backend,
//! and `validate` checks and repairs what comes back. `pipeline` runs batches
//! of graphs through all of it concurrently.

pub mod config;
pub mod error;
pub mod generate;
pub mod ir;
pub mod lower;
pub mod parse;
pub mod pipeline;
pub mod serialize;
pub mod telemetry;
pub mod validate;
pub mod walk;
