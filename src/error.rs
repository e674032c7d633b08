//! Unified error and diagnostic types used across all pipeline stages.
//!
//! Fatal problems are `PipelineError`s and end a job. Recoverable problems
//! (unsupported nodes, repaired code, retries) are `Diagnostic`s attached to
//! the job's result.

use serde::{Deserialize, Serialize};

use crate::generate::GenerationError;
use crate::ir::validate::ValidationError;
use crate::walk::WalkError;

// =============================================================================
// STAGES + ERROR KINDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Parse,
    Walk,
    Serialize,
    Assemble,
    Generate,
    Validate,
    /// The job task itself, outside any single stage.
    Pipeline,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Parse => write!(f, "Parse"),
            Stage::Walk => write!(f, "Walk"),
            Stage::Serialize => write!(f, "Serialize"),
            Stage::Assemble => write!(f, "Assemble"),
            Stage::Generate => write!(f, "Generate"),
            Stage::Validate => write!(f, "Validate"),
            Stage::Pipeline => write!(f, "Pipeline"),
        }
    }
}

/// The error taxonomy every terminal failure is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    GraphIntegrity,
    UnsupportedNode,
    Network,
    Timeout,
    BackendRejected,
    BackendMalformedResponse,
    ValidationRejected,
    Cancelled,
    /// The job task panicked or was aborted.
    Internal,
}

impl ErrorKind {
    /// Transient kinds are retried by the generation client.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout)
    }
}

// =============================================================================
// PIPELINE ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineError {
    pub code: String,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    pub node_id: Option<String>,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node_id {
            Some(id) => write!(
                f,
                "[{}:{}] {} (node '{}')",
                self.stage, self.code, self.message, id
            ),
            None => write!(f, "[{}:{}] {}", self.stage, self.code, self.message),
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    pub fn new(
        code: &str,
        stage: Stage,
        kind: ErrorKind,
        message: impl Into<String>,
        node_id: Option<String>,
    ) -> Self {
        PipelineError {
            code: code.into(),
            stage,
            kind,
            message: message.into(),
            node_id,
        }
    }

    pub fn parse(code: &str, message: impl Into<String>, node_id: Option<String>) -> Self {
        PipelineError::new(code, Stage::Parse, ErrorKind::GraphIntegrity, message, node_id)
    }

    pub fn cancelled(stage: Stage) -> Self {
        PipelineError::new(
            "C001",
            stage,
            ErrorKind::Cancelled,
            "Job was cancelled",
            None,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PipelineError::new("J001", Stage::Pipeline, ErrorKind::Internal, message, None)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        PipelineError::new(
            "R001",
            Stage::Validate,
            ErrorKind::ValidationRejected,
            message,
            None,
        )
    }
}

impl From<WalkError> for PipelineError {
    fn from(e: WalkError) -> Self {
        let node_id = e.node_id().map(str::to_string);
        PipelineError::new(
            e.code(),
            Stage::Walk,
            ErrorKind::GraphIntegrity,
            e.to_string(),
            node_id,
        )
    }
}

impl From<GenerationError> for PipelineError {
    fn from(e: GenerationError) -> Self {
        PipelineError::new(e.code(), Stage::Generate, e.kind(), e.to_string(), None)
    }
}

impl From<ValidationError> for PipelineError {
    fn from(e: ValidationError) -> Self {
        PipelineError::new(
            e.code,
            Stage::Assemble,
            ErrorKind::GraphIntegrity,
            e.message,
            e.record_id,
        )
    }
}

// =============================================================================
// DIAGNOSTICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    // Graph side
    UnsupportedNode,
    PinTypeMismatch,
    UnreachableNode,
    BackEdge,
    UnresolvedReroute,
    CalleeSkipped,
    // Generation side
    RetryCount,
    // Response side
    EmptyBody,
    UnbalancedDelimiter,
    MismatchedDelimiter,
    TrimmedPartialStatement,
    StrayCloser,
    ClosedDelimiter,
    SignatureRenamed,
    SignatureMismatch,
    MissingSymbol,
    MissingCallee,
}

/// Where a diagnostic points: a graph node, a line of generated code, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Host graph node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// IR record id (`N1`, `N2`, …).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// 1-based line in the generated code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub location: Location,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            severity,
            message: message.into(),
            location: Location::default(),
        }
    }

    pub fn at_node(mut self, node_id: impl Into<String>) -> Self {
        self.location.node_id = Some(node_id.into());
        self
    }

    pub fn at_record(mut self, record_id: impl Into<String>) -> Self {
        self.location.record_id = Some(record_id.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.location.line = Some(line);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(id) = &self.location.node_id {
            write!(f, " (node '{}')", id)?;
        }
        if let Some(line) = self.location.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_code_and_node() {
        let err = PipelineError::new(
            "W002",
            Stage::Walk,
            ErrorKind::GraphIntegrity,
            "Pin references unknown node 'ghost'",
            Some("n1".into()),
        );
        assert_eq!(
            err.to_string(),
            "[Walk:W002] Pin references unknown node 'ghost' (node 'n1')"
        );
    }

    #[test]
    fn only_network_and_timeout_are_transient() {
        assert!(ErrorKind::Network.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(!ErrorKind::BackendRejected.is_transient());
        assert!(!ErrorKind::BackendMalformedResponse.is_transient());
        assert!(!ErrorKind::Cancelled.is_transient());
        assert!(!ErrorKind::Internal.is_transient());
    }
}
