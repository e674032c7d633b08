//! Response validation phase (post-generation).
//!
//! Turns a raw backend reply into a `ValidationResult`: extract the code,
//! check and repair its structure, check the declared signature, look for
//! the document's local variables, and attach the graph-side diagnostics.

pub mod extract;
pub mod signature;
pub mod structural;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Diagnostic, DiagnosticKind, Severity};
use crate::ir::types::{FunctionSignature, IrDocument, NodeKind, NodeRecord, TargetLanguage};
use signature::{SignatureCheck, check_signature, identifiers, normalize_param};
use structural::{StructuralStatus, check_structure};

// =============================================================================
// POLICY + RESULT
// =============================================================================

/// Bounds on the deterministic repair pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairPolicy {
    pub enabled: bool,
    /// Trailing partial statements that may be dropped.
    pub max_trimmed_lines: usize,
    /// Unclosed openers that may be closed at the end of the body.
    pub max_appended_closers: usize,
    pub remove_stray_closers: bool,
    pub allow_signature_rename: bool,
    /// Missing local variables reject the result instead of warning.
    pub strict_symbols: bool,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        RepairPolicy {
            enabled: true,
            max_trimmed_lines: 3,
            max_appended_closers: 8,
            remove_stray_closers: true,
            allow_signature_rename: true,
            strict_symbols: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Accepted,
    Repaired,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub outcome: Outcome,
    /// Normalized, possibly repaired code. On rejection, the best effort so far.
    pub final_code: String,
    pub raw_text: String,
    pub implementation_notes: Option<String>,
    /// Checked code for each called graph the reply covered.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callee_code: Vec<CalleeCode>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalleeCode {
    pub graph_name: String,
    pub code: String,
}

impl ValidationResult {
    pub fn is_rejected(&self) -> bool {
        self.outcome == Outcome::Rejected
    }

    /// First error-severity diagnostic, used as the rejection reason.
    pub fn rejection_reason(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    policy: RepairPolicy,
}

impl ResponseValidator {
    pub fn new(policy: RepairPolicy) -> Self {
        ResponseValidator { policy }
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    pub fn validate(&self, raw: &str, document: &IrDocument) -> ValidationResult {
        let language = document.metadata.target_language;
        let extracted = extract::extract(raw, &document.metadata.name);
        let mut diagnostics = graph_diagnostics(document);

        let reject = |code: String, callee_code: Vec<CalleeCode>, diagnostics: Vec<Diagnostic>| {
            ValidationResult {
                outcome: Outcome::Rejected,
                final_code: code,
                raw_text: raw.to_string(),
                implementation_notes: extracted.notes.clone(),
                callee_code,
                diagnostics,
            }
        };

        // 1. Structure and signature
        let checked = self.check_code(
            &extracted.code,
            document.metadata.signature.as_ref(),
            language,
        );
        diagnostics.extend(checked.diagnostics);
        let mut repaired = checked.repaired;
        let code = checked.code;
        if let Some(check) = checked.rejected_by {
            info!(graph = %document.metadata.name, check, "response rejected");
            return reject(code, Vec::new(), diagnostics);
        }

        // 2. Called graphs
        let mut callee_code = Vec::new();
        for callee in &document.callees {
            let name = &callee.metadata.name;
            let Some(extracted) = extract::extract_named(raw, name) else {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MissingCallee,
                    Severity::Warning,
                    format!("The reply has no code for called graph '{}'", name),
                ));
                continue;
            };
            let checked = self.check_code(
                &extracted.code,
                callee.metadata.signature.as_ref(),
                language,
            );
            diagnostics.extend(checked.diagnostics.into_iter().map(|mut d| {
                d.message = format!("{}: {}", name, d.message);
                d
            }));
            repaired |= checked.repaired;
            if let Some(check) = checked.rejected_by {
                info!(
                    graph = %document.metadata.name,
                    callee = %name,
                    check,
                    "response rejected"
                );
                return reject(code, callee_code, diagnostics);
            }
            callee_code.push(CalleeCode {
                graph_name: name.clone(),
                code: checked.code,
            });
        }

        // 3. Symbols
        let masked = structural::scan(&code, language).masked;
        let present: HashSet<String> = identifiers(&masked)
            .into_iter()
            .map(|(s, e)| normalize_param(&masked[s..e]))
            .collect();
        let severity = if self.policy.strict_symbols {
            Severity::Error
        } else {
            Severity::Warning
        };
        let mut missing = false;
        for variable in &document.metadata.local_variables {
            if !present.contains(&normalize_param(&variable.name)) {
                missing = true;
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MissingSymbol,
                    severity,
                    format!("Local variable '{}' does not appear in the code", variable.name),
                ));
            }
        }
        if missing && self.policy.strict_symbols {
            info!(graph = %document.metadata.name, check = "symbols", "response rejected");
            return reject(code, callee_code, diagnostics);
        }

        let outcome = if repaired {
            Outcome::Repaired
        } else {
            Outcome::Accepted
        };
        debug!(
            graph = %document.metadata.name,
            ?outcome,
            callees = callee_code.len(),
            diagnostics = diagnostics.len(),
            "response validated"
        );
        ValidationResult {
            outcome,
            final_code: code,
            raw_text: raw.to_string(),
            implementation_notes: extracted.notes,
            callee_code,
            diagnostics,
        }
    }

    /// Structure, then signature, for one graph's code.
    fn check_code(
        &self,
        code: &str,
        signature: Option<&FunctionSignature>,
        language: TargetLanguage,
    ) -> CheckedCode {
        let structure = check_structure(code, language, &self.policy);
        let (code, repaired) = match structure.status {
            StructuralStatus::Rejected => {
                return CheckedCode {
                    code: structure.code,
                    repaired: false,
                    rejected_by: Some("structure"),
                    diagnostics: structure.diagnostics,
                };
            }
            StructuralStatus::Repaired => (extract::normalize(&structure.code), true),
            StructuralStatus::Clean => (structure.code, false),
        };
        let mut checked = CheckedCode {
            code,
            repaired,
            rejected_by: None,
            diagnostics: structure.diagnostics,
        };

        let Some(expected) = signature else {
            return checked;
        };
        let masked = structural::scan(&checked.code, language).masked;
        match check_signature(&checked.code, &masked, expected, self.policy.allow_signature_rename) {
            SignatureCheck::Matched => {}
            SignatureCheck::Renamed { from, code: renamed } => {
                checked.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::SignatureRenamed,
                    Severity::Info,
                    format!("Renamed '{}' to '{}'", from, expected.name),
                ));
                checked.repaired = true;
                checked.code = renamed;
            }
            SignatureCheck::Mismatch(message) => {
                checked.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::SignatureMismatch,
                    Severity::Error,
                    message,
                ));
                checked.rejected_by = Some("signature");
            }
        }
        checked
    }
}

struct CheckedCode {
    code: String,
    repaired: bool,
    rejected_by: Option<&'static str>,
    diagnostics: Vec<Diagnostic>,
}

pub fn validate_response(raw: &str, document: &IrDocument, policy: &RepairPolicy) -> ValidationResult {
    ResponseValidator::new(policy.clone()).validate(raw, document)
}

/// Diagnostics owed to the graph itself, attached whatever the outcome.
/// Called graphs contribute theirs prefixed with the graph name.
fn graph_diagnostics(document: &IrDocument) -> Vec<Diagnostic> {
    let mut out = record_diagnostics(&document.nodes);
    for callee in &document.callees {
        out.extend(record_diagnostics(&callee.nodes).into_iter().map(|mut d| {
            d.message = format!("{}: {}", callee.metadata.name, d.message);
            d
        }));
    }
    out
}

fn record_diagnostics(records: &[NodeRecord]) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for record in records {
        if let NodeKind::Unsupported { node_type } = &record.kind {
            out.push(
                Diagnostic::new(
                    DiagnosticKind::UnsupportedNode,
                    Severity::Warning,
                    format!("Node '{}' of type '{}' has no translation", record.name, node_type),
                )
                .at_node(record.host_id.clone())
                .at_record(record.id.clone()),
            );
        }
        out.extend(record.diagnostics.iter().cloned());
    }
    out
}
