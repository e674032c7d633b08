//! IR invariant validation.
//!
//! Validates that an `IrDocument` satisfies the ordering and reference
//! invariants before it is handed to a backend.

use std::collections::{HashMap, HashSet};

use crate::ir::types::*;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    /// The record ID where the error was found, if applicable.
    pub record_id: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.record_id {
            Some(id) => write!(f, "[{}] {} (at record '{}')", self.code, self.message, id),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Validate an IrDocument against all invariants. Returns all errors found.
pub fn validate_ir(doc: &IrDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_non_empty(doc, &mut errors);
    validate_unique_record_ids(doc, &mut errors);
    validate_forward_references(doc, &mut errors);
    validate_loop_carried_refs(doc, &mut errors);
    validate_exec_targets(doc, &mut errors);
    validate_callees(doc, &mut errors);

    errors
}

// ---------------------------------------------------------------------------
// Invariant: each called graph appears once and is itself valid
// ---------------------------------------------------------------------------

fn validate_callees(doc: &IrDocument, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::from([doc.metadata.name.as_str()]);
    for callee in &doc.callees {
        let name = callee.metadata.name.as_str();
        if !seen.insert(name) {
            errors.push(ValidationError {
                code: "E008",
                message: format!("Graph '{}' appears more than once in the document", name),
                record_id: None,
            });
            continue;
        }
        let view = IrDocument {
            version: doc.version.clone(),
            metadata: callee.metadata.clone(),
            nodes: callee.nodes.clone(),
            callees: Vec::new(),
        };
        for mut error in validate_ir(&view) {
            error.message = format!("in called graph '{}': {}", name, error.message);
            errors.push(error);
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: the document has at least one record
// ---------------------------------------------------------------------------

fn validate_non_empty(doc: &IrDocument, errors: &mut Vec<ValidationError>) {
    if doc.nodes.is_empty() {
        errors.push(ValidationError {
            code: "E001",
            message: "Document must contain at least one node record".into(),
            record_id: None,
        });
    }
}

// ---------------------------------------------------------------------------
// Invariant: record IDs are unique
// ---------------------------------------------------------------------------

fn validate_unique_record_ids(doc: &IrDocument, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for record in &doc.nodes {
        if !seen.insert(record.id.as_str()) {
            errors.push(ValidationError {
                code: "E002",
                message: format!("Duplicate record ID '{}'", record.id),
                record_id: Some(record.id.clone()),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: node references only point backwards
// ---------------------------------------------------------------------------

fn validate_forward_references(doc: &IrDocument, errors: &mut Vec<ValidationError>) {
    // record id -> output pin ids of records emitted so far
    let mut emitted: HashMap<&str, HashSet<&str>> = HashMap::new();

    for record in &doc.nodes {
        for input in &record.inputs {
            let PinSource::Node { record: producer, pin } = &input.source else {
                continue;
            };
            match emitted.get(producer.as_str()) {
                None => errors.push(ValidationError {
                    code: "E003",
                    message: format!(
                        "Input '{}' of record '{}' references record '{}' which is not \
                         emitted earlier in the document",
                        input.name, record.id, producer
                    ),
                    record_id: Some(record.id.clone()),
                }),
                Some(pins) if !pins.contains(pin.as_str()) => errors.push(ValidationError {
                    code: "E004",
                    message: format!(
                        "Input '{}' of record '{}' references unknown output pin '{}' on '{}'",
                        input.name, record.id, pin, producer
                    ),
                    record_id: Some(record.id.clone()),
                }),
                Some(_) => {}
            }
        }

        emitted.insert(
            record.id.as_str(),
            record.outputs.iter().map(|o| o.id.as_str()).collect(),
        );
    }
}

// ---------------------------------------------------------------------------
// Invariant: loop-carried references name declared variables
// ---------------------------------------------------------------------------

fn validate_loop_carried_refs(doc: &IrDocument, errors: &mut Vec<ValidationError>) {
    let declared: HashSet<&str> = doc
        .metadata
        .loop_carried
        .iter()
        .map(|v| v.name.as_str())
        .collect();

    for record in &doc.nodes {
        for input in &record.inputs {
            if let PinSource::LoopCarried { variable } = &input.source
                && !declared.contains(variable.as_str())
            {
                errors.push(ValidationError {
                    code: "E005",
                    message: format!(
                        "Input '{}' of record '{}' reads undeclared loop-carried variable '{}'",
                        input.name, record.id, variable
                    ),
                    record_id: Some(record.id.clone()),
                });
            }
        }
    }

    for var in &doc.metadata.loop_carried {
        let producer_ok = doc
            .record(&var.producer.record)
            .is_some_and(|r| r.output(&var.producer.pin).is_some());
        if !producer_ok {
            errors.push(ValidationError {
                code: "E006",
                message: format!(
                    "Loop-carried variable '{}' is produced by unknown pin '{}.{}'",
                    var.name, var.producer.record, var.producer.pin
                ),
                record_id: Some(var.consumer.record.clone()),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: exec links target records in the document
// ---------------------------------------------------------------------------

fn validate_exec_targets(doc: &IrDocument, errors: &mut Vec<ValidationError>) {
    let ids: HashSet<&str> = doc.nodes.iter().map(|r| r.id.as_str()).collect();
    for record in &doc.nodes {
        for link in &record.exec {
            if !ids.contains(link.target.as_str()) {
                errors.push(ValidationError {
                    code: "E007",
                    message: format!(
                        "Exec pin '{}' of record '{}' continues at unknown record '{}'",
                        link.pin_name, record.id, link.target
                    ),
                    record_id: Some(record.id.clone()),
                });
            }
        }
    }
}
