//! Pull the code out of a raw backend reply.
//!
//! Replies arrive as bare code, fenced markdown, or the JSON envelope the
//! system prompt asks for. Whatever the shape, the result is normalized:
//! trailing whitespace trimmed per line, no leading or trailing blank lines,
//! exactly one trailing newline.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub code: String,
    pub notes: Option<String>,
    pub from_envelope: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    graphs: Vec<EnvelopeGraph>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeGraph {
    #[serde(default)]
    graph_name: String,
    code: EnvelopeCode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeCode {
    #[serde(default)]
    graph_declaration: String,
    #[serde(default)]
    graph_implementation: String,
    #[serde(default)]
    implementation_notes: String,
}

/// Extract the code for `graph_name` from a raw reply.
pub fn extract(raw: &str, graph_name: &str) -> Extracted {
    let unfenced = strip_fences(raw.trim_start_matches('\u{feff}'));

    if let Some(envelope) = parse_envelope(unfenced) {
        let graph = envelope
            .graphs
            .iter()
            .find(|g| g.graph_name == graph_name)
            .or_else(|| envelope.graphs.first());
        if let Some(graph) = graph {
            return from_graph(graph);
        }
    }

    Extracted {
        code: normalize(unfenced),
        notes: None,
        from_envelope: false,
    }
}

/// Code for a called graph. Only an envelope entry with exactly this name
/// counts; bare replies carry no callees.
pub fn extract_named(raw: &str, graph_name: &str) -> Option<Extracted> {
    let envelope = parse_envelope(strip_fences(raw.trim_start_matches('\u{feff}')))?;
    envelope
        .graphs
        .iter()
        .find(|g| g.graph_name == graph_name)
        .map(from_graph)
}

/// Body of the first fenced block, or the trimmed text when there is none.
/// An unclosed fence (truncated reply) runs to the end of the text.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn parse_envelope(text: &str) -> Option<Envelope> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let end = trimmed.rfind('}')?;
    serde_json::from_str(&trimmed[..=end]).ok()
}

fn from_graph(graph: &EnvelopeGraph) -> Extracted {
    let declaration = graph.code.graph_declaration.trim();
    let implementation = graph.code.graph_implementation.trim();
    let declaration_core = declaration.trim_end_matches(';').trim();

    let code = if implementation.is_empty() {
        declaration.to_string()
    } else if declaration.is_empty() || implementation.contains(declaration_core) {
        implementation.to_string()
    } else {
        format!("{}\n\n{}", declaration, implementation)
    };

    Extracted {
        code: normalize(strip_fences(&code)),
        notes: Some(graph.code.implementation_notes.trim().to_string()).filter(|n| !n.is_empty()),
        from_envelope: true,
    }
}

pub fn normalize(code: &str) -> String {
    let lines: Vec<&str> = code.lines().map(str::trim_end).collect();
    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    match (first, last) {
        (Some(first), Some(last)) => {
            let mut out = lines[first..=last].join("\n");
            out.push('\n');
            out
        }
        _ => String::new(),
    }
}
