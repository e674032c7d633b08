//! Delimiter balance check and bounded repair.
//!
//! The scanner walks the code once, skipping string, character and comment
//! contents with the target language's rules, and reports unclosed openers,
//! stray closers and mismatched pairs. It also returns a masked copy of the
//! code (strings and comments blanked, byte offsets preserved) that the
//! signature and symbol checks search instead of the raw text.
//!
//! Repair order: trim trailing partial lines, drop stray closers, append
//! closers for whatever is still open. Each step is bounded by the
//! `RepairPolicy`. A mismatched closer or an empty body is never repaired.

use crate::error::{Diagnostic, DiagnosticKind, Severity};
use crate::ir::types::TargetLanguage;

use super::RepairPolicy;

// =============================================================================
// SCANNER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub ch: char,
    /// 1-based.
    pub line: usize,
    /// Byte offset in the scanned text.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanIssue {
    Stray { closer: Delimiter },
    Mismatch { open: Delimiter, close: Delimiter },
}

#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Same byte layout as the input; string and comment contents are spaces.
    pub masked: String,
    /// Openers left on the stack at end of input, outermost first.
    pub unclosed: Vec<Delimiter>,
    pub issues: Vec<ScanIssue>,
    /// Line where an unterminated string or block comment started.
    pub unterminated: Option<usize>,
}

impl Scan {
    pub fn is_balanced(&self) -> bool {
        self.unclosed.is_empty() && self.issues.is_empty() && self.unterminated.is_none()
    }

    pub fn first_mismatch(&self) -> Option<(Delimiter, Delimiter)> {
        self.issues.iter().find_map(|issue| match issue {
            ScanIssue::Mismatch { open, close } => Some((*open, *close)),
            ScanIssue::Stray { .. } => None,
        })
    }

    pub fn strays(&self) -> Vec<Delimiter> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                ScanIssue::Stray { closer } => Some(*closer),
                ScanIssue::Mismatch { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment { start_line: usize },
    Str {
        quote: char,
        triple: bool,
        multiline: bool,
        start_line: usize,
    },
}

pub fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn opens_string(c: char, prev: Option<char>, language: TargetLanguage) -> bool {
    match c {
        '"' => true,
        '\'' => match language {
            TargetLanguage::Python | TargetLanguage::JavaScript => true,
            // 1'000'000 digit separators are not char literals.
            TargetLanguage::Cpp | TargetLanguage::CSharp => {
                !prev.is_some_and(|p| p.is_ascii_alphanumeric())
            }
            TargetLanguage::Swift | TargetLanguage::Pseudocode => false,
        },
        '`' => language == TargetLanguage::JavaScript,
        _ => false,
    }
}

fn supports_triple(c: char, language: TargetLanguage) -> bool {
    match language {
        TargetLanguage::Python => c == '"' || c == '\'',
        TargetLanguage::Swift => c == '"',
        _ => false,
    }
}

pub fn scan(code: &str, language: TargetLanguage) -> Scan {
    let chars: Vec<(usize, char)> = code.char_indices().collect();
    let mut masked = code.as_bytes().to_vec();
    let mut mask = |offset: usize, c: char| {
        for b in &mut masked[offset..offset + c.len_utf8()] {
            *b = b' ';
        }
    };

    let mut stack: Vec<Delimiter> = Vec::new();
    let mut issues = Vec::new();
    let mut state = State::Code;
    let mut line = 1;
    let mut i = 0;
    let line_comment = language.line_comment();

    while i < chars.len() {
        let (offset, c) = chars[i];
        let at = |k: usize| chars.get(i + k).map(|&(_, ch)| ch);
        let next = at(1);

        match state {
            State::Code => {
                let starts_line_comment = match line_comment {
                    "#" => c == '#',
                    _ => c == '/' && next == Some('/'),
                };
                if starts_line_comment {
                    state = State::LineComment;
                    mask(offset, c);
                    i += 1;
                    continue;
                }
                if language.has_block_comments() && c == '/' && next == Some('*') {
                    state = State::BlockComment { start_line: line };
                    mask(offset, c);
                    mask(chars[i + 1].0, '*');
                    i += 2;
                    continue;
                }
                let prev = i.checked_sub(1).map(|p| chars[p].1);
                if opens_string(c, prev, language) {
                    let triple = supports_triple(c, language) && next == Some(c) && at(2) == Some(c);
                    let width = if triple { 3 } else { 1 };
                    for k in 0..width {
                        mask(chars[i + k].0, c);
                    }
                    state = State::Str {
                        quote: c,
                        triple,
                        multiline: c == '`',
                        start_line: line,
                    };
                    i += width;
                    continue;
                }
                match c {
                    '(' | '[' | '{' => stack.push(Delimiter { ch: c, line, offset }),
                    ')' | ']' | '}' => {
                        let closer = Delimiter { ch: c, line, offset };
                        match stack.pop() {
                            None => issues.push(ScanIssue::Stray { closer }),
                            Some(open) if closer_for(open.ch) == c => {}
                            Some(open) => issues.push(ScanIssue::Mismatch {
                                open,
                                close: closer,
                            }),
                        }
                    }
                    _ => {}
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                } else {
                    mask(offset, c);
                }
            }
            State::BlockComment { .. } => {
                if c == '*' && next == Some('/') {
                    mask(offset, c);
                    mask(chars[i + 1].0, '/');
                    state = State::Code;
                    i += 2;
                    continue;
                }
                if c != '\n' {
                    mask(offset, c);
                }
            }
            State::Str {
                quote,
                triple,
                multiline,
                ..
            } => {
                if c == '\\' {
                    mask(offset, c);
                    if let Some((next_offset, escaped)) = chars.get(i + 1).copied() {
                        if escaped == '\n' {
                            line += 1;
                        } else {
                            mask(next_offset, escaped);
                        }
                    }
                    i += 2;
                    continue;
                }
                if c == quote && (!triple || (next == Some(quote) && at(2) == Some(quote))) {
                    let width = if triple { 3 } else { 1 };
                    for k in 0..width {
                        mask(chars[i + k].0, quote);
                    }
                    state = State::Code;
                    i += width;
                    continue;
                }
                if c == '\n' {
                    if !triple && !multiline {
                        // A plain string never spans lines; resync on the next one.
                        state = State::Code;
                    }
                } else {
                    mask(offset, c);
                }
            }
        }

        if c == '\n' {
            line += 1;
        }
        i += 1;
    }

    let unterminated = match state {
        State::BlockComment { start_line } | State::Str { start_line, .. } => Some(start_line),
        State::Code | State::LineComment => None,
    };

    Scan {
        masked: String::from_utf8_lossy(&masked).into_owned(),
        unclosed: stack,
        issues,
        unterminated,
    }
}

// =============================================================================
// CHECK + REPAIR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralStatus {
    Clean,
    Repaired,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct StructuralOutcome {
    pub status: StructuralStatus,
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl StructuralOutcome {
    fn rejected(code: &str, mut diagnostics: Vec<Diagnostic>, reason: Diagnostic) -> Self {
        diagnostics.push(reason);
        StructuralOutcome {
            status: StructuralStatus::Rejected,
            code: code.to_string(),
            diagnostics,
        }
    }
}

pub fn check_structure(
    code: &str,
    language: TargetLanguage,
    policy: &RepairPolicy,
) -> StructuralOutcome {
    if code.trim().is_empty() {
        return StructuralOutcome::rejected(
            code,
            vec![],
            Diagnostic::new(
                DiagnosticKind::EmptyBody,
                Severity::Error,
                "Generated code is empty",
            ),
        );
    }

    let first = scan(code, language);
    if first.is_balanced() {
        return StructuralOutcome {
            status: StructuralStatus::Clean,
            code: code.to_string(),
            diagnostics: vec![],
        };
    }
    if let Some((open, close)) = first.first_mismatch() {
        return StructuralOutcome::rejected(code, vec![], mismatch_diagnostic(open, close));
    }
    if !policy.enabled {
        return StructuralOutcome::rejected(
            code,
            vec![],
            Diagnostic::new(
                DiagnosticKind::UnbalancedDelimiter,
                Severity::Error,
                "Delimiters are unbalanced and repair is disabled",
            ),
        );
    }

    let mut diagnostics = Vec::new();
    let mut lines: Vec<String> = code.lines().map(str::to_string).collect();

    // 1. Trailing partial statements, only when the code looks truncated.
    let mut current = first;
    let mut trimmed = 0;
    while (current.unterminated.is_some() || !current.unclosed.is_empty())
        && trimmed < policy.max_trimmed_lines
    {
        let Some(last) = lines.iter().rposition(|l| !l.trim().is_empty()) else {
            break;
        };
        if lines[..last].iter().all(|l| l.trim().is_empty()) {
            break;
        }
        let masked_line = current.masked.lines().nth(last).unwrap_or("");
        let inside_unterminated = current.unterminated.is_some_and(|start| last + 1 >= start);
        if !inside_unterminated && !is_partial_line(masked_line, language) {
            break;
        }
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::TrimmedPartialStatement,
                Severity::Warning,
                format!("Removed incomplete trailing line: {}", lines[last].trim()),
            )
            .at_line(last + 1),
        );
        lines.truncate(last);
        trimmed += 1;
        current = scan(&lines.join("\n"), language);
    }

    // 2. Stray closers.
    let strays = current.strays();
    if !strays.is_empty() {
        if !policy.remove_stray_closers {
            let stray = strays[0];
            return StructuralOutcome::rejected(
                code,
                diagnostics,
                Diagnostic::new(
                    DiagnosticKind::StrayCloser,
                    Severity::Error,
                    format!("'{}' on line {} closes nothing", stray.ch, stray.line),
                )
                .at_line(stray.line),
            );
        }
        remove_strays(&mut lines, &strays);
        for stray in &strays {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::StrayCloser,
                    Severity::Warning,
                    format!("Removed '{}' that closed nothing", stray.ch),
                )
                .at_line(stray.line),
            );
        }
        current = scan(&lines.join("\n"), language);
    }

    if let Some((open, close)) = current.first_mismatch() {
        return StructuralOutcome::rejected(code, diagnostics, mismatch_diagnostic(open, close));
    }
    if let Some(start) = current.unterminated {
        return StructuralOutcome::rejected(
            code,
            diagnostics,
            Diagnostic::new(
                DiagnosticKind::UnbalancedDelimiter,
                Severity::Error,
                format!("Unterminated string or comment starting on line {}", start),
            )
            .at_line(start),
        );
    }

    // 3. Close what is still open, innermost first.
    if current.unclosed.len() > policy.max_appended_closers {
        return StructuralOutcome::rejected(
            code,
            diagnostics,
            Diagnostic::new(
                DiagnosticKind::UnbalancedDelimiter,
                Severity::Error,
                format!(
                    "{} unclosed delimiters exceed the repair limit of {}",
                    current.unclosed.len(),
                    policy.max_appended_closers
                ),
            ),
        );
    }
    for open in current.unclosed.iter().rev() {
        let closer = closer_for(open.ch);
        if closer == '}' {
            let indent: String = lines
                .get(open.line - 1)
                .map(|l| l.chars().take_while(|c| c.is_whitespace()).collect())
                .unwrap_or_default();
            lines.push(format!("{}}}", indent));
        } else if let Some(last) = lines.iter_mut().rev().find(|l| !l.trim().is_empty()) {
            last.push(closer);
        }
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::ClosedDelimiter,
                Severity::Warning,
                format!("Appended '{}' for '{}' opened on line {}", closer, open.ch, open.line),
            )
            .at_line(open.line),
        );
    }

    let repaired = lines.join("\n");
    if !scan(&repaired, language).is_balanced() {
        return StructuralOutcome::rejected(
            code,
            diagnostics,
            Diagnostic::new(
                DiagnosticKind::UnbalancedDelimiter,
                Severity::Error,
                "Repair did not balance delimiters",
            ),
        );
    }

    StructuralOutcome {
        status: StructuralStatus::Repaired,
        code: repaired,
        diagnostics,
    }
}

fn mismatch_diagnostic(open: Delimiter, close: Delimiter) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::MismatchedDelimiter,
        Severity::Error,
        format!(
            "'{}' on line {} does not match '{}' opened on line {}",
            close.ch, close.line, open.ch, open.line
        ),
    )
    .at_line(close.line)
}

/// A line the response was most likely cut off in. `masked` has strings and
/// comments blanked.
fn is_partial_line(masked: &str, language: TargetLanguage) -> bool {
    let t = masked.trim();
    if t.is_empty() {
        return false;
    }
    if t.ends_with("++") || t.ends_with("--") {
        return false;
    }
    let Some(last) = t.chars().last() else {
        return false;
    };
    const CONTINUATION: &[char] = &[
        ',', '\\', '+', '-', '*', '/', '=', '&', '|', '.', '(', '[', '<', '>', '!', '?', '%', '^',
    ];
    if CONTINUATION.contains(&last) {
        return true;
    }
    match language {
        TargetLanguage::Cpp | TargetLanguage::CSharp => {
            !(matches!(last, ';' | '{' | '}' | ':') || t.starts_with('#'))
        }
        _ => false,
    }
}

/// Remove stray closers; a line left blank by the removal is dropped.
fn remove_strays(lines: &mut Vec<String>, strays: &[Delimiter]) {
    let mut starts = Vec::with_capacity(lines.len());
    let mut offset = 0;
    for line in lines.iter() {
        starts.push(offset);
        offset += line.len() + 1;
    }

    let mut ordered: Vec<&Delimiter> = strays.iter().collect();
    ordered.sort_by(|a, b| b.offset.cmp(&a.offset));

    for stray in ordered {
        let idx = stray.line - 1;
        let Some(line) = lines.get_mut(idx) else {
            continue;
        };
        let column = stray.offset - starts[idx];
        if line.get(column..column + 1) != Some(&stray.ch.to_string()[..]) {
            continue;
        }
        let was_blank = line.trim().is_empty();
        line.remove(column);
        if !was_blank && line.trim().is_empty() {
            lines.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RepairPolicy {
        RepairPolicy::default()
    }

    #[test]
    fn strings_and_comments_are_ignored() {
        let code = "void F() {\n    auto s = \"}}(\"; // {{\n    /* ) */ char c = '{';\n}\n";
        let scan = scan(code, TargetLanguage::Cpp);
        assert!(scan.is_balanced(), "{:?}", scan);
        assert_eq!(scan.masked.len(), code.len());
    }

    #[test]
    fn python_hash_comments_and_triple_quotes() {
        let code = "def f():\n    \"\"\"doc (\n    \"\"\"\n    return [1, 2]  # ]\n";
        assert!(scan(code, TargetLanguage::Python).is_balanced());
    }

    #[test]
    fn digit_separator_is_not_a_char_literal() {
        let code = "int x = 1'000'000; int y = (x);\n";
        assert!(scan(code, TargetLanguage::Cpp).is_balanced());
    }

    #[test]
    fn mismatch_is_rejected() {
        let out = check_structure("void F() {\n    G(1];\n}\n", TargetLanguage::Cpp, &policy());
        assert_eq!(out.status, StructuralStatus::Rejected);
        assert_eq!(
            out.diagnostics.last().map(|d| d.kind),
            Some(DiagnosticKind::MismatchedDelimiter)
        );
    }

    #[test]
    fn truncated_body_is_trimmed_and_closed() {
        let code = "void F(int A) {\n    if (A > 0) {\n        G(A);\n        H(A,";
        let out = check_structure(code, TargetLanguage::Cpp, &policy());
        assert_eq!(out.status, StructuralStatus::Repaired);
        assert_eq!(
            out.code,
            "void F(int A) {\n    if (A > 0) {\n        G(A);\n    }\n}"
        );
        let kinds: Vec<_> = out.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::TrimmedPartialStatement,
                DiagnosticKind::ClosedDelimiter,
                DiagnosticKind::ClosedDelimiter,
            ]
        );
    }

    #[test]
    fn stray_closer_line_is_dropped() {
        let code = "void F() {\n    G();\n}\n}\n";
        let out = check_structure(code, TargetLanguage::Cpp, &policy());
        assert_eq!(out.status, StructuralStatus::Repaired);
        assert_eq!(out.code, "void F() {\n    G();\n}");
    }

    #[test]
    fn repair_limits_are_respected() {
        let strict = RepairPolicy {
            max_appended_closers: 1,
            ..RepairPolicy::default()
        };
        let out = check_structure("void F() {\n    if (x) {\n", TargetLanguage::Cpp, &strict);
        assert_eq!(out.status, StructuralStatus::Rejected);
    }

    #[test]
    fn empty_body_is_rejected() {
        let out = check_structure("  \n\n", TargetLanguage::Python, &policy());
        assert_eq!(out.status, StructuralStatus::Rejected);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::EmptyBody);
    }
}
