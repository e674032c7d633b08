//! Declared-signature check against the document's derived signature.
//!
//! Works on masked code (strings and comments blanked) so identifiers inside
//! literals never count as declarations.

use crate::ir::types::FunctionSignature;

/// Words that look like `name(` but never name a declaration.
const NOT_A_NAME: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "sizeof", "elif", "with", "foreach",
    "using", "lock", "guard", "function", "func", "def", "fn", "await", "typeof", "new", "print",
    "assert", "decltype", "static_assert", "alignof", "nameof", "super",
];

/// Last word before a name that makes `name(...)` an expression, not a declaration.
const EXPRESSION_CONTEXT: &[&str] = &[
    "return", "if", "elif", "while", "for", "not", "and", "or", "in", "await", "new", "throw",
    "yield", "case", "else", "do", "delete", "try",
];

const RECEIVERS: &[&str] = &["self", "this", "cls", "void"];

/// Words in a brace header that open a type or namespace scope rather than a body.
const SCOPE_KEYWORDS: &[&str] = &[
    "class", "struct", "namespace", "interface", "enum", "union", "extension", "protocol",
    "impl", "record", "object", "trait", "extern", "module",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub params: Vec<String>,
    /// 1-based.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Matched,
    /// A uniquely matching declaration was renamed to the expected name.
    Renamed { from: String, code: String },
    Mismatch(String),
}

pub fn check_signature(
    code: &str,
    masked: &str,
    signature: &FunctionSignature,
    allow_rename: bool,
) -> SignatureCheck {
    let declarations = find_declarations(masked);
    let expected: Vec<String> = signature
        .parameters
        .iter()
        .map(|p| normalize_param(&p.name))
        .collect();
    let params_match = |d: &Declaration| {
        d.params.iter().map(|p| normalize_param(p)).collect::<Vec<_>>() == expected
    };

    let named: Vec<&Declaration> = declarations
        .iter()
        .filter(|d| d.name == signature.name)
        .collect();
    if !named.is_empty() {
        if named.iter().any(|d| params_match(d)) {
            return SignatureCheck::Matched;
        }
        return SignatureCheck::Mismatch(format!(
            "'{}' is declared with parameters ({}), expected ({})",
            signature.name,
            named[0].params.join(", "),
            display_params(signature)
        ));
    }

    let mut candidates: Vec<&str> = declarations
        .iter()
        .filter(|d| params_match(d))
        .map(|d| d.name.as_str())
        .collect();
    candidates.sort_unstable();
    candidates.dedup();

    match candidates.as_slice() {
        [only] if allow_rename => SignatureCheck::Renamed {
            from: only.to_string(),
            code: rename_word(code, masked, only, &signature.name),
        },
        [only] => SignatureCheck::Mismatch(format!(
            "expected '{}' but found '{}' with matching parameters; renaming is disabled",
            signature.name, only
        )),
        [] => SignatureCheck::Mismatch(format!(
            "no declaration of '{}({})' found",
            signature.name,
            display_params(signature)
        )),
        many => SignatureCheck::Mismatch(format!(
            "'{}' not declared; several candidates match its parameters: {}",
            signature.name,
            many.join(", ")
        )),
    }
}

fn display_params(signature: &FunctionSignature) -> String {
    signature
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Case-insensitive, underscores and spaces ignored.
pub fn normalize_param(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// -----------------------------------------------------------------------------
// Declaration discovery
// -----------------------------------------------------------------------------

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Identifier tokens as byte ranges.
pub fn identifiers(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if is_ident_start(bytes[i]) && (i == 0 || !is_ident_char(bytes[i - 1])) {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            out.push((start, i));
        } else {
            i += 1;
        }
    }
    out
}

/// Declarations outside any function body. Locals such as `int32 Count(0);`
/// inside a body never count.
pub fn find_declarations(masked: &str) -> Vec<Declaration> {
    let bytes = masked.as_bytes();
    let in_body = body_mask(masked);
    let mut found = Vec::new();

    for (start, end) in identifiers(masked) {
        let name = &masked[start..end];
        if NOT_A_NAME.contains(&name) || in_body[start] {
            continue;
        }

        let line_start = masked[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let prefix = masked[line_start..start].trim_end();

        // `name(` or JS `name = (...) =>`
        let mut cursor = skip_spaces(bytes, end);
        let arrow_form = bytes.get(cursor) == Some(&b'=') && bytes.get(cursor + 1) != Some(&b'=');
        if arrow_form {
            cursor = skip_spaces(bytes, cursor + 1);
            if masked[cursor..].starts_with("async") {
                cursor = skip_spaces(bytes, cursor + 5);
            }
        }
        if bytes.get(cursor) != Some(&b'(') {
            continue;
        }
        let Some(close) = matching_paren(bytes, cursor) else {
            continue;
        };

        let line_end = masked[close..].find('\n').map(|i| close + i).unwrap_or(masked.len());
        let rest = masked[close + 1..line_end].trim();
        let next_line = masked[line_end..]
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");

        let is_declaration = if arrow_form {
            rest.starts_with("=>")
        } else {
            !in_expression_context(prefix) && declaration_tail(prefix, rest, next_line)
        };
        if !is_declaration {
            continue;
        }

        let pieces = split_params(&masked[cursor + 1..close]);
        let prototype = !arrow_form && rest == ";";
        if prototype && !pieces.iter().all(|p| is_typed_param(p)) {
            continue;
        }
        let Some(params) = param_names(&pieces) else {
            continue;
        };
        found.push(Declaration {
            name: name.to_string(),
            params,
            line: masked[..start].matches('\n').count() + 1,
        });
    }

    found
}

/// Per byte: inside a function or block body. Braces opened by a
/// `class`/`namespace`/... header are scopes, not bodies.
fn body_mask(masked: &str) -> Vec<bool> {
    let bytes = masked.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut stack: Vec<bool> = Vec::new();
    let mut body_depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                out.push(body_depth > 0);
                let body = !opens_scope(brace_header(masked, i));
                if body {
                    body_depth += 1;
                }
                stack.push(body);
                continue;
            }
            b'}' => {
                if stack.pop() == Some(true) {
                    body_depth -= 1;
                }
            }
            _ => {}
        }
        out.push(body_depth > 0);
    }
    out
}

/// Text between the previous statement boundary and the brace at `at`.
fn brace_header(masked: &str, at: usize) -> &str {
    let start = masked[..at]
        .rfind([';', '{', '}'])
        .map(|i| i + 1)
        .unwrap_or(0);
    masked[start..at].trim()
}

fn opens_scope(header: &str) -> bool {
    let head = header.split('(').next().unwrap_or("");
    identifiers(head)
        .into_iter()
        .any(|(s, e)| SCOPE_KEYWORDS.contains(&&head[s..e]))
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn in_expression_context(prefix: &str) -> bool {
    if prefix
        .chars()
        .last()
        .is_some_and(|c| "=(,.!&|?:+-*/<[%^~".contains(c) && !prefix.ends_with("::"))
    {
        return true;
    }
    let last_word = prefix
        .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    EXPRESSION_CONTEXT.contains(&last_word)
}

/// What follows the parameter list decides whether `name(...)` declares.
fn declaration_tail(prefix: &str, rest: &str, next_line: &str) -> bool {
    if rest.ends_with('{') || (rest.ends_with(':') && !rest.contains('?')) {
        return true;
    }
    if rest.is_empty() || is_qualifier_tail(rest) {
        return next_line.starts_with('{') || rest.ends_with(':');
    }
    // Prototype: `void Name(int A);` needs a type before the name.
    rest == ";"
        && prefix
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | '&' | '>' | ':'))
}

/// `const`, `override`, `-> Type`, `throws` and similar trailers.
fn is_qualifier_tail(rest: &str) -> bool {
    !rest.contains(['(', ')', ';', '=', '{', '}'])
        || rest.starts_with("->")
}

fn split_params(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Names of every parameter piece, receivers dropped. `None` when a piece is
/// not a parameter at all (a literal or an expression), i.e. the parens hold
/// call arguments.
fn param_names(pieces: &[&str]) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for piece in pieces {
        let name = param_name(piece)?;
        if !RECEIVERS.contains(&name.as_str()) {
            names.push(name);
        }
    }
    Some(names)
}

/// `Type Name`, `Name: Type` or `void`; a bare identifier is an argument.
fn is_typed_param(piece: &str) -> bool {
    let head = piece.split('=').next().unwrap_or("").trim();
    if head == "void" || find_single_colon(head).is_some() {
        return true;
    }
    !head.contains(['.', '(', ')', '+', '-', '/', '!'])
        && identifiers(head).len() >= 2
}

/// `name: Type` → name before the colon; otherwise the last identifier before
/// any default value.
fn param_name(piece: &str) -> Option<String> {
    let without_default = match piece.find('=') {
        Some(i) => &piece[..i],
        None => piece,
    };
    let head = match find_single_colon(without_default) {
        Some(i) => &without_default[..i],
        None => without_default,
    };
    let (start, end) = identifiers(head).into_iter().next_back()?;
    Some(head[start..end].to_string())
}

fn find_single_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (0..bytes.len()).find(|&i| {
        bytes[i] == b':'
            && bytes.get(i + 1) != Some(&b':')
            && (i == 0 || bytes[i - 1] != b':')
    })
}

/// Replace whole-word occurrences of `from` that are code, not literal text.
pub fn rename_word(code: &str, masked: &str, from: &str, to: &str) -> String {
    let hits: Vec<(usize, usize)> = identifiers(masked)
        .into_iter()
        .filter(|&(s, e)| &masked[s..e] == from)
        .collect();

    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for (s, e) in hits {
        out.push_str(&code[last..s]);
        out.push_str(to);
        last = e;
    }
    out.push_str(&code[last..]);
    out
}
