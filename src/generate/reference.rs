//! Reference source files sent ahead of the graph in every request.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFile {
    /// File name without its directory.
    pub name: String,
    pub content: String,
}

impl ReferenceFile {
    pub fn new(path: &Path, content: String) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        ReferenceFile { name, content }
    }

    /// Rough token count: four characters per token, rounded up.
    pub fn estimated_tokens(&self) -> usize {
        self.content.len().div_ceil(4)
    }

    fn render(&self) -> String {
        format!("File: {}\n```\n{}\n```", self.name, self.content)
    }
}

/// Read every path. Unreadable files are logged and skipped.
pub fn load_reference_files(paths: &[PathBuf]) -> Vec<ReferenceFile> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let file = ReferenceFile::new(path, content);
                debug!(file = %file.name, tokens = file.estimated_tokens(), "loaded reference file");
                files.push(file);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load reference source file"),
        }
    }
    files
}

/// `<referenceSourceFiles>` block placed before the graph. Empty when there
/// are no files.
pub fn reference_block(files: &[ReferenceFile]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let body = files
        .iter()
        .map(ReferenceFile::render)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("<referenceSourceFiles>\n{}\n</referenceSourceFiles>\n\n", body)
}
