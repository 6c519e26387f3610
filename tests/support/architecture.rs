//! Source scanning for the layer contracts in `architecture_contract_tests`.

use std::fs;
use std::path::{Path, PathBuf};

/// A source line that mentions a forbidden path.
#[derive(Debug)]
pub struct Reference {
    pub file: String,
    pub line: usize,
    pub text: String,
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn sources_under(dir: &Path) -> Vec<PathBuf> {
    let mut pending = vec![dir.to_path_buf()];
    let mut sources = Vec::new();
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).unwrap_or_else(|e| panic!("read {}: {e}", dir.display()));
        for entry in entries {
            let path = entry.expect("directory entry").path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                sources.push(path);
            }
        }
    }
    sources.sort();
    sources
}

/// Code lines under `layer` (relative to the crate root) mentioning any of
/// `forbidden`. Comment lines are skipped.
pub fn forbidden_references(layer: &str, forbidden: &[&str]) -> Vec<Reference> {
    let root = manifest_dir();
    let mut found = Vec::new();

    for path in sources_under(&root.join(layer)) {
        let content =
            fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
        let file = path
            .strip_prefix(&root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        for (idx, text) in content.lines().enumerate() {
            if text.trim_start().starts_with("//") {
                continue;
            }
            if forbidden.iter().any(|pattern| text.contains(pattern)) {
                found.push(Reference {
                    file: file.clone(),
                    line: idx + 1,
                    text: text.trim().to_string(),
                });
            }
        }
    }

    found
}
