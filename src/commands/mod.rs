//! Command implementations
//!
//! Each command reads its inputs through the helpers here, so every
//! document argument accepts `-` for stdin.

pub mod documents;
pub mod deploy;
pub mod diff;

use crate::config::Config;
use crate::paths;
use definitions::Index;
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Read a JSON document from a file, or stdin for `-`.
pub fn read_document(path: &Path) -> Result<Value> {
    if paths::is_stdio(path) {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Could not read stdin")?;
        return serde_json::from_str(&content).context("Invalid JSON on stdin");
    }
    definitions::read_definitions(path).with_context(|| format!("Could not load {}", path.display()))
}

/// Display name of a document argument.
pub fn source_name(path: &Path) -> String {
    if paths::is_stdio(path) {
        "<stdin>".to_string()
    } else {
        path.display().to_string()
    }
}

/// Pretty-print a document to a file, or stdout when no path (or `-`) is given.
pub fn write_document(document: &Value, output: Option<&Path>) -> Result<()> {
    let mut content = serde_json::to_string_pretty(document).context("Failed to serialize JSON")?;
    content.push('\n');
    match output {
        Some(path) if !paths::is_stdio(path) => std::fs::write(path, content)
            .with_context(|| format!("Could not write {}", path.display())),
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes()).context("Could not write stdout")?;
            Ok(())
        }
    }
}

/// The ignore list path from the command line, falling back to the config.
pub fn ignore_path(arg: Option<&Path>, config: &Config) -> Option<PathBuf> {
    arg.map(Path::to_path_buf).or_else(|| config.ignore_file())
}

/// Load the ignore list from the command line or config, if any.
pub fn load_ignore(arg: Option<&Path>, config: &Config) -> Result<Option<Index>> {
    let Some(path) = ignore_path(arg, config) else {
        return Ok(None);
    };
    log::info!("Using ignore list {}", path.display());
    let index = Index::from_ignore_file(&path)
        .with_context(|| format!("Could not load ignore list {}", path.display()))?;
    Ok(Some(index))
}
