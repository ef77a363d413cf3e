//! Flow document load/save helpers. The format follows the file extension:
//! `.json` is JSON, anything else TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::instruction::Program;
use crate::flow::FlowDocument;

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

pub fn load_flow(path: &Path) -> Result<FlowDocument> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read flow {}", path.display()))?;
    if is_json(path) {
        serde_json::from_str(&contents).with_context(|| format!("parse flow {}", path.display()))
    } else {
        toml::from_str(&contents).with_context(|| format!("parse flow {}", path.display()))
    }
}

/// Load and compile a flow document.
pub fn load_program(path: &Path) -> Result<Program> {
    let doc = load_flow(path)?;
    doc.compile()
        .with_context(|| format!("compile flow {}", path.display()))
}

pub fn write_flow(path: &Path, doc: &FlowDocument) -> Result<()> {
    let mut buf = if is_json(path) {
        serde_json::to_string_pretty(doc).context("serialize flow json")?
    } else {
        toml::to_string_pretty(doc).context("serialize flow toml")?
    };
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write flow {}", path.display()))
}
