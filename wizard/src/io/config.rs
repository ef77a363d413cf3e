//! Wizard configuration stored under `.wizard/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::context::Context as WizardContext;

/// Wizard configuration (TOML).
///
/// Missing fields fall back to defaults, so an absent file behaves like an
/// empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WizardConfig {
    /// Flow document, relative to the project root.
    pub flow: PathBuf,

    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Context every state starts from.
    pub initial_context: WizardContext,

    /// Whether `replace` takes a default step after landing.
    pub auto_advance: bool,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            flow: PathBuf::from("flow.toml"),
            log_filter: "warn".to_string(),
            initial_context: WizardContext::new(),
            auto_advance: true,
        }
    }
}

impl WizardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.flow.as_os_str().is_empty() {
            return Err(anyhow!("flow must be a non-empty path"));
        }
        if self.log_filter.trim().is_empty() {
            return Err(anyhow!("log_filter must be non-empty"));
        }
        // TOML has no null.
        if let Some((key, _)) = self.initial_context.iter().find(|(_, value)| value.is_null()) {
            return Err(anyhow!("initial_context.{key} must not be null"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WizardConfig::default()`.
pub fn load_config(path: &Path) -> Result<WizardConfig> {
    if !path.exists() {
        let cfg = WizardConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WizardConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WizardConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
