//! Initialization helpers for `.wizard/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{WizardConfig, load_config, write_config};
use super::flow_store::write_flow;
use crate::flow::default_flow;

/// Canonical paths for a project root.
#[derive(Debug, Clone)]
pub struct WizardPaths {
    pub root: PathBuf,
    pub wizard_dir: PathBuf,
    pub config_path: PathBuf,
}

impl WizardPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let wizard_dir = root.join(".wizard");
        Self {
            root: root.clone(),
            config_path: wizard_dir.join("config.toml"),
            wizard_dir,
        }
    }

    /// Flow document named by `config`, resolved against the root.
    pub fn flow_path(&self, config: &WizardConfig) -> PathBuf {
        self.root.join(&config.flow)
    }
}

/// Options for `init_wizard`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing wizard-owned files.
    pub force: bool,
}

/// Create `.wizard/config.toml` and the sample flow in `root`.
///
/// Fails if `.wizard/` already exists unless `options.force` is set. An
/// existing config keeps its flow location on re-init.
pub fn init_wizard(root: &Path, options: &InitOptions) -> Result<WizardPaths> {
    let paths = WizardPaths::new(root);
    if paths.wizard_dir.exists() && !paths.wizard_dir.is_dir() {
        return Err(anyhow!(
            "wizard init: .wizard exists but is not a directory"
        ));
    }
    if paths.wizard_dir.exists() && !options.force {
        return Err(anyhow!(
            "wizard init: .wizard already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.wizard_dir)
        .with_context(|| format!("create directory {}", paths.wizard_dir.display()))?;
    let config = WizardConfig {
        flow: load_config(&paths.config_path)?.flow,
        ..WizardConfig::default()
    };
    write_config(&paths.config_path, &config)?;
    write_flow(&paths.flow_path(&config), &default_flow())?;
    Ok(paths)
}
