// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! User defaults for kubectl-find
//!
//! All kubectl-find data is stored under ~/.kubectl-find/:
//! - ~/.kubectl-find/config.json - default columns and sort order
//! - ~/.kubectl-find/log/ - rotating log files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::handlers::ActionOptions;
use crate::output::SortOrder;

/// Get the base kubectl-find directory (~/.kubectl-find/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".kubectl-find"))
        .context("Could not determine home directory")
}

/// kubectl-find configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Label keys shown as columns when `-L` is not given
    #[serde(default)]
    pub labels: Vec<String>,

    /// Annotation keys shown as columns when `--annotations` is not given
    #[serde(default)]
    pub annotations: Vec<String>,

    /// Node label keys shown for pods when `-N` is not given
    #[serde(default)]
    pub node_labels: Vec<String>,

    /// Sort order used when `--sort` is not given
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

impl Config {
    /// Load config from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the config file path (~/.kubectl-find/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }

    /// Fill in whatever the command line left unset. Node label columns only
    /// apply to pods, so they are skipped for other kinds.
    pub fn apply(&self, options: &mut ActionOptions, is_pod: bool) {
        let columns = &mut options.columns;
        if columns.labels.is_empty() {
            columns.labels = self.labels.clone();
        }
        if columns.annotations.is_empty() {
            columns.annotations = self.annotations.clone();
        }
        if is_pod && columns.node_labels.is_empty() {
            columns.node_labels = self.node_labels.clone();
        }
        if options.sort.is_none() {
            options.sort = self.sort;
        }
    }
}
