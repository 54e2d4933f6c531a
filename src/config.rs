//! Run configuration: the ordered manifest priority table.
//!
//! The table maps manifest resources to the compiler instances they activate.
//! Evaluation order is part of the deployment's configuration, not of the
//! selection algorithm, so the table can be overridden by a `portcheck.json`
//! in the config directory; without one the built-in defaults apply.

use crate::helpers;
use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::path::Path;

pub static CONFIG_FILENAME: &str = "portcheck.json";

/// One row of the priority table: a manifest resource and the instances it
/// activates. Rows are evaluated top to bottom; the first manifest containing
/// the input file wins.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestRule {
    pub manifest: String,
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub manifests: Vec<ManifestRule>,
}

impl Config {
    /// The default table mirrors the original deployment: a broad manifest
    /// covering all four instances first, narrower ones after it.
    pub fn default_table() -> Self {
        let rule = |manifest: &str, instances: &[&str]| ManifestRule {
            manifest: manifest.to_string(),
            instances: instances.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            manifests: vec![
                rule("common_files.config", &["amd64", "i386", "P", "Z"]),
                rule("x_files.config", &["amd64", "i386"]),
                rule("amd64_files.config", &["amd64"]),
                rule("i386_files.config", &["i386"]),
                rule("p_files.config", &["P"]),
                rule("z_files.config", &["Z"]),
            ],
        }
    }

    /// Read the config from `<config_dir>/portcheck.json`, falling back to
    /// the default table when the file does not exist. A file that exists
    /// but does not parse is an error: silently ignoring a broken config
    /// would select instances the user did not ask for.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILENAME);
        if !path.exists() {
            log::debug!(
                "No {} in {}; using the default manifest table",
                CONFIG_FILENAME,
                config_dir.to_string_lossy()
            );
            return Ok(Self::default_table());
        }
        let contents = helpers::read_file(&path)?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Could not parse {}: {}", path.to_string_lossy(), e))?;
        if config.manifests.is_empty() {
            return Err(anyhow!(
                "{} declares no manifests; remove it to use the default table",
                path.to_string_lossy()
            ));
        }
        Ok(config)
    }
}
