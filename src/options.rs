//! Per-instance compiler option resources.
//!
//! Each compiler instance has a whitespace-separated token stream (read from
//! `<config-dir>/<instance>.config`) that predefines macros and adds include
//! search directories for that instance. Tokens the parser does not recognize
//! are ignored, so option files stay forward-compatible with future kinds.

use crate::helpers;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// One recognized token from an instance's option resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerOption {
    /// `-I'<path>'` — an angled include-search directory.
    IncludePath(PathBuf),
    /// `-D<NAME>` or `-D<NAME>=<VALUE>` — a predefined macro.
    MacroDefinition(String),
    /// Any other token; kept so callers can log what was skipped.
    Unrecognized(String),
}

/// Identity and compiler options for one target variant. Built fresh for
/// each orchestrator iteration and discarded after the backend call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub name: String,
    pub include_paths: Vec<PathBuf>,
    pub macro_definitions: Vec<String>,
}

impl InstanceConfig {
    pub fn new(name: &str, options: Vec<CompilerOption>) -> Self {
        let mut include_paths = Vec::new();
        let mut macro_definitions = Vec::new();
        for option in options {
            match option {
                CompilerOption::IncludePath(path) => include_paths.push(path),
                CompilerOption::MacroDefinition(def) => macro_definitions.push(def),
                CompilerOption::Unrecognized(token) => {
                    log::debug!("Ignoring unrecognized option token \"{token}\"");
                }
            }
        }
        Self {
            name: name.to_string(),
            include_paths,
            macro_definitions,
        }
    }
}

/// Parse a single option token. Returns None for malformed tokens (an `-I`
/// missing its quotes, a `-D` with no name); the caller skips those and
/// continues with the rest of the stream.
pub fn parse_token(token: &str) -> Option<CompilerOption> {
    if let Some(rest) = token.strip_prefix("-I") {
        let path = rest.strip_prefix('\'')?.strip_suffix('\'')?;
        if path.is_empty() {
            return None;
        }
        Some(CompilerOption::IncludePath(PathBuf::from(path)))
    } else if let Some(definition) = token.strip_prefix("-D") {
        let name = definition.split('=').next().unwrap_or("");
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        Some(CompilerOption::MacroDefinition(definition.to_string()))
    } else {
        Some(CompilerOption::Unrecognized(token.to_string()))
    }
}

/// Parse a whole option stream. Malformed tokens are skipped individually
/// with a warning; they never abort the instance.
pub fn parse_option_stream(contents: &str) -> Vec<CompilerOption> {
    contents
        .split_whitespace()
        .filter_map(|token| match parse_token(token) {
            Some(option) => Some(option),
            None => {
                log::warn!("Skipping malformed option token \"{token}\"");
                None
            }
        })
        .collect()
}

/// Load the option resource for one instance and build its config.
/// A missing resource yields an empty option list rather than an error:
/// an instance with no extra options is still a valid instance.
pub fn load_instance_config(config_dir: &Path, instance: &str) -> Result<InstanceConfig> {
    let path = config_dir.join(format!("{instance}.config"));
    let options = match helpers::read_file(&path) {
        Ok(contents) => parse_option_stream(&contents),
        Err(_) => {
            log::debug!(
                "No option resource at {}; using empty options for \"{instance}\"",
                path.to_string_lossy()
            );
            Vec::new()
        }
    };
    Ok(InstanceConfig::new(instance, options))
}
