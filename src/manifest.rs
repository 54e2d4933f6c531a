//! Instance selection through file manifests.
//!
//! A manifest is a line-oriented list of file paths. Membership is exact
//! string match against the input path as supplied on the command line —
//! no globbing, no canonicalization. The priority table from the run config
//! is evaluated top to bottom and the first manifest containing the file
//! decides which instances compile it.

use crate::config::Config;
use ahash::AHashSet;
use std::path::Path;

/// Result of instance selection for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The file matched this manifest; compile it under these instances, in order.
    Matched {
        manifest: String,
        instances: Vec<String>,
    },
    /// The file appears in no manifest. Not an error, merely nothing to do.
    NoApplicableInstance,
}

/// Read a manifest resource into a set of file paths. A missing or
/// unreadable manifest is treated as "no match" for that manifest, so this
/// returns None instead of an error and selection proceeds to the next rule.
fn read_manifest(config_dir: &Path, manifest: &str) -> Option<AHashSet<String>> {
    let path = config_dir.join(manifest);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Some(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Err(e) => {
            log::debug!("Manifest {} not readable ({e}); treating as no match", path.to_string_lossy());
            None
        }
    }
}

/// Determine which instances should compile `file_name`.
pub fn select_instances(config: &Config, config_dir: &Path, file_name: &str) -> Selection {
    for rule in &config.manifests {
        let Some(files) = read_manifest(config_dir, &rule.manifest) else {
            continue;
        };
        if files.contains(file_name) {
            log::debug!(
                "\"{file_name}\" matched manifest {} -> [{}]",
                rule.manifest,
                rule.instances.join(", ")
            );
            return Selection::Matched {
                manifest: rule.manifest.clone(),
                instances: rule.instances.clone(),
            };
        }
    }
    Selection::NoApplicableInstance
}
