use anyhow::{Context, Result};
use console::Term;
use std::fs;
use std::path::Path;

/// Check if we're running in a TTY (interactive terminal)
pub fn is_tty() -> bool {
    Term::stdout().is_term() && Term::stderr().is_term()
}

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Could not read {}", path.to_string_lossy()))
}
