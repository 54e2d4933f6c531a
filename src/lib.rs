//! portcheck compiles a single source file under several independent target
//! configurations ("compiler instances") and reports a consolidated,
//! deduplicated view of the diagnostics: which findings are shared across
//! instances and which are instance-specific, with pass/fail status per
//! instance.

pub mod backend;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod helpers;
pub mod manifest;
pub mod options;
pub mod run;
