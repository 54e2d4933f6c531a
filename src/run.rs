//! The top-level driver for one input file.
//!
//! Resolves the instance set through the manifest table, then for each
//! instance: loads its option resource, invokes the compilation backend, and
//! routes the backend's diagnostic events into the shared store tagged with
//! the instance name. After all instances are processed the aggregated
//! report goes to the error stream and the pass/fail summary to standard
//! output. Exit-code policy stays with the caller.
//!
//! Instances run sequentially by default. They are independent units of work
//! with no shared mutable state except the diagnostic store, so `--parallel`
//! schedules them on rayon; record order in the report then follows whichever
//! instance's event reaches the store first and is not deterministic across
//! runs.

use crate::backend::{BackendError, CompileBackend, SharedInvocation};
use crate::config::Config;
use crate::diagnostics::DiagnosticStore;
use crate::manifest::{self, Selection};
use crate::options;
use anyhow::Result;
use console::style;
use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;

/// Classification of one instance's compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Good,
    Bad { error_count: u32 },
    /// The backend call was aborted by the run-level timeout.
    Aborted,
    /// The backend could not be brought up for this instance.
    SetupFailure(String),
}

impl InstanceStatus {
    pub fn is_bad(&self) -> bool {
        !matches!(self, InstanceStatus::Good)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstanceStatus::Good => write!(f, "ok"),
            InstanceStatus::Bad { error_count: 1 } => write!(f, "1 error"),
            InstanceStatus::Bad { error_count } => write!(f, "{error_count} errors"),
            InstanceStatus::Aborted => write!(f, "aborted"),
            InstanceStatus::SetupFailure(reason) => write!(f, "setup failure: {reason}"),
        }
    }
}

/// Per-instance result, accumulated across the run in instance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub instance: String,
    pub status: InstanceStatus,
}

/// Everything the caller needs after a completed run.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<RunOutcome>,
    /// The rendered deduplicated diagnostic report.
    pub report: String,
}

impl RunSummary {
    pub fn good_instances(&self) -> Vec<&RunOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_bad()).collect()
    }

    pub fn bad_instances(&self) -> Vec<&RunOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_bad()).collect()
    }

    pub fn any_bad(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_bad())
    }
}

#[derive(Debug)]
pub enum RunResult {
    /// The file matched no manifest. Nothing was compiled; not an error.
    NoApplicableInstance,
    Completed(RunSummary),
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum RunProgress {
    /// Instance set resolved through a manifest.
    Selected { manifest: String, instances: Vec<String> },
    /// One instance's compilation started.
    Compiling { instance: String },
    /// One instance's compilation finished and was classified.
    InstanceFinished { outcome: RunOutcome },
    /// The input file matched no manifest.
    NoApplicableInstance { file: String },
    /// The aggregated deduplicated report (goes to the error stream).
    Report { rendered: String, is_empty: bool },
    /// Final pass/fail summary (goes to standard output).
    Summary { good: Vec<String>, bad: Vec<RunOutcome> },
}

/// Trait for reporting run progress
pub trait RunReporter: Send + Sync {
    fn report(&self, progress: RunProgress);
}

/// A no-op reporter that discards all progress messages. Used in tests and
/// for callers that only want the returned `RunSummary`.
pub struct NoopReporter;

impl RunReporter for NoopReporter {
    fn report(&self, _progress: RunProgress) {
        // Discard all progress
    }
}

/// Renders progress on the console: diagnostics and failures on stderr,
/// status and summary lines on stdout. Styling is dropped outside a TTY.
pub struct ConsoleReporter {
    show_progress: bool,
    plain: bool,
}

impl ConsoleReporter {
    pub fn new(show_progress: bool) -> Self {
        Self {
            show_progress,
            plain: !crate::helpers::is_tty(),
        }
    }
}

impl RunReporter for ConsoleReporter {
    fn report(&self, progress: RunProgress) {
        match progress {
            RunProgress::Selected { manifest, instances } => {
                if self.show_progress {
                    println!("Selected [{}] via {}", instances.join(", "), manifest);
                }
            }
            RunProgress::Compiling { instance } => {
                if self.show_progress {
                    println!("Compiling under \"{instance}\"...");
                }
            }
            RunProgress::InstanceFinished { outcome } => {
                if self.show_progress {
                    println!("  {}: {}", outcome.instance, outcome.status);
                }
            }
            RunProgress::NoApplicableInstance { file } => {
                println!("Unknown file \"{file}\". Please check the file lists.");
            }
            RunProgress::Report { rendered, is_empty } => {
                if is_empty || self.plain {
                    eprint!("{rendered}");
                } else {
                    eprint!("{}", style(rendered).red());
                }
            }
            RunProgress::Summary { good, bad } => {
                if bad.is_empty() {
                    println!("All instances passed.");
                    return;
                }
                let bad_lines = bad
                    .iter()
                    .map(|outcome| format!("  {} ({})", outcome.instance, outcome.status))
                    .collect::<Vec<String>>()
                    .join("\n");
                if good.is_empty() {
                    println!("All instances failed:\n{bad_lines}");
                } else {
                    println!("Bad instances:\n{bad_lines}");
                    println!("Good instances:\n  {}", good.join("\n  "));
                }
            }
        }
    }
}

/// Inputs for one run, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config_dir: PathBuf,
    pub file: String,
    /// Shared invocation flags, identical for every instance.
    pub shared_args: Vec<String>,
    /// Compile under exactly these instances, skipping manifest selection.
    pub instances_override: Option<Vec<String>>,
    pub parallel: bool,
}

fn run_one_instance<B: CompileBackend>(
    args: &RunArgs,
    backend: &B,
    store: &DiagnosticStore,
    reporter: &dyn RunReporter,
    instance: &str,
) -> Result<RunOutcome> {
    reporter.report(RunProgress::Compiling {
        instance: instance.to_string(),
    });

    // Configure: malformed entries in the option stream are skipped
    // individually inside the parser, never fatal to the instance.
    let instance_config = options::load_instance_config(&args.config_dir, instance)?;

    let invocation = SharedInvocation {
        source_file: args.file.clone(),
        args: args.shared_args.clone(),
    };

    // Invoke: route diagnostic events into the shared store as they are
    // produced. Only error-severity events become findings; warnings and
    // notes are not aggregated.
    let mut on_diagnostic = |event: crate::backend::DiagnosticEvent| {
        if event.severity.is_error() {
            store.record(instance, &event.file, event.line, event.column, &event.message);
        } else {
            log::debug!(
                "[{instance}] {}:{}:{}: {:?}: {}",
                event.file,
                event.line,
                event.column,
                event.severity,
                event.message
            );
        }
    };
    let result = backend.compile(&invocation, &instance_config, &mut on_diagnostic);

    // Classify
    let status = match result {
        Ok(outcome) if outcome.error_count > 0 => InstanceStatus::Bad {
            error_count: outcome.error_count,
        },
        Ok(_) => InstanceStatus::Good,
        Err(BackendError::Aborted) => InstanceStatus::Aborted,
        Err(BackendError::Setup(reason)) => InstanceStatus::SetupFailure(reason),
    };

    let outcome = RunOutcome {
        instance: instance.to_string(),
        status,
    };
    reporter.report(RunProgress::InstanceFinished {
        outcome: outcome.clone(),
    });
    Ok(outcome)
}

pub fn run<B: CompileBackend, R: RunReporter>(
    args: &RunArgs,
    backend: &B,
    reporter: &R,
) -> Result<RunResult> {
    let instances = match &args.instances_override {
        Some(instances) => {
            log::debug!("Instance selection overridden: [{}]", instances.join(", "));
            instances.clone()
        }
        None => {
            let config = Config::load(&args.config_dir)?;
            match manifest::select_instances(&config, &args.config_dir, &args.file) {
                Selection::Matched { manifest, instances } => {
                    reporter.report(RunProgress::Selected {
                        manifest,
                        instances: instances.clone(),
                    });
                    instances
                }
                Selection::NoApplicableInstance => {
                    reporter.report(RunProgress::NoApplicableInstance {
                        file: args.file.clone(),
                    });
                    return Ok(RunResult::NoApplicableInstance);
                }
            }
        }
    };

    // The store lives exactly as long as this run; it is shared across
    // instances but owned here, never ambient.
    let store = DiagnosticStore::new();

    let outcomes: Vec<RunOutcome> = if args.parallel {
        instances
            .par_iter()
            .map(|instance| run_one_instance(args, backend, &store, reporter, instance))
            .collect::<Result<Vec<_>>>()?
    } else {
        let mut outcomes = Vec::with_capacity(instances.len());
        for instance in &instances {
            outcomes.push(run_one_instance(args, backend, &store, reporter, instance)?);
        }
        outcomes
    };

    let summary = RunSummary {
        report: store.render(),
        outcomes,
    };

    reporter.report(RunProgress::Report {
        rendered: summary.report.clone(),
        is_empty: store.is_empty(),
    });
    reporter.report(RunProgress::Summary {
        good: summary
            .good_instances()
            .iter()
            .map(|o| o.instance.clone())
            .collect(),
        bad: summary.bad_instances().into_iter().cloned().collect(),
    });

    Ok(RunResult::Completed(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOutcome, DiagnosticEvent, Severity};
    use ahash::AHashMap;
    use crate::options::InstanceConfig;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the scripted backend does when called for a given instance.
    enum Script {
        Events(Vec<DiagnosticEvent>),
        SetupFailure(String),
        Aborted,
    }

    struct ScriptedBackend {
        scripts: AHashMap<String, Script>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(scripts: Vec<(&str, Script)>) -> Self {
            Self {
                scripts: scripts
                    .into_iter()
                    .map(|(name, script)| (name.to_string(), script))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CompileBackend for ScriptedBackend {
        fn compile(
            &self,
            _invocation: &SharedInvocation,
            config: &InstanceConfig,
            on_diagnostic: &mut dyn FnMut(DiagnosticEvent),
        ) -> Result<BackendOutcome, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scripts.get(&config.name) {
                Some(Script::Events(events)) => {
                    let mut error_count = 0;
                    for event in events {
                        if event.severity.is_error() {
                            error_count += 1;
                        }
                        on_diagnostic(event.clone());
                    }
                    Ok(BackendOutcome { error_count })
                }
                Some(Script::SetupFailure(reason)) => Err(BackendError::Setup(reason.clone())),
                Some(Script::Aborted) => Err(BackendError::Aborted),
                None => Ok(BackendOutcome { error_count: 0 }),
            }
        }
    }

    fn error_at(file: &str, line: u32, column: u32, message: &str) -> DiagnosticEvent {
        DiagnosticEvent {
            severity: Severity::Error,
            file: file.to_string(),
            line,
            column,
            message: message.to_string(),
        }
    }

    fn write_manifest(dir: &Path, name: &str, lines: &[&str]) {
        fs::write(dir.join(name), lines.join("\n")).expect("write manifest");
    }

    fn run_args(config_dir: &Path, file: &str) -> RunArgs {
        RunArgs {
            config_dir: config_dir.to_path_buf(),
            file: file.to_string(),
            shared_args: vec![],
            instances_override: None,
            parallel: false,
        }
    }

    fn completed(result: RunResult) -> RunSummary {
        match result {
            RunResult::Completed(summary) => summary,
            RunResult::NoApplicableInstance => panic!("expected a completed run"),
        }
    }

    #[test]
    fn merges_the_same_finding_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "x_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![
            (
                "amd64",
                Script::Events(vec![error_at("a.c", 5, 9, "use of undeclared identifier 'x'")]),
            ),
            (
                "i386",
                Script::Events(vec![error_at("a.c", 5, 13, "use of undeclared identifier 'x'")]),
            ),
        ]);

        let summary = completed(
            run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run"),
        );

        assert_eq!(
            summary.report,
            "amd64, i386:\na.c:5: error: use of undeclared identifier 'x'\n"
        );
        assert_eq!(
            summary
                .bad_instances()
                .iter()
                .map(|o| o.instance.as_str())
                .collect::<Vec<_>>(),
            vec!["amd64", "i386"]
        );
        assert!(summary.good_instances().is_empty());
    }

    #[test]
    fn mixed_outcome_names_both_sides() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "x_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![
            ("amd64", Script::Events(vec![error_at("a.c", 3, 1, "bad cast")])),
            ("i386", Script::Events(vec![])),
        ]);

        let summary = completed(
            run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run"),
        );

        assert_eq!(
            summary
                .bad_instances()
                .iter()
                .map(|o| o.instance.as_str())
                .collect::<Vec<_>>(),
            vec!["amd64"]
        );
        assert_eq!(
            summary
                .good_instances()
                .iter()
                .map(|o| o.instance.as_str())
                .collect::<Vec<_>>(),
            vec!["i386"]
        );
    }

    #[test]
    fn unknown_file_makes_zero_backend_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "x_files.config", &["b.c"]);

        let backend = ScriptedBackend::new(vec![]);
        let result = run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run");

        assert!(matches!(result, RunResult::NoApplicableInstance));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn setup_failure_does_not_abort_remaining_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "x_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![
            ("amd64", Script::SetupFailure("no diagnostics engine".to_string())),
            ("i386", Script::Events(vec![error_at("a.c", 7, 2, "bad")])),
        ]);

        let summary = completed(
            run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run"),
        );

        assert_eq!(backend.call_count(), 2);
        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(
            summary.outcomes[0].status,
            InstanceStatus::SetupFailure("no diagnostics engine".to_string())
        );
        assert_eq!(summary.outcomes[1].status, InstanceStatus::Bad { error_count: 1 });
    }

    #[test]
    fn aborted_instance_is_bad_with_aborted_reason() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "amd64_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![("amd64", Script::Aborted)]);
        let summary = completed(
            run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run"),
        );

        assert_eq!(summary.outcomes[0].status, InstanceStatus::Aborted);
        assert!(summary.any_bad());
    }

    #[test]
    fn clean_run_renders_the_no_errors_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "x_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![]);
        let summary = completed(
            run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run"),
        );

        assert!(!summary.any_bad());
        assert_eq!(summary.report, "No compiler instance reported any errors!\n");
    }

    #[test]
    fn warnings_are_not_aggregated_as_findings() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "amd64_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![(
            "amd64",
            Script::Events(vec![DiagnosticEvent {
                severity: Severity::Warning,
                file: "a.c".to_string(),
                line: 4,
                column: 1,
                message: "unused variable 'v'".to_string(),
            }]),
        )]);

        let summary = completed(
            run(&run_args(dir.path(), "a.c"), &backend, &NoopReporter).expect("run"),
        );

        assert!(!summary.any_bad());
        assert_eq!(summary.report, "No compiler instance reported any errors!\n");
    }

    #[test]
    fn instance_override_skips_manifest_selection() {
        let dir = tempfile::tempdir().expect("tempdir");
        // No manifests exist at all; the override must still compile.
        let backend = ScriptedBackend::new(vec![(
            "Z",
            Script::Events(vec![error_at("a.c", 2, 2, "unsupported alignment")]),
        )]);

        let mut args = run_args(dir.path(), "a.c");
        args.instances_override = Some(vec!["Z".to_string()]);
        let summary = completed(run(&args, &backend, &NoopReporter).expect("run"));

        assert_eq!(backend.call_count(), 1);
        assert_eq!(summary.outcomes[0].instance, "Z");
        assert!(summary.any_bad());
    }

    #[test]
    fn parallel_run_produces_the_same_classification() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "common_files.config", &["a.c"]);

        let backend = ScriptedBackend::new(vec![
            ("amd64", Script::Events(vec![error_at("a.c", 5, 1, "bad")])),
            ("i386", Script::Events(vec![error_at("a.c", 5, 2, "bad")])),
            ("P", Script::Events(vec![])),
            ("Z", Script::Events(vec![])),
        ]);

        let mut args = run_args(dir.path(), "a.c");
        args.parallel = true;
        let summary = completed(run(&args, &backend, &NoopReporter).expect("run"));

        // Outcome order follows instance order even under parallel scheduling.
        assert_eq!(
            summary
                .outcomes
                .iter()
                .map(|o| o.instance.as_str())
                .collect::<Vec<_>>(),
            vec!["amd64", "i386", "P", "Z"]
        );
        assert_eq!(
            summary
                .bad_instances()
                .iter()
                .map(|o| o.instance.as_str())
                .collect::<Vec<_>>(),
            vec!["amd64", "i386"]
        );
        // One deduplicated record regardless of scheduling.
        assert!(summary.report.contains("a.c:5: error: bad"));
    }
}
