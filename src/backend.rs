//! The compilation backend interface.
//!
//! The backend performs one compilation per call and emits a stream of raw
//! diagnostic events plus a final error count. `portcheck` never compiles
//! anything itself; the production backend spawns an external compiler
//! process per instance and parses its stderr. Each call gets a fresh child
//! process, so there is no cross-instance state leakage.

use crate::options::InstanceConfig;
use regex::Regex;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

/// One raw diagnostic event as produced by the backend's formatting stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Terminal result of one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutcome {
    pub error_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be brought up for this instance (compiler
    /// binary missing, shared invocation unparsable, crash with no
    /// diagnostics). Fatal for the instance, never for the run.
    Setup(String),
    /// The in-flight call was aborted by the run-level timeout. Diagnostics
    /// already streamed out remain valid.
    Aborted,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendError::Setup(reason) => write!(f, "setup failure: {reason}"),
            BackendError::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The part of the invocation common to all instances: the source file and
/// whatever shared flags (language standard, warnings) the caller passes.
#[derive(Debug, Clone)]
pub struct SharedInvocation {
    pub source_file: String,
    pub args: Vec<String>,
}

/// One synchronous compilation per call. Diagnostic events are handed to
/// `on_diagnostic` as they are produced, so partial results are visible even
/// if the call is aborted mid-flight.
pub trait CompileBackend: Sync {
    fn compile(
        &self,
        invocation: &SharedInvocation,
        config: &InstanceConfig,
        on_diagnostic: &mut dyn FnMut(DiagnosticEvent),
    ) -> Result<BackendOutcome, BackendError>;
}

fn diagnostic_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // file:line:column: severity: message
        Regex::new(r"^(.+?):(\d+):(\d+): (fatal error|error|warning|note): (.+)$")
            .expect("diagnostic line regex is well-formed")
    })
}

/// Parse one stderr line in the `file:line:column: severity: message` shape.
/// Lines that don't match (source excerpts, caret markers, summary lines)
/// yield None.
pub fn parse_diagnostic_line(line: &str) -> Option<DiagnosticEvent> {
    let captures = diagnostic_line_regex().captures(line)?;
    let severity = match &captures[4] {
        "fatal error" => Severity::Fatal,
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Note,
    };
    Some(DiagnosticEvent {
        severity,
        file: captures[1].to_string(),
        line: captures[2].parse().ok()?,
        column: captures[3].parse().ok()?,
        message: captures[5].to_string(),
    })
}

/// Production backend: spawns the configured compiler binary once per
/// instance and streams its stderr through the diagnostic parser.
pub struct CommandBackend {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl CommandBackend {
    pub fn new(program: PathBuf, timeout: Option<Duration>) -> Self {
        Self { program, timeout }
    }
}

impl CompileBackend for CommandBackend {
    fn compile(
        &self,
        invocation: &SharedInvocation,
        config: &InstanceConfig,
        on_diagnostic: &mut dyn FnMut(DiagnosticEvent),
    ) -> Result<BackendOutcome, BackendError> {
        let mut cmd = Command::new(&self.program);
        for path in &config.include_paths {
            cmd.arg(format!("-I{}", path.display()));
        }
        for definition in &config.macro_definitions {
            cmd.arg(format!("-D{definition}"));
        }
        cmd.args(&invocation.args);
        cmd.arg(&invocation.source_file);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

        log::debug!(
            "Invoking {} for instance \"{}\" on {}",
            self.program.to_string_lossy(),
            config.name,
            invocation.source_file
        );

        let mut child = cmd.spawn().map_err(|e| {
            BackendError::Setup(format!("could not spawn {}: {e}", self.program.to_string_lossy()))
        })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Setup("could not capture compiler stderr".to_string()))?;

        // Parse on a reader thread and stream events back, so the timeout
        // can fire while the child is still producing output.
        let (tx, rx) = mpsc::channel::<DiagnosticEvent>();
        let reader = thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                match parse_diagnostic_line(&line) {
                    Some(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    None => log::trace!("Unparsed compiler output: {line}"),
                }
            }
        });

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut error_count: u32 = 0;
        let mut aborted = false;
        loop {
            let received = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        aborted = true;
                        break;
                    }
                    rx.recv_timeout(deadline - now)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => {
                    if event.severity.is_error() {
                        error_count += 1;
                    }
                    on_diagnostic(event);
                }
                Err(RecvTimeoutError::Timeout) => {
                    aborted = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if aborted {
            log::warn!("Compilation for instance \"{}\" hit the timeout; killing it", config.name);
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            return Err(BackendError::Aborted);
        }

        let _ = reader.join();
        let status = child
            .wait()
            .map_err(|e| BackendError::Setup(format!("could not wait for compiler: {e}")))?;

        if !status.success() && error_count == 0 {
            // The compiler failed without emitting anything we could parse
            // (bad shared arguments, internal crash before diagnostics).
            return Err(BackendError::Setup(format!(
                "compiler exited with {status} and produced no parsable diagnostics"
            )));
        }

        Ok(BackendOutcome { error_count })
    }
}
