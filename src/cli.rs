use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

/// Compile one source file under several compiler instances and report a
/// deduplicated view of the diagnostics.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// The source file to check, exactly as it appears in the manifests.
    pub file: String,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Directory holding the manifests, the per-instance option resources
    /// and the optional portcheck.json.
    #[arg(long, default_value = ".")]
    pub config_dir: PathBuf,

    /// Compiler binary invoked once per instance.
    #[arg(long, default_value = "clang")]
    pub backend: PathBuf,

    /// Compile under exactly these instances, skipping manifest selection.
    #[arg(long, value_delimiter = ',', value_name = "NAME")]
    pub instances: Option<Vec<String>>,

    /// Schedule instances in parallel. Report block order then follows event
    /// arrival and is not deterministic across runs.
    #[arg(long)]
    pub parallel: bool,

    /// Per-instance compilation timeout in seconds. An instance that hits it
    /// is classified bad with the "aborted" reason.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Shared compiler arguments passed to every instance, e.g.
    /// `-- -std=c11 -fsyntax-only`.
    #[arg(last = true)]
    pub shared_args: Vec<String>,
}
