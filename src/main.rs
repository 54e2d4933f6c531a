use clap::Parser;
use log::LevelFilter;
use std::io::Write;
use std::time::Duration;

use portcheck::backend::CommandBackend;
use portcheck::cli;
use portcheck::run::{self, ConsoleReporter, RunArgs, RunResult};

fn main() {
    let cli = cli::Cli::parse();

    let log_level_filter = cli.verbose.log_level_filter();

    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}:\n{}", record.level(), record.args()))
        .filter_level(log_level_filter)
        .target(env_logger::fmt::Target::Stdout)
        .init();

    // The 'normal run' mode shows per-instance progress lines. If the log
    // level was turned down, we should never show those.
    let show_progress = log_level_filter == LevelFilter::Info;

    let backend = CommandBackend::new(cli.backend, cli.timeout.map(Duration::from_secs));
    let reporter = ConsoleReporter::new(show_progress);

    let args = RunArgs {
        config_dir: cli.config_dir,
        file: cli.file,
        shared_args: cli.shared_args,
        instances_override: cli.instances,
        parallel: cli.parallel,
    };

    match run::run(&args, &backend, &reporter) {
        Err(e) => {
            println!("{e}");
            std::process::exit(2)
        }
        // Nothing to do is not an error; the invoking build system must be
        // able to tell it apart from a failed instance.
        Ok(RunResult::NoApplicableInstance) => std::process::exit(0),
        Ok(RunResult::Completed(summary)) => {
            std::process::exit(if summary.any_bad() { 1 } else { 0 })
        }
    }
}
