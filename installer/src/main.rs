//! cfai installer CLI entrypoint.
//!
//! This binary installs or updates the `cfai` tool from GitHub Releases.
//! Progress, results and diagnostics go to stderr; the exit code is 0 on
//! success or a no-op update, 130 after an interruption and 1 otherwise.

use cfai_installer::cli::{Cli, ReleaseArgs};
use cfai_installer::command::SystemCommandExecutor;
use cfai_installer::config::build_request;
use cfai_installer::dirs::SystemBaseDirs;
use cfai_installer::error::Result;
use cfai_installer::extraction::PackageExtractor;
use cfai_installer::interrupt::{CancelToken, install_signal_handlers};
use cfai_installer::output::{failure_message, write_stderr_line};
use cfai_installer::pipeline::{self, Collaborators, RunOutcome};
use cfai_installer::platform::PlatformTag;
use cfai_installer::release::GithubRegistry;
use cfai_installer::transport::HttpTransport;
use clap::Parser;
use log::LevelFilter;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.command.release_args());
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// `RUST_LOG`, when set, overrides the level chosen by the flags.
fn init_logging(args: &ReleaseArgs) {
    env_logger::Builder::new()
        .filter_level(log_level(args.verbosity, args.quiet))
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn log_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<RunOutcome> {
    if let Err(e) = install_signal_handlers() {
        log::warn!("could not install signal handlers: {e}");
    }

    let platform = PlatformTag::detect()?;
    let dirs = SystemBaseDirs;
    let request = build_request(&cli.command, platform, &dirs, &|name| {
        which::which(name).ok()
    })?;
    log::debug!("run request: {request:?}");

    let args = cli.command.release_args();
    let cancel = CancelToken::global();
    let transport = HttpTransport::new(cancel);
    let registry = GithubRegistry::new(&transport, &args.api_url, &args.repo);
    let extractor = PackageExtractor::new(cancel);
    let executor = SystemCommandExecutor::default();
    let collaborators = Collaborators {
        transport: &transport,
        registry: &registry,
        extractor: &extractor,
        executor: &executor,
        dirs: &dirs,
        cancel,
    };

    pipeline::run(&request, &collaborators, stderr)
}

fn exit_code_for_run_result(result: Result<RunOutcome>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => {
            write_stderr_line(stderr, failure_message(&err));
            err.exit_code()
        }
    }
}
