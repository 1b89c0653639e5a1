// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles, start_run_log},
};
use camino::{Utf8Path, Utf8PathBuf};
use casetrace_metadata::CasetraceExitCode;
use casetrace_runner::{
    adapter::{DriveOutcome, InputReader, drive_session},
    config::{CasetraceConfig, RunConfig, TestLogLevel},
    partition::{Partitioner, SplitBy},
    reporter::{CanonicalResultSerializer, TraceReporter, TraceSink},
    run_context::{RunContext, RunContextBuilder, RunMode},
    session::RunSession,
    test_filter::TestFilter,
};
use clap::{Args, Parser, Subcommand};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
};
use tracing::{debug, info};

/// The name of the per-run log file in the output directory.
pub const RUN_LOG_FILE_NAME: &str = "run.log";

/// Track the results of a test worker: filter and shard the collected cases, resolve each case to
/// a status and write the outcome as a JSON-lines trace.
///
/// Framework events are read as JSON lines from `--input`, or from standard input.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct CasetraceApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl CasetraceApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, program_name: &str, writer: &mut OutputWriter) -> Result<i32> {
        let (mode, opts) = match self.command {
            Command::Run(opts) => (RunMode::Run, opts),
            Command::List(opts) => (RunMode::List, opts),
        };

        let working_dir = current_dir()?;
        let config = CasetraceConfig::from_sources(&working_dir, opts.config.as_deref())?;
        let context = opts.make_context(mode, working_dir, program_name, config.run().clone())?;

        if mode == RunMode::Run {
            prepare_output_dir(&context)?;
        }
        debug!("running in {mode} mode, output directory {}", context.output_dir());

        let DriveOutcome { listing, summary } = drive(&context, opts.input.as_deref())?;

        match mode {
            RunMode::List => {
                let mut stderr = writer.stderr_writer();
                let mut write_listing = || -> io::Result<()> {
                    serde_json::to_writer(&mut stderr, &listing)?;
                    writeln!(stderr)?;
                    stderr.flush()
                };
                write_listing().map_err(|err| ExpectedError::WriteTestListError { err })?;
                Ok(CasetraceExitCode::OK)
            }
            RunMode::Run => {
                let counts = summary
                    .iter()
                    .map(|(status, count)| format!("{count} {status}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                info!(
                    "{} cases finished ({counts}), {} collection errors",
                    summary.total(),
                    summary.collection_errors()
                );
                if summary.has_failures() {
                    Err(ExpectedError::test_run_failed())
                } else {
                    Ok(CasetraceExitCode::OK)
                }
            }
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Track a test run and write its trace
    Run(RunOpts),

    /// Print the cases this worker would run, as JSON on stderr
    List(RunOpts),
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Framework event stream to read [default: standard input]
    #[arg(long, value_name = "PATH")]
    input: Option<Utf8PathBuf>,

    /// Trace file to write; without one, events are computed but not written
    #[arg(long, value_name = "PATH")]
    trace: Option<Utf8PathBuf>,

    /// Config file [default: casetrace.toml in the current directory]
    #[arg(long, value_name = "PATH", env = "CASETRACE_CONFIG")]
    config: Option<Utf8PathBuf>,

    #[command(flatten)]
    paths: PathOpts,

    #[command(flatten)]
    filter: FilterOpts,

    #[command(flatten)]
    resolve: ResolveOpts,

    /// Test parameter, published to cases in the test environment file
    #[arg(long = "test-param", value_name = "KEY=VALUE")]
    test_params: Vec<String>,

    /// Free-form context value, published to cases in the test environment file
    #[arg(long = "test-context", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    test_context: Vec<(String, String)>,

    /// Suffix appended to every test name
    #[arg(long, value_name = "SUFFIX")]
    test_suffix: Option<String>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Path options")]
struct PathOpts {
    /// Directory for per-case logs and the run log
    #[arg(long, value_name = "DIR")]
    output_dir: Option<Utf8PathBuf>,

    /// Root of the source tree
    #[arg(long, value_name = "DIR")]
    source_root: Option<Utf8PathBuf>,

    /// Root of the build tree [default: source root]
    #[arg(long, value_name = "DIR")]
    build_root: Option<Utf8PathBuf>,

    /// Root of the test data [default: tests_data next to the source root]
    #[arg(long, value_name = "DIR")]
    data_root: Option<Utf8PathBuf>,

    /// Dependency root, may be repeated
    #[arg(long = "dep-root", value_name = "DIR")]
    dep_roots: Vec<Utf8PathBuf>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Run only cases whose name matches this glob, may be repeated
    #[arg(long = "test-filter", value_name = "GLOB")]
    test_filters: Vec<String>,

    /// Run only cases whose file matches this glob, may be repeated
    #[arg(long = "test-file-filter", value_name = "GLOB")]
    test_file_filters: Vec<String>,

    /// Number of shards the run is split into
    #[arg(long, value_name = "N", default_value_t = 1)]
    modulo: u64,

    /// Index of this worker's shard
    #[arg(long, value_name = "I", default_value_t = 0)]
    modulo_index: u64,

    /// Split individual cases across shards instead of whole classes
    #[arg(long)]
    split_by_tests: bool,

    /// Report filtered-out cases as deselected
    #[arg(long)]
    report_deselected: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Resolution options")]
struct ResolveOpts {
    /// Run expected-failure cases as if they were not marked
    #[arg(long)]
    run_xfail: bool,

    /// Whether an unexpected pass fails the case by default
    #[arg(long, value_name = "BOOL")]
    xfail_strict: Option<bool>,

    /// Level of the run log and per-case logs: critical, error, warning, info, debug
    #[arg(long, value_name = "LEVEL", value_parser = parse_log_level)]
    test_log_level: Option<TestLogLevel>,
}

impl RunOpts {
    fn apply_overrides(&self, run_config: &mut RunConfig) {
        if self.filter.split_by_tests {
            run_config.split_by = SplitBy::Case;
        }
        if self.filter.report_deselected {
            run_config.report_deselected = true;
        }
        if self.resolve.run_xfail {
            run_config.run_xfail = true;
        }
        if let Some(xfail_strict) = self.resolve.xfail_strict {
            run_config.xfail_strict = xfail_strict;
        }
        if let Some(level) = self.resolve.test_log_level {
            run_config.test_log_level = level;
        }
    }

    fn make_context(
        &self,
        mode: RunMode,
        working_dir: Utf8PathBuf,
        program_name: &str,
        mut run_config: RunConfig,
    ) -> Result<RunContext> {
        self.apply_overrides(&mut run_config);

        let filter = TestFilter::new(&self.filter.test_file_filters, &self.filter.test_filters)?;
        let partitioner = Partitioner::new(
            self.filter.modulo,
            self.filter.modulo_index,
            run_config.split_by,
        )?;

        let mut builder = RunContextBuilder::new(mode, working_dir, program_name, run_config);
        builder
            .filter(filter)
            .partitioner(partitioner)
            .dep_roots(self.paths.dep_roots.iter().cloned())
            .test_params(self.test_params.iter().cloned());
        for (key, value) in &self.test_context {
            builder.context(key, value);
        }
        if let Some(output_dir) = &self.paths.output_dir {
            builder.output_dir(output_dir);
        }
        if let Some(source_root) = &self.paths.source_root {
            builder.source_root(source_root);
        }
        if let Some(build_root) = &self.paths.build_root {
            builder.build_root(build_root);
        }
        if let Some(data_root) = &self.paths.data_root {
            builder.data_root(data_root);
        }
        if let Some(suffix) = &self.test_suffix {
            builder.test_suffix(suffix);
        }
        if let Some(trace) = &self.trace {
            builder.trace_path(trace);
        }

        Ok(builder.build()?)
    }
}

/// Starts the run log and publishes the test environment, both in the output directory.
fn prepare_output_dir(context: &RunContext) -> Result<()> {
    let run_log = context.output_dir().join(RUN_LOG_FILE_NAME);
    start_run_log(&run_log, context.test_log_level())
        .map_err(|err| ExpectedError::run_log_create_error(run_log, err))?;
    let environment = context.write_test_environment()?;
    info!("test environment written to {environment}");
    Ok(())
}

fn drive(context: &RunContext, input: Option<&Utf8Path>) -> Result<DriveOutcome> {
    let sink = match (context.mode(), context.trace_path()) {
        (RunMode::Run, Some(path)) => TraceSink::open(path)?,
        _ => TraceSink::Dry,
    };
    let reporter = TraceReporter::with_serializer(
        sink,
        CanonicalResultSerializer::new(context.result_max_size()),
    );
    let session = RunSession::new(context, reporter);

    let outcome = match input {
        Some(path) if path.as_str() != "-" => {
            let file = File::open(path)
                .map_err(|err| ExpectedError::input_open_error(path.to_owned(), err))?;
            drive_session(session, InputReader::new(path.as_str(), BufReader::new(file)))?
        }
        _ => drive_session(session, InputReader::new("<stdin>", stdin()))?,
    };
    Ok(outcome)
}

fn stdin() -> impl BufRead {
    io::stdin().lock()
}

fn current_dir() -> Result<Utf8PathBuf> {
    let current_dir =
        std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(current_dir)
        .map_err(|err| ExpectedError::CurrentDirInvalidUtf8 {
            path: err.into_path_buf(),
        })
}

fn parse_key_value(input: &str) -> std::result::Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, found `{input}`"))
}

fn parse_log_level(input: &str) -> std::result::Result<TestLogLevel, String> {
    TestLogLevel::ALL
        .iter()
        .copied()
        .find(|level| level.as_str() == input)
        .ok_or_else(|| {
            let expected: Vec<_> = TestLogLevel::ALL.iter().map(|level| level.as_str()).collect();
            format!("unknown log level `{input}` (expected one of {})", expected.join(", "))
        })
}
