// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The environment a run happens in.
//!
//! A [`RunContext`] is resolved once at startup and then passed explicitly to the components that
//! need it.

use crate::{
    config::{RunConfig, TestLogLevel},
    errors::{RunContextError, WriteTestEnvironmentError},
    partition::Partitioner,
    resolver::ResolverOptions,
    test_filter::TestFilter,
};
use bytesize::ByteSize;
use camino::{Utf8Path, Utf8PathBuf};
use casetrace_metadata::{TEST_ENVIRONMENT_FILE_NAME, TestEnvironmentSummary};
use std::{collections::BTreeMap, fmt, io};
use tracing::{debug, warn};

/// The name of the directory test output is written to.
pub const TESTING_OUT_DIR_NAME: &str = "testing_out_stuff";

/// Whether cases are run or only listed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RunMode {
    /// Run cases and report their outcomes.
    #[default]
    Run,

    /// Only list the cases that would run.
    List,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => f.write_str("run"),
            Self::List => f.write_str("list"),
        }
    }
}

/// A builder for [`RunContext`].
#[derive(Clone, Debug)]
pub struct RunContextBuilder {
    mode: RunMode,
    working_dir: Utf8PathBuf,
    program_name: String,
    output_dir: Option<Utf8PathBuf>,
    source_root: Option<Utf8PathBuf>,
    build_root: Option<Utf8PathBuf>,
    data_root: Option<Utf8PathBuf>,
    dep_roots: Vec<Utf8PathBuf>,
    test_params: Vec<String>,
    context: BTreeMap<String, String>,
    test_suffix: Option<String>,
    trace_path: Option<Utf8PathBuf>,
    filter: TestFilter,
    partitioner: Partitioner,
    run_config: RunConfig,
}

impl RunContextBuilder {
    /// Creates a new builder.
    ///
    /// `program_name` is used to look for `test-results/<program_name>/testing_out_stuff` when no
    /// output directory is given.
    pub fn new(
        mode: RunMode,
        working_dir: impl Into<Utf8PathBuf>,
        program_name: impl Into<String>,
        run_config: RunConfig,
    ) -> Self {
        Self {
            mode,
            working_dir: working_dir.into(),
            program_name: program_name.into(),
            output_dir: None,
            source_root: None,
            build_root: None,
            data_root: None,
            dep_roots: Vec::new(),
            test_params: Vec::new(),
            context: BTreeMap::new(),
            test_suffix: None,
            trace_path: None,
            filter: TestFilter::all(),
            partitioner: Partitioner::single(),
            run_config,
        }
    }

    /// Sets the output directory.
    pub fn output_dir(&mut self, output_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Sets the source root.
    pub fn source_root(&mut self, source_root: impl Into<Utf8PathBuf>) -> &mut Self {
        self.source_root = Some(source_root.into());
        self
    }

    /// Sets the build root.
    pub fn build_root(&mut self, build_root: impl Into<Utf8PathBuf>) -> &mut Self {
        self.build_root = Some(build_root.into());
        self
    }

    /// Sets the data root.
    pub fn data_root(&mut self, data_root: impl Into<Utf8PathBuf>) -> &mut Self {
        self.data_root = Some(data_root.into());
        self
    }

    /// Adds dependency build roots.
    pub fn dep_roots(&mut self, dep_roots: impl IntoIterator<Item = Utf8PathBuf>) -> &mut Self {
        self.dep_roots.extend(dep_roots);
        self
    }

    /// Adds test parameters in the form `key=value`.
    pub fn test_params(&mut self, params: impl IntoIterator<Item = String>) -> &mut Self {
        self.test_params.extend(params);
        self
    }

    /// Adds an entry to the free-form context.
    pub fn context(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the run-wide suffix appended to test names.
    pub fn test_suffix(&mut self, suffix: impl Into<String>) -> &mut Self {
        self.test_suffix = Some(suffix.into());
        self
    }

    /// Sets the path to the trace file.
    pub fn trace_path(&mut self, trace_path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.trace_path = Some(trace_path.into());
        self
    }

    /// Sets the filter.
    pub fn filter(&mut self, filter: TestFilter) -> &mut Self {
        self.filter = filter;
        self
    }

    /// Sets the partitioner.
    pub fn partitioner(&mut self, partitioner: Partitioner) -> &mut Self {
        self.partitioner = partitioner;
        self
    }

    /// Resolves the context.
    pub fn build(&self) -> Result<RunContext, RunContextError> {
        let output_dir = match &self.output_dir {
            Some(output_dir) => output_dir.clone(),
            None => self.detect_output_dir()?,
        };

        let source_root = self.source_root.clone();
        if source_root.is_none() {
            warn!("source root was not set, use --source-root to set it explicitly");
        }

        let build_root = match (&self.build_root, &source_root) {
            (Some(build_root), _) => Some(build_root.clone()),
            (None, Some(source_root)) => Some(source_root.clone()),
            (None, None) => {
                warn!("build root was not set, use --build-root to set it explicitly");
                None
            }
        };

        let data_root = match (&self.data_root, &source_root) {
            (Some(data_root), _) => Some(data_root.clone()),
            (None, Some(source_root)) => Some(default_data_root(source_root)),
            (None, None) => None,
        };

        let mut params = BTreeMap::new();
        for input in &self.test_params {
            let (key, value) =
                input
                    .split_once('=')
                    .ok_or_else(|| RunContextError::InvalidTestParam {
                        input: input.clone(),
                    })?;
            params.insert(key.to_owned(), value.to_owned());
        }

        Ok(RunContext {
            mode: self.mode,
            output_dir,
            source_root,
            build_root,
            data_root,
            dep_roots: self.dep_roots.clone(),
            params,
            context: self.context.clone(),
            test_suffix: self.test_suffix.clone(),
            trace_path: self.trace_path.clone(),
            filter: self.filter.clone(),
            partitioner: self.partitioner,
            run_config: self.run_config.clone(),
        })
    }

    fn detect_output_dir(&self) -> Result<Utf8PathBuf, RunContextError> {
        let program_stem = Utf8Path::new(&self.program_name)
            .file_stem()
            .unwrap_or(self.program_name.as_str());
        let candidates = [
            // Running from a kept test working directory.
            self.working_dir.join(TESTING_OUT_DIR_NAME),
            // Running from the source directory.
            self.working_dir
                .join("test-results")
                .join(program_stem)
                .join(TESTING_OUT_DIR_NAME),
        ];

        for candidate in &candidates {
            if candidate.exists() {
                debug!("detected output directory {candidate}");
                return Ok(candidate.clone());
            }
        }
        Err(RunContextError::OutputDirNotFound {
            searched: candidates.into(),
        })
    }
}

fn default_data_root(source_root: &Utf8Path) -> Utf8PathBuf {
    match source_root.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.join("tests_data"),
        _ => source_root.join("..").join("tests_data"),
    }
}

/// The resolved environment of a run.
#[derive(Clone, Debug)]
pub struct RunContext {
    mode: RunMode,
    output_dir: Utf8PathBuf,
    source_root: Option<Utf8PathBuf>,
    build_root: Option<Utf8PathBuf>,
    data_root: Option<Utf8PathBuf>,
    dep_roots: Vec<Utf8PathBuf>,
    params: BTreeMap<String, String>,
    context: BTreeMap<String, String>,
    test_suffix: Option<String>,
    trace_path: Option<Utf8PathBuf>,
    filter: TestFilter,
    partitioner: Partitioner,
    run_config: RunConfig,
}

impl RunContext {
    /// Returns the mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Returns the run-wide suffix appended to test names.
    pub fn test_suffix(&self) -> Option<&str> {
        self.test_suffix.as_deref()
    }

    /// Returns the path to the trace file, if events are reported.
    pub fn trace_path(&self) -> Option<&Utf8Path> {
        self.trace_path.as_deref()
    }

    /// Returns the filter.
    pub fn filter(&self) -> &TestFilter {
        &self.filter
    }

    /// Returns the partitioner.
    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// Returns true if filtered-out cases are reported as deselected.
    pub fn report_deselected(&self) -> bool {
        self.run_config.report_deselected
    }

    /// Returns the options for the status resolver.
    pub fn resolver_options(&self) -> ResolverOptions {
        self.run_config.resolver_options()
    }

    /// Returns the level of the run log and of the per-case log files.
    pub fn test_log_level(&self) -> TestLogLevel {
        self.run_config.test_log_level
    }

    /// Returns the maximum canonical size of a result payload.
    pub fn result_max_size(&self) -> ByteSize {
        self.run_config.result_max_size
    }

    /// Returns the directories binaries that cases depend on are looked up in.
    ///
    /// `<build_root>/bin` comes first, then `<build_root>` itself. Empty without a build root.
    pub fn binary_search_dirs(&self) -> Vec<Utf8PathBuf> {
        match &self.build_root {
            Some(build_root) => vec![build_root.join("bin"), build_root.clone()],
            None => Vec::new(),
        }
    }

    /// Returns the environment published to cases.
    pub fn test_environment(&self) -> TestEnvironmentSummary {
        let to_string = |path: &Utf8PathBuf| path.to_string();
        TestEnvironmentSummary {
            output_dir: self.output_dir.to_string(),
            source_root: self.source_root.as_ref().map(to_string),
            build_root: self.build_root.as_ref().map(to_string),
            data_root: self.data_root.as_ref().map(to_string),
            dep_roots: self.dep_roots.iter().map(to_string).collect(),
            binary_search_dirs: self.binary_search_dirs().iter().map(to_string).collect(),
            params: self.params.clone(),
            context: self.context.clone(),
            test_suffix: self.test_suffix.clone(),
        }
    }

    /// Writes the test environment to the output directory, creating the directory if needed.
    ///
    /// Returns the path of the file that was written.
    pub fn write_test_environment(&self) -> Result<Utf8PathBuf, WriteTestEnvironmentError> {
        let path = self.output_dir.join(TEST_ENVIRONMENT_FILE_NAME);
        let environment = self.test_environment();
        debug!(
            "test params: {:?}, test context: {:?}",
            environment.params, environment.context
        );

        let write = || -> io::Result<()> {
            std::fs::create_dir_all(&self.output_dir)?;
            let mut contents = serde_json::to_vec_pretty(&environment)?;
            contents.push(b'\n');
            std::fs::write(&path, contents)
        };
        write().map_err(|error| WriteTestEnvironmentError::new(path.clone(), error))?;
        debug!("wrote test environment to {path}");
        Ok(path)
    }
}
