// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by casetrace.

use bytesize::ByteSize;
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse casetrace config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while resolving the [`RunContext`](crate::run_context::RunContext).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunContextError {
    /// No output directory was specified, and none could be detected.
    #[error(
        "no output directory was specified, and none was found (searched: {})",
        .searched.iter().join(", ")
    )]
    OutputDirNotFound {
        /// The locations that were searched.
        searched: Vec<Utf8PathBuf>,
    },

    /// A test parameter was not in the form `key=value`.
    #[error("test parameter `{input}` must be in the form key=value")]
    InvalidTestParam {
        /// The input provided.
        input: String,
    },
}

/// An error that occurs while publishing the test environment to the output directory.
#[derive(Debug, Error)]
#[error("failed to write test environment to `{path}`")]
pub struct WriteTestEnvironmentError {
    path: Utf8PathBuf,
    #[source]
    error: std::io::Error,
}

impl WriteTestEnvironmentError {
    pub(crate) fn new(path: Utf8PathBuf, error: std::io::Error) -> Self {
        Self { path, error }
    }

    /// Returns the path that could not be written.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }
}

/// An error that occurs while compiling a test filter pattern.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestFilterBuilderError {
    /// An empty pattern was supplied.
    #[error("empty pattern in {list} filter list")]
    EmptyPattern {
        /// Which list the pattern was in.
        list: FilterListKind,
    },

    /// A pattern could not be compiled as a glob.
    #[error("invalid glob `{pattern}` in {list} filter list")]
    InvalidGlob {
        /// Which list the pattern was in.
        list: FilterListKind,

        /// The pattern as given.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// The regex produced from a glob failed to compile.
    #[error("glob `{pattern}` in {list} filter list could not be converted to a regex")]
    Regex {
        /// Which list the pattern was in.
        list: FilterListKind,

        /// The pattern as given.
        pattern: String,

        /// The underlying error.
        #[source]
        error: regex::Error,
    },
}

/// Which filter list a pattern came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterListKind {
    /// Filters on the file the test is defined in (`--test-file-filter`).
    File,

    /// Filters on the test name (`--test-filter`).
    Name,
}

impl fmt::Display for FilterListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Name => f.write_str("name"),
        }
    }
}

/// An error that occurs while building a [`Partitioner`](crate::partition::Partitioner).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum PartitionerBuildError {
    /// The modulo was zero.
    #[error("modulo must be at least 1")]
    ZeroModulo,

    /// The modulo index was out of range.
    #[error("modulo index {index} must be less than modulo {modulo}")]
    IndexOutOfRange {
        /// The index provided.
        index: u64,

        /// The modulo provided.
        modulo: u64,
    },
}

/// An error that occurs while opening the trace sink.
#[derive(Debug, Error)]
#[error("failed to open trace file `{path}`")]
pub struct TraceSinkOpenError {
    path: Utf8PathBuf,
    #[source]
    error: std::io::Error,
}

impl TraceSinkOpenError {
    pub(crate) fn new(path: Utf8PathBuf, error: std::io::Error) -> Self {
        Self { path, error }
    }
}

/// An error that occurs while writing an event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while writing to the trace file.
    #[error("error writing to trace file {file}")]
    Fs {
        /// The file being written to.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An event could not be serialized.
    #[error("error serializing event")]
    Serialize(#[source] serde_json::Error),
}

/// An error that occurs while serializing the result payload of a single case.
///
/// These errors never abort a run: the affected case is reported as failed instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultSerializeError {
    /// The canonical form of the result exceeded the configured size limit.
    #[error("serialized result is {size}, which exceeds the limit of {limit}")]
    TooLarge {
        /// The size of the canonical result.
        size: ByteSize,

        /// The configured limit.
        limit: ByteSize,
    },

    /// The result was nested more deeply than allowed.
    #[error("result is nested more than {limit} levels deep")]
    TooDeep {
        /// The maximum depth.
        limit: usize,
    },

    /// The result could not be converted to JSON.
    #[error("result could not be converted to JSON")]
    Json(#[source] serde_json::Error),

    /// A custom serializer rejected the result.
    #[error("{message}")]
    Rejected {
        /// The reason for rejection.
        message: String,
    },
}

/// An error that occurs while reading framework input.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InputReadError {
    /// The input could not be read.
    #[error("error reading framework input from {source_name}")]
    Read {
        /// A description of the input, e.g. the file path or `<stdin>`.
        source_name: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A line of input could not be parsed.
    #[error("error parsing framework input from {source_name}, line {line_number}")]
    Parse {
        /// A description of the input, e.g. the file path or `<stdin>`.
        source_name: String,

        /// The 1-based line number.
        line_number: usize,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurs while driving a session from framework input.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriveSessionError {
    /// The input could not be read.
    #[error(transparent)]
    Input(#[from] InputReadError),

    /// An event could not be written.
    #[error(transparent)]
    Write(#[from] WriteEventError),
}

/// Displays an error along with its chain of sources.
///
/// The output looks like:
///
/// ```text
/// top-level message
///   caused by:
///   - first source
///   - second source
/// ```
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let Some(mut cause) = self.error.source() else {
            return Ok(());
        };

        write!(f, "\n  caused by:")?;
        loop {
            write!(f, "\n  - {cause}")?;
            match cause.source() {
                Some(next) => cause = next,
                None => return Ok(()),
            }
        }
    }
}
