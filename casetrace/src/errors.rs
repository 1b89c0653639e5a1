// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use casetrace_metadata::CasetraceExitCode;
use casetrace_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with display_to_stderr.

/// An expected failure: bad input, configuration or environment rather than a bug in casetrace.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("test filter build error")]
    TestFilterBuilderError {
        #[from]
        err: TestFilterBuilderError,
    },
    #[error("partitioner build error")]
    PartitionerBuildError {
        #[from]
        err: PartitionerBuildError,
    },
    #[error("run context error")]
    RunContextError {
        #[from]
        err: RunContextError,
    },
    #[error("run log create error")]
    RunLogCreateError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("write test environment error")]
    WriteTestEnvironmentError {
        #[from]
        err: WriteTestEnvironmentError,
    },
    #[error("trace sink open error")]
    TraceSinkOpenError {
        #[from]
        err: TraceSinkOpenError,
    },
    #[error("input open error")]
    InputOpenError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("input read error")]
    InputReadError {
        #[from]
        err: InputReadError,
    },
    #[error("write event error")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing test list")]
    WriteTestListError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn run_log_create_error(path: Utf8PathBuf, err: std::io::Error) -> Self {
        Self::RunLogCreateError { path, err }
    }

    pub(crate) fn input_open_error(path: Utf8PathBuf, err: std::io::Error) -> Self {
        Self::InputOpenError { path, err }
    }

    pub(crate) fn test_run_failed() -> Self {
        Self::TestRunFailed
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::PartitionerBuildError { .. }
            | Self::RunContextError { .. }
            | Self::RunLogCreateError { .. }
            | Self::WriteTestEnvironmentError { .. } => CasetraceExitCode::SETUP_ERROR,
            Self::TestFilterBuilderError { .. } => CasetraceExitCode::INVALID_FILTER,
            Self::InputOpenError { .. } | Self::InputReadError { .. } => {
                CasetraceExitCode::INPUT_READ_FAILED
            }
            Self::TraceSinkOpenError { .. }
            | Self::WriteEventError { .. }
            | Self::WriteTestListError { .. } => CasetraceExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => CasetraceExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse casetrace config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::TestFilterBuilderError { err } => {
                error!("{err}");
                err.source()
            }
            Self::PartitionerBuildError { err } => {
                error!("invalid shard: {err}");
                None
            }
            Self::RunContextError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RunLogCreateError { path, err } => {
                error!("failed to create run log at `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::WriteTestEnvironmentError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TraceSinkOpenError { err } => {
                error!("{err}");
                err.source()
            }
            Self::InputOpenError { path, err } => {
                error!("failed to open framework input `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::InputReadError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteEventError { err } => {
                error!("failed to write trace event");
                Some(err as &dyn Error)
            }
            Self::WriteTestListError { err } => {
                error!("failed to write test list");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

impl From<DriveSessionError> for ExpectedError {
    fn from(err: DriveSessionError) -> Self {
        match err {
            DriveSessionError::Input(err) => Self::InputReadError { err },
            DriveSessionError::Write(err) => Self::WriteEventError { err },
            _ => unreachable!("all DriveSessionError variants are handled above"),
        }
    }
}
