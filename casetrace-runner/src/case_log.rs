// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-case log files.
//!
//! Each started case gets a log file in the output directory, at the path reported under
//! `logs.log` in the trace. The file holds a header with the test name, one line per phase and the
//! final status, filtered by the run's test log level.

use crate::resolver::{Phase, PhaseOutcome};
use camino::{Utf8Path, Utf8PathBuf};
use casetrace_metadata::CaseStatus;
use chrono::Local;
use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
};
use tracing::Level;

const HEADER_SEPARATOR_LEN: usize = 100;

/// An open per-case log file.
#[derive(Debug)]
pub struct CaseLog {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    max_level: Level,
}

impl CaseLog {
    /// Creates the log file at `path`, along with any missing parent directories.
    ///
    /// Lines more verbose than `max_level` are not written.
    pub fn create(path: impl Into<Utf8PathBuf>, max_level: Level) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            max_level,
        })
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes the header for a case that is starting.
    pub fn start(&mut self, test_name: &str) -> io::Result<()> {
        let separator = "#".repeat(HEADER_SEPARATOR_LEN);
        self.line(Level::INFO, format_args!("{separator}"))?;
        self.line(Level::INFO, format_args!("{test_name}"))?;
        self.line(Level::INFO, format_args!("{separator}"))?;
        self.line(Level::INFO, format_args!("Test setup"))?;
        self.writer.flush()
    }

    /// Records the outcome of a phase.
    pub fn phase(&mut self, phase: Phase, outcome: &PhaseOutcome) -> io::Result<()> {
        match phase {
            Phase::Setup => {}
            Phase::Call => self.line(Level::INFO, format_args!("Test call"))?,
            Phase::Teardown => self.line(Level::INFO, format_args!("Test teardown"))?,
        }

        match outcome {
            PhaseOutcome::Passed => self.line(Level::DEBUG, format_args!("{phase} passed"))?,
            PhaseOutcome::Failed(failure) => {
                let kind = failure.kind.as_deref().unwrap_or("failure");
                self.line(
                    Level::ERROR,
                    format_args!("{phase} failed ({kind}):\n{}", failure.repr.render()),
                )?;
            }
            PhaseOutcome::Skipped(reason) => self.line(
                Level::INFO,
                format_args!("{phase} skipped: {}", reason.explanation()),
            )?,
            PhaseOutcome::ExpectedFailure { reason, was_raised } => {
                let raised = if *was_raised { "raised" } else { "not raised" };
                self.line(
                    Level::INFO,
                    format_args!("{phase} expected failure {raised}: {reason}"),
                )?;
            }
        }
        self.writer.flush()
    }

    /// Writes the final status of the case and closes the file.
    pub fn finish(mut self, status: CaseStatus) -> io::Result<()> {
        let level = if status.is_failure() {
            Level::ERROR
        } else {
            Level::INFO
        };
        self.line(level, format_args!("Test finished: {status}"))?;
        self.writer.flush()
    }

    fn line(&mut self, level: Level, message: fmt::Arguments<'_>) -> io::Result<()> {
        // More verbose levels compare greater.
        if level > self.max_level {
            return Ok(());
        }
        writeln!(
            self.writer,
            "{} - {level} - {message}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        )
    }
}
