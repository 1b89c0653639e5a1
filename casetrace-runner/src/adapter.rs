// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapting an execution framework's event stream to a [`RunSession`].
//!
//! The framework writes one JSON record per line. Every record has a `type` field:
//!
//! * `collected`: a case was discovered. All `collected` records come before the first phase.
//! * `collect-error`: a collection unit failed to import.
//! * `phase`: a setup, call or teardown phase of a case finished.
//!
//! Cases start implicitly on their first phase and finish on their teardown phase.

use crate::{
    errors::{DriveSessionError, InputReadError},
    resolver::{Failure, FailureRepr, Phase, PhaseOutcome, SkipReason, XfailMarker},
    run_context::RunMode,
    session::{CollectedCase, PhaseReport, RunSession, RunSummary},
};
use casetrace_metadata::{CaseMetrics, ListedCase};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use tracing::{debug, warn};

/// One line of framework input.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InputRecord {
    /// A case was discovered.
    Collected {
        /// The case's locator.
        nodeid: String,

        /// The keywords attached to the case.
        #[serde(default)]
        keywords: Vec<String>,

        /// The expected-failure marker, if the case has one.
        #[serde(default)]
        xfail: Option<XfailMarker>,
    },

    /// A collection unit failed.
    CollectError {
        /// The locator of the unit.
        nodeid: String,

        /// The framework's failure representation.
        #[serde(default)]
        longrepr: Option<Value>,
    },

    /// A phase of a case finished.
    Phase(PhaseRecord),
}

/// The outcome reported in a `phase` record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordOutcome {
    /// The phase passed.
    Passed,

    /// The phase failed.
    Failed,

    /// The phase was skipped.
    Skipped,

    /// The framework reported an expected failure.
    Xfailed,
}

/// A `phase` record.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhaseRecord {
    /// The case's locator.
    pub nodeid: String,

    /// The phase that finished.
    pub when: Phase,

    /// The outcome of the phase.
    pub outcome: RecordOutcome,

    /// The failure or skip representation.
    #[serde(default)]
    pub longrepr: Option<Value>,

    /// The kind of condition that was raised.
    #[serde(default)]
    pub kind: Option<String>,

    /// The expected-failure reason.
    #[serde(default)]
    pub reason: Option<String>,

    /// For expected failures, whether the condition was raised by the case itself.
    #[serde(default)]
    pub was_raised: Option<bool>,

    /// The duration of the phase in seconds.
    #[serde(default)]
    pub duration: Option<f64>,

    /// The result payload recorded during the phase.
    #[serde(default)]
    pub result: Option<Value>,

    /// Metrics recorded during the phase.
    #[serde(default)]
    pub metrics: Option<CaseMetrics>,
}

impl PhaseRecord {
    /// Converts this record into a phase report.
    pub fn into_report(self) -> PhaseReport {
        let outcome = match self.outcome {
            RecordOutcome::Passed => PhaseOutcome::Passed,
            RecordOutcome::Failed => PhaseOutcome::Failed(Failure {
                kind: self.kind,
                repr: failure_repr(self.longrepr),
            }),
            RecordOutcome::Skipped => PhaseOutcome::Skipped(skip_reason(self.longrepr)),
            RecordOutcome::Xfailed => PhaseOutcome::ExpectedFailure {
                reason: self.reason.unwrap_or_default(),
                was_raised: self.was_raised.unwrap_or(true),
            },
        };
        PhaseReport {
            raw_id: self.nodeid,
            phase: self.when,
            outcome,
            duration: self.duration,
            result: self.result,
            metrics: self.metrics,
        }
    }
}

#[derive(Deserialize)]
struct LocatedRepr {
    path: String,
    #[serde(default)]
    line: Option<u64>,
    message: String,
}

/// Converts a `longrepr` value into a failure representation.
pub fn failure_repr(longrepr: Option<Value>) -> FailureRepr {
    match longrepr {
        None | Some(Value::Null) => FailureRepr::Missing,
        Some(Value::String(text)) => FailureRepr::Text(text),
        Some(value @ Value::Object(_)) => match LocatedRepr::deserialize(&value) {
            Ok(LocatedRepr {
                path,
                line,
                message,
            }) => FailureRepr::Located {
                path,
                line,
                message,
            },
            Err(_) => FailureRepr::Raw(value),
        },
        Some(value) => FailureRepr::Raw(value),
    }
}

/// Converts a `longrepr` value into a skip reason.
pub fn skip_reason(longrepr: Option<Value>) -> SkipReason {
    match longrepr {
        None => SkipReason::Raw(Value::Null),
        Some(Value::String(message)) => SkipReason::message(message),
        Some(value @ Value::Object(_)) => match LocatedRepr::deserialize(&value) {
            Ok(LocatedRepr {
                path,
                line,
                message,
            }) => SkipReason::Located {
                path,
                line,
                message,
            },
            Err(_) => SkipReason::Raw(value),
        },
        Some(value) => SkipReason::Raw(value),
    }
}

/// Reads input records from a line-oriented source. Blank lines are skipped.
#[derive(Debug)]
pub struct InputReader<R> {
    source_name: String,
    reader: R,
    line_number: usize,
    line: String,
}

impl<R: BufRead> InputReader<R> {
    /// Creates a new reader. `source_name` is used in error messages.
    pub fn new(source_name: impl Into<String>, reader: R) -> Self {
        Self {
            source_name: source_name.into(),
            reader,
            line_number: 0,
            line: String::new(),
        }
    }

    /// Returns the description of the source.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

impl<R: BufRead> Iterator for InputReader<R> {
    type Item = Result<InputRecord, InputReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(error) => {
                    return Some(Err(InputReadError::Read {
                        source_name: self.source_name.clone(),
                        error,
                    }));
                }
            }
            self.line_number += 1;

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(line).map_err(|error| InputReadError::Parse {
                source_name: self.source_name.clone(),
                line_number: self.line_number,
                error,
            }));
        }
    }
}

/// The result of driving a session to completion.
#[derive(Clone, Debug)]
pub struct DriveOutcome {
    /// The cases in this worker's shard, in shard order.
    pub listing: Vec<ListedCase>,

    /// The per-status counts of the run.
    pub summary: RunSummary,
}

/// Feeds input records into `session` and finishes it.
///
/// Collection ends at the first `phase` record, or at the end of input.
pub fn drive_session<I>(
    mut session: RunSession<'_>,
    records: I,
) -> Result<DriveOutcome, DriveSessionError>
where
    I: IntoIterator<Item = Result<InputRecord, InputReadError>>,
{
    let suffix = session.context().test_suffix().map(str::to_owned);
    let mode = session.context().mode();

    let mut collected = Vec::new();
    let mut listing = None;

    for record in records {
        match record? {
            InputRecord::Collected {
                nodeid,
                keywords,
                xfail,
            } => {
                if listing.is_some() {
                    warn!("ignoring case `{nodeid}` collected after the run started");
                    continue;
                }
                let mut case = CollectedCase::new(nodeid, suffix.as_deref()).with_keywords(keywords);
                if let Some(marker) = xfail {
                    case = case.with_marker(marker);
                }
                collected.push(case);
            }
            InputRecord::CollectError { nodeid, longrepr } => {
                session.collection_error(&nodeid, &failure_repr(longrepr))?;
            }
            InputRecord::Phase(record) => {
                if listing.is_none() {
                    listing = Some(session.collect(std::mem::take(&mut collected))?);
                }
                if mode == RunMode::List {
                    debug!("list mode: ignoring {} phase of `{}`", record.when, record.nodeid);
                    continue;
                }

                if session.active_case() != Some(record.nodeid.as_str()) {
                    session.start_case(&record.nodeid)?;
                }
                let is_teardown = record.when == Phase::Teardown;
                session.record_phase(record.into_report());
                if is_teardown {
                    session.finish_case()?;
                }
            }
        }
    }

    let listing = match listing {
        Some(listing) => listing,
        None => session.collect(collected)?,
    };
    let summary = session.finish()?;
    Ok(DriveOutcome { listing, summary })
}
