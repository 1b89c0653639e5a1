// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driving one worker's run from collection to the final summary.
//!
//! A [`RunSession`] owns the trace reporter for the worker. Every case goes through one full
//! class/case start and finish cycle before the next one starts.

use crate::{
    case_log::CaseLog,
    config::TestLogLevel,
    errors::WriteEventError,
    identity::{CASE_LOG_KEY, CaseIdentity, LogPathAllocator},
    reporter::{FinishedCase, TraceReporter},
    resolver::{CaseResolver, FailureRepr, Phase, PhaseOutcome, ResolvedCase, XfailMarker},
    run_context::{RunContext, RunMode},
};
use camino::Utf8PathBuf;
use casetrace_metadata::{CaseMetrics, CaseStatus, ListedCase, LogPaths};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Keyword that suppresses a case's result payload.
pub const NOT_CANONIZE_KEYWORD: &str = "not_canonize";

/// Keyword that marks a case as a diff test.
pub const DIFF_TEST_KEYWORD: &str = "diff_test";

/// A case discovered by the execution framework.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectedCase {
    identity: CaseIdentity,
    keywords: BTreeSet<String>,
    marker: Option<XfailMarker>,
}

impl CollectedCase {
    /// Creates a new collected case.
    pub fn new(raw_id: impl Into<String>, suffix: Option<&str>) -> Self {
        Self {
            identity: CaseIdentity::new(raw_id, suffix),
            keywords: BTreeSet::new(),
            marker: None,
        }
    }

    /// Sets the keywords of this case.
    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = String>) -> Self {
        self.keywords.extend(keywords);
        self
    }

    /// Sets the expected-failure marker of this case.
    pub fn with_marker(mut self, marker: XfailMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Returns the identity of this case.
    pub fn identity(&self) -> &CaseIdentity {
        &self.identity
    }

    /// Returns the keywords of this case.
    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    /// Returns the expected-failure marker of this case.
    pub fn marker(&self) -> Option<&XfailMarker> {
        self.marker.as_ref()
    }

    /// Returns true if this case is a diff test.
    pub fn is_diff_test(&self) -> bool {
        self.keywords.contains(DIFF_TEST_KEYWORD)
    }

    /// Returns true if this case's result payload is not reported.
    pub fn suppresses_result(&self) -> bool {
        self.keywords.contains(NOT_CANONIZE_KEYWORD)
    }
}

impl AsRef<CaseIdentity> for CollectedCase {
    fn as_ref(&self) -> &CaseIdentity {
        &self.identity
    }
}

/// The outcome of one phase of a case, along with the data recorded during it.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseReport {
    /// The locator of the case.
    pub raw_id: String,

    /// The phase.
    pub phase: Phase,

    /// The outcome.
    pub outcome: PhaseOutcome,

    /// The duration of the phase in seconds.
    pub duration: Option<f64>,

    /// The result payload recorded during the phase.
    pub result: Option<Value>,

    /// Metrics recorded during the phase.
    pub metrics: Option<CaseMetrics>,
}

impl PhaseReport {
    /// Creates a report with no duration, result or metrics.
    pub fn new(raw_id: impl Into<String>, phase: Phase, outcome: PhaseOutcome) -> Self {
        Self {
            raw_id: raw_id.into(),
            phase,
            outcome,
            duration: None,
            result: None,
            metrics: None,
        }
    }
}

/// Per-status counts for a finished run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    counts: BTreeMap<CaseStatus, usize>,
    collection_errors: usize,
}

impl RunSummary {
    /// Returns the number of cases with the given status.
    pub fn count(&self, status: CaseStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Returns the total number of cases.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Returns the number of collection errors reported.
    pub fn collection_errors(&self) -> usize {
        self.collection_errors
    }

    /// Returns true if any case failed, passed unexpectedly or crashed, or if collection failed.
    pub fn has_failures(&self) -> bool {
        self.collection_errors > 0
            || self
                .counts
                .iter()
                .any(|(status, count)| status.is_failure() && *count > 0)
    }

    /// Iterates over the statuses that occurred, with their counts.
    pub fn iter(&self) -> impl Iterator<Item = (CaseStatus, usize)> + '_ {
        self.counts.iter().map(|(status, count)| (*status, *count))
    }

    fn add(&mut self, status: CaseStatus) {
        *self.counts.entry(status).or_default() += 1;
    }
}

#[derive(Debug)]
struct ShardEntry {
    case: CollectedCase,
    started: bool,
}

#[derive(Debug)]
struct ActiveCase {
    index: usize,
    resolver: CaseResolver,
    logs: LogPaths,
    log: Option<CaseLog>,
    result: Option<Value>,
    metrics: Option<CaseMetrics>,
}

/// The run of one worker.
#[derive(Debug)]
pub struct RunSession<'a> {
    context: &'a RunContext,
    reporter: TraceReporter<'a>,
    log_paths: LogPathAllocator,
    shard: Vec<ShardEntry>,
    active: Option<ActiveCase>,
    summary: RunSummary,
}

impl<'a> RunSession<'a> {
    /// Creates a new session.
    pub fn new(context: &'a RunContext, reporter: TraceReporter<'a>) -> Self {
        Self {
            context,
            reporter,
            log_paths: LogPathAllocator::new(context.output_dir()),
            shard: Vec::new(),
            active: None,
            summary: RunSummary::default(),
        }
    }

    /// Returns the context of this session.
    pub fn context(&self) -> &RunContext {
        self.context
    }

    /// Selects the cases this worker owns out of everything the framework collected.
    ///
    /// Filtered-out cases are reported as deselected if enabled. In run mode, every case in the
    /// shard is reported as not launched until it actually runs. Returns the listing of the shard.
    pub fn collect(
        &mut self,
        cases: Vec<CollectedCase>,
    ) -> Result<Vec<ListedCase>, WriteEventError> {
        let collected = cases.len();
        let outcome = self.context.filter().apply(cases);

        if self.context.report_deselected() {
            for (case, _) in &outcome.deselected {
                self.report_placeholder(case.identity(), CaseStatus::Deselected)?;
            }
        }

        let shard = self.context.partitioner().shard(outcome.selected);
        info!(
            "collected {collected} cases: {} deselected, {} in shard {}/{}",
            outcome.deselected.len(),
            shard.len(),
            self.context.partitioner().index(),
            self.context.partitioner().modulo(),
        );

        if self.context.mode() == RunMode::Run {
            for case in &shard {
                self.report_placeholder(case.identity(), CaseStatus::NotLaunched)?;
            }
        }

        let listing = shard
            .iter()
            .map(|case| ListedCase {
                class: case.identity().class_name().to_owned(),
                test: case.identity().test_name().to_owned(),
            })
            .collect();
        self.shard = shard
            .into_iter()
            .map(|case| ShardEntry {
                case,
                started: false,
            })
            .collect();
        Ok(listing)
    }

    /// Reports an error that occurred while collecting `raw_id`.
    pub fn collection_error(
        &mut self,
        raw_id: &str,
        repr: &FailureRepr,
    ) -> Result<(), WriteEventError> {
        warn!("error collecting {raw_id}");
        self.summary.collection_errors += 1;
        self.reporter.on_error(CaseStatus::Fail, &repr.render())
    }

    /// Returns the locator of the case that is currently running.
    pub fn active_case(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|active| self.shard[active.index].case.identity().raw_id())
    }

    /// Starts a case. Until a phase is recorded, the case counts as crashed.
    ///
    /// The case's log file is created in the output directory. If that fails, the case runs
    /// without one and no log path is reported for it.
    ///
    /// A case that is still running is finished as interrupted first. Cases outside this worker's
    /// shard are ignored.
    pub fn start_case(&mut self, raw_id: &str) -> Result<(), WriteEventError> {
        if let Some(active) = self.active_case() {
            warn!("{active} did not finish before {raw_id} started");
            self.finish_active(true)?;
        }

        let Some(index) = self
            .shard
            .iter()
            .position(|entry| !entry.started && entry.case.identity().raw_id() == raw_id)
        else {
            debug!("ignoring {raw_id}: not in this shard");
            return Ok(());
        };

        let entry = &mut self.shard[index];
        entry.started = true;
        let identity = entry.case.identity();
        let mut logs = self.log_paths.allocate(identity);
        let log = open_case_log(&mut logs, identity.test_name(), self.context.test_log_level());

        self.reporter.on_start_class(identity.class_name())?;
        self.reporter.on_start_case(identity, Some(&logs))?;

        let mut resolver =
            CaseResolver::new(entry.case.marker().cloned(), self.context.resolver_options());
        resolver.start();
        self.active = Some(ActiveCase {
            index,
            resolver,
            logs,
            log,
            result: None,
            metrics: None,
        });
        Ok(())
    }

    /// Records the outcome of a phase of the running case.
    pub fn record_phase(&mut self, report: PhaseReport) {
        let Some(active) = &mut self.active else {
            debug!(
                "ignoring {} report for {}: no case is running",
                report.phase, report.raw_id
            );
            return;
        };
        let identity = self.shard[active.index].case.identity();
        if identity.raw_id() != report.raw_id {
            debug!(
                "ignoring {} report for {}: {} is running",
                report.phase,
                report.raw_id,
                identity.raw_id(),
            );
            return;
        }

        if let Some(log) = &mut active.log
            && let Err(error) = log.phase(report.phase, &report.outcome)
        {
            warn!("failed to write case log {}: {error}", log.path());
            active.log = None;
        }
        active
            .resolver
            .record(report.phase, &report.outcome, report.duration);
        if report.result.is_some() {
            active.result = report.result;
        }
        if let Some(metrics) = report.metrics {
            active.metrics.get_or_insert_default().extend(metrics);
        }
    }

    /// Finishes the running case and returns its reported status.
    pub fn finish_case(&mut self) -> Result<Option<CaseStatus>, WriteEventError> {
        self.finish_active(false)
    }

    /// Finishes the run. A case that is still running is finished as interrupted, and cases that
    /// never started count as not launched.
    pub fn finish(mut self) -> Result<RunSummary, WriteEventError> {
        if let Some(active) = self.active_case() {
            warn!("{active} was interrupted");
            self.finish_active(true)?;
        }

        if self.context.mode() == RunMode::Run {
            for entry in &self.shard {
                if !entry.started {
                    self.summary.add(CaseStatus::NotLaunched);
                }
            }
        }

        self.reporter.finish()?;
        Ok(self.summary)
    }

    fn finish_active(&mut self, interrupted: bool) -> Result<Option<CaseStatus>, WriteEventError> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        let ResolvedCase {
            status,
            error,
            duration,
        } = if interrupted {
            active.resolver.finish_interrupted()
        } else {
            active.resolver.finish()
        };

        let case = &self.shard[active.index].case;
        let result = active
            .result
            .as_ref()
            .filter(|_| !case.suppresses_result());
        let status = self.reporter.on_finish_case(&FinishedCase {
            identity: case.identity(),
            status,
            comment: &error,
            duration,
            result,
            metrics: active.metrics.as_ref(),
            is_diff_test: case.is_diff_test(),
            logs: Some(&active.logs),
        })?;
        self.reporter.on_finish_class(case.identity().class_name())?;

        if let Some(log) = active.log {
            let path = log.path().to_owned();
            if let Err(error) = log.finish(status) {
                warn!("failed to write case log {path}: {error}");
            }
        }
        debug!("{} finished: {status}", case.identity());
        self.summary.add(status);
        Ok(Some(status))
    }

    fn report_placeholder(
        &mut self,
        identity: &CaseIdentity,
        status: CaseStatus,
    ) -> Result<(), WriteEventError> {
        self.reporter.on_start_class(identity.class_name())?;
        self.reporter.on_start_case(identity, None)?;
        self.reporter.on_finish_case(&FinishedCase {
            identity,
            status,
            comment: "",
            duration: 0.0,
            result: None,
            metrics: None,
            is_diff_test: false,
            logs: None,
        })?;
        self.reporter.on_finish_class(identity.class_name())
    }
}

fn open_case_log(logs: &mut LogPaths, test_name: &str, level: TestLogLevel) -> Option<CaseLog> {
    let path = Utf8PathBuf::from(logs.get(CASE_LOG_KEY)?);
    let log = CaseLog::create(&path, level.to_tracing_level()).and_then(|mut log| {
        log.start(test_name)?;
        Ok(log)
    });
    match log {
        Ok(log) => Some(log),
        Err(error) => {
            warn!("failed to create case log {path}: {error}");
            logs.remove(CASE_LOG_KEY);
            None
        }
    }
}
