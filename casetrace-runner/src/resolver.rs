// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning per-phase outcomes into one canonical status per case.
//!
//! The execution framework reports one [`PhaseOutcome`] for each of the setup, call and teardown
//! phases of a case. [`classify`] maps a single phase outcome to a verdict, and [`CaseResolver`]
//! folds the verdicts for a case into exactly one terminal [`CaseStatus`]:
//!
//! * The first disqualifying verdict decides the status and the explanation.
//! * Later failures only append to the explanation, prefixed with the phase name.
//! * A case that was started but never reported a phase stays [`CaseStatus::Crashed`].
//!
//! Classification never fails: malformed failure representations are rendered on a best-effort
//! basis.

use casetrace_metadata::CaseStatus;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};

/// A lifecycle phase of a test case.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum Phase {
    /// Fixture setup.
    Setup,

    /// The test body.
    Call,

    /// Fixture teardown.
    Teardown,
}

impl Phase {
    /// Returns the name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Call => "call",
            Self::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placeholder text used when the framework did not describe a failure at all.
pub const MISSING_FAILURE_TEXT: &str = "<no failure representation>";

/// Explanation used for an unexpected pass.
pub const UNEXPECTED_PASS_TEXT: &str = "Test unexpectedly passed";

/// The condition kind raised by an imperative expected-failure call.
pub const XFAIL_CONDITION_KIND: &str = "xfail";

/// The framework's description of a failure.
#[derive(Clone, Debug, PartialEq)]
pub enum FailureRepr {
    /// Preformatted text, typically a traceback.
    Text(String),

    /// A message attached to a source location.
    Located {
        /// The file the failure was raised in.
        path: String,

        /// The line number, if known.
        line: Option<u64>,

        /// The failure message.
        message: String,
    },

    /// A representation of unknown shape, rendered on a best-effort basis.
    Raw(serde_json::Value),

    /// The framework did not provide a representation.
    Missing,
}

impl FailureRepr {
    /// Renders this representation as text.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Located {
                path,
                line: Some(line),
                message,
            } => format!("{path}:{line}: {message}"),
            Self::Located {
                path,
                line: None,
                message,
            } => format!("{path}: {message}"),
            Self::Raw(value) => render_value(value),
            Self::Missing => MISSING_FAILURE_TEXT.to_owned(),
        }
    }
}

fn render_value(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => MISSING_FAILURE_TEXT.to_owned(),
        Value::String(s) => s.clone(),
        Value::Array(entries) => entries
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(": "),
        other => other.to_string(),
    }
}

/// A failure reported for a phase.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    /// The kind of condition that was raised, e.g. an exception type name.
    pub kind: Option<String>,

    /// The description of the failure.
    pub repr: FailureRepr,
}

impl Failure {
    /// Creates a failure with a text representation and no kind.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: None,
            repr: FailureRepr::Text(text.into()),
        }
    }

    /// Sets the kind of this failure.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// The reason a phase was skipped.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// A skip raised at a known location.
    Located {
        /// The file the skip was raised in.
        path: String,

        /// The line number.
        line: Option<u64>,

        /// The skip message.
        message: String,
    },

    /// A skip reason of unknown shape.
    Raw(serde_json::Value),
}

impl SkipReason {
    /// Creates a located skip reason with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Located {
            path: String::new(),
            line: None,
            message: message.into(),
        }
    }

    /// Returns the explanation for this skip.
    pub fn explanation(&self) -> String {
        use serde_json::Value;

        match self {
            Self::Located { message, .. } => message.clone(),
            // Tuple-shaped reasons are (path, line, message).
            Self::Raw(Value::Array(entries)) => {
                entries.last().map(render_value).unwrap_or_default()
            }
            Self::Raw(Value::Null) => String::new(),
            Self::Raw(value) => render_value(value),
        }
    }
}

/// The outcome of one phase of a case, as reported by the execution framework.
#[derive(Clone, Debug, PartialEq)]
pub enum PhaseOutcome {
    /// The phase completed without raising anything.
    Passed,

    /// The phase raised a failure.
    Failed(Failure),

    /// The phase raised a skip condition.
    Skipped(SkipReason),

    /// The framework reported an expected-failure outcome for this phase.
    ExpectedFailure {
        /// The expected-failure reason.
        reason: String,

        /// True if the case raised the expected-failure condition itself, false if the framework
        /// detected that an expected failure did not happen.
        was_raised: bool,
    },
}

/// An expected-failure marker attached to a case.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct XfailMarker {
    /// The reason given for the expected failure.
    #[serde(default)]
    pub reason: String,

    /// The result of evaluating the marker's condition.
    #[serde(default = "default_true")]
    pub condition: bool,

    /// False if evaluating the condition itself failed.
    #[serde(default = "default_true")]
    pub valid: bool,

    /// Whether an unexpected pass fails the case. `None` uses the run-wide default.
    #[serde(default)]
    pub strict: Option<bool>,

    /// The condition kinds that count as the expected failure. Empty means any kind.
    #[serde(default)]
    pub raises: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl XfailMarker {
    /// Creates an unconditional marker with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            condition: true,
            valid: true,
            strict: None,
            raises: Vec::new(),
        }
    }

    /// Returns true if the marker is in effect for this case.
    pub fn applies(&self) -> bool {
        self.valid && self.condition
    }

    /// Returns true if the marker restricts the accepted condition kinds and `kind` is not one of
    /// them.
    pub fn excludes(&self, kind: Option<&str>) -> bool {
        !self.raises.is_empty()
            && kind.is_none_or(|kind| !self.raises.iter().any(|accepted| accepted == kind))
    }

    /// Returns the explanation reported for an expected failure.
    pub fn explanation(&self) -> String {
        if self.reason.is_empty() {
            "expected failure".to_owned()
        } else {
            self.reason.clone()
        }
    }

    fn is_strict(&self, options: &ResolverOptions) -> bool {
        self.strict.unwrap_or(options.xfail_strict)
    }
}

/// Run-wide options that affect classification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResolverOptions {
    /// Ignore expected-failure markers ("force-fail" mode).
    pub run_xfail: bool,

    /// Default strictness for markers that don't specify it.
    pub xfail_strict: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            run_xfail: false,
            xfail_strict: true,
        }
    }
}

/// The verdict for a single phase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PhaseVerdict {
    /// The phase does not disqualify the case.
    Pass,

    /// The phase determines the status of the case, unless an earlier phase already did.
    Disqualify {
        /// The status the case should have.
        status: CaseStatus,

        /// The explanation if this is the first disqualifying verdict.
        explanation: String,

        /// The unprefixed failure text, used when appending to an earlier explanation.
        detail: String,
    },
}

impl PhaseVerdict {
    fn disqualify(status: CaseStatus, explanation: String, detail: String) -> Self {
        Self::Disqualify {
            status,
            explanation,
            detail,
        }
    }
}

/// Classifies the outcome of a single phase.
///
/// This is a pure function of its inputs.
pub fn classify(
    phase: Phase,
    outcome: &PhaseOutcome,
    marker: Option<&XfailMarker>,
    options: &ResolverOptions,
) -> PhaseVerdict {
    let declared_marker = marker;
    let marker = marker.filter(|marker| marker.applies() && !options.run_xfail);

    match outcome {
        PhaseOutcome::Passed => match marker {
            Some(marker) if phase == Phase::Call && marker.is_strict(options) => {
                PhaseVerdict::disqualify(
                    CaseStatus::Xpass,
                    UNEXPECTED_PASS_TEXT.to_owned(),
                    UNEXPECTED_PASS_TEXT.to_owned(),
                )
            }
            _ => PhaseVerdict::Pass,
        },
        PhaseOutcome::Failed(failure) => {
            let detail = failure.repr.render();
            match (marker, phase) {
                (Some(marker), Phase::Setup | Phase::Call)
                    if !marker.excludes(failure.kind.as_deref()) =>
                {
                    if phase == Phase::Setup {
                        PhaseVerdict::disqualify(
                            CaseStatus::Skipped,
                            prefixed(phase, &detail),
                            detail,
                        )
                    } else {
                        PhaseVerdict::disqualify(CaseStatus::Xfail, marker.explanation(), detail)
                    }
                }
                _ => {
                    let explanation = if phase == Phase::Call {
                        detail.clone()
                    } else {
                        prefixed(phase, &detail)
                    };
                    PhaseVerdict::disqualify(CaseStatus::Fail, explanation, detail)
                }
            }
        }
        PhaseOutcome::Skipped(reason) => {
            let explanation = reason.explanation();
            PhaseVerdict::disqualify(CaseStatus::Skipped, explanation.clone(), explanation)
        }
        PhaseOutcome::ExpectedFailure {
            reason,
            was_raised: true,
        } => {
            if !options.run_xfail {
                let explanation = format!("reason: {reason}");
                return PhaseVerdict::disqualify(
                    CaseStatus::Xfail,
                    explanation.clone(),
                    explanation,
                );
            }
            // Markers are ignored in force-fail mode, but their `raises` list still says whether
            // the imperative expected-failure condition is acceptable.
            let excluded = declared_marker.is_some_and(|marker| {
                marker.applies() && marker.excludes(Some(XFAIL_CONDITION_KIND))
            });
            if excluded {
                PhaseVerdict::disqualify(CaseStatus::Fail, reason.clone(), reason.clone())
            } else {
                PhaseVerdict::disqualify(CaseStatus::Skipped, reason.clone(), reason.clone())
            }
        }
        PhaseOutcome::ExpectedFailure {
            reason: _,
            was_raised: false,
        } => {
            let strict = marker.map_or(options.xfail_strict, |marker| marker.is_strict(options));
            if phase == Phase::Call && strict {
                PhaseVerdict::disqualify(
                    CaseStatus::Xpass,
                    UNEXPECTED_PASS_TEXT.to_owned(),
                    UNEXPECTED_PASS_TEXT.to_owned(),
                )
            } else {
                PhaseVerdict::Pass
            }
        }
    }
}

fn prefixed(phase: Phase, detail: &str) -> String {
    format!("{phase} failed:\n{detail}")
}

/// The final resolution of a case.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCase {
    /// The terminal status.
    pub status: CaseStatus,

    /// The explanation, empty when the case is good.
    pub error: String,

    /// The sum of the reported phase durations, in seconds.
    pub duration: f64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum ResolverState {
    Pending,
    Crashed,
    InProgress,
    Disqualified(CaseStatus),
}

/// Folds the phase outcomes for one case into a single status.
#[derive(Clone, Debug)]
pub struct CaseResolver {
    marker: Option<XfailMarker>,
    options: ResolverOptions,
    state: ResolverState,
    error: String,
    duration: f64,
    last_phase: Option<Phase>,
    call_seen: bool,
}

impl CaseResolver {
    /// Creates a resolver for a case that has not been started yet.
    pub fn new(marker: Option<XfailMarker>, options: ResolverOptions) -> Self {
        Self {
            marker,
            options,
            state: ResolverState::Pending,
            error: String::new(),
            duration: 0.0,
            last_phase: None,
            call_seen: false,
        }
    }

    /// Marks the case as started. Until a phase is reported the case counts as crashed.
    pub fn start(&mut self) {
        if self.state == ResolverState::Pending {
            self.state = ResolverState::Crashed;
        }
    }

    /// Returns the current best-known status.
    pub fn status(&self) -> CaseStatus {
        match self.state {
            ResolverState::Pending => CaseStatus::NotLaunched,
            ResolverState::Crashed => CaseStatus::Crashed,
            ResolverState::InProgress => CaseStatus::Good,
            ResolverState::Disqualified(status) => status,
        }
    }

    /// Returns the explanation accumulated so far.
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Records the outcome of a phase.
    pub fn record(&mut self, phase: Phase, outcome: &PhaseOutcome, duration: Option<f64>) {
        if self.last_phase.is_some_and(|last| last >= phase) {
            warn!(
                "phase `{phase}` reported after `{}`, processing anyway",
                self.last_phase.map_or("", Phase::as_str),
            );
        }
        self.last_phase = Some(phase);
        if phase == Phase::Call {
            self.call_seen = true;
        }

        match duration {
            Some(duration) if duration.is_finite() && duration >= 0.0 => {
                self.duration += duration;
            }
            Some(duration) => warn!("ignoring invalid duration {duration} for phase `{phase}`"),
            None => {}
        }

        let verdict = classify(phase, outcome, self.marker.as_ref(), &self.options);
        match (&self.state, verdict) {
            (
                ResolverState::Pending | ResolverState::Crashed | ResolverState::InProgress,
                PhaseVerdict::Pass,
            ) => {
                self.state = ResolverState::InProgress;
            }
            (
                ResolverState::Pending | ResolverState::Crashed | ResolverState::InProgress,
                PhaseVerdict::Disqualify {
                    status,
                    explanation,
                    ..
                },
            ) => {
                self.state = ResolverState::Disqualified(status);
                self.error = explanation;
            }
            (ResolverState::Disqualified(_), PhaseVerdict::Pass) => {}
            (
                ResolverState::Disqualified(_),
                PhaseVerdict::Disqualify { status, detail, .. },
            ) => {
                if status == CaseStatus::Fail {
                    if !self.error.is_empty() {
                        self.error.push('\n');
                    }
                    self.error.push_str(&prefixed(phase, &detail));
                } else {
                    debug!("ignoring later `{status}` verdict from phase `{phase}`");
                }
            }
        }
    }

    /// Resolves a case that ran to completion.
    pub fn finish(self) -> ResolvedCase {
        let status = self.status();
        self.into_resolved(status)
    }

    /// Resolves a case whose run was interrupted before teardown was reported.
    pub fn finish_interrupted(self) -> ResolvedCase {
        let status = match self.state {
            ResolverState::InProgress if !self.call_seen => CaseStatus::Crashed,
            _ => self.status(),
        };
        self.into_resolved(status)
    }

    fn into_resolved(self, status: CaseStatus) -> ResolvedCase {
        let error = if status == CaseStatus::Good {
            String::new()
        } else {
            self.error
        };
        ResolvedCase {
            status,
            error,
            duration: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::{collection::vec, prelude::*};
    use test_case::test_case;
    use test_strategy::proptest;

    fn resolve(
        marker: Option<XfailMarker>,
        options: ResolverOptions,
        phases: &[(Phase, PhaseOutcome)],
    ) -> ResolvedCase {
        let mut resolver = CaseResolver::new(marker, options);
        resolver.start();
        for (phase, outcome) in phases {
            resolver.record(*phase, outcome, Some(0.5));
        }
        resolver.finish()
    }

    fn full_run(call: PhaseOutcome) -> Vec<(Phase, PhaseOutcome)> {
        vec![
            (Phase::Setup, PhaseOutcome::Passed),
            (Phase::Call, call),
            (Phase::Teardown, PhaseOutcome::Passed),
        ]
    }

    #[test]
    fn generic_failure() {
        let resolved = resolve(
            None,
            ResolverOptions::default(),
            &full_run(PhaseOutcome::Failed(Failure::text("assert 1 == 2"))),
        );
        assert_eq!(
            resolved,
            ResolvedCase {
                status: CaseStatus::Fail,
                error: "assert 1 == 2".to_owned(),
                duration: 1.5,
            }
        );
    }

    #[test_case(Phase::Setup ; "skipped in setup")]
    #[test_case(Phase::Call ; "skipped in call")]
    fn skip_with_message(skipped_phase: Phase) {
        let phases: Vec<_> = [Phase::Setup, Phase::Call, Phase::Teardown]
            .into_iter()
            .take_while(|phase| *phase <= skipped_phase)
            .map(|phase| {
                let outcome = if phase == skipped_phase {
                    PhaseOutcome::Skipped(SkipReason::message("not supported"))
                } else {
                    PhaseOutcome::Passed
                };
                (phase, outcome)
            })
            .chain([(Phase::Teardown, PhaseOutcome::Passed)])
            .collect();
        let resolved = resolve(None, ResolverOptions::default(), &phases);
        assert_eq!(resolved.status, CaseStatus::Skipped);
        assert_eq!(resolved.error, "not supported");
        assert_eq!(resolved.duration, 0.5 * phases.len() as f64);
    }

    #[test]
    fn raw_skip_reason_uses_last_entry() {
        let reason = SkipReason::Raw(serde_json::json!(["test_mod.py", 3, "no network"]));
        assert_eq!(reason.explanation(), "no network");
        assert_eq!(
            SkipReason::Raw(serde_json::json!({"why": 1})).explanation(),
            r#"{"why":1}"#
        );
    }

    #[test]
    fn imperative_xfail() {
        let resolved = resolve(
            None,
            ResolverOptions::default(),
            &full_run(PhaseOutcome::ExpectedFailure {
                reason: "bug 42".to_owned(),
                was_raised: true,
            }),
        );
        assert_eq!(resolved.status, CaseStatus::Xfail);
        assert_eq!(resolved.error, "reason: bug 42");
    }

    #[test]
    fn strict_xfail_not_raised() {
        let resolved = resolve(
            Some(XfailMarker::new("flaky")),
            ResolverOptions::default(),
            &full_run(PhaseOutcome::ExpectedFailure {
                reason: "flaky".to_owned(),
                was_raised: false,
            }),
        );
        assert_eq!(resolved.status, CaseStatus::Xpass);
        assert_eq!(resolved.error, UNEXPECTED_PASS_TEXT);
    }

    // Columns: the case raises a failure, the marker is strict, the marker is valid.
    #[test_case(true, true, true, CaseStatus::Xfail, "known bug" ; "raised strict valid")]
    #[test_case(true, false, true, CaseStatus::Xfail, "known bug" ; "raised lenient valid")]
    #[test_case(true, true, false, CaseStatus::Fail, "boom" ; "raised strict invalid")]
    #[test_case(true, false, false, CaseStatus::Fail, "boom" ; "raised lenient invalid")]
    #[test_case(false, true, true, CaseStatus::Xpass, UNEXPECTED_PASS_TEXT ; "passed strict valid")]
    #[test_case(false, false, true, CaseStatus::Good, "" ; "passed lenient valid")]
    #[test_case(false, true, false, CaseStatus::Good, "" ; "passed strict invalid")]
    #[test_case(false, false, false, CaseStatus::Good, "" ; "passed lenient invalid")]
    fn xfail_matrix(raised: bool, strict: bool, valid: bool, status: CaseStatus, error: &str) {
        let marker = XfailMarker {
            strict: Some(strict),
            valid,
            ..XfailMarker::new("known bug")
        };
        let call = if raised {
            PhaseOutcome::Failed(Failure::text("boom"))
        } else {
            PhaseOutcome::Passed
        };
        let resolved = resolve(Some(marker), ResolverOptions::default(), &full_run(call));
        assert_eq!(resolved.status, status);
        assert_eq!(resolved.error, error);
    }

    #[test]
    fn marker_without_reason() {
        let resolved = resolve(
            Some(XfailMarker::new("")),
            ResolverOptions::default(),
            &full_run(PhaseOutcome::Failed(Failure::text("boom"))),
        );
        assert_eq!(resolved.status, CaseStatus::Xfail);
        assert_eq!(resolved.error, "expected failure");
    }

    #[test]
    fn false_condition_disables_marker() {
        let marker = XfailMarker {
            condition: false,
            ..XfailMarker::new("only on windows")
        };
        let resolved = resolve(
            Some(marker),
            ResolverOptions::default(),
            &full_run(PhaseOutcome::Failed(Failure::text("boom"))),
        );
        assert_eq!(resolved.status, CaseStatus::Fail);
    }

    #[test]
    fn raises_restriction() {
        let marker = XfailMarker {
            raises: vec!["ValueError".to_owned()],
            ..XfailMarker::new("parser bug")
        };

        let resolved = resolve(
            Some(marker.clone()),
            ResolverOptions::default(),
            &full_run(PhaseOutcome::Failed(
                Failure::text("bad value").with_kind("ValueError"),
            )),
        );
        assert_eq!(resolved.status, CaseStatus::Xfail);

        let resolved = resolve(
            Some(marker.clone()),
            ResolverOptions::default(),
            &full_run(PhaseOutcome::Failed(
                Failure::text("bad key").with_kind("KeyError"),
            )),
        );
        assert_eq!(resolved.status, CaseStatus::Fail);
        assert_eq!(resolved.error, "bad key");

        let resolved = resolve(
            Some(marker),
            ResolverOptions::default(),
            &full_run(PhaseOutcome::Failed(Failure::text("no kind"))),
        );
        assert_eq!(resolved.status, CaseStatus::Fail);
    }

    #[test]
    fn setup_failure_under_marker_is_skipped() {
        let resolved = resolve(
            Some(XfailMarker::new("known bug")),
            ResolverOptions::default(),
            &[(
                Phase::Setup,
                PhaseOutcome::Failed(Failure::text("fixture broke")),
            )],
        );
        assert_eq!(resolved.status, CaseStatus::Skipped);
        assert_eq!(resolved.error, "setup failed:\nfixture broke");
    }

    #[test]
    fn setup_failure_without_marker() {
        let resolved = resolve(
            None,
            ResolverOptions::default(),
            &[
                (
                    Phase::Setup,
                    PhaseOutcome::Failed(Failure::text("fixture broke")),
                ),
                (
                    Phase::Teardown,
                    PhaseOutcome::Failed(Failure::text("cleanup broke")),
                ),
            ],
        );
        assert_eq!(resolved.status, CaseStatus::Fail);
        assert_eq!(
            resolved.error,
            "setup failed:\nfixture broke\nteardown failed:\ncleanup broke"
        );
    }

    #[test]
    fn teardown_failure_after_pass() {
        let resolved = resolve(
            None,
            ResolverOptions::default(),
            &[
                (Phase::Setup, PhaseOutcome::Passed),
                (Phase::Call, PhaseOutcome::Passed),
                (
                    Phase::Teardown,
                    PhaseOutcome::Failed(Failure::text("leaked file")),
                ),
            ],
        );
        assert_eq!(resolved.status, CaseStatus::Fail);
        assert_eq!(resolved.error, "teardown failed:\nleaked file");
    }

    #[test]
    fn later_failure_does_not_change_terminal_status() {
        let resolved = resolve(
            None,
            ResolverOptions::default(),
            &[
                (Phase::Setup, PhaseOutcome::Passed),
                (
                    Phase::Call,
                    PhaseOutcome::Skipped(SkipReason::message("no gpu")),
                ),
                (
                    Phase::Teardown,
                    PhaseOutcome::Failed(Failure::text("leaked file")),
                ),
            ],
        );
        assert_eq!(resolved.status, CaseStatus::Skipped);
        assert_eq!(resolved.error, "no gpu\nteardown failed:\nleaked file");
    }

    #[test]
    fn run_xfail_ignores_markers() {
        let options = ResolverOptions {
            run_xfail: true,
            ..ResolverOptions::default()
        };
        let resolved = resolve(
            Some(XfailMarker::new("known bug")),
            options,
            &full_run(PhaseOutcome::Failed(Failure::text("boom"))),
        );
        assert_eq!(resolved.status, CaseStatus::Fail);

        let resolved = resolve(
            Some(XfailMarker::new("known bug")),
            options,
            &full_run(PhaseOutcome::Passed),
        );
        assert_eq!(resolved.status, CaseStatus::Good);
    }

    #[test]
    fn run_xfail_with_imperative_xfail() {
        let options = ResolverOptions {
            run_xfail: true,
            ..ResolverOptions::default()
        };
        let call = PhaseOutcome::ExpectedFailure {
            reason: "bug 42".to_owned(),
            was_raised: true,
        };

        let resolved = resolve(None, options, &full_run(call.clone()));
        assert_eq!(resolved.status, CaseStatus::Skipped);
        assert_eq!(resolved.error, "bug 42");

        let marker = XfailMarker {
            raises: vec!["ValueError".to_owned()],
            ..XfailMarker::new("parser bug")
        };
        let resolved = resolve(Some(marker), options, &full_run(call.clone()));
        assert_eq!(resolved.status, CaseStatus::Fail);

        let marker = XfailMarker {
            raises: vec!["ValueError".to_owned(), XFAIL_CONDITION_KIND.to_owned()],
            ..XfailMarker::new("parser bug")
        };
        let resolved = resolve(Some(marker), options, &full_run(call));
        assert_eq!(resolved.status, CaseStatus::Skipped);
    }

    #[test]
    fn lenient_default_strictness() {
        let options = ResolverOptions {
            xfail_strict: false,
            ..ResolverOptions::default()
        };
        let resolved = resolve(
            Some(XfailMarker::new("flaky")),
            options,
            &full_run(PhaseOutcome::ExpectedFailure {
                reason: "flaky".to_owned(),
                was_raised: false,
            }),
        );
        assert_eq!(resolved.status, CaseStatus::Good);
        assert_eq!(resolved.error, "");
    }

    #[test]
    fn lifecycle_states() {
        let resolver = CaseResolver::new(None, ResolverOptions::default());
        assert_eq!(resolver.status(), CaseStatus::NotLaunched);
        assert_eq!(resolver.finish().status, CaseStatus::NotLaunched);

        let mut resolver = CaseResolver::new(None, ResolverOptions::default());
        resolver.start();
        assert_eq!(resolver.status(), CaseStatus::Crashed);
        let resolved = resolver.finish();
        assert_eq!(resolved.status, CaseStatus::Crashed);
        assert_eq!(resolved.duration, 0.0);
    }

    #[test]
    fn interrupted_cases() {
        let mut resolver = CaseResolver::new(None, ResolverOptions::default());
        resolver.start();
        resolver.record(Phase::Setup, &PhaseOutcome::Passed, Some(0.1));
        assert_eq!(resolver.status(), CaseStatus::Good);
        assert_eq!(resolver.finish_interrupted().status, CaseStatus::Crashed);

        let mut resolver = CaseResolver::new(None, ResolverOptions::default());
        resolver.start();
        resolver.record(Phase::Setup, &PhaseOutcome::Passed, None);
        resolver.record(Phase::Call, &PhaseOutcome::Passed, None);
        assert_eq!(resolver.finish_interrupted().status, CaseStatus::Good);

        let mut resolver = CaseResolver::new(None, ResolverOptions::default());
        resolver.start();
        resolver.record(
            Phase::Setup,
            &PhaseOutcome::Failed(Failure::text("fixture broke")),
            None,
        );
        assert_eq!(resolver.finish_interrupted().status, CaseStatus::Fail);
    }

    #[test]
    fn invalid_durations_are_ignored() {
        let mut resolver = CaseResolver::new(None, ResolverOptions::default());
        resolver.start();
        resolver.record(Phase::Setup, &PhaseOutcome::Passed, Some(-1.0));
        resolver.record(Phase::Call, &PhaseOutcome::Passed, Some(f64::NAN));
        resolver.record(Phase::Teardown, &PhaseOutcome::Passed, Some(0.25));
        assert_eq!(resolver.finish().duration, 0.25);
    }

    #[test_case(FailureRepr::Text("trace".to_owned()), "trace" ; "text")]
    #[test_case(
        FailureRepr::Located { path: "a.py".to_owned(), line: Some(3), message: "bad".to_owned() },
        "a.py:3: bad"
        ; "located")]
    #[test_case(FailureRepr::Raw(serde_json::json!(["a.py", 3, "bad"])), "a.py: 3: bad" ; "raw tuple")]
    #[test_case(FailureRepr::Raw(serde_json::Value::Null), MISSING_FAILURE_TEXT ; "raw null")]
    #[test_case(FailureRepr::Missing, MISSING_FAILURE_TEXT ; "missing")]
    fn failure_rendering(repr: FailureRepr, expected: &str) {
        assert_eq!(repr.render(), expected);
    }

    fn outcome_strategy() -> impl Strategy<Value = PhaseOutcome> {
        let kind = proptest::option::of(prop_oneof![
            Just("ValueError".to_owned()),
            Just("KeyError".to_owned()),
        ]);
        prop_oneof![
            Just(PhaseOutcome::Passed),
            (kind, ".*").prop_map(|(kind, text)| PhaseOutcome::Failed(Failure {
                kind,
                repr: FailureRepr::Text(text),
            })),
            ".*".prop_map(|message| PhaseOutcome::Skipped(SkipReason::message(message))),
            (".*", any::<bool>()).prop_map(|(reason, was_raised)| {
                PhaseOutcome::ExpectedFailure { reason, was_raised }
            }),
        ]
    }

    fn marker_strategy() -> impl Strategy<Value = Option<XfailMarker>> {
        proptest::option::of(
            (
                any::<bool>(),
                any::<bool>(),
                any::<Option<bool>>(),
                any::<bool>(),
            )
                .prop_map(|(condition, valid, strict, restricted)| XfailMarker {
                    reason: "marked".to_owned(),
                    condition,
                    valid,
                    strict,
                    raises: if restricted {
                        vec!["ValueError".to_owned()]
                    } else {
                        Vec::new()
                    },
                }),
        )
    }

    #[proptest]
    fn resolution_is_deterministic(
        #[strategy(vec((any::<Phase>(), outcome_strategy()), 0..4))] phases: Vec<(
            Phase,
            PhaseOutcome,
        )>,
        #[strategy(marker_strategy())] marker: Option<XfailMarker>,
        run_xfail: bool,
        xfail_strict: bool,
    ) {
        let options = ResolverOptions {
            run_xfail,
            xfail_strict,
        };
        let first = resolve(marker.clone(), options, &phases);
        let second = resolve(marker, options, &phases);
        prop_assert_eq!(&first, &second);

        prop_assert_ne!(first.status, CaseStatus::NotLaunched);
        if phases.is_empty() {
            prop_assert_eq!(first.status, CaseStatus::Crashed);
        }
        if first.status == CaseStatus::Good {
            prop_assert_eq!(first.error, "");
        }
    }
}
