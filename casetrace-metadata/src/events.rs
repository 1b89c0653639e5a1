// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::CaseStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log files associated with a test case, keyed by the kind of log (for example `log` or
/// `logsdir`).
pub type LogPaths = BTreeMap<String, String>;

/// Numeric metrics recorded by a test case.
pub type CaseMetrics = BTreeMap<String, f64>;

/// A single line of the trace stream.
///
/// Serialized as `{"timestamp": <float seconds>, "name": <event name>, "value": {...}}`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TraceEvent {
    /// Wall-clock time the event was emitted, in seconds since the Unix epoch.
    pub timestamp: f64,

    /// The name and payload of the event.
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// The name and payload of a [`TraceEvent`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "name", content = "value")]
pub enum TraceEventKind {
    /// A test class started.
    #[serde(rename = "test-started")]
    TestStarted(ClassEvent),

    /// A test class finished.
    #[serde(rename = "test-finished")]
    TestFinished(ClassEvent),

    /// A test case started.
    #[serde(rename = "subtest-started")]
    SubtestStarted(SubtestStarted),

    /// A test case finished.
    #[serde(rename = "subtest-finished")]
    SubtestFinished(SubtestFinished),

    /// An error not attributable to a single case, for example a collection error.
    #[serde(rename = "suite_event")]
    SuiteEvent(SuiteEvent),
}

impl TraceEventKind {
    /// Returns the wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TestStarted(_) => "test-started",
            Self::TestFinished(_) => "test-finished",
            Self::SubtestStarted(_) => "subtest-started",
            Self::SubtestFinished(_) => "subtest-finished",
            Self::SuiteEvent(_) => "suite_event",
        }
    }

    /// Returns the class this event belongs to, if any.
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::TestStarted(event) | Self::TestFinished(event) => Some(&event.class),
            Self::SubtestStarted(event) => Some(&event.class),
            Self::SubtestFinished(event) => Some(&event.class),
            Self::SuiteEvent(_) => None,
        }
    }
}

/// Payload for `test-started` and `test-finished`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ClassEvent {
    /// The class name.
    pub class: String,
}

/// Payload for `subtest-started`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SubtestStarted {
    /// The class name.
    pub class: String,

    /// The test name.
    pub subtest: String,

    /// Log files for this case, present only for cases that were actually started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogPaths>,
}

/// Payload for `subtest-finished`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SubtestFinished {
    /// The class name.
    pub class: String,

    /// The test name.
    pub subtest: String,

    /// The canonical status.
    pub status: CaseStatus,

    /// Human-readable explanation. Empty for passing cases.
    pub comment: String,

    /// Elapsed time in seconds.
    pub time: f64,

    /// The serialized result payload, forwarded opaquely.
    pub result: Option<serde_json::Value>,

    /// Metrics recorded by the case.
    pub metrics: Option<CaseMetrics>,

    /// Whether the case is a diff test.
    pub is_diff_test: bool,

    /// Log files for this case, present only for cases that were actually started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogPaths>,
}

/// Payload for `suite_event`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SuiteEvent {
    /// Errors as `[status, comment]` pairs.
    pub errors: Vec<(CaseStatus, String)>,
}
