// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino_tempfile::Utf8TempDir;
use casetrace_metadata::{CaseStatus, LogPaths, TraceEvent, TraceEventKind};
use casetrace_runner::{
    adapter::{DriveOutcome, InputReader, drive_session},
    config::{CasetraceConfig, RunConfig},
    reporter::{TraceReporter, TraceSink},
    run_context::{RunContext, RunContextBuilder, RunMode},
    session::RunSession,
};
use std::{io::Cursor, ops::Deref};

/// A collection with two classes and two module-level cases.
pub(crate) const COLLECTED: &str = r#"
{"type": "collected", "nodeid": "tests/test_math.py::TestAdd::test_small"}
{"type": "collected", "nodeid": "tests/test_math.py::TestAdd::test_large"}
{"type": "collected", "nodeid": "tests/test_math.py::TestDiv::test_zero", "xfail": {"reason": "division by zero is unsupported", "raises": ["ZeroDivisionError"]}}
{"type": "collected", "nodeid": "tests/test_math.py::TestDiv::test_exact", "xfail": {"reason": "rounding", "strict": true}}
{"type": "collected", "nodeid": "tests/test_io.py::test_read[small]"}
{"type": "collected", "nodeid": "tests/test_io.py::test_network", "keywords": ["not_canonize"]}
"#;

/// Phase records for every case in [`COLLECTED`].
pub(crate) const PHASES: &str = r#"
{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_small", "when": "setup", "outcome": "passed", "duration": 0.01}
{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_small", "when": "call", "outcome": "passed", "duration": 0.2, "result": {"sum": 3}}
{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_small", "when": "teardown", "outcome": "passed", "duration": 0.01}
{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_large", "when": "setup", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_large", "when": "call", "outcome": "failed", "kind": "AssertionError", "longrepr": {"path": "tests/test_math.py", "line": 12, "message": "assert 4 == 5"}}
{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_large", "when": "teardown", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_math.py::TestDiv::test_zero", "when": "setup", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_math.py::TestDiv::test_zero", "when": "call", "outcome": "xfailed", "reason": "division by zero is unsupported", "kind": "ZeroDivisionError"}
{"type": "phase", "nodeid": "tests/test_math.py::TestDiv::test_zero", "when": "teardown", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_math.py::TestDiv::test_exact", "when": "setup", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_math.py::TestDiv::test_exact", "when": "call", "outcome": "xfailed", "was-raised": false}
{"type": "phase", "nodeid": "tests/test_math.py::TestDiv::test_exact", "when": "teardown", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_io.py::test_read[small]", "when": "setup", "outcome": "skipped", "longrepr": ["tests/test_io.py", 4, "not supported"]}
{"type": "phase", "nodeid": "tests/test_io.py::test_read[small]", "when": "teardown", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_io.py::test_network", "when": "setup", "outcome": "passed"}
{"type": "phase", "nodeid": "tests/test_io.py::test_network", "when": "call", "outcome": "passed", "result": {"payload": "ignored"}}
{"type": "phase", "nodeid": "tests/test_io.py::test_network", "when": "teardown", "outcome": "passed"}
"#;

pub(crate) fn default_run_config() -> RunConfig {
    CasetraceConfig::default_config()
        .expect("default config is valid")
        .run()
        .clone()
}

/// A run context whose output directory is removed when the test ends.
pub(crate) struct TestContext {
    context: RunContext,
    _output_dir: Utf8TempDir,
}

impl Deref for TestContext {
    type Target = RunContext;

    fn deref(&self) -> &RunContext {
        &self.context
    }
}

pub(crate) fn context(
    mode: RunMode,
    configure: impl FnOnce(&mut RunContextBuilder),
) -> TestContext {
    context_with_config(mode, default_run_config(), configure)
}

pub(crate) fn context_with_config(
    mode: RunMode,
    run_config: RunConfig,
    configure: impl FnOnce(&mut RunContextBuilder),
) -> TestContext {
    let output_dir = Utf8TempDir::new().expect("temp dir created");
    let mut builder = RunContextBuilder::new(mode, ".", "test_math", run_config);
    builder.output_dir(output_dir.path()).source_root("tests");
    configure(&mut builder);
    TestContext {
        context: builder.build().expect("context is valid"),
        _output_dir: output_dir,
    }
}

/// Drives a session over `input` and returns the outcome along with the trace that was written.
pub(crate) fn drive(context: &RunContext, input: &str) -> (DriveOutcome, Vec<TraceEvent>) {
    let mut buf = Vec::new();
    let session = RunSession::new(context, TraceReporter::new(TraceSink::buffer(&mut buf)));
    let records = InputReader::new("<fixture>", Cursor::new(input.as_bytes()));
    let outcome = drive_session(session, records).expect("session runs to completion");
    (outcome, parse_trace(&buf))
}

pub(crate) fn parse_trace(buf: &[u8]) -> Vec<TraceEvent> {
    std::str::from_utf8(buf)
        .expect("trace is UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is a trace event"))
        .collect()
}

/// A finished case, as seen in the trace.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Finished {
    pub(crate) name: String,
    pub(crate) status: CaseStatus,
    pub(crate) comment: String,
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) logs: Option<LogPaths>,
}

impl Finished {
    /// Returns true if the case actually ran, as opposed to a placeholder cycle.
    pub(crate) fn started(&self) -> bool {
        self.logs.is_some()
    }
}

pub(crate) fn finished_cases(events: &[TraceEvent]) -> Vec<Finished> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            TraceEventKind::SubtestFinished(finished) => Some(Finished {
                name: format!("{}::{}", finished.class, finished.subtest),
                status: finished.status,
                comment: finished.comment.clone(),
                result: finished.result.clone(),
                logs: finished.logs.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Returns the cases that actually ran, skipping placeholder cycles.
pub(crate) fn ran(events: &[TraceEvent]) -> Vec<Finished> {
    finished_cases(events)
        .into_iter()
        .filter(Finished::started)
        .collect()
}
