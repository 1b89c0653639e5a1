// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use casetrace_metadata::{CaseStatus, TraceEventKind};
use casetrace_runner::{
    adapter::{InputReader, drive_session},
    reporter::{TraceReporter, TraceSink},
    run_context::RunMode,
    session::RunSession,
    test_filter::TestFilter,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Cursor;
use test_case::test_case;

fn full_input() -> String {
    format!("{COLLECTED}{PHASES}")
}

#[test]
fn statuses_of_a_full_run() {
    let context = context(RunMode::Run, |_| {});
    let (outcome, events) = drive(&context, &full_input());

    let ran: Vec<_> = ran(&events)
        .into_iter()
        .map(|finished| (finished.name, finished.status, finished.comment))
        .collect();
    assert_eq!(
        ran,
        [
            (
                "test_math.py::TestAdd::test_small".to_owned(),
                CaseStatus::Good,
                String::new()
            ),
            (
                "test_math.py::TestAdd::test_large".to_owned(),
                CaseStatus::Fail,
                "tests/test_math.py:12: assert 4 == 5".to_owned()
            ),
            (
                "test_math.py::TestDiv::test_zero".to_owned(),
                CaseStatus::Xfail,
                "reason: division by zero is unsupported".to_owned()
            ),
            (
                "test_math.py::TestDiv::test_exact".to_owned(),
                CaseStatus::Xpass,
                "Test unexpectedly passed".to_owned()
            ),
            (
                "test_io.py::test_read[small]".to_owned(),
                CaseStatus::Skipped,
                "not supported".to_owned()
            ),
            (
                "test_io.py::test_network".to_owned(),
                CaseStatus::Good,
                String::new()
            ),
        ]
    );

    assert_eq!(outcome.summary.total(), 6);
    assert_eq!(outcome.summary.count(CaseStatus::Good), 2);
    assert_eq!(outcome.summary.count(CaseStatus::NotLaunched), 0);
    assert!(outcome.summary.has_failures());
}

#[test]
fn results_are_canonical_and_suppressible() {
    let context = context(RunMode::Run, |_| {});
    let (_, events) = drive(&context, &full_input());
    let ran = ran(&events);

    assert_eq!(ran[0].result, Some(json!({"sum": 3})));
    assert_eq!(ran[1].result, None, "no result was recorded");
    assert_eq!(ran[5].result, None, "not_canonize suppresses the result");
}

#[test]
fn event_ordering() {
    let context = context(RunMode::Run, |_| {});
    let (_, events) = drive(&context, &full_input());

    // Every case runs through a complete cycle before the next one starts.
    let mut open_class: Option<String> = None;
    let mut open_case: Option<String> = None;
    for event in &events {
        match &event.kind {
            TraceEventKind::TestStarted(started) => {
                assert_eq!(open_class, None, "class started while another was open");
                open_class = Some(started.class.clone());
            }
            TraceEventKind::SubtestStarted(started) => {
                assert_eq!(open_class.as_deref(), Some(started.class.as_str()));
                assert_eq!(open_case, None, "case started while another was open");
                open_case = Some(started.subtest.clone());
            }
            TraceEventKind::SubtestFinished(finished) => {
                assert_eq!(open_case.take().as_deref(), Some(finished.subtest.as_str()));
            }
            TraceEventKind::TestFinished(finished) => {
                assert_eq!(open_case, None, "class finished with a case still open");
                assert_eq!(open_class.take().as_deref(), Some(finished.class.as_str()));
            }
            TraceEventKind::SuiteEvent(_) => {
                assert_eq!(open_case, None);
            }
        }
    }
    assert_eq!(open_class, None);

    // Timestamps never go backwards.
    assert!(
        events
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    );

    // Six placeholder cycles, then six real ones.
    let finished = finished_cases(&events);
    assert_eq!(finished.len(), 12);
    assert!(
        finished[..6]
            .iter()
            .all(|finished| finished.status == CaseStatus::NotLaunched && !finished.started())
    );
    assert!(finished[6..].iter().all(|finished| finished.started()));
}

#[test]
fn truncated_run_reports_crash_and_not_launched() {
    let context = context(RunMode::Run, |_| {});
    let input = format!(
        "{COLLECTED}{}",
        r#"{"type": "phase", "nodeid": "tests/test_math.py::TestAdd::test_small", "when": "setup", "outcome": "passed"}"#
    );
    let (outcome, events) = drive(&context, &input);

    let ran = ran(&events);
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, CaseStatus::Crashed);
    assert_eq!(outcome.summary.count(CaseStatus::Crashed), 1);
    assert_eq!(outcome.summary.count(CaseStatus::NotLaunched), 5);
}

#[test]
fn collection_errors_are_suite_events() {
    let context = context(RunMode::Run, |_| {});
    let input = format!(
        "{}{COLLECTED}",
        r#"{"type": "collect-error", "nodeid": "tests/test_broken.py", "longrepr": "ImportError: cannot import name 'gone'"}"#
    );
    let (outcome, events) = drive(&context, &input);

    let errors: Vec<_> = events
        .iter()
        .filter_map(|event| match &event.kind {
            TraceEventKind::SuiteEvent(suite) => Some(suite.errors.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        errors,
        [vec![(
            CaseStatus::Fail,
            "ImportError: cannot import name 'gone'".to_owned()
        )]]
    );
    assert_eq!(outcome.summary.collection_errors(), 1);
    assert!(outcome.summary.has_failures());
}

#[test_case(false, CaseStatus::Xfail ; "marker honored")]
#[test_case(true, CaseStatus::Fail ; "run xfail with raises restriction")]
fn run_xfail_mode(run_xfail: bool, expected: CaseStatus) {
    let mut run_config = default_run_config();
    run_config.run_xfail = run_xfail;
    let context = context_with_config(RunMode::Run, run_config, |_| {});
    let (_, events) = drive(&context, &full_input());
    let zero = ran(&events)
        .into_iter()
        .find(|finished| finished.name.ends_with("test_zero"))
        .expect("test_zero ran");
    assert_eq!(zero.status, expected);
}

#[test]
fn filtered_cases_are_deselected() {
    let mut run_config = default_run_config();
    run_config.report_deselected = true;
    let context = context_with_config(RunMode::Run, run_config, |builder| {
        builder.filter(TestFilter::new(["test_io.py"], Vec::<String>::new()).unwrap());
    });
    let (outcome, events) = drive(&context, &full_input());

    let deselected: Vec<_> = finished_cases(&events)
        .into_iter()
        .filter(|finished| finished.status == CaseStatus::Deselected)
        .map(|finished| finished.name)
        .collect();
    assert_eq!(deselected.len(), 4);
    assert!(deselected.iter().all(|name| name.starts_with("test_math.py")));

    let ran: Vec<_> = ran(&events).into_iter().map(|finished| finished.name).collect();
    assert_eq!(
        ran,
        ["test_io.py::test_read[small]", "test_io.py::test_network"]
    );
    assert_eq!(outcome.listing.len(), 2);
}

#[test]
fn file_sink_leaves_valid_prefix() {
    let dir = Utf8TempDir::new().unwrap();
    let trace = dir.path().join("nested").join("trace.jsonl");
    let context = context(RunMode::Run, |builder| {
        builder.trace_path(&trace);
    });

    let sink = TraceSink::open(context.trace_path().unwrap()).unwrap();
    assert_eq!(sink.path(), Some(trace.as_path()));
    let session = RunSession::new(&context, TraceReporter::new(sink));
    let input = full_input();
    let records = InputReader::new("<fixture>", Cursor::new(input.as_bytes()));
    let outcome = drive_session(session, records).unwrap();
    assert_eq!(outcome.summary.total(), 6);

    let contents = std::fs::read(&trace).unwrap();
    let events = parse_trace(&contents);
    assert_eq!(ran(&events).len(), 6);
}

#[test]
fn case_logs_exist_for_started_cases() {
    let context = context(RunMode::Run, |_| {});
    let (_, events) = drive(&context, &full_input());

    let ran = ran(&events);
    assert_eq!(ran.len(), 6);
    for finished in &ran {
        let logs = finished.logs.as_ref().expect("started cases report logs");
        let path = &logs["log"];
        let contents = std::fs::read_to_string(path)
            .unwrap_or_else(|error| panic!("log for {} at {path}: {error}", finished.name));
        let subtest = finished.name.rsplit("::").next().unwrap();
        assert!(
            contents.contains(subtest),
            "log for {} names the case:\n{contents}",
            finished.name
        );
        assert!(contents.contains(&format!("Test finished: {}", finished.status)));
    }
}

#[test]
fn skip_during_call() {
    let context = context(RunMode::Run, |_| {});
    let input = indoc::indoc! {r#"
        {"type": "collected", "nodeid": "tests/test_io.py::test_write"}
        {"type": "phase", "nodeid": "tests/test_io.py::test_write", "when": "setup", "outcome": "passed"}
        {"type": "phase", "nodeid": "tests/test_io.py::test_write", "when": "call", "outcome": "skipped", "longrepr": ["tests/test_io.py", 9, "not supported"]}
        {"type": "phase", "nodeid": "tests/test_io.py::test_write", "when": "teardown", "outcome": "passed"}
    "#};
    let (outcome, events) = drive(&context, input);

    let ran: Vec<_> = ran(&events)
        .into_iter()
        .map(|finished| (finished.name, finished.status, finished.comment))
        .collect();
    assert_eq!(
        ran,
        [(
            "test_io.py::test_write".to_owned(),
            CaseStatus::Skipped,
            "not supported".to_owned()
        )]
    );
    assert!(!outcome.summary.has_failures());
}
