// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use casetrace_metadata::{CaseStatus, ListedCase};
use casetrace_runner::{
    partition::{Partitioner, SplitBy},
    run_context::RunMode,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

/// Seven cases: four in `TestA`, three in `TestB`.
const SEVEN_CASES: &str = r#"
{"type": "collected", "nodeid": "test_shard.py::TestB::test_3"}
{"type": "collected", "nodeid": "test_shard.py::TestA::test_1"}
{"type": "collected", "nodeid": "test_shard.py::TestA::test_2"}
{"type": "collected", "nodeid": "test_shard.py::TestB::test_1"}
{"type": "collected", "nodeid": "test_shard.py::TestA::test_3"}
{"type": "collected", "nodeid": "test_shard.py::TestA::test_4"}
{"type": "collected", "nodeid": "test_shard.py::TestB::test_2"}
"#;

fn listing(modulo: u64, index: u64, split_by: SplitBy) -> Vec<ListedCase> {
    let context = context(RunMode::List, |builder| {
        builder.partitioner(Partitioner::new(modulo, index, split_by).unwrap());
    });
    let (outcome, events) = drive(&context, SEVEN_CASES);
    assert!(events.is_empty(), "list mode writes no events");
    outcome.listing
}

#[test]
fn classes_are_not_split() {
    let shards: Vec<Vec<String>> = (0..3)
        .map(|index| {
            listing(3, index, SplitBy::Class)
                .into_iter()
                .map(|case| format!("{}::{}", case.class, case.test))
                .collect()
        })
        .collect();

    assert_eq!(
        shards,
        [
            vec![
                "test_shard.py::TestA::test_1",
                "test_shard.py::TestA::test_2",
                "test_shard.py::TestA::test_3",
                "test_shard.py::TestA::test_4",
            ],
            vec![
                "test_shard.py::TestB::test_1",
                "test_shard.py::TestB::test_2",
                "test_shard.py::TestB::test_3",
            ],
            vec![],
        ]
    );
}

#[test]
fn shards_cover_collection_exactly_once() {
    for split_by in [SplitBy::Class, SplitBy::Case] {
        for modulo in 1..=8 {
            let mut seen = Vec::new();
            for index in 0..modulo {
                seen.extend(listing(modulo, index, split_by));
            }
            let unique: BTreeSet<_> = seen
                .iter()
                .map(|case| (case.class.clone(), case.test.clone()))
                .collect();
            assert_eq!(seen.len(), 7, "{split_by} split into {modulo}");
            assert_eq!(unique.len(), 7, "{split_by} split into {modulo}");
        }
    }
}

#[test]
fn each_worker_reports_only_its_shard() {
    let input = format!(
        "{SEVEN_CASES}{}",
        r#"
{"type": "phase", "nodeid": "test_shard.py::TestA::test_1", "when": "setup", "outcome": "passed"}
{"type": "phase", "nodeid": "test_shard.py::TestA::test_1", "when": "call", "outcome": "passed"}
{"type": "phase", "nodeid": "test_shard.py::TestA::test_1", "when": "teardown", "outcome": "passed"}
{"type": "phase", "nodeid": "test_shard.py::TestB::test_1", "when": "setup", "outcome": "passed"}
{"type": "phase", "nodeid": "test_shard.py::TestB::test_1", "when": "call", "outcome": "failed", "longrepr": "boom"}
{"type": "phase", "nodeid": "test_shard.py::TestB::test_1", "when": "teardown", "outcome": "passed"}
"#
    );

    let context = context(RunMode::Run, |builder| {
        builder.partitioner(Partitioner::new(3, 1, SplitBy::Class).unwrap());
    });
    let (outcome, events) = drive(&context, &input);

    // TestA belongs to shard 0, so its phases are ignored here.
    let ran: Vec<_> = ran(&events)
        .into_iter()
        .map(|finished| (finished.name, finished.status))
        .collect();
    assert_eq!(
        ran,
        [("test_shard.py::TestB::test_1".to_owned(), CaseStatus::Fail)]
    );
    assert_eq!(outcome.summary.count(CaseStatus::NotLaunched), 2);
    assert_eq!(outcome.summary.total(), 3);
}
