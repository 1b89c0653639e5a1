// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming trace events to the external consumer.
//!
//! The [`TraceReporter`] writes one JSON object per line and flushes after every event, so a
//! crashed worker always leaves a valid prefix of the trace behind.

use crate::{
    errors::{ResultSerializeError, TraceSinkOpenError, WriteEventError},
    identity::CaseIdentity,
};
use bytesize::ByteSize;
use camino::{Utf8Path, Utf8PathBuf};
use casetrace_metadata::{
    CaseMetrics, CaseStatus, ClassEvent, LogPaths, SubtestFinished, SubtestStarted, SuiteEvent,
    TraceEvent, TraceEventKind,
};
use chrono::Utc;
use debug_ignore::DebugIgnore;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufWriter, Write},
};
use tracing::error;

/// The default limit on the canonical size of a case's result payload.
pub const DEFAULT_RESULT_MAX_SIZE: ByteSize = ByteSize::mib(1);

/// The default limit on how deeply a result payload may be nested.
pub const DEFAULT_RESULT_MAX_DEPTH: usize = 64;

/// Where trace events are written.
#[derive(Debug)]
pub enum TraceSink<'a> {
    /// A file, created or truncated when the sink is opened.
    File {
        /// The path to the file.
        path: Utf8PathBuf,

        /// The writer.
        writer: BufWriter<File>,
    },

    /// An in-memory buffer.
    Buffer(&'a mut Vec<u8>),

    /// Events are discarded.
    Dry,
}

impl TraceSink<'static> {
    /// Creates or truncates the trace file at `path`.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, TraceSinkOpenError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| TraceSinkOpenError::new(path.clone(), error))?;
        }
        let file =
            File::create(&path).map_err(|error| TraceSinkOpenError::new(path.clone(), error))?;
        Ok(Self::File {
            path,
            writer: BufWriter::new(file),
        })
    }
}

impl<'a> TraceSink<'a> {
    /// Creates a sink that appends to `buf`.
    pub fn buffer(buf: &'a mut Vec<u8>) -> Self {
        Self::Buffer(buf)
    }

    /// Returns the path to the trace file, if this is a file sink.
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Buffer(_) | Self::Dry => None,
        }
    }

    /// Returns true if events are discarded.
    pub fn is_dry(&self) -> bool {
        matches!(self, Self::Dry)
    }

    fn write_event(&mut self, event: &TraceEvent) -> Result<(), WriteEventError> {
        match self {
            Self::File { path, writer } => {
                serde_json::to_writer(&mut *writer, event).map_err(WriteEventError::Serialize)?;
                writer
                    .write_all(b"\n")
                    .and_then(|()| writer.flush())
                    .map_err(|error| WriteEventError::Fs {
                        file: path.clone(),
                        error,
                    })
            }
            Self::Buffer(buf) => {
                serde_json::to_writer(&mut **buf, event).map_err(WriteEventError::Serialize)?;
                buf.push(b'\n');
                Ok(())
            }
            Self::Dry => Ok(()),
        }
    }
}

/// Converts a case's result payload into the form that is emitted.
pub trait ResultSerializer {
    /// Returns the value to emit, or an error if the result cannot be reported.
    fn serialize(&self, result: &Value) -> Result<Value, ResultSerializeError>;
}

/// The default [`ResultSerializer`].
///
/// Object keys are emitted in sorted order. Results that are nested too deeply or whose compact
/// JSON form is too large are rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanonicalResultSerializer {
    max_size: ByteSize,
    max_depth: usize,
}

impl CanonicalResultSerializer {
    /// Creates a serializer with the given size limit and the default depth limit.
    pub fn new(max_size: ByteSize) -> Self {
        Self {
            max_size,
            max_depth: DEFAULT_RESULT_MAX_DEPTH,
        }
    }

    /// Sets the depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for CanonicalResultSerializer {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_MAX_SIZE)
    }
}

impl ResultSerializer for CanonicalResultSerializer {
    fn serialize(&self, result: &Value) -> Result<Value, ResultSerializeError> {
        if exceeds_depth(result, self.max_depth) {
            return Err(ResultSerializeError::TooDeep {
                limit: self.max_depth,
            });
        }

        let canonical = canonicalize(result);
        let bytes = serde_json::to_vec(&canonical).map_err(ResultSerializeError::Json)?;
        let size = ByteSize::b(bytes.len() as u64);
        if size > self.max_size {
            return Err(ResultSerializeError::TooLarge {
                size,
                limit: self.max_size,
            });
        }

        Ok(canonical)
    }
}

/// Returns a copy of `value` with object keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(entries) => Value::Array(entries.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        other => other.clone(),
    }
}

fn exceeds_depth(value: &Value, max_depth: usize) -> bool {
    let mut stack = vec![(value, 0_usize)];
    while let Some((value, depth)) = stack.pop() {
        let children: Box<dyn Iterator<Item = &Value>> = match value {
            Value::Array(entries) => Box::new(entries.iter()),
            Value::Object(map) => Box::new(map.values()),
            _ => continue,
        };
        if depth >= max_depth {
            return true;
        }
        stack.extend(children.map(|child| (child, depth + 1)));
    }
    false
}

/// A finished case, ready to be reported.
#[derive(Clone, Debug)]
pub struct FinishedCase<'a> {
    /// The identity of the case.
    pub identity: &'a CaseIdentity,

    /// The resolved status.
    pub status: CaseStatus,

    /// The explanation.
    pub comment: &'a str,

    /// The duration in seconds.
    pub duration: f64,

    /// The result payload, if any.
    pub result: Option<&'a Value>,

    /// Metrics recorded during the case.
    pub metrics: Option<&'a CaseMetrics>,

    /// Whether the case is a diff test.
    pub is_diff_test: bool,

    /// The log paths for the case.
    pub logs: Option<&'a LogPaths>,
}

/// Writes trace events for a run.
#[derive(Debug)]
pub struct TraceReporter<'a> {
    sink: TraceSink<'a>,
    serializer: DebugIgnore<Box<dyn ResultSerializer + 'a>>,
}

impl<'a> TraceReporter<'a> {
    /// Creates a new reporter writing to `sink` with the default result serializer.
    pub fn new(sink: TraceSink<'a>) -> Self {
        Self::with_serializer(sink, CanonicalResultSerializer::default())
    }

    /// Creates a new reporter with a custom result serializer.
    pub fn with_serializer(sink: TraceSink<'a>, serializer: impl ResultSerializer + 'a) -> Self {
        Self {
            sink,
            serializer: DebugIgnore(Box::new(serializer)),
        }
    }

    /// Returns the sink.
    pub fn sink(&self) -> &TraceSink<'a> {
        &self.sink
    }

    /// Reports the start of a class.
    pub fn on_start_class(&mut self, class: &str) -> Result<(), WriteEventError> {
        self.trace(TraceEventKind::TestStarted(ClassEvent {
            class: class.to_owned(),
        }))
    }

    /// Reports the end of a class.
    pub fn on_finish_class(&mut self, class: &str) -> Result<(), WriteEventError> {
        self.trace(TraceEventKind::TestFinished(ClassEvent {
            class: class.to_owned(),
        }))
    }

    /// Reports the start of a case.
    pub fn on_start_case(
        &mut self,
        identity: &CaseIdentity,
        logs: Option<&LogPaths>,
    ) -> Result<(), WriteEventError> {
        self.trace(TraceEventKind::SubtestStarted(SubtestStarted {
            class: identity.class_name().to_owned(),
            subtest: identity.test_name().to_owned(),
            logs: logs.cloned(),
        }))
    }

    /// Reports the end of a case and returns the status that was reported.
    ///
    /// If the result payload cannot be serialized, the case is reported as failed instead.
    pub fn on_finish_case(
        &mut self,
        case: &FinishedCase<'_>,
    ) -> Result<CaseStatus, WriteEventError> {
        let mut status = case.status;
        let mut comment = case.comment.to_owned();
        let result = match case.result {
            Some(result) if !result.is_null() => match self.serializer.serialize(result) {
                Ok(result) => Some(result),
                Err(err) => {
                    error!("error serializing result for {}: {err}", case.identity);
                    status = CaseStatus::Fail;
                    comment = format!("Invalid test result: {err}");
                    None
                }
            },
            _ => None,
        };

        self.trace(TraceEventKind::SubtestFinished(SubtestFinished {
            class: case.identity.class_name().to_owned(),
            subtest: case.identity.test_name().to_owned(),
            status,
            comment,
            time: case.duration,
            result,
            metrics: case.metrics.cloned(),
            is_diff_test: case.is_diff_test,
            logs: case.logs.cloned(),
        }))?;
        Ok(status)
    }

    /// Reports an error that is not attached to a case, such as a collection error.
    pub fn on_error(&mut self, status: CaseStatus, comment: &str) -> Result<(), WriteEventError> {
        self.trace(TraceEventKind::SuiteEvent(SuiteEvent {
            errors: vec![(status, comment.to_owned())],
        }))
    }

    /// Flushes and closes the sink.
    pub fn finish(self) -> Result<(), WriteEventError> {
        match self.sink {
            TraceSink::File { path, mut writer } => writer
                .flush()
                .map_err(|error| WriteEventError::Fs { file: path, error }),
            TraceSink::Buffer(_) | TraceSink::Dry => Ok(()),
        }
    }

    fn trace(&mut self, kind: TraceEventKind) -> Result<(), WriteEventError> {
        if self.sink.is_dry() {
            return Ok(());
        }
        let event = TraceEvent {
            timestamp: timestamp_now(),
            kind,
        };
        self.sink.write_event(&event)
    }
}

fn timestamp_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
