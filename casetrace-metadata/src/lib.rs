// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable output for casetrace.
//!
//! casetrace writes a trace of test events, one JSON object per line, for a build or test
//! orchestrator to consume. This crate contains the serializable types for that stream, for the
//! flat listing produced in list mode, for the environment a run publishes to its cases, and the
//! documented exit codes.
//!
//! The types here are stable: they describe an external format, not the internals of the runner.

mod environment;
mod events;
mod exit_codes;
mod list;
mod status;

pub use environment::*;
pub use events::*;
pub use exit_codes::*;
pub use list::*;
pub use status::*;
