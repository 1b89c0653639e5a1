// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `casetrace` failures.
///
/// `casetrace` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum CasetraceExitCode {}

impl CasetraceExitCode {
    /// No errors occurred and casetrace exited normally.
    pub const OK: i32 = 0;

    /// One or more cases failed, passed unexpectedly, or crashed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Reading or parsing the framework input produced an error.
    pub const INPUT_READ_FAILED: i32 = 104;

    /// Writing the trace, the listing, or other output produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a casetrace invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// A test filter failed to compile.
    pub const INVALID_FILTER: i32 = 94;
}
