// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The canonical status of a single test case, as reported in the trace.
///
/// This is a closed set: consumers can match on it exhaustively.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "proptest1", derive(test_strategy::Arbitrary))]
pub enum CaseStatus {
    /// The case ran and every phase passed.
    Good,

    /// The case failed.
    Fail,

    /// The case was skipped, either by the case itself or by a setup failure under an
    /// expected-failure marker.
    Skipped,

    /// The case was expected to fail, and it did.
    Xfail,

    /// The case was expected to fail, but it passed.
    Xpass,

    /// The case was started but the worker never reported an outcome for it.
    Crashed,

    /// The case was collected but never dispatched for execution.
    NotLaunched,

    /// The case was removed by a test filter.
    Deselected,
}

impl CaseStatus {
    /// All known statuses, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Good,
        Self::Fail,
        Self::Skipped,
        Self::Xfail,
        Self::Xpass,
        Self::Crashed,
        Self::NotLaunched,
        Self::Deselected,
    ];

    /// Returns the string used for this status on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fail => "fail",
            Self::Skipped => "skipped",
            Self::Xfail => "xfail",
            Self::Xpass => "xpass",
            Self::Crashed => "crashed",
            Self::NotLaunched => "not_launched",
            Self::Deselected => "deselected",
        }
    }

    /// Returns true if this status should make a test run fail.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Xpass | Self::Crashed)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned while parsing a [`CaseStatus`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaseStatusParseError {
    input: String,
}

impl fmt::Display for CaseStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized case status: {} (known values: ", self.input)?;
        for (i, status) in CaseStatus::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(status.as_str())?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for CaseStatusParseError {}

impl FromStr for CaseStatus {
    type Err = CaseStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CaseStatusParseError { input: s.to_owned() })
    }
}
