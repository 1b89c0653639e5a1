// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// One entry of the flat listing produced in list mode.
///
/// The listing is a single JSON array: `[{"class": ..., "test": ...}, ...]`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ListedCase {
    /// The class name.
    pub class: String,

    /// The test name.
    pub test: String,
}
