// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The name of the file, in the output directory, that a run publishes its environment to.
pub const TEST_ENVIRONMENT_FILE_NAME: &str = "test_environment.json";

/// The environment a run publishes for the cases it tracks.
///
/// Written once per run, before any case starts, as a single JSON object. Paths are absolute or
/// relative to the directory casetrace was started from.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestEnvironmentSummary {
    /// The directory per-case logs and the run log are written to.
    pub output_dir: String,

    /// The root of the source tree, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,

    /// The root of the build tree, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_root: Option<String>,

    /// The root of the test data, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<String>,

    /// Dependency build roots, in the order they were given.
    #[serde(default)]
    pub dep_roots: Vec<String>,

    /// Directories to look up binaries the cases depend on, most specific first.
    #[serde(default)]
    pub binary_search_dirs: Vec<String>,

    /// Test parameters given as `key=value`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// The free-form context.
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    /// The suffix appended to every test name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suffix: Option<String>,
}

impl TestEnvironmentSummary {
    /// Returns a test parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}
