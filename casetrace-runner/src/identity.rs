// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable, filter-matchable identities for test cases.
//!
//! The execution framework hands out opaque locators such as `dir/test_mod.py::TestFoo::test_a[1]`.
//! These are turned into a [`CaseIdentity`]: a class name and a test name that are safe to use as
//! report keys and file names, plus the key used to keep same-class cases together when sharding.

use camino::{Utf8Path, Utf8PathBuf};
use casetrace_metadata::LogPaths;
use std::{collections::HashSet, fmt};
use swrite::{SWrite, swrite};

/// Separator between components of a locator and of a canonical identity.
pub const SEPARATOR: &str = "::";

// Legacy locators contain an instance segment between the class and the test name.
const INSTANCE_SEGMENT: &str = "()";

/// The identity of a single test case.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CaseIdentity {
    raw_id: String,
    class_name: String,
    test_name: String,
    group: Option<String>,
}

impl CaseIdentity {
    /// Derives an identity from a raw locator.
    ///
    /// `suffix` is a run-wide disambiguator appended to the test name, if any.
    pub fn new(raw_id: impl Into<String>, suffix: Option<&str>) -> Self {
        let raw_id = raw_id.into();
        let split = split_locator(&raw_id, suffix);
        let class_name = normalize_name(&split.class_name);
        let group = split.class_scoped.then(|| class_name.clone());
        Self {
            class_name,
            test_name: normalize_name(&split.test_name),
            group,
            raw_id,
        }
    }

    /// Returns the locator this identity was derived from.
    pub fn raw_id(&self) -> &str {
        &self.raw_id
    }

    /// Returns the normalized class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the normalized test name.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Returns the key that same-class cases share, or `None` for standalone cases.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Returns the canonical `class::test` string.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl AsRef<CaseIdentity> for CaseIdentity {
    fn as_ref(&self) -> &CaseIdentity {
        self
    }
}

impl fmt::Display for CaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.class_name, self.test_name)
    }
}

struct SplitLocator {
    class_name: String,
    test_name: String,
    class_scoped: bool,
}

fn split_locator(raw_id: &str, suffix: Option<&str>) -> SplitLocator {
    // Parameters may themselves contain "::", so they're split off first.
    let (path, params) = match raw_id.find('[') {
        Some(idx) => raw_id.split_at(idx),
        None => (raw_id, ""),
    };

    let (file, test_path) = match path.split_once(SEPARATOR) {
        Some((file, rest)) => (file, Some(rest)),
        None => (path, None),
    };
    let file_name = base_name(file.trim());

    let mut class_name = file_name.to_owned();
    let mut class_scoped = false;
    let segments: Vec<&str> = test_path
        .into_iter()
        .flat_map(|test_path| test_path.split(SEPARATOR))
        .filter(|segment| *segment != INSTANCE_SEGMENT)
        .collect();
    let test = match segments.as_slice() {
        [] => file_name,
        [test] => *test,
        [class, .., test] => {
            swrite!(class_name, "{SEPARATOR}{class}");
            class_scoped = true;
            *test
        }
    };
    let test = if test.is_empty() { file_name } else { test };

    let mut test_name = format!("{test}{params}");
    if let Some(suffix) = suffix {
        swrite!(test_name, "{SEPARATOR}{suffix}");
    }

    SplitLocator {
        class_name,
        test_name,
        class_scoped,
    }
}

fn base_name(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, name)) => name,
        None => path,
    }
}

/// Escapes characters that would make a name unsafe as a report key.
///
/// Backslashes, newlines, tabs and carriage returns are replaced with their escaped forms.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Replaces characters that are not safe in file names with `_`.
pub fn normalize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// The maximum length in bytes of a generated log file name.
pub const MAX_FILE_NAME_LEN: usize = 200;

const LOG_EXTENSION: &str = "log";

/// The key of the per-case log file in [`LogPaths`].
pub const CASE_LOG_KEY: &str = "log";

/// The key of the log directory in [`LogPaths`].
pub const LOGS_DIR_KEY: &str = "logsdir";

/// Assigns per-case log file paths inside the output directory.
///
/// File names are derived from the class and test names. Names that collide within one run get a
/// numeric disambiguator before the extension.
#[derive(Clone, Debug)]
pub struct LogPathAllocator {
    output_dir: Utf8PathBuf,
    used: HashSet<String>,
}

impl LogPathAllocator {
    /// Creates a new allocator for the given output directory.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            used: HashSet::new(),
        }
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Allocates the log paths for a case.
    pub fn allocate(&mut self, identity: &CaseIdentity) -> LogPaths {
        let stem = normalize_filename(&format!(
            "{}.{}",
            identity.class_name(),
            identity.test_name()
        ));

        let mut file_name = Self::file_name(&stem, None);
        let mut index = 0;
        while self.used.contains(&file_name) {
            index += 1;
            file_name = Self::file_name(&stem, Some(index));
        }
        self.used.insert(file_name.clone());

        let mut paths = LogPaths::new();
        paths.insert(
            CASE_LOG_KEY.to_owned(),
            self.output_dir.join(&file_name).into_string(),
        );
        paths.insert(LOGS_DIR_KEY.to_owned(), self.output_dir.to_string());
        paths
    }

    fn file_name(stem: &str, index: Option<usize>) -> String {
        let tail = match index {
            Some(index) => format!(".{index}.{LOG_EXTENSION}"),
            None => format!(".{LOG_EXTENSION}"),
        };
        let stem = truncate_at_char_boundary(stem, MAX_FILE_NAME_LEN.saturating_sub(tail.len()));
        format!("{stem}{tail}")
    }
}

fn truncate_at_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
