// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering cases based on user-specified tokens.
//!
//! The main structure in this module is [`TestFilter`], which holds two lists of tokens: one
//! matched against the file a case is defined in, and one matched against its name. A case is
//! selected if it matches any token of every non-empty list.

use crate::{
    errors::{FilterListKind, TestFilterBuilderError},
    identity::{CaseIdentity, SEPARATOR},
};
use tracing::debug;

/// A glob pattern with generic (non-path) semantics.
///
/// `globset::GlobMatcher` treats its input as a path, so the glob is compiled to a regex directly.
#[derive(Clone, Debug)]
struct GenericGlob {
    regex: regex::bytes::Regex,
}

impl GenericGlob {
    fn new(list: FilterListKind, glob_str: &str) -> Result<Self, TestFilterBuilderError> {
        let glob = globset::GlobBuilder::new(glob_str)
            .backslash_escape(false)
            .build()
            .map_err(|error| TestFilterBuilderError::InvalidGlob {
                list,
                pattern: glob_str.to_owned(),
                error,
            })?;

        let regex = regex::bytes::Regex::new(glob.regex()).map_err(|error| {
            TestFilterBuilderError::Regex {
                list,
                pattern: glob_str.to_owned(),
                error,
            }
        })?;

        Ok(Self { regex })
    }

    fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s.as_bytes())
    }
}

/// Replaces brackets and braces with entities so that they are matched literally.
///
/// Only `*` and `?` remain special, so parameter blocks such as `test_a[1]` and names containing
/// `{` match verbatim.
pub fn escape_for_glob(s: &str) -> String {
    s.replace('[', "&#91;")
        .replace(']', "&#93;")
        .replace('{', "&#123;")
        .replace('}', "&#125;")
}

/// A single compiled filter token.
#[derive(Clone, Debug)]
struct FilterPattern {
    token: String,
    glob: GenericGlob,
}

impl FilterPattern {
    fn new(list: FilterListKind, raw: &str) -> Result<Self, TestFilterBuilderError> {
        if raw.is_empty() {
            return Err(TestFilterBuilderError::EmptyPattern { list });
        }

        let mut token = match list {
            FilterListKind::File => raw.replace('/', "."),
            FilterListKind::Name => raw.to_owned(),
        };
        // A bare module or class name selects everything inside it.
        if !token.contains(SEPARATOR) && !token.contains('*') {
            token.push('*');
        }

        let glob = GenericGlob::new(list, &escape_for_glob(&token))?;
        Ok(Self { token, glob })
    }

    fn is_match(&self, candidate: &MatchCandidate) -> bool {
        candidate.canonical.ends_with(&self.token) || self.glob.is_match(&candidate.escaped)
    }
}

struct MatchCandidate {
    canonical: String,
    escaped: String,
}

impl MatchCandidate {
    fn new(identity: &CaseIdentity) -> Self {
        let canonical = identity.canonical();
        let escaped = escape_for_glob(&canonical);
        Self { canonical, escaped }
    }
}

/// The tokens of one filter list.
#[derive(Clone, Debug)]
pub struct FilterPatterns {
    kind: FilterListKind,
    patterns: Vec<FilterPattern>,
}

impl FilterPatterns {
    /// Compiles the tokens of one list.
    pub fn new<I, S>(kind: FilterListKind, tokens: I) -> Result<Self, TestFilterBuilderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = tokens
            .into_iter()
            .map(|token| FilterPattern::new(kind, token.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { kind, patterns })
    }

    /// Returns which list these patterns belong to.
    pub fn kind(&self) -> FilterListKind {
        self.kind
    }

    /// Returns true if no tokens were provided, in which case everything matches.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the tokens after the implicit trailing `*` was added.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|pattern| pattern.token.as_str())
    }

    /// Returns true if the identity matches any of the tokens.
    pub fn is_match(&self, identity: &CaseIdentity) -> bool {
        self.is_match_candidate(&MatchCandidate::new(identity))
    }

    fn is_match_candidate(&self, candidate: &MatchCandidate) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| pattern.is_match(candidate))
    }
}

/// Whether a case matched a [`TestFilter`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// The case matched both lists.
    Matches,

    /// The case was filtered out.
    Mismatch {
        /// The list that rejected the case.
        reason: FilterListKind,
    },
}

impl FilterMatch {
    /// Returns true if the case matched.
    pub fn is_match(self) -> bool {
        matches!(self, Self::Matches)
    }
}

/// The result of applying a [`TestFilter`] to a collection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilterOutcome<T> {
    /// Cases that matched, in input order.
    pub selected: Vec<T>,

    /// Cases that were filtered out, in the order they were rejected: file-list rejections first,
    /// then name-list rejections.
    pub deselected: Vec<(T, FilterListKind)>,
}

/// Selects cases by file and by name.
#[derive(Clone, Debug)]
pub struct TestFilter {
    file_patterns: FilterPatterns,
    name_patterns: FilterPatterns,
}

impl TestFilter {
    /// Compiles a filter from the file list and the name list.
    pub fn new<F, N>(file_tokens: F, name_tokens: N) -> Result<Self, TestFilterBuilderError>
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        Ok(Self {
            file_patterns: FilterPatterns::new(FilterListKind::File, file_tokens)?,
            name_patterns: FilterPatterns::new(FilterListKind::Name, name_tokens)?,
        })
    }

    /// Creates a filter that matches everything.
    pub fn all() -> Self {
        Self {
            file_patterns: FilterPatterns {
                kind: FilterListKind::File,
                patterns: Vec::new(),
            },
            name_patterns: FilterPatterns {
                kind: FilterListKind::Name,
                patterns: Vec::new(),
            },
        }
    }

    /// Returns the file list.
    pub fn file_patterns(&self) -> &FilterPatterns {
        &self.file_patterns
    }

    /// Returns the name list.
    pub fn name_patterns(&self) -> &FilterPatterns {
        &self.name_patterns
    }

    /// Returns true if this filter selects everything.
    pub fn is_all(&self) -> bool {
        self.file_patterns.is_empty() && self.name_patterns.is_empty()
    }

    /// Checks a single case against both lists.
    pub fn filter_match(&self, identity: &CaseIdentity) -> FilterMatch {
        let candidate = MatchCandidate::new(identity);
        if !self.file_patterns.is_match_candidate(&candidate) {
            FilterMatch::Mismatch {
                reason: FilterListKind::File,
            }
        } else if !self.name_patterns.is_match_candidate(&candidate) {
            FilterMatch::Mismatch {
                reason: FilterListKind::Name,
            }
        } else {
            FilterMatch::Matches
        }
    }

    /// Splits `cases` into selected and deselected cases.
    ///
    /// The file list is applied first, then the name list, so deselected cases come out in that
    /// order.
    pub fn apply<T>(&self, cases: impl IntoIterator<Item = T>) -> FilterOutcome<T>
    where
        T: AsRef<CaseIdentity>,
    {
        let mut outcome = FilterOutcome {
            selected: cases.into_iter().collect(),
            deselected: Vec::new(),
        };

        for patterns in [&self.file_patterns, &self.name_patterns] {
            if patterns.is_empty() {
                continue;
            }
            let (selected, deselected): (Vec<_>, Vec<_>) = outcome
                .selected
                .into_iter()
                .partition(|case| patterns.is_match(case.as_ref()));
            debug!(
                "{} filter list: {} selected, {} deselected",
                patterns.kind(),
                selected.len(),
                deselected.len(),
            );
            outcome.selected = selected;
            outcome
                .deselected
                .extend(deselected.into_iter().map(|case| (case, patterns.kind())));
        }

        outcome
    }
}
