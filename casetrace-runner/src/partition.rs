// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for splitting a collected set of cases across several workers.
//!
//! Cases are sorted, coalesced into groups, and the groups are handed out in contiguous chunks of
//! equal size. Every worker computes the same grouping, so the shards of all workers together
//! cover the whole set exactly once.

use crate::{errors::PartitionerBuildError, identity::CaseIdentity};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{fmt, str::FromStr};
use tracing::debug;

/// How cases are coalesced before being split into shards.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitBy {
    /// Cases of one class always end up in the same shard.
    #[default]
    Class,

    /// Every case is split individually.
    Case,
}

impl fmt::Display for SplitBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => f.write_str("class"),
            Self::Case => f.write_str("case"),
        }
    }
}

impl FromStr for SplitBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" => Ok(Self::Class),
            "case" => Ok(Self::Case),
            other => Err(format!(
                "unknown split mode `{other}` (expected `class` or `case`)"
            )),
        }
    }
}

/// Selects the shard of cases owned by one worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Partitioner {
    modulo: u64,
    index: u64,
    split_by: SplitBy,
}

impl Partitioner {
    /// Creates a new partitioner for shard `index` out of `modulo`.
    pub fn new(modulo: u64, index: u64, split_by: SplitBy) -> Result<Self, PartitionerBuildError> {
        if modulo == 0 {
            return Err(PartitionerBuildError::ZeroModulo);
        }
        if index >= modulo {
            return Err(PartitionerBuildError::IndexOutOfRange { index, modulo });
        }
        Ok(Self {
            modulo,
            index,
            split_by,
        })
    }

    /// Returns a partitioner that owns everything.
    pub fn single() -> Self {
        Self {
            modulo: 1,
            index: 0,
            split_by: SplitBy::Class,
        }
    }

    /// Returns the number of shards.
    pub fn modulo(&self) -> u64 {
        self.modulo
    }

    /// Returns the index of the shard this partitioner selects.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the split mode.
    pub fn split_by(&self) -> SplitBy {
        self.split_by
    }

    /// Returns the cases in this partitioner's shard.
    ///
    /// With a single shard the input is returned unchanged, in its original order.
    pub fn shard<T>(&self, cases: Vec<T>) -> Vec<T>
    where
        T: AsRef<CaseIdentity>,
    {
        if self.modulo == 1 {
            return cases;
        }

        let mut keyed: Vec<(String, T)> = cases
            .into_iter()
            .map(|case| (case.as_ref().canonical(), case))
            .collect();
        keyed.sort_by(|(a_key, a), (b_key, b)| {
            a_key
                .cmp(b_key)
                .then_with(|| a.as_ref().raw_id().cmp(b.as_ref().raw_id()))
        });

        let groups = self.group(keyed.into_iter().map(|(_, case)| case));

        let per_shard = groups.len().div_ceil(self.modulo as usize);
        let start = (self.index as usize).saturating_mul(per_shard);
        let end = start.saturating_add(per_shard);

        debug!(
            "shard {}/{}: {} groups, {per_shard} per shard, taking [{start}, {end})",
            self.index,
            self.modulo,
            groups.len(),
        );

        groups
            .into_iter()
            .skip(start)
            .take(per_shard)
            .flatten()
            .collect()
    }

    fn group<T>(&self, cases: impl Iterator<Item = T>) -> Vec<Vec<T>>
    where
        T: AsRef<CaseIdentity>,
    {
        enum Slot<T> {
            Grouped(String),
            Single(T),
        }

        // Groups keep the position of their first member.
        let mut slots = Vec::new();
        let mut grouped: IndexMap<String, Vec<T>> = IndexMap::new();
        for case in cases {
            let key = match self.split_by {
                SplitBy::Class => case.as_ref().group().map(str::to_owned),
                SplitBy::Case => None,
            };
            match key {
                Some(key) => {
                    let members = grouped.entry(key.clone()).or_default();
                    if members.is_empty() {
                        slots.push(Slot::Grouped(key));
                    }
                    members.push(case);
                }
                None => slots.push(Slot::Single(case)),
            }
        }

        slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Grouped(key) => grouped.swap_remove(&key).unwrap_or_default(),
                Slot::Single(case) => vec![case],
            })
            .collect()
    }
}
