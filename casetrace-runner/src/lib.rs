// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core result-tracking logic for casetrace.
//!
//! A worker reads the execution framework's event stream through [`adapter`], narrows the
//! collected cases down with [`test_filter`] and [`partition`], resolves each case's phases to a
//! single status with [`resolver`], and streams the outcome through [`reporter`]. [`session`] ties
//! these together for one run, writing a per-case log through [`case_log`].

pub mod adapter;
pub mod case_log;
pub mod config;
pub mod errors;
pub mod identity;
pub mod partition;
pub mod reporter;
pub mod resolver;
pub mod run_context;
pub mod session;
pub mod test_filter;
