// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core execution engine for testmill.
//!
//! Given a catalog of discovered test fixtures and test cases, this crate
//! runs them under a two-level concurrent scheduler (fixtures across one
//! worker pool, each fixture's tests across another), derives a fine-grained
//! result state per invocation, aggregates results into a thread-safe store,
//! and relays them to notification sinks from a background callout queue.
//!
//! Test discovery, command-line parsing and output-file serialization are
//! the responsibility of external collaborators: this crate consumes a
//! [`TestCatalog`](catalog::TestCatalog) and a [`RunConfig`](config::RunConfig)
//! and exposes the [`ResultStore`](store::ResultStore) views, a streaming
//! per-result observer, and an [`InterruptHandle`](signal::InterruptHandle).

pub mod callout;
pub mod catalog;
pub mod config;
pub mod errors;
mod helpers;
pub mod reporter;
pub mod results;
pub mod runner;
mod schedule;
pub mod signal;
pub mod store;
pub mod verdict;
