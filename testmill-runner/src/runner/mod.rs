// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner: the top-level entry point and the per-fixture and
//! per-test invocation runners beneath it.

mod case;
mod fixture;
mod imp;

pub use imp::{RunReport, TestRunner, TestRunnerBuilder};
