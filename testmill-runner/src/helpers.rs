// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod plural {
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    pub fn fixtures_str(count: usize) -> &'static str {
        if count == 1 { "fixture" } else { "fixtures" }
    }

    pub fn failures_str(count: usize) -> &'static str {
        if count == 1 { "failure" } else { "failures" }
    }
}
