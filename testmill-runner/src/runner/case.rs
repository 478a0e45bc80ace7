// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test invocation runner.
//!
//! Runs one test's repeat × parameter-case matrix strictly sequentially,
//! committing exactly one result per combination before starting the next.
//! A blocking error from an enclosing setup stage short-circuits the hooks:
//! the combination still advances and still commits a result derived from
//! the blocker, so no test is silently skipped.

use crate::{
    catalog::{CaseTuple, FixtureHandle, TestCaseSpec},
    results::{ResultKey, TestResult},
    runner::fixture::FixtureInstance,
    verdict::{FailureSite, Verdict, catch, derive_state},
};
use chrono::Utc;
use std::{fmt::Write as _, time::Instant};
use tracing::{trace, warn};

/// Runs every (test-repeat, parameter-case) combination of `test`.
pub(crate) fn run_test(instance: &FixtureInstance<'_>, test: &TestCaseSpec) {
    for test_repeat in 1..=test.repeat {
        if instance.ctx.interrupt.is_set() {
            return;
        }
        for case in &test.cases {
            if instance.ctx.interrupt.is_set() {
                return;
            }
            execute_one(instance, test, test_repeat, case);
        }
    }
}

fn full_name(prefix: &str, test: &TestCaseSpec, case: &CaseTuple, test_repeat: u32) -> String {
    let mut name = format!("{prefix}::{}{}", test.name, case.suffix());
    if test.repeat > 1 {
        let _ = write!(name, "#{test_repeat}");
    }
    name
}

fn execute_one(
    instance: &FixtureInstance<'_>,
    test: &TestCaseSpec,
    test_repeat: u32,
    case: &CaseTuple,
) {
    let full_name = full_name(instance.prefix, test, case, test_repeat);
    let started = Instant::now();
    let verdict = match instance.blocking {
        Some(blocked) => derive_state(blocked.site, &blocked.error, None),
        None => run_hooks(test, instance.handle, case),
    };
    trace!(test = %full_name, state = %verdict.state, "invocation finished");

    instance.ctx.store.add_or_update(TestResult {
        key: ResultKey::new(&instance.fixture.source_id, full_name),
        fixture_repeat: instance.fixture_repeat,
        test_repeat,
        state: verdict.state,
        message: verdict.message,
        stack: verdict.stack,
        duration: started.elapsed(),
        created_at: Utc::now(),
        author: test.author.clone(),
        version: test.version.clone(),
        channels: test.channels,
    });
}

/// Setup, body, teardown, one catch per step.
fn run_hooks(test: &TestCaseSpec, handle: &FixtureHandle, case: &CaseTuple) -> Verdict {
    let mut verdict = Verdict::success();
    let mut setup_ok = true;

    if let Some(setup) = &test.setup {
        if let Err(error) = catch(|| (setup.0)(handle)) {
            verdict = derive_state(FailureSite::CaseSetup, &error, None);
            setup_ok = false;
        }
    }

    if setup_ok {
        if let Err(error) = catch(|| (test.body.0)(handle, case)) {
            verdict = derive_state(FailureSite::TestBody, &error, test.expected_raise.as_ref());
        }
    }

    // Teardown is always attempted. Its failure is logged under the derived
    // teardown state; the primary verdict stands either way.
    if let Some(teardown) = &test.teardown {
        if let Err(error) = catch(|| (teardown.0)(handle)) {
            let teardown = derive_state(FailureSite::Teardown, &error, None);
            warn!(
                test = %test.name,
                state = %teardown.state,
                message = %teardown.message,
                "test teardown failed"
            );
        }
    }

    verdict
}
