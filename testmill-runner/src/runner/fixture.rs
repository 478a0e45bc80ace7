// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fixture invocation runner.
//!
//! Runs one fixture's repeat × construction-case matrix sequentially on the
//! worker that owns it. Each combination constructs the fixture instance,
//! runs fixture setup, hands the instance to the test-level scheduler, and
//! always attempts fixture teardown afterwards. Construction and setup
//! failures become blocking errors: the tests are still enumerated, each
//! committing a result derived from the blocker instead of running.

use crate::{
    catalog::{CaseTuple, FixtureHandle, TestFixtureSpec},
    runner::case,
    schedule::run_partitioned,
    signal::InterruptFlag,
    store::ResultStore,
    verdict::{BlockingError, FailureSite, catch, derive_state},
};
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Run-wide state shared by every fixture worker.
pub(crate) struct RunContext<'a> {
    pub(crate) store: &'a ResultStore,
    pub(crate) interrupt: &'a InterruptFlag,
    pub(crate) test_threads: usize,
    /// A global-setup failure blocking the whole run, if any.
    pub(crate) blocked: Option<&'a BlockingError>,
}

/// One constructed fixture instance, shared by the test workers under it.
pub(crate) struct FixtureInstance<'a> {
    pub(crate) ctx: &'a RunContext<'a>,
    pub(crate) fixture: &'a TestFixtureSpec,
    /// The identity prefix `Fixture(args)#r` for this instance.
    pub(crate) prefix: &'a str,
    pub(crate) fixture_repeat: u32,
    pub(crate) handle: &'a FixtureHandle,
    pub(crate) blocking: Option<&'a BlockingError>,
}

/// Runs every (fixture-repeat, fixture-case) combination of `fixture`.
pub(crate) fn run_fixture(ctx: &RunContext<'_>, fixture: &TestFixtureSpec) {
    for fixture_repeat in 1..=fixture.repeat {
        if ctx.interrupt.is_set() {
            return;
        }
        for fixture_case in &fixture.cases {
            if ctx.interrupt.is_set() {
                return;
            }
            run_instance(ctx, fixture, fixture_repeat, fixture_case);
        }
    }
}

fn identity_prefix(fixture: &TestFixtureSpec, case: &CaseTuple, repeat: u32) -> String {
    let mut prefix = format!("{}{}", fixture.name, case.suffix());
    if fixture.repeat > 1 {
        let _ = write!(prefix, "#{repeat}");
    }
    prefix
}

fn run_instance(
    ctx: &RunContext<'_>,
    fixture: &TestFixtureSpec,
    fixture_repeat: u32,
    fixture_case: &CaseTuple,
) {
    let prefix = identity_prefix(fixture, fixture_case, fixture_repeat);
    debug!(fixture = %prefix, tests = fixture.tests.len(), "running fixture instance");

    let mut handle = FixtureHandle::unit();
    let mut constructed = false;
    let mut blocking = ctx.blocked.cloned();

    if blocking.is_none() {
        // Construction failures derive through the fixture-setup site and
        // block this instance's tests uniformly.
        let factory = fixture.factory.as_ref();
        match catch(|| match factory {
            Some(factory) => (factory.0)(fixture_case),
            None => Ok(FixtureHandle::unit()),
        }) {
            Ok(instance) => {
                handle = instance;
                constructed = true;
            }
            Err(error) => {
                warn!(fixture = %prefix, %error, "fixture construction failed, blocking its tests");
                blocking = Some(BlockingError {
                    site: FailureSite::FixtureSetup,
                    error,
                });
            }
        }
    }

    if blocking.is_none() {
        if let Some(setup) = &fixture.setup {
            if let Err(error) = catch(|| (setup.0)(&handle)) {
                warn!(fixture = %prefix, %error, "fixture setup failed, blocking its tests");
                blocking = Some(BlockingError {
                    site: FailureSite::FixtureSetup,
                    error,
                });
            }
        }
    }

    let instance = FixtureInstance {
        ctx,
        fixture,
        prefix: &prefix,
        fixture_repeat,
        handle: &handle,
        blocking: blocking.as_ref(),
    };
    run_partitioned(
        &fixture.tests,
        ctx.test_threads,
        ctx.interrupt,
        "testmill-test",
        |test| case::run_test(&instance, test),
    );

    // Teardown runs only against an instance that was actually constructed.
    // Its failure is logged under the derived state and never touches the
    // results already committed above.
    if constructed {
        if let Some(teardown) = &fixture.teardown {
            if let Err(error) = catch(|| (teardown.0)(&handle)) {
                let verdict = derive_state(FailureSite::FixtureTeardown, &error, None);
                warn!(
                    fixture = %prefix,
                    state = %verdict.state,
                    message = %verdict.message,
                    "fixture teardown failed"
                );
            }
        }
    }
}
