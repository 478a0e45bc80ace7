// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure-state derivation.
//!
//! [`derive_state`] is the pure state machine mapping (failure site, caught
//! error, declared expectation) to a result state. Every execution layer
//! funnels caught errors through it; nothing else decides states.

use crate::{
    catalog::ExpectedRaise,
    results::ResultState,
};
use std::{any::Any, fmt, panic};

/// The result type returned by user hooks.
pub type HookResult = Result<(), TestError>;

/// The error kind assigned to caught panics that are not assertion signals.
pub const PANIC_KIND: &str = "panic";

/// The state an assertion signal asks for.
///
/// `Failure` is a placeholder mapped to the site-specific failure variant;
/// every other state passes through unchanged regardless of site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalState {
    /// Record the invocation as successful.
    Success,
    /// Record the site-specific failure variant.
    Failure,
    /// Record the invocation as inconclusive.
    Inconclusive,
    /// Record the invocation as ignored.
    Ignored,
}

/// The framework's dedicated assertion-signal kind.
///
/// Assertion helpers raise this either by returning
/// `Err(TestError::Signal(..))` or by panicking with an `AssertSignal`
/// payload; [`catch`] recovers the latter.
#[derive(Clone, Debug)]
pub struct AssertSignal {
    /// The intended result state.
    pub state: SignalState,
    /// The assertion message.
    pub message: String,
}

impl AssertSignal {
    /// Creates a signal asking for `state` with `message`.
    pub fn new(state: SignalState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    /// A failure signal, mapped to the site-specific failure variant.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(SignalState::Failure, message)
    }

    /// An inconclusive signal.
    pub fn inconclusive(message: impl Into<String>) -> Self {
        Self::new(SignalState::Inconclusive, message)
    }

    /// An ignored signal.
    pub fn ignored(message: impl Into<String>) -> Self {
        Self::new(SignalState::Ignored, message)
    }
}

/// An error caught at any execution site.
#[derive(Clone, Debug)]
pub enum TestError {
    /// The framework's assertion-signal kind, carrying an intended state.
    Signal(AssertSignal),
    /// Any other raised error, including converted panics.
    Raised {
        /// The error kind, used for expected-raise matching.
        kind: String,
        /// The error message.
        message: String,
        /// Captured stack text, if any.
        stack: String,
    },
}

impl TestError {
    /// Creates a raised error of `kind` with `message` and no stack text.
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TestError::Raised {
            kind: kind.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    /// The error's message.
    pub fn message(&self) -> &str {
        match self {
            TestError::Signal(signal) => &signal.message,
            TestError::Raised { message, .. } => message,
        }
    }

    /// The error's stack text, empty for signals.
    pub fn stack(&self) -> &str {
        match self {
            TestError::Signal(_) => "",
            TestError::Raised { stack, .. } => stack,
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<AssertSignal>() {
            Ok(signal) => return TestError::Signal(*signal),
            Err(payload) => payload,
        };
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic with non-string payload".to_owned()
        };
        TestError::raised(PANIC_KIND, message)
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Signal(signal) => {
                write!(f, "assertion signal ({:?}): {}", signal.state, signal.message)
            }
            TestError::Raised { kind, message, .. } => write!(f, "{kind}: {message}"),
        }
    }
}

impl std::error::Error for TestError {}

/// The site at which an error was caught.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureSite {
    /// Run-level setup.
    GlobalSetup,
    /// Fixture construction or fixture-level setup.
    FixtureSetup,
    /// Per-test setup.
    CaseSetup,
    /// The test body itself.
    TestBody,
    /// Per-test teardown.
    Teardown,
    /// Fixture-level teardown.
    FixtureTeardown,
    /// Run-level teardown.
    GlobalTeardown,
}

impl FailureSite {
    fn failure_state(self) -> ResultState {
        match self {
            FailureSite::GlobalSetup => ResultState::GlobalSetupFailure,
            FailureSite::FixtureSetup => ResultState::FixtureSetupFailure,
            FailureSite::CaseSetup => ResultState::SetupFailure,
            FailureSite::TestBody => ResultState::Failure,
            FailureSite::Teardown => ResultState::TeardownFailure,
            FailureSite::FixtureTeardown => ResultState::FixtureTeardownFailure,
            FailureSite::GlobalTeardown => ResultState::GlobalTeardownFailure,
        }
    }

    fn error_state(self) -> ResultState {
        match self {
            FailureSite::GlobalSetup => ResultState::GlobalSetupError,
            FailureSite::FixtureSetup => ResultState::FixtureSetupError,
            FailureSite::CaseSetup => ResultState::SetupError,
            FailureSite::TestBody => ResultState::Error,
            FailureSite::Teardown => ResultState::TeardownError,
            FailureSite::FixtureTeardown => ResultState::FixtureTeardownError,
            FailureSite::GlobalTeardown => ResultState::GlobalTeardownError,
        }
    }
}

/// A derived (state, message, stack) triple.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    /// The derived result state.
    pub state: ResultState,
    /// The error message, empty on success.
    pub message: String,
    /// The stack text, empty on success.
    pub stack: String,
}

impl Verdict {
    /// The clean-success verdict.
    pub fn success() -> Self {
        Self {
            state: ResultState::Success,
            message: String::new(),
            stack: String::new(),
        }
    }
}

/// A setup-stage error that blocks descendant invocations from running their
/// real logic while still producing a derived result for each.
#[derive(Clone, Debug)]
pub(crate) struct BlockingError {
    pub(crate) site: FailureSite,
    pub(crate) error: TestError,
}

/// Derives the result state for an error caught at `site`.
///
/// Assertion signals asking for the generic `Failure` placeholder map to the
/// site-specific failure variant; any other intended state passes through
/// unchanged. Other errors map to the site-specific error variant, except at
/// the test-body site where a matching expected-raise declaration turns the
/// error into `Success`.
pub fn derive_state(
    site: FailureSite,
    error: &TestError,
    expected: Option<&ExpectedRaise>,
) -> Verdict {
    if site == FailureSite::TestBody {
        if let (Some(expected), TestError::Raised { kind, message, .. }) = (expected, error) {
            if expected.matches(kind, message) {
                return Verdict::success();
            }
        }
    }

    let state = match error {
        TestError::Signal(signal) => match signal.state {
            SignalState::Failure => site.failure_state(),
            SignalState::Success => ResultState::Success,
            SignalState::Inconclusive => ResultState::Inconclusive,
            SignalState::Ignored => ResultState::Ignored,
        },
        TestError::Raised { .. } => site.error_state(),
    };

    Verdict {
        state,
        message: error.message().to_owned(),
        stack: error.stack().to_owned(),
    }
}

/// Runs a fallible hook, converting panics into [`TestError`]s.
///
/// A panic payload that downcasts to [`AssertSignal`] is treated as the
/// framework's assertion-signal kind; anything else becomes a raised error
/// of kind [`PANIC_KIND`].
pub(crate) fn catch<T>(hook: impl FnOnce() -> Result<T, TestError>) -> Result<T, TestError> {
    match panic::catch_unwind(panic::AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(TestError::from_panic(payload)),
    }
}
