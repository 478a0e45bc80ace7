// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testmill.
//!
//! Failures inside test code never surface here: they are converted into
//! [`TestResult`](crate::results::TestResult)s by the invocation runners.
//! The types below cover contract violations by collaborators (fatal) and
//! callout delivery problems (logged and counted, never fatal).

use thiserror::Error;

/// The discovery collaborator handed the engine a malformed catalog.
///
/// This is the one category of failure treated as fatal: it indicates a
/// contract violation rather than a test outcome, and is returned from
/// [`TestRunner::execute`](crate::runner::TestRunner::execute) before any
/// test runs.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// A fixture declared a repeat count of zero.
    #[error("fixture `{fixture}` declares a repeat count of zero")]
    ZeroFixtureRepeat {
        /// The fixture's qualified name.
        fixture: String,
    },

    /// A test declared a repeat count of zero.
    #[error("test `{test}` in fixture `{fixture}` declares a repeat count of zero")]
    ZeroTestRepeat {
        /// The owning fixture's qualified name.
        fixture: String,
        /// The test's qualified name.
        test: String,
    },

    /// A fixture declared an empty parameter-case list.
    ///
    /// Discovery must default to a single empty tuple instead.
    #[error("fixture `{fixture}` declares an empty parameter-case list")]
    NoFixtureCases {
        /// The fixture's qualified name.
        fixture: String,
    },

    /// A test declared an empty parameter-case list.
    #[error("test `{test}` in fixture `{fixture}` declares an empty parameter-case list")]
    NoTestCases {
        /// The owning fixture's qualified name.
        fixture: String,
        /// The test's qualified name.
        test: String,
    },

    /// Two fixtures share a qualified name.
    #[error("duplicate fixture name `{fixture}`")]
    DuplicateFixture {
        /// The duplicated qualified name.
        fixture: String,
    },

    /// Two tests within one fixture share a qualified name.
    #[error("duplicate test name `{test}` in fixture `{fixture}`")]
    DuplicateTest {
        /// The owning fixture's qualified name.
        fixture: String,
        /// The duplicated test name.
        test: String,
    },

    /// A test's declared owning fixture does not match the fixture it was
    /// discovered under.
    #[error("test `{test}` declares owning fixture `{declared}` but was discovered under `{actual}`")]
    FixtureMismatch {
        /// The test's qualified name.
        test: String,
        /// The fixture id the test declares.
        declared: String,
        /// The fixture the test was found under.
        actual: String,
    },
}

/// A malformed notification-sink configuration.
///
/// Reported by [`TestRunnerBuilder::build`](crate::runner::TestRunnerBuilder::build),
/// before a run starts.
#[derive(Clone, Debug, Error)]
#[error("invalid {kind} sink URL `{url}`: expected an http or https endpoint")]
pub struct SinkConfigError {
    /// The sink kind.
    pub kind: crate::callout::SinkKind,
    /// The offending URL.
    pub url: String,
}

/// An error that occurred while delivering a callout to a notification sink.
///
/// Delivery errors are caught by the callout consumer, logged, and counted
/// toward the sink's circuit breaker; they never block or fail the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CalloutError {
    /// The POST to the sink failed (connection, timeout, or non-success
    /// status reported by the transport).
    #[error("delivery to `{url}` failed")]
    Delivery {
        /// The sink URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The payload could not be serialized.
    #[error("failed to serialize callout payload")]
    Serialize {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}
