// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result records and the flat result-state taxonomy.

use crate::callout::ChannelHints;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The fine-grained state of one test invocation.
///
/// A flat enumeration, not a hierarchy: each setup/teardown stage has its
/// own error and failure variants so a result records exactly where it went
/// wrong. [`absolute`](Self::absolute) collapses this for aggregate counting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultState {
    /// The invocation completed successfully.
    Success,
    /// An assertion failed in the test body.
    Failure,
    /// A non-assertion error was raised in the test body.
    Error,
    /// The test declared itself inconclusive.
    Inconclusive,
    /// The test declared itself ignored.
    Ignored,
    /// A non-assertion error in per-test setup.
    SetupError,
    /// An assertion failure in per-test setup.
    SetupFailure,
    /// A non-assertion error in per-test teardown.
    TeardownError,
    /// An assertion failure in per-test teardown.
    TeardownFailure,
    /// A non-assertion error in run-level setup.
    GlobalSetupError,
    /// An assertion failure in run-level setup.
    GlobalSetupFailure,
    /// A non-assertion error in run-level teardown.
    GlobalTeardownError,
    /// An assertion failure in run-level teardown.
    GlobalTeardownFailure,
    /// A non-assertion error in fixture construction or setup.
    FixtureSetupError,
    /// An assertion failure in fixture construction or setup.
    FixtureSetupFailure,
    /// A non-assertion error in fixture teardown.
    FixtureTeardownError,
    /// An assertion failure in fixture teardown.
    FixtureTeardownFailure,
}

/// The collapsed state used for aggregate counting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbsoluteState {
    /// The invocation passed.
    Success,
    /// An assertion failed at some site.
    Failure,
    /// A non-assertion error was raised at some site.
    Error,
    /// The invocation was ignored.
    Ignored,
    /// The invocation was inconclusive.
    Inconclusive,
}

impl ResultState {
    /// Collapses this state for aggregate counting.
    pub fn absolute(self) -> AbsoluteState {
        use ResultState::*;
        match self {
            Success => AbsoluteState::Success,
            Failure | SetupFailure | TeardownFailure | GlobalSetupFailure
            | GlobalTeardownFailure | FixtureSetupFailure | FixtureTeardownFailure => {
                AbsoluteState::Failure
            }
            Error | SetupError | TeardownError | GlobalSetupError | GlobalTeardownError
            | FixtureSetupError | FixtureTeardownError => AbsoluteState::Error,
            Ignored => AbsoluteState::Ignored,
            Inconclusive => AbsoluteState::Inconclusive,
        }
    }

    /// Returns true for `Success`.
    pub fn is_success(self) -> bool {
        self == ResultState::Success
    }

    /// A short console label for this state.
    pub fn console_label(self) -> &'static str {
        use ResultState::*;
        match self {
            Success => "PASS",
            Failure => "FAIL",
            Error => "ERROR",
            Inconclusive => "INCONCL",
            Ignored => "IGNORED",
            SetupError => "SETUP-ERR",
            SetupFailure => "SETUP-FAIL",
            TeardownError => "TDOWN-ERR",
            TeardownFailure => "TDOWN-FAIL",
            GlobalSetupError => "GSETUP-ERR",
            GlobalSetupFailure => "GSETUP-FAIL",
            GlobalTeardownError => "GTDOWN-ERR",
            GlobalTeardownFailure => "GTDOWN-FAIL",
            FixtureSetupError => "FSETUP-ERR",
            FixtureSetupFailure => "FSETUP-FAIL",
            FixtureTeardownError => "FTDOWN-ERR",
            FixtureTeardownFailure => "FTDOWN-FAIL",
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.console_label())
    }
}

/// The identity a result is stored under.
///
/// The full name embeds the fixture-case, fixture-repeat, test-case and
/// test-repeat suffixes, so every invocation of a repeated or parameterised
/// test has a distinct key.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    /// The assembly/source id the test came from.
    pub source_id: String,
    /// The fully-qualified invocation name.
    pub full_name: String,
}

impl ResultKey {
    /// Creates a key.
    pub fn new(source_id: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            full_name: full_name.into(),
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.source_id, self.full_name)
    }
}

/// The outcome of one test invocation.
///
/// Created by the invocation runner that owns it, then handed immutably to
/// the [`ResultStore`](crate::store::ResultStore).
#[derive(Clone, Debug)]
pub struct TestResult {
    /// The invocation identity.
    pub key: ResultKey,
    /// The fixture-repeat index this invocation ran under (1-based).
    pub fixture_repeat: u32,
    /// The test-repeat index of this invocation (1-based).
    pub test_repeat: u32,
    /// The derived result state.
    pub state: ResultState,
    /// The error message, empty on success.
    pub message: String,
    /// Captured stack text, empty on success.
    pub stack: String,
    /// How long the invocation took.
    pub duration: Duration,
    /// When the result was created.
    pub created_at: DateTime<Utc>,
    /// Author metadata copied from the test spec.
    pub author: Option<String>,
    /// Version metadata copied from the test spec.
    pub version: Option<String>,
    /// Which notification channels this result opts into.
    pub channels: ChannelHints,
}

/// Aggregate counters over the result store.
///
/// Always computed from the live map; there are no separately maintained
/// counters that can drift.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunCounts {
    /// Total recorded results.
    pub total: usize,
    /// Results whose absolute state is `Success`.
    pub success: usize,
    /// Results whose absolute state is `Failure`.
    pub failure: usize,
    /// Results whose absolute state is `Error`.
    pub error: usize,
    /// Results whose absolute state is `Ignored`.
    pub ignored: usize,
    /// Results whose absolute state is `Inconclusive`.
    pub inconclusive: usize,
}

impl RunCounts {
    /// Folds one state into the counters.
    pub(crate) fn record(&mut self, state: ResultState) {
        self.total += 1;
        match state.absolute() {
            AbsoluteState::Success => self.success += 1,
            AbsoluteState::Failure => self.failure += 1,
            AbsoluteState::Error => self.error += 1,
            AbsoluteState::Ignored => self.ignored += 1,
            AbsoluteState::Inconclusive => self.inconclusive += 1,
        }
    }

    /// The percentage of results that passed, 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 * 100.0 / self.total as f64
        }
    }

    /// The percentage of results that failed or errored.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.failure + self.error) as f64 * 100.0 / self.total as f64
        }
    }

    /// Returns true if no result failed or errored.
    pub fn is_success(&self) -> bool {
        self.failure == 0 && self.error == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_collapse_covers_every_variant() {
        use ResultState::*;
        let failures = [
            Failure,
            SetupFailure,
            TeardownFailure,
            GlobalSetupFailure,
            GlobalTeardownFailure,
            FixtureSetupFailure,
            FixtureTeardownFailure,
        ];
        for state in failures {
            assert_eq!(state.absolute(), AbsoluteState::Failure, "{state:?}");
        }

        let errors = [
            Error,
            SetupError,
            TeardownError,
            GlobalSetupError,
            GlobalTeardownError,
            FixtureSetupError,
            FixtureTeardownError,
        ];
        for state in errors {
            assert_eq!(state.absolute(), AbsoluteState::Error, "{state:?}");
        }

        assert_eq!(Success.absolute(), AbsoluteState::Success);
        assert_eq!(Ignored.absolute(), AbsoluteState::Ignored);
        assert_eq!(Inconclusive.absolute(), AbsoluteState::Inconclusive);
    }

    #[test]
    fn counts_and_rates() {
        let mut counts = RunCounts::default();
        for state in [
            ResultState::Success,
            ResultState::Success,
            ResultState::Success,
            ResultState::Failure,
            ResultState::SetupError,
        ] {
            counts.record(state);
        }
        assert_eq!(counts.total, 5);
        assert_eq!(counts.success, 3);
        assert_eq!(counts.failure, 1);
        assert_eq!(counts.error, 1);
        assert!((counts.success_rate() - 60.0).abs() < f64::EPSILON);
        assert!((counts.failure_rate() - 40.0).abs() < f64::EPSILON);
        assert!(!counts.is_success());

        let empty = RunCounts::default();
        assert_eq!(empty.success_rate(), 0.0);
        assert!(empty.is_success());
    }
}
