// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The catalog of discovered fixtures and test cases.
//!
//! Everything in this module is produced by the (external) discovery
//! collaborator and is immutable once a run starts. The scheduler never
//! inspects metadata reflectively: declarative markers such as categories,
//! repeat counts, concurrency modes and expected-raise declarations arrive
//! here as plain, already-resolved fields.

use crate::{
    callout::ChannelHints,
    errors::CatalogError,
    verdict::{HookResult, TestError},
};
use debug_ignore::DebugIgnore;
use std::{any::Any, fmt, fmt::Write as _, sync::Arc};

/// Whether an item may share a worker pool or must run alone.
///
/// `Serial` items run on a single dedicated worker, in ascending name order,
/// only after all `Parallel` workers in their scope have returned.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ConcurrencyMode {
    /// May run concurrently with its siblings (the default).
    #[default]
    Parallel,
    /// Must run alone, after all parallel work in its scope.
    Serial,
}

/// One tuple of arguments used to construct a fixture or invoke a test.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseTuple(Vec<serde_json::Value>);

impl CaseTuple {
    /// The empty tuple, used for unparameterised fixtures and tests.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Creates a tuple from a list of values.
    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Self(values)
    }

    /// Returns true if this is the empty tuple.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tuple's values in declared order.
    pub fn values(&self) -> &[serde_json::Value] {
        &self.0
    }

    /// The identity suffix this tuple contributes to a qualified name:
    /// `"(1,\"a\")"` for a non-empty tuple, `""` for the empty one.
    pub fn suffix(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let mut out = String::from("(");
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{value}");
        }
        out.push(')');
        out
    }
}

impl fmt::Display for CaseTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.suffix())
    }
}

/// How a declared expected-raise message constraint is matched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchMode {
    /// The message must equal the declared text.
    Exact,
    /// The message must contain the declared text.
    Contains,
    /// The message must match the declared regular expression.
    Regex,
    /// The message must start with the declared text.
    StartsWith,
    /// The message must end with the declared text.
    EndsWith,
}

impl MatchMode {
    fn message_matches(self, declared: &str, message: &str) -> bool {
        match self {
            MatchMode::Exact => message == declared,
            MatchMode::Contains => message.contains(declared),
            MatchMode::Regex => regex::Regex::new(declared)
                .map(|re| re.is_match(message))
                .unwrap_or(false),
            MatchMode::StartsWith => message.starts_with(declared),
            MatchMode::EndsWith => message.ends_with(declared),
        }
    }
}

/// A declared expectation that the test body raises a particular error.
///
/// A raise matches when its kind equals the declared kind and, if a message
/// constraint is declared, the message satisfies the match mode. The
/// `inverse` flag negates the final match outcome.
#[derive(Clone, Debug)]
pub struct ExpectedRaise {
    /// The expected error kind.
    pub kind: String,
    /// An optional message constraint.
    pub message: Option<String>,
    /// How the message constraint is applied.
    pub match_mode: MatchMode,
    /// Negates the final match result.
    pub inverse: bool,
}

impl ExpectedRaise {
    /// Declares an expected raise of `kind` with no message constraint.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            match_mode: MatchMode::Exact,
            inverse: false,
        }
    }

    /// Adds a message constraint.
    pub fn with_message(mut self, message: impl Into<String>, match_mode: MatchMode) -> Self {
        self.message = Some(message.into());
        self.match_mode = match_mode;
        self
    }

    /// Inverts the match result.
    pub fn inverted(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// Returns true if a raise of `kind` with `message` satisfies this
    /// declaration.
    pub fn matches(&self, kind: &str, message: &str) -> bool {
        let mut matched = kind == self.kind
            && match &self.message {
                None => true,
                Some(declared) => self.match_mode.message_matches(declared, message),
            };
        if self.inverse {
            matched = !matched;
        }
        matched
    }
}

/// An opaque, constructed fixture instance.
///
/// One instance is constructed per (fixture-repeat, fixture-case) and shared
/// by reference across that fixture's test workers, so the payload must be
/// `Sync`; fixtures that need mutation use interior mutability.
pub struct FixtureHandle(Box<dyn Any + Send + Sync>);

impl FixtureHandle {
    /// Wraps a fixture value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// A handle with no state, used by fixtures without a factory.
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Borrows the fixture value as `T`, if that is its type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for FixtureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FixtureHandle(..)")
    }
}

/// Constructs a fixture instance from a fixture-level parameter tuple.
pub type FactoryFn = Arc<dyn Fn(&CaseTuple) -> Result<FixtureHandle, TestError> + Send + Sync>;

/// A setup or teardown hook running against a fixture instance.
pub type HookFn = Arc<dyn Fn(&FixtureHandle) -> HookResult + Send + Sync>;

/// A test body, invoked once per (repeat, parameter-case).
pub type TestBodyFn = Arc<dyn Fn(&FixtureHandle, &CaseTuple) -> HookResult + Send + Sync>;

/// A global (run-level) setup or teardown hook.
pub type GlobalHookFn = Arc<dyn Fn() -> HookResult + Send + Sync>;

/// Items the shared scheduler knows how to partition.
pub(crate) trait Schedulable {
    /// The qualified name groups are sorted by.
    fn sort_name(&self) -> &str;
    /// The declared concurrency mode.
    fn concurrency(&self) -> ConcurrencyMode;
}

/// Immutable metadata for a single discovered test case.
#[derive(Clone, Debug)]
pub struct TestCaseSpec {
    /// The test's qualified name within its fixture.
    pub name: String,
    /// The owning fixture's qualified name.
    pub fixture_id: String,
    /// Category tags.
    pub tags: Vec<String>,
    /// Declared concurrency mode.
    pub concurrency: ConcurrencyMode,
    /// Number of times the test is re-executed; always >= 1.
    pub repeat: u32,
    /// Ordered parameter-case tuples; always non-empty.
    pub cases: Vec<CaseTuple>,
    /// An optional expected-raise declaration.
    pub expected_raise: Option<ExpectedRaise>,
    /// Author metadata copied onto every result.
    pub author: Option<String>,
    /// Version metadata copied onto every result.
    pub version: Option<String>,
    /// Which notification channels results of this test opt into.
    pub channels: ChannelHints,
    /// Per-test setup hook.
    pub setup: Option<DebugIgnore<HookFn>>,
    /// Per-test teardown hook.
    pub teardown: Option<DebugIgnore<HookFn>>,
    /// The test body.
    pub body: DebugIgnore<TestBodyFn>,
}

impl TestCaseSpec {
    /// Creates a test case with default markers: parallel, one repeat, one
    /// empty parameter case.
    pub fn new(
        name: impl Into<String>,
        fixture_id: impl Into<String>,
        body: impl Fn(&FixtureHandle, &CaseTuple) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fixture_id: fixture_id.into(),
            tags: Vec::new(),
            concurrency: ConcurrencyMode::Parallel,
            repeat: 1,
            cases: vec![CaseTuple::empty()],
            expected_raise: None,
            author: None,
            version: None,
            channels: ChannelHints::default(),
            setup: None,
            teardown: None,
            body: DebugIgnore(Arc::new(body)),
        }
    }

    /// Sets the concurrency mode.
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency = mode;
        self
    }

    /// Sets the repeat count.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Sets the parameter cases.
    pub fn with_cases(mut self, cases: Vec<CaseTuple>) -> Self {
        self.cases = cases;
        self
    }

    /// Declares an expected raise.
    pub fn with_expected_raise(mut self, expected: ExpectedRaise) -> Self {
        self.expected_raise = Some(expected);
        self
    }

    /// Sets the per-test setup hook.
    pub fn with_setup(
        mut self,
        setup: impl Fn(&FixtureHandle) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.setup = Some(DebugIgnore(Arc::new(setup)));
        self
    }

    /// Sets the per-test teardown hook.
    pub fn with_teardown(
        mut self,
        teardown: impl Fn(&FixtureHandle) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.teardown = Some(DebugIgnore(Arc::new(teardown)));
        self
    }

    /// Sets author metadata.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets version metadata.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets category tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets notification channel opt-ins.
    pub fn with_channels(mut self, channels: ChannelHints) -> Self {
        self.channels = channels;
        self
    }
}

impl Schedulable for TestCaseSpec {
    fn sort_name(&self) -> &str {
        &self.name
    }

    fn concurrency(&self) -> ConcurrencyMode {
        self.concurrency
    }
}

/// Immutable metadata for a discovered test fixture.
#[derive(Clone, Debug)]
pub struct TestFixtureSpec {
    /// The fixture's qualified name.
    pub name: String,
    /// The assembly/source id the fixture was discovered in.
    pub source_id: String,
    /// Declared concurrency mode.
    pub concurrency: ConcurrencyMode,
    /// Number of times the fixture matrix is re-executed; always >= 1.
    pub repeat: u32,
    /// Ordered fixture-level parameter tuples (construction arguments);
    /// always non-empty.
    pub cases: Vec<CaseTuple>,
    /// Category tags.
    pub tags: Vec<String>,
    /// An optional suite tag.
    pub suite: Option<String>,
    /// The fixture's test cases, in discovery order.
    pub tests: Vec<TestCaseSpec>,
    /// Constructs the fixture instance; `None` means a stateless fixture.
    pub factory: Option<DebugIgnore<FactoryFn>>,
    /// Fixture-level setup, run once per (repeat, case) before the tests.
    pub setup: Option<DebugIgnore<HookFn>>,
    /// Fixture-level teardown, always attempted after the tests.
    pub teardown: Option<DebugIgnore<HookFn>>,
}

impl TestFixtureSpec {
    /// Creates a fixture with default markers: parallel, one repeat, one
    /// empty construction tuple, no tests.
    pub fn new(name: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_id: source_id.into(),
            concurrency: ConcurrencyMode::Parallel,
            repeat: 1,
            cases: vec![CaseTuple::empty()],
            tags: Vec::new(),
            suite: None,
            tests: Vec::new(),
            factory: None,
            setup: None,
            teardown: None,
        }
    }

    /// Sets the concurrency mode.
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency = mode;
        self
    }

    /// Sets the repeat count.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Sets the fixture-level construction tuples.
    pub fn with_cases(mut self, cases: Vec<CaseTuple>) -> Self {
        self.cases = cases;
        self
    }

    /// Sets the factory used to construct the fixture instance.
    pub fn with_factory(
        mut self,
        factory: impl Fn(&CaseTuple) -> Result<FixtureHandle, TestError> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Some(DebugIgnore(Arc::new(factory)));
        self
    }

    /// Sets the fixture-level setup hook.
    pub fn with_setup(
        mut self,
        setup: impl Fn(&FixtureHandle) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.setup = Some(DebugIgnore(Arc::new(setup)));
        self
    }

    /// Sets the fixture-level teardown hook.
    pub fn with_teardown(
        mut self,
        teardown: impl Fn(&FixtureHandle) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.teardown = Some(DebugIgnore(Arc::new(teardown)));
        self
    }

    /// Sets the suite tag.
    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    /// Appends a test case.
    pub fn with_test(mut self, test: TestCaseSpec) -> Self {
        self.tests.push(test);
        self
    }

    /// The number of test invocations this fixture contributes to a run.
    pub fn invocation_count(&self) -> usize {
        let per_instance: usize = self
            .tests
            .iter()
            .map(|test| test.repeat as usize * test.cases.len())
            .sum();
        self.repeat as usize * self.cases.len() * per_instance
    }
}

impl Schedulable for TestFixtureSpec {
    fn sort_name(&self) -> &str {
        &self.name
    }

    fn concurrency(&self) -> ConcurrencyMode {
        self.concurrency
    }
}

/// The full, ordered, deduplicated catalog for one run.
///
/// Discovery has already applied category/suite/name filters; the scheduler
/// runs exactly what it is given.
#[derive(Clone, Debug, Default)]
pub struct TestCatalog {
    /// The fixtures to run, in discovery order.
    pub fixtures: Vec<TestFixtureSpec>,
    /// Run-level setup, executed once before any fixture.
    pub global_setup: Option<DebugIgnore<GlobalHookFn>>,
    /// Run-level teardown, always attempted after all fixtures.
    pub global_teardown: Option<DebugIgnore<GlobalHookFn>>,
}

impl TestCatalog {
    /// Creates a catalog from a fixture list.
    pub fn new(fixtures: Vec<TestFixtureSpec>) -> Self {
        Self {
            fixtures,
            global_setup: None,
            global_teardown: None,
        }
    }

    /// Sets the run-level setup hook.
    pub fn with_global_setup(
        mut self,
        setup: impl Fn() -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.global_setup = Some(DebugIgnore(Arc::new(setup)));
        self
    }

    /// Sets the run-level teardown hook.
    pub fn with_global_teardown(
        mut self,
        teardown: impl Fn() -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.global_teardown = Some(DebugIgnore(Arc::new(teardown)));
        self
    }

    /// The total number of test invocations this catalog produces.
    pub fn invocation_count(&self) -> usize {
        self.fixtures.iter().map(TestFixtureSpec::invocation_count).sum()
    }

    /// Checks the discovery contract.
    ///
    /// Violations are fatal: they indicate a bug in the discovery
    /// collaborator, not a test outcome.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen_fixtures = std::collections::HashSet::new();
        for fixture in &self.fixtures {
            if !seen_fixtures.insert(fixture.name.as_str()) {
                return Err(CatalogError::DuplicateFixture {
                    fixture: fixture.name.clone(),
                });
            }
            if fixture.repeat == 0 {
                return Err(CatalogError::ZeroFixtureRepeat {
                    fixture: fixture.name.clone(),
                });
            }
            if fixture.cases.is_empty() {
                return Err(CatalogError::NoFixtureCases {
                    fixture: fixture.name.clone(),
                });
            }

            let mut seen_tests = std::collections::HashSet::new();
            for test in &fixture.tests {
                if !seen_tests.insert(test.name.as_str()) {
                    return Err(CatalogError::DuplicateTest {
                        fixture: fixture.name.clone(),
                        test: test.name.clone(),
                    });
                }
                if test.repeat == 0 {
                    return Err(CatalogError::ZeroTestRepeat {
                        fixture: fixture.name.clone(),
                        test: test.name.clone(),
                    });
                }
                if test.cases.is_empty() {
                    return Err(CatalogError::NoTestCases {
                        fixture: fixture.name.clone(),
                        test: test.name.clone(),
                    });
                }
                if test.fixture_id != fixture.name {
                    return Err(CatalogError::FixtureMismatch {
                        test: test.name.clone(),
                        declared: test.fixture_id.clone(),
                        actual: fixture.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_test(name: &str, fixture: &str) -> TestCaseSpec {
        TestCaseSpec::new(name, fixture, |_, _| Ok(()))
    }

    #[test]
    fn case_tuple_suffixes() {
        assert_eq!(CaseTuple::empty().suffix(), "");
        assert_eq!(CaseTuple::new(vec![json!(1), json!(2)]).suffix(), "(1,2)");
        assert_eq!(CaseTuple::new(vec![json!("a")]).suffix(), "(\"a\")");
    }

    #[test]
    fn expected_raise_matching() {
        let exact = ExpectedRaise::new("io").with_message("boom", MatchMode::Exact);
        assert!(exact.matches("io", "boom"));
        assert!(!exact.matches("io", "boom!"));
        assert!(!exact.matches("parse", "boom"));

        let contains = ExpectedRaise::new("io").with_message("oo", MatchMode::Contains);
        assert!(contains.matches("io", "boom"));

        let regex = ExpectedRaise::new("io").with_message("^b.*m$", MatchMode::Regex);
        assert!(regex.matches("io", "boom"));
        assert!(!regex.matches("io", "booms"));

        let starts = ExpectedRaise::new("io").with_message("bo", MatchMode::StartsWith);
        assert!(starts.matches("io", "boom"));
        let ends = ExpectedRaise::new("io").with_message("om", MatchMode::EndsWith);
        assert!(ends.matches("io", "boom"));

        // No message constraint: kind equality alone decides.
        let plain = ExpectedRaise::new("io");
        assert!(plain.matches("io", "anything"));

        // Inverse negates the final result.
        let inverse = ExpectedRaise::new("io").inverted();
        assert!(!inverse.matches("io", "boom"));
        assert!(inverse.matches("parse", "boom"));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let bad = ExpectedRaise::new("io").with_message("(", MatchMode::Regex);
        assert!(!bad.matches("io", "("));
    }

    #[test]
    fn validate_catches_contract_violations() {
        let fixture = TestFixtureSpec::new("f", "src").with_test(noop_test("t", "f"));
        TestCatalog::new(vec![fixture.clone()]).validate().expect("valid catalog");

        let dup = TestCatalog::new(vec![fixture.clone(), fixture.clone()]);
        assert!(matches!(
            dup.validate(),
            Err(CatalogError::DuplicateFixture { .. })
        ));

        let zero_repeat = TestCatalog::new(vec![fixture.clone().with_repeat(0)]);
        assert!(matches!(
            zero_repeat.validate(),
            Err(CatalogError::ZeroFixtureRepeat { .. })
        ));

        let mismatch = TestCatalog::new(vec![
            TestFixtureSpec::new("g", "src").with_test(noop_test("t", "f")),
        ]);
        assert!(matches!(
            mismatch.validate(),
            Err(CatalogError::FixtureMismatch { .. })
        ));

        let no_cases = TestCatalog::new(vec![
            TestFixtureSpec::new("h", "src").with_test(noop_test("t", "h").with_cases(vec![])),
        ]);
        assert!(matches!(
            no_cases.validate(),
            Err(CatalogError::NoTestCases { .. })
        ));
    }

    #[test]
    fn invocation_counts_cover_the_repeat_case_matrix() {
        let fixture = TestFixtureSpec::new("f", "src")
            .with_repeat(2)
            .with_test(
                noop_test("t", "f")
                    .with_repeat(2)
                    .with_cases(vec![
                        CaseTuple::new(vec![json!(1)]),
                        CaseTuple::new(vec![json!(2)]),
                    ]),
            );
        assert_eq!(fixture.invocation_count(), 8);
        assert_eq!(TestCatalog::new(vec![fixture]).invocation_count(), 8);
    }
}
