// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The top-level runner.

use crate::{
    callout::{CalloutItem, CalloutQueue},
    catalog::TestCatalog,
    config::{RunConfig, RunId, RunMeta},
    errors::{CatalogError, SinkConfigError},
    helpers::plural,
    reporter::{LiveSink, RunSummary},
    runner::fixture::{self, RunContext},
    schedule::run_partitioned,
    signal::{InterruptFlag, InterruptHandle},
    store::{ResultObserver, ResultStore},
    verdict::{BlockingError, FailureSite, catch, derive_state},
};
use std::time::Instant;
use tracing::{info, warn};

/// Builds a [`TestRunner`].
pub struct TestRunnerBuilder {
    config: RunConfig,
    sink: Option<Box<dyn LiveSink>>,
    observer: Option<ResultObserver>,
}

impl TestRunnerBuilder {
    /// Starts a builder from a run configuration.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            sink: None,
            observer: None,
        }
    }

    /// Sets the live sink committed results are streamed to.
    pub fn with_live_sink(mut self, sink: Box<dyn LiveSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets an observer invoked synchronously for every committed result.
    pub fn with_observer(mut self, observer: ResultObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validates the sink list and creates the runner.
    ///
    /// Thread counts are clamped to at least 1.
    pub fn build(self) -> Result<TestRunner, SinkConfigError> {
        for sink in &self.config.sinks {
            if !sink.url.starts_with("http://") && !sink.url.starts_with("https://") {
                return Err(SinkConfigError {
                    kind: sink.kind,
                    url: sink.url.clone(),
                });
            }
        }
        let mut config = self.config;
        config.fixture_threads = config.fixture_threads.max(1);
        config.test_threads = config.test_threads.max(1);

        let interrupt = InterruptFlag::new();
        let handle = InterruptHandle::new(interrupt.clone());
        Ok(TestRunner {
            config,
            sink: self.sink,
            observer: self.observer,
            interrupt,
            handle,
        })
    }
}

impl std::fmt::Debug for TestRunnerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunnerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What a completed (or interrupted) run hands back.
#[derive(Debug)]
pub struct RunReport {
    /// The end-of-run summary.
    pub summary: RunSummary,
    /// The result store, for the read-only views.
    pub store: ResultStore,
}

/// Executes a [`TestCatalog`] under a [`RunConfig`].
pub struct TestRunner {
    config: RunConfig,
    sink: Option<Box<dyn LiveSink>>,
    observer: Option<ResultObserver>,
    interrupt: InterruptFlag,
    handle: InterruptHandle,
}

impl TestRunner {
    /// A handle for interrupting this run from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.handle.clone()
    }

    /// Runs the whole catalog and reports the outcome.
    ///
    /// Failures inside test code never escape this call: they are converted
    /// to results and committed. The only error returned is a malformed
    /// catalog, which is a discovery-contract violation and fatal.
    pub fn execute(self, catalog: &TestCatalog) -> Result<RunReport, CatalogError> {
        if let Err(error) = catalog.validate() {
            self.handle.mark_drained();
            return Err(error);
        }

        let run_id = RunId::new();
        let invocations = catalog.invocation_count();
        info!(
            %run_id,
            fixture_threads = self.config.fixture_threads,
            test_threads = self.config.test_threads,
            "starting test run: {} {} across {} {}",
            invocations,
            plural::tests_str(invocations),
            catalog.fixtures.len(),
            plural::fixtures_str(catalog.fixtures.len()),
        );

        let meta = RunMeta::for_run(run_id, &self.config);
        let queue = CalloutQueue::start(meta, &self.config, self.interrupt.clone());
        let mut store = ResultStore::new().with_callout(&queue);
        if let Some(sink) = self.sink {
            store = store.with_sink(sink);
        }
        if let Some(observer) = self.observer {
            store = store.with_observer(observer);
        }

        queue.enqueue(CalloutItem::Start);
        let started = Instant::now();

        let blocking = catalog.global_setup.as_ref().and_then(|setup| {
            match catch(|| (setup.0)()) {
                Ok(()) => None,
                Err(error) => {
                    warn!(%error, "global setup failed, blocking every fixture");
                    Some(BlockingError {
                        site: FailureSite::GlobalSetup,
                        error,
                    })
                }
            }
        });

        {
            let ctx = RunContext {
                store: &store,
                interrupt: &self.interrupt,
                test_threads: self.config.test_threads,
                blocked: blocking.as_ref(),
            };
            run_partitioned(
                &catalog.fixtures,
                self.config.fixture_threads,
                &self.interrupt,
                "testmill-fixture",
                |spec| fixture::run_fixture(&ctx, spec),
            );
        }

        // Global teardown is always attempted, interrupt or not.
        if let Some(teardown) = &catalog.global_teardown {
            if let Err(error) = catch(|| (teardown.0)()) {
                let verdict = derive_state(FailureSite::GlobalTeardown, &error, None);
                warn!(
                    state = %verdict.state,
                    message = %verdict.message,
                    "global teardown failed"
                );
            }
        }

        let counts = store.counts();
        queue.enqueue(CalloutItem::End(counts));
        store.disconnect_callout();
        let callout = queue.finish();

        let summary = RunSummary {
            run_id,
            counts,
            duration: started.elapsed(),
            interrupted: self.interrupt.is_set(),
            callout,
        };
        let failures = counts.failure + counts.error;
        info!(
            %run_id,
            %summary,
            "test run finished with {} {}",
            failures,
            plural::failures_str(failures),
        );
        self.handle.mark_drained();
        Ok(RunReport { summary, store })
    }
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
