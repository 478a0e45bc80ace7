// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run configuration.
//!
//! The configuration collaborator validates everything before the engine
//! sees it: thread counts arrive clamped to >= 1 and the sink list is
//! already resolved. A [`RunConfig`] is supplied once per run and read-only
//! during execution.

use crate::callout::SinkKind;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use uuid::Uuid;

/// A unique identifier for one test run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh random run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One configured notification sink.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// The sink kind.
    pub kind: SinkKind,
    /// The POST endpoint.
    pub url: String,
}

impl SinkConfig {
    /// Creates a sink configuration.
    pub fn new(kind: SinkKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// Configuration for one test run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Number of fixture-level worker threads.
    pub fixture_threads: usize,
    /// Number of test-level worker threads per fixture.
    pub test_threads: usize,
    /// A human-readable run name, carried in the webhook envelope.
    pub run_name: String,
    /// The project name, carried in the webhook envelope.
    pub project: String,
    /// The environment name, carried in the webhook envelope.
    pub environment: String,
    /// An external session id, carried in the webhook envelope.
    pub session_id: String,
    /// The resolved notification sinks.
    pub sinks: Vec<SinkConfig>,
    /// How long the callout consumer sleeps when its queue is empty.
    pub callout_poll_interval: Duration,
    /// The timeout applied to each sink POST.
    pub callout_timeout: Duration,
}

impl RunConfig {
    /// A configuration with both thread counts set to the available
    /// parallelism, no sinks, and default callout timing.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            fixture_threads: threads,
            test_threads: threads,
            run_name: String::new(),
            project: String::new(),
            environment: String::new(),
            session_id: String::new(),
            sinks: Vec::new(),
            callout_poll_interval: Duration::from_millis(100),
            callout_timeout: Duration::from_secs(10),
        }
    }

    /// Sets both thread counts.
    pub fn with_threads(mut self, fixture_threads: usize, test_threads: usize) -> Self {
        self.fixture_threads = fixture_threads;
        self.test_threads = test_threads;
        self
    }

    /// Sets the sink list.
    pub fn with_sinks(mut self, sinks: Vec<SinkConfig>) -> Self {
        self.sinks = sinks;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity metadata for one run, carried into every callout envelope.
#[derive(Clone, Debug)]
pub struct RunMeta {
    /// The run id.
    pub run_id: RunId,
    /// The run name.
    pub run_name: String,
    /// The project name.
    pub project: String,
    /// The environment name.
    pub environment: String,
    /// The external session id.
    pub session_id: String,
}

impl RunMeta {
    pub(crate) fn for_run(run_id: RunId, config: &RunConfig) -> Self {
        Self {
            run_id,
            run_name: config.run_name.clone(),
            project: config.project.clone(),
            environment: config.environment.clone(),
            session_id: config.session_id.clone(),
        }
    }
}
