// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The thread-safe result store.
//!
//! Workers commit results here as invocations finish. The store enforces one
//! update contract: a recorded `Success` is never replaced. Everything else
//! (first insert, or replacing a non-success) is accepted, which is what
//! lets a rerun of previously failed tests overwrite their old results
//! under the same identity while keeping already-green results intact.
//!
//! Counters are always computed from the live map; there is no separately
//! maintained tally that could drift from it.

use crate::{
    callout::{CalloutItem, CalloutQueue},
    reporter::{LiveSink, NullSink},
    results::{ResultKey, RunCounts, TestResult},
};
use crossbeam_channel::Sender;
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Mutex,
};
use tracing::debug;

/// A callback invoked synchronously for every accepted commit.
pub type ResultObserver = Box<dyn Fn(&TestResult) + Send + Sync>;

/// Stores one result per invocation identity.
pub struct ResultStore {
    map: Mutex<HashMap<ResultKey, TestResult>>,
    sink: Mutex<Box<dyn LiveSink>>,
    callout: Option<Sender<CalloutItem>>,
    observer: Option<ResultObserver>,
}

impl ResultStore {
    /// An empty store with no live sink, callout channel, or observer.
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            sink: Mutex::new(Box::new(NullSink)),
            callout: None,
            observer: None,
        }
    }

    /// Sets the live sink accepted commits are written to.
    pub fn with_sink(mut self, sink: Box<dyn LiveSink>) -> Self {
        self.sink = Mutex::new(sink);
        self
    }

    /// Sets the observer invoked for every accepted commit.
    pub fn with_observer(mut self, observer: ResultObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Routes accepted commits onto the callout channel.
    pub(crate) fn with_callout(mut self, queue: &CalloutQueue) -> Self {
        self.callout = queue.sender();
        self
    }

    /// Drops the store's callout sender so the consumer can observe the
    /// channel disconnecting. Must be called before joining the consumer.
    pub(crate) fn disconnect_callout(&mut self) {
        self.callout = None;
    }

    /// Commits `result`, returning whether it was accepted.
    ///
    /// A first result for an identity is inserted. A later result replaces
    /// the stored one unless the stored one is `Success`, which is
    /// protected: the commit is rejected and the map left untouched.
    ///
    /// Accepted commits fan out synchronously, in order: the live sink
    /// (under the sink lock, so lines never interleave), the callout
    /// channel, then the observer. The map lock is released first, so none
    /// of these can block other workers' commits.
    pub fn add_or_update(&self, result: TestResult) -> bool {
        let accepted = {
            let mut map = self.map.lock().expect("result map poisoned");
            match map.entry(result.key.clone()) {
                Entry::Occupied(mut entry) => {
                    if entry.get().state.is_success() {
                        false
                    } else {
                        entry.insert(result.clone());
                        true
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(result.clone());
                    true
                }
            }
        };
        if !accepted {
            debug!(key = %result.key, state = %result.state, "commit rejected, success already recorded");
            return false;
        }

        self.sink
            .lock()
            .expect("live sink poisoned")
            .result_committed(&result);
        if let Some(callout) = &self.callout {
            // Fails only once the consumer has exited, which only happens
            // after the run has stopped committing.
            let _ = callout.send(CalloutItem::Result(Box::new(result.clone())));
        }
        if let Some(observer) = &self.observer {
            observer(&result);
        }
        true
    }

    /// Returns the stored result for `key`, if any.
    pub fn get(&self, key: &ResultKey) -> Option<TestResult> {
        self.map
            .lock()
            .expect("result map poisoned")
            .get(key)
            .cloned()
    }

    /// A snapshot of all stored results, sorted by identity.
    pub fn results(&self) -> Vec<TestResult> {
        let map = self.map.lock().expect("result map poisoned");
        let mut results: Vec<_> = map.values().cloned().collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// A snapshot of the results whose absolute state is `Failure` or
    /// `Error`, sorted by identity. This is the rerun set: committing a new
    /// result under the same identity replaces these, while identities that
    /// went green in the meantime are protected.
    pub fn failed_results(&self) -> Vec<TestResult> {
        use crate::results::AbsoluteState;
        let map = self.map.lock().expect("result map poisoned");
        let mut results: Vec<_> = map
            .values()
            .filter(|r| {
                matches!(
                    r.state.absolute(),
                    AbsoluteState::Failure | AbsoluteState::Error
                )
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// Counters computed from the live map.
    pub fn counts(&self) -> RunCounts {
        let map = self.map.lock().expect("result map poisoned");
        let mut counts = RunCounts::default();
        for result in map.values() {
            counts.record(result.state);
        }
        counts
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.map.lock().expect("result map poisoned").len()
    }

    /// True if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
