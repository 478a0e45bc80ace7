// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative interruption of a test run.
//!
//! Cancellation is non-preemptive: workers poll an atomic flag at loop
//! boundaries (before each fixture, fixture-repeat, fixture-case, test,
//! test-repeat and parameter case) and stop scheduling further items, while
//! any in-flight invocation runs to completion including its teardown.

use std::sync::{
    Arc, Condvar, Mutex,
    atomic::{AtomicBool, Ordering},
};

/// The interrupt flag polled by scheduler workers.
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub(crate) struct InterruptFlag {
    flag: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A handle that interrupts a running [`TestRunner`](crate::runner::TestRunner).
///
/// Safe to call from any thread and idempotent. [`interrupt`](Self::interrupt)
/// sets the run's interrupt flag and then blocks until every scheduler worker
/// and the callout consumer have drained and the run has returned control.
///
/// Calling `interrupt` from inside one of the run's own callbacks (the
/// result observer or a callout sink) would deadlock, since the run cannot
/// drain while the callback blocks it.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    flag: InterruptFlag,
    drained: Arc<(Mutex<bool>, Condvar)>,
}

impl InterruptHandle {
    pub(crate) fn new(flag: InterruptFlag) -> Self {
        Self {
            flag,
            drained: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Requests interruption and blocks until the run has fully drained.
    ///
    /// If the run has already completed this returns immediately. If no run
    /// has started yet, the flag stays set and the next `execute` call will
    /// stop at its first loop boundary; this call then returns once that
    /// (empty) run drains.
    pub fn interrupt(&self) {
        self.flag.set();
        let (lock, cvar) = &*self.drained;
        let mut drained = lock.lock().expect("drained lock poisoned");
        while !*drained {
            drained = cvar.wait(drained).expect("drained lock poisoned");
        }
    }

    /// Returns true if interruption has been requested.
    pub fn is_interrupted(&self) -> bool {
        self.flag.is_set()
    }

    /// Marks the run as drained, releasing every blocked `interrupt` call.
    pub(crate) fn mark_drained(&self) {
        let (lock, cvar) = &*self.drained;
        let mut drained = lock.lock().expect("drained lock poisoned");
        *drained = true;
        cvar.notify_all();
    }
}
