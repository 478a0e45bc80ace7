// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The shared two-level scheduling algorithm.
//!
//! Both scheduler levels (fixtures across the run, tests within a fixture)
//! use the same plan: split serial from parallel items, sort each group by
//! qualified name, slice the parallel group into contiguous near-equal
//! segments, run the slices on real worker threads, then run the serial
//! group on one dedicated worker after every parallel worker has returned.
//!
//! Partitioning is deterministic: for a fixed catalog and thread count, two
//! runs produce identical per-worker slices.

use crate::{catalog::Schedulable, signal::InterruptFlag};
use std::thread;
use tracing::debug;

/// The deterministic partition of an item list across K workers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct SchedulePlan {
    /// One contiguous slice of item indices per parallel worker, each slice
    /// internally sorted by qualified name.
    pub(crate) parallel_slices: Vec<Vec<usize>>,
    /// Serial item indices, sorted by qualified name.
    pub(crate) serial: Vec<usize>,
}

impl SchedulePlan {
    /// Plans `items` across up to `threads` parallel workers.
    ///
    /// The serial/parallel split is skipped (everything treated as one
    /// parallel group) when `threads <= 1` or there is a single item.
    pub(crate) fn new<T: Schedulable>(items: &[T], threads: usize) -> Self {
        use crate::catalog::ConcurrencyMode;

        let split = threads > 1 && items.len() > 1;
        let mut parallel = Vec::new();
        let mut serial = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if split && item.concurrency() == ConcurrencyMode::Serial {
                serial.push(index);
            } else {
                parallel.push(index);
            }
        }

        // Names are unique per the catalog contract; the index tie-break
        // keeps the sort total regardless.
        let by_name = |&a: &usize, &b: &usize| {
            items[a]
                .sort_name()
                .cmp(items[b].sort_name())
                .then(a.cmp(&b))
        };
        parallel.sort_unstable_by(by_name);
        serial.sort_unstable_by(by_name);

        let parallel_slices = if parallel.is_empty() {
            Vec::new()
        } else {
            let workers = threads.max(1).min(parallel.len());
            let segment = parallel.len() / workers;
            (0..workers)
                .map(|w| {
                    let start = w * segment;
                    let end = if w + 1 == workers {
                        parallel.len()
                    } else {
                        (w + 1) * segment
                    };
                    parallel[start..end].to_vec()
                })
                .collect()
        };

        Self {
            parallel_slices,
            serial,
        }
    }
}

/// Runs `items` under the shared partitioning algorithm.
///
/// Each worker checks the interrupt flag before starting an item; on
/// interrupt it stops scheduling further items in its slice but lets the
/// in-flight item finish. Returns once all workers (including the serial
/// worker, if any) have completed.
pub(crate) fn run_partitioned<T, F>(
    items: &[T],
    threads: usize,
    interrupt: &InterruptFlag,
    label: &str,
    run_item: F,
) where
    T: Schedulable + Sync,
    F: Fn(&T) + Send + Sync,
{
    let plan = SchedulePlan::new(items, threads);
    debug!(
        label,
        parallel_workers = plan.parallel_slices.len(),
        serial_items = plan.serial.len(),
        "scheduling {} items",
        items.len()
    );

    let run_slice = |slice: &[usize]| {
        for &index in slice {
            if interrupt.is_set() {
                debug!(label, "interrupted, not scheduling further items");
                break;
            }
            run_item(&items[index]);
        }
    };

    if !plan.parallel_slices.is_empty() {
        thread::scope(|scope| {
            for (worker, slice) in plan.parallel_slices.iter().enumerate() {
                let run_slice = &run_slice;
                thread::Builder::new()
                    .name(format!("{label}-{worker}"))
                    .spawn_scoped(scope, move || run_slice(slice))
                    .expect("failed to spawn scheduler worker");
            }
            // The scope joins every parallel worker before returning.
        });
    }

    // The serial group runs only once all parallel workers have returned.
    if !plan.serial.is_empty() {
        thread::scope(|scope| {
            let run_slice = &run_slice;
            thread::Builder::new()
                .name(format!("{label}-serial"))
                .spawn_scoped(scope, move || run_slice(&plan.serial))
                .expect("failed to spawn serial scheduler worker");
        });
    }
}
