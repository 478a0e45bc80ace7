// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests driving whole catalogs through the runner.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use pretty_assertions::assert_eq;
use serde_json::json;
use testmill_runner::{
    catalog::{
        CaseTuple, ConcurrencyMode, ExpectedRaise, FixtureHandle, TestCaseSpec, TestCatalog,
        TestFixtureSpec,
    },
    config::RunConfig,
    results::{AbsoluteState, ResultState},
    runner::{RunReport, TestRunnerBuilder},
    verdict::{AssertSignal, TestError},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn run(catalog: &TestCatalog, fixture_threads: usize, test_threads: usize) -> RunReport {
    let config = RunConfig::new().with_threads(fixture_threads, test_threads);
    TestRunnerBuilder::new(config)
        .build()
        .expect("no sinks to validate")
        .execute(catalog)
        .expect("catalog is well-formed")
}

#[test]
fn repeat_and_case_matrix_yields_eight_distinct_identities() {
    init_tracing();
    let test = TestCaseSpec::new("t", "F", |_, _| Ok(()))
        .with_repeat(2)
        .with_cases(vec![
            CaseTuple::new(vec![json!(1)]),
            CaseTuple::new(vec![json!(2)]),
        ]);
    let fixture = TestFixtureSpec::new("F", "src").with_repeat(2).with_test(test);
    let report = run(&TestCatalog::new(vec![fixture]), 2, 2);

    let names: HashSet<String> = report
        .store
        .results()
        .into_iter()
        .map(|r| r.key.full_name)
        .collect();
    assert_eq!(names.len(), 8);
    for fixture_repeat in 1..=2 {
        for case in ["(1)", "(2)"] {
            for test_repeat in 1..=2 {
                let expected = format!("F#{fixture_repeat}::t{case}#{test_repeat}");
                assert!(names.contains(&expected), "missing {expected}");
            }
        }
    }
    assert_eq!(report.summary.counts.total, 8);
    assert_eq!(report.summary.counts.success, 8);
    assert!(report.summary.is_success());
}

#[test]
fn repeat_and_case_indices_land_on_the_results() {
    let test = TestCaseSpec::new("t", "F", |_, _| Ok(())).with_repeat(3);
    let fixture = TestFixtureSpec::new("F", "src").with_repeat(2).with_test(test);
    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);

    let mut pairs: Vec<(u32, u32)> = report
        .store
        .results()
        .into_iter()
        .map(|r| (r.fixture_repeat, r.test_repeat))
        .collect();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)]);
}

#[test]
fn global_setup_failure_blocks_every_body() {
    init_tracing();
    let bodies = Arc::new(AtomicUsize::new(0));

    let mut fixtures = Vec::new();
    for name in ["Alpha", "Beta"] {
        let counter = Arc::clone(&bodies);
        let test = TestCaseSpec::new("t", name, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        fixtures.push(TestFixtureSpec::new(name, "src").with_test(test));
    }
    let catalog = TestCatalog::new(fixtures)
        .with_global_setup(|| Err(TestError::raised("env", "database unreachable")));

    let report = run(&catalog, 2, 2);
    assert_eq!(bodies.load(Ordering::SeqCst), 0);
    assert_eq!(report.summary.counts.total, 2);
    for result in report.store.results() {
        assert_eq!(result.state, ResultState::GlobalSetupError);
        assert_eq!(result.message, "database unreachable");
    }
}

#[test]
fn fixture_setup_failure_still_enumerates_its_tests() {
    let bodies = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&bodies);
    let fixture = TestFixtureSpec::new("F", "src")
        .with_setup(|_| Err(TestError::raised("io", "port in use")))
        .with_test(TestCaseSpec::new("a", "F", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .with_test(TestCaseSpec::new("b", "F", |_, _| Ok(())));

    let report = run(&TestCatalog::new(vec![fixture]), 1, 2);
    assert_eq!(bodies.load(Ordering::SeqCst), 0);
    assert_eq!(report.summary.counts.total, 2);
    for result in report.store.results() {
        assert_eq!(result.state, ResultState::FixtureSetupError);
    }
}

#[test]
fn factory_failure_blocks_like_a_setup_failure() {
    let fixture = TestFixtureSpec::new("F", "src")
        .with_factory(|_| Err(TestError::raised("ctor", "no such service")))
        .with_test(TestCaseSpec::new("t", "F", |_, _| {
            panic!("body must not run")
        }));

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    let results = report.store.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, ResultState::FixtureSetupError);
    assert_eq!(results[0].message, "no such service");
}

#[test]
fn expected_raise_turns_the_error_into_success() {
    let test = TestCaseSpec::new("t", "F", |_, _| Err(TestError::raised("io", "boom")))
        .with_expected_raise(ExpectedRaise::new("io"));
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    assert_eq!(report.store.results()[0].state, ResultState::Success);
    assert!(report.summary.is_success());
}

#[test]
fn unexpected_raise_kind_stays_an_error() {
    let test = TestCaseSpec::new("t", "F", |_, _| Err(TestError::raised("parse", "boom")))
        .with_expected_raise(ExpectedRaise::new("io"));
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    assert_eq!(report.store.results()[0].state, ResultState::Error);
}

#[test]
fn inconclusive_signal_passes_through_at_the_body_site() {
    let test = TestCaseSpec::new("t", "F", |_, _| {
        std::panic::panic_any(AssertSignal::inconclusive("needs live endpoint"));
    });
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    let results = report.store.results();
    assert_eq!(results[0].state, ResultState::Inconclusive);
    assert_eq!(results[0].message, "needs live endpoint");
    assert_eq!(results[0].state.absolute(), AbsoluteState::Inconclusive);
}

#[test]
fn assertion_panic_maps_to_the_site_failure_variant() {
    let test = TestCaseSpec::new("t", "F", |_, _| {
        std::panic::panic_any(AssertSignal::failure("1 != 2"));
    });
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    assert_eq!(report.store.results()[0].state, ResultState::Failure);
}

#[test]
fn plain_panic_becomes_a_body_error() {
    let test = TestCaseSpec::new("t", "F", |_, _| panic!("index out of range"));
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    let results = report.store.results();
    assert_eq!(results[0].state, ResultState::Error);
    assert!(results[0].message.contains("index out of range"));
}

#[test]
fn case_setup_failure_skips_the_body() {
    let bodies = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&bodies);
    let test = TestCaseSpec::new("t", "F", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .with_setup(|_| Err(TestError::raised("io", "temp dir missing")));
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    assert_eq!(bodies.load(Ordering::SeqCst), 0);
    assert_eq!(report.store.results()[0].state, ResultState::SetupError);
}

#[test]
fn teardown_failure_never_downgrades_the_verdict() {
    let test = TestCaseSpec::new("t", "F", |_, _| Ok(()))
        .with_teardown(|_| Err(TestError::raised("io", "socket already closed")));
    let fixture = TestFixtureSpec::new("F", "src").with_test(test);

    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);
    assert_eq!(report.store.results()[0].state, ResultState::Success);
    assert!(report.summary.is_success());
}

struct Counter {
    hits: AtomicUsize,
}

#[test]
fn one_instance_is_constructed_per_repeat_and_case() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));

    let ctor = Arc::clone(&constructed);
    let mut fixture = TestFixtureSpec::new("F", "src")
        .with_repeat(2)
        .with_cases(vec![
            CaseTuple::new(vec![json!("a")]),
            CaseTuple::new(vec![json!("b")]),
        ])
        .with_factory(move |_| {
            ctor.fetch_add(1, Ordering::SeqCst);
            Ok(FixtureHandle::new(Counter {
                hits: AtomicUsize::new(0),
            }))
        });
    for name in ["x", "y", "z"] {
        let total = Arc::clone(&hits);
        fixture = fixture.with_test(TestCaseSpec::new(name, "F", move |handle, _| {
            let counter = handle.get::<Counter>().ok_or_else(|| {
                TestError::raised("fixture", "wrong fixture payload type")
            })?;
            counter.hits.fetch_add(1, Ordering::SeqCst);
            total.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }

    let report = run(&TestCatalog::new(vec![fixture]), 2, 3);
    // 2 repeats x 2 construction cases, 3 tests against each instance.
    assert_eq!(constructed.load(Ordering::SeqCst), 4);
    assert_eq!(hits.load(Ordering::SeqCst), 12);
    assert_eq!(report.summary.counts.success, 12);
}

#[test]
fn serial_fixtures_run_after_every_parallel_fixture() {
    init_tracing();
    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut fixtures = Vec::new();
    for name in ["P1", "P2", "P3", "P4"] {
        let log = Arc::clone(&events);
        let name_owned = name.to_owned();
        let test = TestCaseSpec::new("t", name, move |_, _| {
            // Hold the worker long enough that a premature serial start
            // would be observable.
            thread::sleep(Duration::from_millis(20));
            log.lock().unwrap().push(format!("end {name_owned}"));
            Ok(())
        });
        fixtures.push(TestFixtureSpec::new(name, "src").with_test(test));
    }
    for name in ["S1", "S2"] {
        let log = Arc::clone(&events);
        let name_owned = name.to_owned();
        let test = TestCaseSpec::new("t", name, move |_, _| {
            log.lock().unwrap().push(format!("start {name_owned}"));
            Ok(())
        });
        fixtures.push(
            TestFixtureSpec::new(name, "src")
                .with_concurrency(ConcurrencyMode::Serial)
                .with_test(test),
        );
    }

    run(&TestCatalog::new(vec![]), 1, 1); // smoke: empty catalog is fine
    run(&TestCatalog::new(fixtures), 3, 1);

    let events = events.lock().unwrap();
    let first_serial = events
        .iter()
        .position(|e| e.starts_with("start S"))
        .expect("serial fixtures ran");
    for name in ["P1", "P2", "P3", "P4"] {
        let ended = events
            .iter()
            .position(|e| e == &format!("end {name}"))
            .expect("parallel fixture ran");
        assert!(
            ended < first_serial,
            "{name} finished after a serial fixture started: {events:?}"
        );
    }
    // Serial fixtures execute in ascending name order.
    let serial: Vec<&String> = events.iter().filter(|e| e.starts_with("start S")).collect();
    assert_eq!(serial, ["start S1", "start S2"]);
}

#[test]
fn interrupt_stops_scheduling_and_unblocks_the_caller() {
    init_tracing();
    let later_bodies = Arc::new(AtomicUsize::new(0));
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);

    let config = RunConfig::new().with_threads(1, 1);
    let runner = TestRunnerBuilder::new(config).build().unwrap();
    let handle = runner.interrupt_handle();

    let trigger = {
        let handle = handle.clone();
        let test = TestCaseSpec::new("t", "AaTrigger", move |_, _| {
            ready_tx.send(()).expect("interrupter is waiting");
            while !handle.is_interrupted() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        });
        TestFixtureSpec::new("AaTrigger", "src").with_test(test)
    };
    let mut fixtures = vec![trigger];
    for name in ["BbSkipped", "CcSkipped"] {
        let counter = Arc::clone(&later_bodies);
        let test = TestCaseSpec::new("t", name, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        fixtures.push(TestFixtureSpec::new(name, "src").with_test(test));
    }

    let interrupter = {
        let handle = handle.clone();
        thread::spawn(move || {
            ready_rx.recv().expect("run started");
            // Blocks until the whole run has drained.
            handle.interrupt();
        })
    };

    let report = runner.execute(&TestCatalog::new(fixtures)).unwrap();
    interrupter.join().unwrap();

    // The in-flight invocation completed; nothing after it was scheduled.
    assert_eq!(later_bodies.load(Ordering::SeqCst), 0);
    assert_eq!(report.store.len(), 1);
    assert!(report.summary.interrupted);
    assert!(!report.summary.is_success());
}

#[test]
fn failed_results_view_supports_rerunning() {
    let flaky_runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&flaky_runs);
    let flaky = move |_: &FixtureHandle, _: &CaseTuple| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(TestError::raised("io", "flaky connection"))
        } else {
            Ok(())
        }
    };

    let fixture = TestFixtureSpec::new("F", "src")
        .with_test(TestCaseSpec::new("flaky", "F", flaky.clone()))
        .with_test(TestCaseSpec::new("steady", "F", |_, _| Ok(())));
    let report = run(&TestCatalog::new(vec![fixture]), 1, 1);

    let failed = report.store.failed_results();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].key.full_name, "F::flaky");

    // A rerun commits under the same identity; the store replaces the
    // failure and protects the steady test's success.
    let rerun_fixture =
        TestFixtureSpec::new("F", "src").with_test(TestCaseSpec::new("flaky", "F", flaky));
    let store = report.store;
    let rerun = run(&TestCatalog::new(vec![rerun_fixture]), 1, 1);
    let rerun_results = rerun.store.results();
    let recovered = &rerun_results[0];
    assert_eq!(recovered.state, ResultState::Success);

    // The original store still enforces its own contract.
    assert!(store.add_or_update(recovered.clone()));
    assert!(store.failed_results().is_empty());
}

#[test]
fn observer_sees_every_commit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer_log = Arc::clone(&seen);

    let fixture = TestFixtureSpec::new("F", "src")
        .with_test(TestCaseSpec::new("a", "F", |_, _| Ok(())))
        .with_test(TestCaseSpec::new("b", "F", |_, _| {
            Err(TestError::raised("io", "boom"))
        }));
    let report = TestRunnerBuilder::new(RunConfig::new().with_threads(1, 1))
        .with_observer(Box::new(move |result| {
            observer_log
                .lock()
                .unwrap()
                .push((result.key.full_name.clone(), result.state));
        }))
        .build()
        .unwrap()
        .execute(&TestCatalog::new(vec![fixture]))
        .unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        seen,
        vec![
            ("F::a".to_owned(), ResultState::Success),
            ("F::b".to_owned(), ResultState::Error),
        ]
    );
    assert_eq!(report.summary.counts.total, 2);
}
