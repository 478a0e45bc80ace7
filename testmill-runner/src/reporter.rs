// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live console output and the end-of-run summary.
//!
//! The store calls the live sink synchronously for every committed result,
//! holding the sink lock so lines from concurrent workers never interleave.

use crate::{
    callout::CalloutStats,
    config::RunId,
    helpers::plural,
    results::{AbsoluteState, RunCounts, TestResult},
};
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    io::{self, Write},
    time::Duration,
};

/// Receives every committed result, in commit order.
pub trait LiveSink: Send {
    /// Called under the store's sink lock for each accepted result.
    fn result_committed(&mut self, result: &TestResult);
}

/// A [`LiveSink`] that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl LiveSink for NullSink {
    fn result_committed(&mut self, _result: &TestResult) {}
}

#[derive(Clone, Copy, Debug, Default)]
struct Styles {
    pass: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorized() -> Self {
        Self {
            pass: Style::new().green().bold(),
            fail: Style::new().red().bold(),
            skip: Style::new().yellow().bold(),
        }
    }

    fn for_state(&self, state: AbsoluteState) -> Style {
        match state {
            AbsoluteState::Success => self.pass,
            AbsoluteState::Failure | AbsoluteState::Error => self.fail,
            AbsoluteState::Ignored | AbsoluteState::Inconclusive => self.skip,
        }
    }
}

/// Writes one line per committed result.
pub struct ConsoleSink {
    writer: Box<dyn Write + Send>,
    styles: Styles,
}

impl ConsoleSink {
    /// A sink writing to standard error without colors.
    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// A sink writing to `writer` without colors.
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            styles: Styles::default(),
        }
    }

    /// Enables ANSI colors.
    pub fn colorize(mut self) -> Self {
        self.styles = Styles::colorized();
        self
    }
}

impl LiveSink for ConsoleSink {
    fn result_committed(&mut self, result: &TestResult) {
        let style = self.styles.for_state(result.state.absolute());
        let mut line = format!(
            "{:>12} [{:>8.3}s] {}",
            result.state.console_label().style(style),
            result.duration.as_secs_f64(),
            result.key,
        );
        if !result.message.is_empty() {
            line.push(' ');
            line.push_str(&result.message);
        }
        // A closed console must not take the run down with it.
        if writeln!(self.writer, "{line}").is_err() {
            return;
        }
        let _ = self.writer.flush();
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

/// The final report of one run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// The run's id.
    pub run_id: RunId,
    /// Final counters over the result store.
    pub counts: RunCounts,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
    /// True if the run was interrupted before completing.
    pub interrupted: bool,
    /// Delivery counters from the callout consumer.
    pub callout: CalloutStats,
}

impl RunSummary {
    /// True if every recorded result succeeded and the run was not
    /// interrupted.
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.counts.is_success()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        write!(
            f,
            "{} {} run in {:.3}s: {} passed, {} failed, {} errored, {} ignored, {} inconclusive",
            c.total,
            plural::tests_str(c.total),
            self.duration.as_secs_f64(),
            c.success,
            c.failure,
            c.error,
            c.ignored,
            c.inconclusive,
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callout::ChannelHints,
        results::{ResultKey, ResultState},
    };
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    /// A writer handing its bytes back out through an `Arc`.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_sink_writes_one_line_per_result() {
        let buf = SharedBuf::default();
        let mut sink = ConsoleSink::new(Box::new(buf.clone()));
        sink.result_committed(&TestResult {
            key: ResultKey::new("src", "Db::migrate"),
            fixture_repeat: 1,
            test_repeat: 1,
            state: ResultState::Failure,
            message: "column missing".to_owned(),
            stack: String::new(),
            duration: Duration::from_millis(150),
            created_at: Utc::now(),
            author: None,
            version: None,
            channels: ChannelHints::default(),
        });

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("FAIL"));
        assert!(out.contains("src::Db::migrate"));
        assert!(out.contains("column missing"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn summary_display_reports_all_counters() {
        let summary = RunSummary {
            run_id: RunId::new(),
            counts: RunCounts {
                total: 4,
                success: 2,
                failure: 1,
                error: 1,
                ..RunCounts::default()
            },
            duration: Duration::from_millis(2500),
            interrupted: false,
            callout: CalloutStats::default(),
        };
        assert_eq!(
            summary.to_string(),
            "4 tests run in 2.500s: 2 passed, 1 failed, 1 errored, 0 ignored, 0 inconclusive"
        );
        assert!(!summary.is_success());
    }

    #[test]
    fn interrupted_summary_is_never_a_success() {
        let summary = RunSummary {
            run_id: RunId::new(),
            counts: RunCounts {
                total: 1,
                success: 1,
                ..RunCounts::default()
            },
            duration: Duration::ZERO,
            interrupted: true,
            callout: CalloutStats::default(),
        };
        assert!(summary.to_string().ends_with("(interrupted)"));
        assert!(!summary.is_success());
    }
}
