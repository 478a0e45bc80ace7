// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The JSON envelope posted to notification sinks.

use crate::{
    config::{RunId, RunMeta},
    results::{RunCounts, TestResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a callout envelope announces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalloutAction {
    /// The run has started.
    Start,
    /// One test invocation completed.
    Result,
    /// The run has finished.
    End,
}

/// The wire shape posted to webhook sinks, borrowing from the run metadata
/// and the result being announced.
#[derive(Debug, Serialize)]
pub(crate) struct Envelope<'a> {
    pub(crate) run_id: RunId,
    pub(crate) run_name: &'a str,
    pub(crate) project: &'a str,
    pub(crate) environment: &'a str,
    pub(crate) session_id: &'a str,
    pub(crate) action: CalloutAction,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) results: Vec<EnvelopeResult<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) counts: Option<&'a RunCounts>,
}

/// One result entry inside an [`Envelope`].
#[derive(Debug, Serialize)]
pub(crate) struct EnvelopeResult<'a> {
    pub(crate) source_id: &'a str,
    pub(crate) full_name: &'a str,
    pub(crate) fixture_repeat: u32,
    pub(crate) test_repeat: u32,
    pub(crate) state: crate::results::ResultState,
    pub(crate) message: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub(crate) stack: &'a str,
    pub(crate) duration_ms: u128,
    pub(crate) created_at: &'a DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    fn bare(meta: &'a RunMeta, action: CalloutAction) -> Self {
        Self {
            run_id: meta.run_id,
            run_name: &meta.run_name,
            project: &meta.project,
            environment: &meta.environment,
            session_id: &meta.session_id,
            action,
            results: Vec::new(),
            counts: None,
        }
    }

    pub(crate) fn start(meta: &'a RunMeta) -> Self {
        Self::bare(meta, CalloutAction::Start)
    }

    pub(crate) fn result(meta: &'a RunMeta, result: &'a TestResult) -> Self {
        let mut envelope = Self::bare(meta, CalloutAction::Result);
        envelope.results.push(EnvelopeResult {
            source_id: &result.key.source_id,
            full_name: &result.key.full_name,
            fixture_repeat: result.fixture_repeat,
            test_repeat: result.test_repeat,
            state: result.state,
            message: &result.message,
            stack: &result.stack,
            duration_ms: result.duration.as_millis(),
            created_at: &result.created_at,
            author: result.author.as_deref(),
            version: result.version.as_deref(),
        });
        envelope
    }

    pub(crate) fn end(meta: &'a RunMeta, counts: &'a RunCounts) -> Self {
        let mut envelope = Self::bare(meta, CalloutAction::End);
        envelope.counts = Some(counts);
        envelope
    }

    /// Renders the envelope as a short human-readable line for chat sinks.
    pub(crate) fn chat_text(&self) -> String {
        let name = if self.run_name.is_empty() {
            self.run_id.to_string()
        } else {
            self.run_name.to_owned()
        };
        match self.action {
            CalloutAction::Start => {
                format!("Test run `{name}` started ({}/{})", self.project, self.environment)
            }
            CalloutAction::Result => self
                .results
                .iter()
                .map(|r| {
                    format!(
                        "[{}] {}::{}: {}",
                        r.state.console_label(),
                        r.source_id,
                        r.full_name,
                        if r.message.is_empty() { "ok" } else { r.message },
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            CalloutAction::End => match self.counts {
                Some(counts) => format!(
                    "Test run `{name}` finished: {}/{} succeeded, {} failed, {} errored",
                    counts.success, counts.total, counts.failure, counts.error,
                ),
                None => format!("Test run `{name}` finished"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{callout::ChannelHints, config::RunConfig, results::ResultKey, results::ResultState};
    use std::time::Duration;

    fn meta() -> RunMeta {
        let mut config = RunConfig::new();
        config.run_name = "nightly".to_owned();
        config.project = "billing".to_owned();
        config.environment = "staging".to_owned();
        RunMeta::for_run(RunId::new(), &config)
    }

    fn result() -> TestResult {
        TestResult {
            key: ResultKey::new("suite.billing", "Invoices#2::rounding(\"usd\")"),
            fixture_repeat: 2,
            test_repeat: 1,
            state: ResultState::Failure,
            message: "expected 10.00, got 10.01".to_owned(),
            stack: String::new(),
            duration: Duration::from_millis(42),
            created_at: Utc::now(),
            author: None,
            version: None,
            channels: ChannelHints::default(),
        }
    }

    #[test]
    fn result_envelope_serializes_the_invocation() {
        let meta = meta();
        let result = result();
        let value = serde_json::to_value(Envelope::result(&meta, &result)).unwrap();
        assert_eq!(value["action"], "result");
        assert_eq!(value["run_name"], "nightly");
        assert_eq!(value["results"][0]["state"], "failure");
        assert_eq!(value["results"][0]["duration_ms"], 42);
        assert_eq!(value["results"][0]["full_name"], "Invoices#2::rounding(\"usd\")");
        // Empty optional fields stay off the wire.
        assert!(value["results"][0].get("stack").is_none());
        assert!(value.get("counts").is_none());
    }

    #[test]
    fn start_and_end_envelopes_carry_no_results() {
        let meta = meta();
        let start = serde_json::to_value(Envelope::start(&meta)).unwrap();
        assert_eq!(start["action"], "start");
        assert!(start.get("results").is_none());

        let counts = RunCounts {
            total: 3,
            success: 2,
            failure: 1,
            ..RunCounts::default()
        };
        let end = serde_json::to_value(Envelope::end(&meta, &counts)).unwrap();
        assert_eq!(end["action"], "end");
        assert_eq!(end["counts"]["success"], 2);
    }

    #[test]
    fn chat_text_summarizes_each_action() {
        let meta = meta();
        assert_eq!(
            Envelope::start(&meta).chat_text(),
            "Test run `nightly` started (billing/staging)"
        );

        let result = result();
        let line = Envelope::result(&meta, &result).chat_text();
        assert!(line.starts_with("[FAIL] suite.billing::Invoices#2"));
        assert!(line.ends_with("expected 10.00, got 10.01"));

        let counts = RunCounts {
            total: 5,
            success: 4,
            failure: 1,
            ..RunCounts::default()
        };
        assert_eq!(
            Envelope::end(&meta, &counts).chat_text(),
            "Test run `nightly` finished: 4/5 succeeded, 1 failed, 0 errored"
        );
    }
}
