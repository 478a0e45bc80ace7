// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The asynchronous callout queue.
//!
//! Completed results (and run start/end announcements) are enqueued on an
//! unbounded channel and delivered to notification sinks by one dedicated
//! background thread, so a slow or down endpoint never stalls a test worker.
//! Each sink carries a circuit breaker: after [`BREAK_AFTER`] consecutive
//! delivery failures the sink is disabled for the remainder of the run. A
//! successful delivery resets the consecutive-failure count, but a sink that
//! has broken stays broken.

mod envelope;
mod sinks;

pub use self::envelope::CalloutAction;
pub(crate) use self::envelope::Envelope;
pub(crate) use self::sinks::{CalloutSink, CalloutTransport, ChatSink, UreqTransport, WebhookSink};

use crate::{
    config::{RunConfig, RunMeta},
    results::{RunCounts, TestResult},
    signal::InterruptFlag,
};
use crossbeam_channel::{Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::{fmt, thread, time::Duration};
use tracing::{debug, warn};

/// Consecutive delivery failures after which a sink's breaker opens.
const BREAK_AFTER: u32 = 5;

/// The kind of notification sink, which decides the payload shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// A generic webhook receiving the full JSON envelope.
    Webhook,
    /// A chat-style endpoint receiving a `{"text": ...}` summary.
    Chat,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Webhook => f.write_str("webhook"),
            SinkKind::Chat => f.write_str("chat"),
        }
    }
}

/// Which sink kinds a test's results are announced to.
///
/// Run start/end announcements ignore hints and go to every sink.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelHints {
    /// Deliver to webhook sinks.
    pub webhook: bool,
    /// Deliver to chat sinks.
    pub chat: bool,
}

impl Default for ChannelHints {
    fn default() -> Self {
        Self {
            webhook: true,
            chat: true,
        }
    }
}

impl ChannelHints {
    /// Hints that suppress every sink.
    pub fn none() -> Self {
        Self {
            webhook: false,
            chat: false,
        }
    }

    /// Returns true if results should be delivered to sinks of `kind`.
    pub fn allows(&self, kind: SinkKind) -> bool {
        match kind {
            SinkKind::Webhook => self.webhook,
            SinkKind::Chat => self.chat,
        }
    }
}

/// One message on the callout channel.
#[derive(Clone, Debug)]
pub(crate) enum CalloutItem {
    /// Announce the start of the run.
    Start,
    /// Announce one completed invocation.
    Result(Box<TestResult>),
    /// Announce the end of the run with final counters.
    End(RunCounts),
}

/// Delivery counters reported by the consumer when it exits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CalloutStats {
    /// Envelopes delivered successfully.
    pub delivered: usize,
    /// Delivery attempts that failed.
    pub failed: usize,
    /// Deliveries skipped because the sink's breaker was open.
    pub skipped: usize,
    /// Sinks whose breaker opened during the run.
    pub broken_sinks: usize,
}

struct SinkState {
    sink: Box<dyn CalloutSink>,
    consecutive_failures: u32,
    broken: bool,
}

/// Producer handle for the callout channel, owned by the runner.
///
/// Dropping the queue without calling [`finish`](Self::finish) disconnects
/// the channel; the consumer drains whatever is queued and exits on its own.
pub(crate) struct CalloutQueue {
    sender: Option<Sender<CalloutItem>>,
    worker: Option<thread::JoinHandle<CalloutStats>>,
}

impl CalloutQueue {
    /// Spawns the consumer thread for the sinks named in `config`.
    ///
    /// With no sinks configured the queue is inert: enqueues are dropped and
    /// no thread is spawned.
    pub(crate) fn start(meta: RunMeta, config: &RunConfig, interrupt: InterruptFlag) -> Self {
        let sinks: Vec<Box<dyn CalloutSink>> = config
            .sinks
            .iter()
            .map(|sink| match sink.kind {
                SinkKind::Webhook => {
                    Box::new(WebhookSink::new(&sink.url)) as Box<dyn CalloutSink>
                }
                SinkKind::Chat => Box::new(ChatSink::new(&sink.url)),
            })
            .collect();
        let transport = Box::new(UreqTransport::new(config.callout_timeout));
        Self::spawn(meta, sinks, transport, config.callout_poll_interval, interrupt)
    }

    pub(crate) fn spawn(
        meta: RunMeta,
        sinks: Vec<Box<dyn CalloutSink>>,
        transport: Box<dyn CalloutTransport>,
        poll_interval: Duration,
        interrupt: InterruptFlag,
    ) -> Self {
        if sinks.is_empty() {
            return Self {
                sender: None,
                worker: None,
            };
        }
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("testmill-callout".to_owned())
            .spawn(move || {
                let mut sinks: Vec<SinkState> = sinks
                    .into_iter()
                    .map(|sink| SinkState {
                        sink,
                        consecutive_failures: 0,
                        broken: false,
                    })
                    .collect();
                let mut stats = CalloutStats::default();
                loop {
                    match receiver.try_recv() {
                        Ok(item) => dispatch(&meta, &*transport, &mut sinks, &item, &mut stats),
                        Err(TryRecvError::Empty) => {
                            // On interrupt the queue has been drained by the
                            // time we see Empty, so exiting here is graceful.
                            if interrupt.is_set() {
                                break;
                            }
                            thread::sleep(poll_interval);
                        }
                        Err(TryRecvError::Disconnected) => break,
                    }
                }
                stats.broken_sinks = sinks.iter().filter(|s| s.broken).count();
                debug!(
                    delivered = stats.delivered,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    broken_sinks = stats.broken_sinks,
                    "callout consumer exiting"
                );
                stats
            })
            .expect("failed to spawn callout consumer");
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// A sender clone for the callout channel, `None` when the queue is
    /// inert.
    pub(crate) fn sender(&self) -> Option<Sender<CalloutItem>> {
        self.sender.clone()
    }

    /// Enqueues an item without blocking. Dropped if no sinks are configured.
    pub(crate) fn enqueue(&self, item: CalloutItem) {
        if let Some(sender) = &self.sender {
            // Fails only if the consumer has already exited.
            let _ = sender.send(item);
        }
    }

    /// Disconnects the channel, waits for the consumer to drain, and returns
    /// its delivery counters.
    pub(crate) fn finish(mut self) -> CalloutStats {
        self.sender = None;
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or_default(),
            None => CalloutStats::default(),
        }
    }
}

fn dispatch(
    meta: &RunMeta,
    transport: &dyn CalloutTransport,
    sinks: &mut [SinkState],
    item: &CalloutItem,
    stats: &mut CalloutStats,
) {
    let envelope = match item {
        CalloutItem::Start => Envelope::start(meta),
        CalloutItem::Result(result) => Envelope::result(meta, result),
        CalloutItem::End(counts) => Envelope::end(meta, counts),
    };
    for state in sinks.iter_mut() {
        if let CalloutItem::Result(result) = item {
            if !result.channels.allows(state.sink.kind()) {
                continue;
            }
        }
        if state.broken {
            stats.skipped += 1;
            continue;
        }
        match state.sink.deliver(transport, &envelope) {
            Ok(()) => {
                state.consecutive_failures = 0;
                stats.delivered += 1;
            }
            Err(error) => {
                state.consecutive_failures += 1;
                stats.failed += 1;
                warn!(
                    sink = %state.sink.kind(),
                    consecutive = state.consecutive_failures,
                    %error,
                    "callout delivery failed"
                );
                if state.consecutive_failures >= BREAK_AFTER {
                    state.broken = true;
                    warn!(
                        sink = %state.sink.kind(),
                        "circuit breaker opened, sink disabled for the rest of the run"
                    );
                }
            }
        }
    }
}
