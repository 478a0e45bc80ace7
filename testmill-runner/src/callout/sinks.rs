// Copyright (c) The testmill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sink implementations and the HTTP transport seam.

use crate::{
    callout::{SinkKind, envelope::Envelope},
    errors::CalloutError,
};
use std::time::Duration;

/// Posts a JSON body to a URL.
///
/// The trait exists so the consumer loop can be exercised without a network;
/// production runs use [`UreqTransport`].
pub(crate) trait CalloutTransport: Send {
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// The blocking HTTP transport used by real runs.
pub(crate) struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub(crate) fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }
}

impl CalloutTransport for UreqTransport {
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Non-2xx statuses surface as ureq::Error::Status.
        self.agent.post(url).send_json(body)?;
        Ok(())
    }
}

/// One notification sink the consumer delivers envelopes to.
pub(crate) trait CalloutSink: Send {
    fn kind(&self) -> SinkKind;

    fn deliver(
        &mut self,
        transport: &dyn CalloutTransport,
        envelope: &Envelope<'_>,
    ) -> Result<(), CalloutError>;
}

/// Posts the full JSON envelope to a generic webhook endpoint.
pub(crate) struct WebhookSink {
    url: String,
}

impl WebhookSink {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl CalloutSink for WebhookSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Webhook
    }

    fn deliver(
        &mut self,
        transport: &dyn CalloutTransport,
        envelope: &Envelope<'_>,
    ) -> Result<(), CalloutError> {
        let body =
            serde_json::to_value(envelope).map_err(|source| CalloutError::Serialize { source })?;
        transport
            .post_json(&self.url, &body)
            .map_err(|source| CalloutError::Delivery {
                url: self.url.clone(),
                source,
            })
    }
}

/// Posts a short human-readable message to a chat-style endpoint.
pub(crate) struct ChatSink {
    url: String,
}

impl ChatSink {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl CalloutSink for ChatSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Chat
    }

    fn deliver(
        &mut self,
        transport: &dyn CalloutTransport,
        envelope: &Envelope<'_>,
    ) -> Result<(), CalloutError> {
        let body = serde_json::json!({ "text": envelope.chat_text() });
        transport
            .post_json(&self.url, &body)
            .map_err(|source| CalloutError::Delivery {
                url: self.url.clone(),
                source,
            })
    }
}
