// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events framing for the streaming APIs, via `eventsource-stream`.

use cortex_core::CortexError;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};

/// One SSE event: its `event:` name (empty when absent) and `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Frame a streaming response body as SSE events.
pub(crate) fn events(
    provider: &'static str,
    response: reqwest::Response,
) -> impl Stream<Item = Result<SseEvent, CortexError>> + Send {
    response.bytes_stream().eventsource().map(move |result| {
        result
            .map(|event| SseEvent {
                event: event.event,
                data: event.data,
            })
            .map_err(|e| CortexError::unavailable(provider, format!("event stream interrupted: {e}")))
    })
}
