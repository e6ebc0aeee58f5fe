use axum::body::Body;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use relaygate_schema::anthropic::StreamEvent;

use crate::streaming::reframe_line;

const SSE_HEADERS: &[(&str, &str)] = &[
    ("content-type", "text/event-stream; charset=utf-8"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
];

fn with_sse_headers(mut resp: Response) -> Response {
    for (name, value) in SSE_HEADERS {
        resp.headers_mut().insert(
            axum::http::HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    resp
}

/// Forwards an already-SSE upstream body byte-for-byte, re-framing each line
/// through [`reframe_line`] so the doubled blank-line terminator survives
/// whatever chunk boundaries the transport handed back. Used for Claude and
/// Factory, whose wire format *is* Anthropic's own SSE — re-parsing and
/// re-serializing each event would risk losing byte-for-byte fidelity for no
/// benefit.
pub fn passthrough_stream(upstream: reqwest::Response) -> Response {
    let byte_stream = upstream.bytes_stream();
    let framed = byte_stream.scan(String::new(), |buf, chunk| {
        let out = match chunk {
            Ok(bytes) => {
                buf.push_str(&String::from_utf8_lossy(&bytes));
                let mut rendered = String::new();
                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    rendered.push_str(&reframe_line(line.trim_end_matches('\n')));
                }
                Ok(axum::body::Bytes::from(rendered))
            }
            Err(e) => Err(std::io::Error::other(e.to_string())),
        };
        futures::future::ready(Some(out))
    });

    with_sse_headers(Response::new(Body::from_stream(framed)))
}

/// Maps an Anthropic `StreamEvent`'s tag to the SSE `event:` field name the
/// official client expects alongside `data:`.
fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::MessageStart { .. } => "message_start",
        StreamEvent::ContentBlockStart { .. } => "content_block_start",
        StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        StreamEvent::ContentBlockStop { .. } => "content_block_stop",
        StreamEvent::MessageDelta { .. } => "message_delta",
        StreamEvent::MessageStop => "message_stop",
        StreamEvent::Ping => "ping",
    }
}

/// Builds an SSE response from a live sequence of Anthropic stream events,
/// emitting each as it is produced by `source` instead of requiring the
/// whole sequence upfront. Dropping the returned response body (client
/// disconnect) drops `source` with it, so an upstream still mid-flight when
/// the client goes away is abandoned rather than drained to completion.
pub fn anthropic_sse_stream(source: impl Stream<Item = StreamEvent> + Send + 'static) -> Response {
    let stream = source.map(|event| {
        let name = event_name(&event);
        Event::default()
            .event(name)
            .json_data(&event)
            .map_err(|e| std::io::Error::other(e.to_string()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// Builds an SSE response from a finished sequence of Anthropic stream
/// events. Used where the whole sequence is already in hand (Kiro, whose
/// assembled text never arrives as a true upstream SSE stream).
pub fn anthropic_sse_response(events: Vec<StreamEvent>) -> Response {
    anthropic_sse_stream(futures::stream::iter(events))
}

/// Builds an SSE response from a live sequence of OpenAI-dialect chunks,
/// terminated by the conventional `data: [DONE]` line once `source` ends.
pub fn openai_sse_stream<T: serde::Serialize + Send + 'static>(
    source: impl Stream<Item = T> + Send + 'static,
) -> Response {
    let events = source
        .map(|chunk| {
            Event::default()
                .json_data(&chunk)
                .map_err(|e| std::io::Error::other(e.to_string()))
        })
        .chain(futures::stream::once(async { Ok(Event::default().data("[DONE]")) }));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Builds an SSE response from a finished sequence of OpenAI-dialect chunks.
pub fn openai_sse_response<T: serde::Serialize + Send + 'static>(chunks: Vec<T>) -> Response {
    openai_sse_stream(futures::stream::iter(chunks))
}
