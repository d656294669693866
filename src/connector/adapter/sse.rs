//! Server-sent event decoding for streamed chat completions.
//!
//! The completion service sends one `data:` payload per event, events are
//! separated by a blank line, and the response ends with `data: [DONE]`.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::domain::{CompletionChunk, DomainError};

const DONE_MARKER: &str = "[DONE]";

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ErrorPayload>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ErrorPayload {
    pub(crate) message: String,
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
}

/// One decoded event.
#[derive(Debug)]
enum Frame {
    Chunk(CompletionChunk),
    Done,
    Skip,
}

struct DecoderState<S> {
    bytes: S,
    /// Undecoded tail of a multi-byte character split across reads.
    pending: Vec<u8>,
    buffer: String,
    finished: bool,
}

/// Turn a response body into completion chunks.
///
/// The returned stream ends right after the `[DONE]` marker. A body that ends
/// before the marker yields a final `TransportError`.
pub fn decode_chunks<S, E>(byte_stream: S) -> impl Stream<Item = Result<CompletionChunk, DomainError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let state = DecoderState {
        bytes: byte_stream,
        pending: Vec::new(),
        buffer: String::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            if let Some(event) = split_event(&mut state.buffer) {
                match parse_event(&event) {
                    Ok(Frame::Chunk(chunk)) => return Some((Ok(chunk), state)),
                    Ok(Frame::Done) => return None,
                    Ok(Frame::Skip) => continue,
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    state.pending.extend_from_slice(&bytes);
                    if let Err(e) = drain_utf8(&mut state.pending, &mut state.buffer) {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(DomainError::transport(format!("error in HTTP stream: {e}"))),
                        state,
                    ));
                }
                None => {
                    state.finished = true;
                    // A trailing event without its blank line still counts.
                    let tail = std::mem::take(&mut state.buffer);
                    return match parse_event(tail.trim_end()) {
                        Ok(Frame::Chunk(chunk)) => Some((Ok(chunk), state)),
                        Ok(Frame::Done) => None,
                        Ok(Frame::Skip) | Err(_) => Some((
                            Err(DomainError::transport(
                                "stream ended before the completion signal",
                            )),
                            state,
                        )),
                    };
                }
            }
        }
    })
}

/// Move every complete UTF-8 character from `pending` into `buffer`.
fn drain_utf8(pending: &mut Vec<u8>, buffer: &mut String) -> Result<(), DomainError> {
    let valid = match std::str::from_utf8(pending) {
        Ok(text) => text.len(),
        // `error_len() == None` means the input merely stops mid-character.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            return Err(DomainError::transport(format!("invalid UTF-8 in stream: {e}")));
        }
    };

    let text = std::str::from_utf8(&pending[..valid])
        .map_err(|e| DomainError::transport(format!("invalid UTF-8 in stream: {e}")))?;
    buffer.push_str(&text.replace('\r', ""));
    pending.drain(..valid);
    Ok(())
}

/// Remove the first complete event (terminated by a blank line) from the
/// front of `buffer`, leaving the remainder in place.
fn split_event(buffer: &mut String) -> Option<String> {
    let end = buffer.find("\n\n")?;
    let mut event: String = buffer.drain(..end + 2).collect();
    event.truncate(end);
    Some(event)
}

fn parse_event(event: &str) -> Result<Frame, DomainError> {
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    // Comments, keep-alives, and `event:`-only blocks carry no payload.
    if data.is_empty() {
        return Ok(Frame::Skip);
    }

    let payload = data.join("\n");
    if payload == DONE_MARKER {
        return Ok(Frame::Done);
    }

    let parsed: ChunkPayload = serde_json::from_str(&payload)
        .map_err(|e| DomainError::transport(format!("malformed stream event: {e}")))?;

    if let Some(error) = parsed.error {
        let kind = error.kind.unwrap_or_else(|| "error".to_string());
        return Err(DomainError::service(200, format!("{kind}: {}", error.message)));
    }

    let chunk = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| CompletionChunk {
            delta: choice.delta.content,
            finish_reason: choice.finish_reason,
        })
        .unwrap_or_default();

    Ok(Frame::Chunk(chunk))
}
