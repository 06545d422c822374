//! Incremental body decoding.
//!
//! Response bodies arrive as arbitrary byte chunks, so a multi-byte UTF-8
//! sequence may be split across two reads. [`Utf8Decoder`] holds back an
//! incomplete tail until the rest of the sequence arrives, and
//! [`accumulate_body`] drives it over a chunk stream while reporting the
//! cumulative text after every chunk.

use futures_util::{Stream, StreamExt};
use tracing::trace;

use super::{ProgressCallback, ProgressEvent};

/// Streaming UTF-8 decoder that tolerates sequences split across chunks.
///
/// Invalid sequences are replaced with U+FFFD, matching
/// [`String::from_utf8_lossy`].
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` and append the complete characters to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(
                        &self.pending[consumed..valid_end],
                    ));
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + invalid_len;
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    /// Flush whatever is still buffered once the body has ended.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Drain a body stream into a `String`, emitting a progress event with the
/// cumulative text each time a chunk adds at least one character.
///
/// Chunks that only carry part of a multi-byte character do not emit, so
/// successive events are always strictly longer than the previous one.
pub(crate) async fn accumulate_body<S, B, E>(
    body: S,
    total: Option<u64>,
    on_progress: &mut Option<ProgressCallback<'_>>,
) -> Result<String, E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = Utf8Decoder::new();
    let mut text = String::new();
    let mut loaded: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let bytes = chunk.as_ref();
        loaded += bytes.len() as u64;

        let before = text.len();
        decoder.decode(bytes, &mut text);
        trace!(bytes = bytes.len(), loaded, "Received body chunk");

        if text.len() > before {
            emit(on_progress, &text, loaded, total);
        }
    }

    let before = text.len();
    decoder.finish(&mut text);
    if text.len() > before {
        emit(on_progress, &text, loaded, total);
    }

    Ok(text)
}

pub(crate) fn emit(
    on_progress: &mut Option<ProgressCallback<'_>>,
    text: &str,
    loaded: u64,
    total: Option<u64>,
) {
    if let Some(callback) = on_progress.as_mut() {
        callback(&ProgressEvent {
            text,
            loaded,
            total,
        });
    }
}
