//! Server-sent event decoding for streaming backends.
//!
//! [`SseDecoder`] turns raw bytes into `data:` payloads. [`text_stream`] drives
//! a byte stream through the decoder and a backend-specific frame classifier,
//! yielding text fragments lazily.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use crate::backend::TextStream;
use crate::error::BackendError;

/// Line-buffering SSE decoder.
///
/// Only `data:` lines produce payloads. `event:`, `id:`, `retry:`, comments
/// and blank lines are dropped. A line longer than [`Self::MAX_LINE`] is
/// discarded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    discarding: bool,
}

impl SseDecoder {
    pub const MAX_LINE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }

        if self.buffer.len() > Self::MAX_LINE {
            warn!(
                "SSE line exceeded {}KB limit, discarding",
                Self::MAX_LINE / 1024
            );
            self.buffer.clear();
            self.discarding = true;
        }

        payloads
    }

    /// Flush a final unterminated line once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        if self.discarding {
            self.discarding = false;
            return Vec::new();
        }
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// How a backend classifies one `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text to hand to the consumer.
    Content(String),
    /// Nothing to emit (keep-alive, metadata, malformed JSON).
    Skip,
    /// End of the response.
    Done,
    /// The server reported an error in-band.
    Failed(String),
}

/// Classifier for one backend's payloads.
pub type FrameDecoder = fn(&str) -> Frame;

struct StreamState<S> {
    backend: String,
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    classify: FrameDecoder,
    idle_timeout: Duration,
    pending: VecDeque<Result<String, BackendError>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn absorb(&mut self, payloads: Vec<String>) {
        for data in payloads {
            match (self.classify)(&data) {
                Frame::Content(text) if !text.is_empty() => self.pending.push_back(Ok(text)),
                Frame::Content(_) | Frame::Skip => {}
                Frame::Done => {
                    debug!(backend = %self.backend, "Stream finished");
                    self.finished = true;
                    return;
                }
                Frame::Failed(reason) => {
                    self.pending.push_back(Err(BackendError::Stream {
                        backend: self.backend.clone(),
                        reason,
                    }));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// Lazily decode an SSE byte stream into text fragments.
///
/// The stream ends at the first terminal frame or when the bytes run out.
/// Transport errors and waits longer than `idle_timeout` for the next chunk
/// are yielded once as errors, after which the stream ends. The byte source
/// is dropped as soon as the returned stream finishes or is dropped.
pub fn text_stream<S, B, E>(
    backend: &str,
    bytes: S,
    classify: FrameDecoder,
    idle_timeout: Duration,
) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = StreamState {
        backend: backend.to_string(),
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        classify,
        idle_timeout,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.idle_timeout, state.bytes.next()).await {
                Err(_) => {
                    state.finished = true;
                    let err = BackendError::Timeout {
                        backend: state.backend.clone(),
                        secs: state.idle_timeout.as_secs(),
                    };
                    return Some((Err(err), state));
                }
                Ok(Some(Ok(chunk))) => {
                    let payloads = state.decoder.push(chunk.as_ref());
                    state.absorb(payloads);
                }
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    let err = BackendError::Stream {
                        backend: state.backend.clone(),
                        reason: e.to_string(),
                    };
                    return Some((Err(err), state));
                }
                Ok(None) => {
                    let payloads = state.decoder.finish();
                    state.absorb(payloads);
                    state.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn classify_plain(data: &str) -> Frame {
        match data {
            "[DONE]" => Frame::Done,
            "" => Frame::Skip,
            d if d.starts_with('{') => Frame::Skip,
            "boom" => Frame::Failed("server exploded".into()),
            d => Frame::Content(d.to_string()),
        }
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, String>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    async fn collect_plain<S>(
        bytes: S,
        idle_timeout: Duration,
    ) -> Vec<Result<String, BackendError>>
    where
        S: Stream<Item = Result<Vec<u8>, String>> + Send + 'static,
    {
        text_stream("test", bytes, classify_plain, idle_timeout)
            .collect()
            .await
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        assert_eq!(decoder.push(b"lo\n\ndata: world\n"), vec!["hello", "world"]);
    }

    #[test]
    fn test_decoder_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: ping\nid: 4\n: comment\n\ndata:tight\r\n");
        assert_eq!(out, vec!["tight"]);
    }

    #[test]
    fn test_decoder_keeps_multibyte_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n".as_bytes();
        let (a, b) = bytes.split_at(8);
        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec!["héllo"]);
    }

    #[test]
    fn test_decoder_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
    }

    #[test]
    fn test_decoder_discards_oversized_line() {
        let mut decoder = SseDecoder::new();
        let huge = vec![b'x'; SseDecoder::MAX_LINE + 1];
        assert!(decoder.push(b"data: ").is_empty());
        assert!(decoder.push(&huge).is_empty());
        assert!(decoder.push(b"still the same line\n").is_empty());
        assert_eq!(decoder.push(b"data: next\n"), vec!["next"]);
    }

    #[tokio::test]
    async fn test_stream_yields_content_in_order_then_stops() {
        let bytes = chunks(&[
            "data: one\n\ndata: {bad json\n\n",
            "data: two\n\ndata: [DONE]\n\ndata: late\n\n",
        ]);
        let items = collect_plain(bytes, Duration::from_secs(5)).await;
        let texts: Vec<String> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_stream_without_terminal_frame_ends_normally() {
        let bytes = chunks(&["data: only\n"]);
        let items = collect_plain(bytes, Duration::from_secs(5)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "only");
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_once() {
        let bytes = stream::iter(vec![
            Ok(b"data: first\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: never\n".to_vec()),
        ]);
        let items = collect_plain(bytes, Duration::from_secs(5)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "first");
        match &items[1] {
            Err(BackendError::Stream { reason, .. }) => {
                assert!(reason.contains("connection reset"))
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_band_failure_ends_stream() {
        let bytes = chunks(&["data: a\ndata: boom\ndata: b\n"]);
        let items = collect_plain(bytes, Duration::from_secs(5)).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(BackendError::Stream { .. })));
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let bytes = stream::pending::<Result<Vec<u8>, String>>();
        let items = collect_plain(bytes, Duration::from_millis(50)).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(BackendError::Timeout { .. })));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_consumer_releases_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let source = chunks(&["data: a\n", "data: b\n"]).chain(stream::pending()).map(move |item| {
            let _keep = &guard;
            item
        });

        let mut stream = text_stream("test", source, classify_plain, Duration::from_secs(5));
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(!dropped.load(Ordering::SeqCst));
        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
