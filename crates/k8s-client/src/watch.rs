//! Watch stream decoding
//!
//! A watch response is a long-lived body of newline-delimited JSON frames,
//! each one `{"type": ..., "object": ...}`. [`WatchStream`] reads chunks from
//! a [`ByteSource`], splits them into frames and decodes each frame on its
//! own, so one bad frame never ends the stream.
//!
//! The decoder is an explicit state machine:
//!
//! - `Accumulating`: no complete frame is buffered; read more bytes
//! - `Decode(frame)`: a complete frame is ready to be turned into an event
//! - `StreamClosed`: the source is gone; every further `next()` is `None`

use crate::context::RequestContext;
use crate::error::Error;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use k8s_types::{Status, WatchEvent};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Incremental byte reader behind a watch
#[async_trait::async_trait]
pub trait ByteSource: Send {
    /// Next chunk of the body; `Ok(None)` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error>;
}

#[async_trait::async_trait]
impl ByteSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        self.chunk().await.map_err(Error::Transport)
    }
}

/// In-memory source yielding preset chunks, then end of stream
#[derive(Debug, Default)]
pub struct ChunkSource {
    chunks: std::collections::VecDeque<Bytes>,
}

impl ChunkSource {
    /// Source that yields `chunks` in order
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl ByteSource for ChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.chunks.pop_front())
    }
}

/// Largest frame the decoder buffers before giving up on it
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Newline framing over a growable buffer
#[derive(Debug)]
struct FrameBuffer {
    buf: BytesMut,
    /// Bytes of `buf` already searched for a newline
    scanned: usize,
    max_frame: usize,
    /// Dropping the rest of an oversized frame up to its newline
    discarding: bool,
}

#[derive(Debug)]
enum Frame {
    Line(Bytes),
    Oversized(usize),
}

impl FrameBuffer {
    fn new(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_frame,
            discarding: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete non-blank line, without its terminator
    ///
    /// A line longer than `max_frame` is reported once as `Oversized` and
    /// skipped up to its newline.
    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let newline = self.buf[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.scanned + offset);
            let Some(pos) = newline else {
                if self.discarding {
                    self.buf.clear();
                    self.scanned = 0;
                    return None;
                }
                if self.buf.len() > self.max_frame {
                    let size = self.buf.len();
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Some(Frame::Oversized(size));
                }
                self.scanned = self.buf.len();
                return None;
            };

            let mut line = self.buf.split_to(pos + 1);
            self.scanned = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            line.truncate(pos);
            if line.len() > self.max_frame {
                return Some(Frame::Oversized(line.len()));
            }
            if !is_blank(&line) {
                return Some(Frame::Line(line.freeze()));
            }
        }
    }

    /// Whatever is left once the source has ended
    fn take_remainder(&mut self) -> Option<Frame> {
        let rest = self.buf.split();
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || is_blank(&rest) {
            None
        } else if rest.len() > self.max_frame {
            Some(Frame::Oversized(rest.len()))
        } else {
            Some(Frame::Line(rest.freeze()))
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

#[derive(Debug)]
enum DecoderState {
    Accumulating,
    Decode(Bytes),
    StreamClosed,
}

enum ReadOutcome {
    Chunk(Bytes),
    Eof,
    Canceled,
    Failed(Error),
}

/// Lazily decoded sequence of watch events
///
/// Dropping the stream closes the underlying connection.
pub struct WatchStream<K> {
    source: Option<Box<dyn ByteSource>>,
    frames: FrameBuffer,
    state: DecoderState,
    eof: bool,
    ctx: RequestContext,
    _kind: PhantomData<fn() -> K>,
}

impl<K> std::fmt::Debug for WatchStream<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchStream")
            .field("state", &self.state)
            .field("buffered", &self.frames.buf.len())
            .field("eof", &self.eof)
            .finish()
    }
}

impl<K: DeserializeOwned> WatchStream<K> {
    /// Decode events from `source` until it ends or `ctx` fires
    pub fn new(source: Box<dyn ByteSource>, ctx: RequestContext) -> Self {
        Self {
            source: Some(source),
            frames: FrameBuffer::new(DEFAULT_MAX_FRAME_BYTES),
            state: DecoderState::Accumulating,
            eof: false,
            ctx,
            _kind: PhantomData,
        }
    }

    /// Cap the size of a single frame
    ///
    /// A longer frame yields one `WatchEvent::Error` with reason
    /// `DecodeFailure` and is skipped; the stream keeps going.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.frames.max_frame = max;
        self
    }

    /// Next event
    ///
    /// - `Some(Ok(event))` for every frame; undecodable frames become
    ///   `WatchEvent::Error` with reason `DecodeFailure`
    /// - `Some(Err(_))` once if reading the body fails, then `None`
    /// - `None` at end of stream or when the context is canceled
    pub async fn next(&mut self) -> Option<Result<WatchEvent<K>, Error>> {
        if let Some(reason) = self.ctx.err() {
            if !matches!(self.state, DecoderState::StreamClosed) {
                debug!("Watch stopped: {}", reason);
                self.close();
            }
            return None;
        }

        loop {
            match std::mem::replace(&mut self.state, DecoderState::Accumulating) {
                DecoderState::StreamClosed => {
                    self.state = DecoderState::StreamClosed;
                    return None;
                }
                DecoderState::Decode(frame) => return Some(Ok(decode_frame(&frame))),
                DecoderState::Accumulating => {
                    let frame = match self.frames.next_frame() {
                        None if self.eof => self.frames.take_remainder(),
                        frame => frame,
                    };
                    match frame {
                        Some(Frame::Line(line)) => {
                            self.state = DecoderState::Decode(line);
                            continue;
                        }
                        Some(Frame::Oversized(size)) => return Some(Ok(oversized_frame(size, self.frames.max_frame))),
                        None if self.eof => {
                            self.state = DecoderState::StreamClosed;
                            continue;
                        }
                        None => {}
                    }
                    match self.read_chunk().await {
                        ReadOutcome::Chunk(chunk) => self.frames.push(&chunk),
                        ReadOutcome::Eof => {
                            self.eof = true;
                            self.source = None;
                        }
                        ReadOutcome::Canceled => {
                            self.close();
                            return None;
                        }
                        ReadOutcome::Failed(err) => {
                            warn!("Watch stream read failed: {}", err);
                            self.close();
                            return Some(Err(err));
                        }
                    }
                }
            }
        }
    }

    async fn read_chunk(&mut self) -> ReadOutcome {
        let Some(source) = self.source.as_mut() else {
            return ReadOutcome::Eof;
        };
        tokio::select! {
            biased;
            reason = self.ctx.done() => {
                debug!("Watch stopped: {}", reason);
                ReadOutcome::Canceled
            }
            chunk = source.next_chunk() => match chunk {
                Ok(Some(bytes)) => ReadOutcome::Chunk(bytes),
                Ok(None) => ReadOutcome::Eof,
                Err(err) => ReadOutcome::Failed(err),
            },
        }
    }

    fn close(&mut self) {
        self.source = None;
        self.frames = FrameBuffer::new(self.frames.max_frame);
        self.state = DecoderState::StreamClosed;
    }

    /// Whether the stream has finished
    pub fn is_closed(&self) -> bool {
        matches!(self.state, DecoderState::StreamClosed)
    }
}

impl<K: DeserializeOwned + Send + 'static> WatchStream<K> {
    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<WatchEvent<K>, Error>> + Send {
        futures::stream::unfold(self, |mut watch| async move {
            let item = watch.next().await?;
            Some((item, watch))
        })
    }
}

fn oversized_frame<K>(size: usize, max: usize) -> WatchEvent<K> {
    warn!("Skipping watch frame of {} bytes (limit {})", size, max);
    WatchEvent::Error(Status::decode_failure(format!(
        "watch frame of at least {} bytes exceeds the {} byte limit",
        size, max
    )))
}

fn decode_frame<K: DeserializeOwned>(frame: &[u8]) -> WatchEvent<K> {
    match serde_json::from_slice::<WatchEvent<K>>(frame) {
        Ok(event) => event,
        Err(e) => {
            let preview = String::from_utf8_lossy(frame).chars().take(200).collect::<String>();
            warn!("Undecodable watch frame: {}", e);
            WatchEvent::Error(Status::decode_failure(format!(
                "error decoding watch event: {} - Frame (first 200 chars): {}",
                e, preview
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelReason;
    use k8s_types::ConfigMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const ADDED: &str = r#"{"type":"ADDED","object":{"metadata":{"name":"a","namespace":"default","resourceVersion":"1"}}}"#;
    const MODIFIED: &str = r#"{"type":"MODIFIED","object":{"metadata":{"name":"a","namespace":"default","resourceVersion":"2"},"data":{"zam":"spam"}}}"#;
    const DELETED: &str = r#"{"type":"DELETED","object":{"metadata":{"name":"a","namespace":"default","resourceVersion":"3"}}}"#;

    fn stream(chunks: Vec<String>) -> WatchStream<ConfigMap> {
        WatchStream::new(Box::new(ChunkSource::new(chunks)), RequestContext::background())
    }

    /// Yields its chunks, then blocks forever; records when it is dropped
    struct HangingSource {
        chunks: Vec<Bytes>,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ByteSource for HangingSource {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
            if self.chunks.is_empty() {
                std::future::pending::<()>().await;
            }
            Ok(Some(self.chunks.remove(0)))
        }
    }

    impl Drop for HangingSource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    /// Yields one chunk, then a read error
    struct FailingSource {
        sent: bool,
    }

    #[async_trait::async_trait]
    impl ByteSource for FailingSource {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
            if self.sent {
                return Err(Error::InvalidArgument("connection reset".into()));
            }
            self.sent = true;
            Ok(Some(Bytes::from(format!("{}\n", ADDED))))
        }
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let mut watch = stream(vec![format!("{}\n{}\n{}\n", ADDED, MODIFIED, DELETED)]);

        let first = watch.next().await.unwrap().unwrap();
        assert_eq!(first.type_name(), "ADDED");
        let second = watch.next().await.unwrap().unwrap();
        assert_eq!(second.object().unwrap().data.as_ref().unwrap()["zam"], "spam");
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "DELETED");
        assert!(watch.next().await.is_none());
        assert!(watch.is_closed());
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let (head, tail) = MODIFIED.split_at(17);
        let mut watch = stream(vec![
            format!("{}\n{}", ADDED, head),
            tail.to_string(),
            "\n".to_string(),
        ]);

        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "MODIFIED");
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let mut watch = stream(vec![format!("\n\r\n{}\n\n  \n{}\n", ADDED, DELETED)]);
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "DELETED");
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_trailing_frame_without_newline() {
        let mut watch = stream(vec![format!("{}\n{}", ADDED, DELETED)]);
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "DELETED");
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_end_stream() {
        let mut watch = stream(vec![format!("{}\nnot json at all\n{}\n", ADDED, DELETED)]);

        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");
        match watch.next().await.unwrap().unwrap() {
            WatchEvent::Error(status) => {
                assert!(status.is_decode_failure());
                assert!(status.message.unwrap().contains("not json at all"));
            }
            other => panic!("expected decode failure, got {:?}", other),
        }
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "DELETED");
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_server_error_event_passes_through() {
        let frame = r#"{"type":"ERROR","object":{"kind":"Status","apiVersion":"v1","status":"Failure","message":"too old resource version","reason":"Expired","code":410}}"#;
        let mut watch = stream(vec![format!("{}\n", frame)]);
        match watch.next().await.unwrap().unwrap() {
            WatchEvent::Error(status) => {
                assert_eq!(status.code, Some(410));
                assert!(!status.is_decode_failure());
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_failure_is_terminal() {
        let mut watch: WatchStream<ConfigMap> =
            WatchStream::new(Box::new(FailingSource { sent: false }), RequestContext::background());

        assert!(watch.next().await.unwrap().is_ok());
        assert!(watch.next().await.unwrap().is_err());
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_closes_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = HangingSource {
            chunks: vec![Bytes::from(format!("{}\n", ADDED))],
            dropped: dropped.clone(),
        };
        let (ctx, cancel) = RequestContext::background().with_cancel();
        let mut watch: WatchStream<ConfigMap> = WatchStream::new(Box::new(source), ctx);

        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");

        let canceler = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        assert!(watch.next().await.is_none(), "cancel must end the stream without an event");
        assert!(dropped.load(Ordering::SeqCst), "source must be dropped on cancel");
        assert!(watch.is_closed());
        canceler.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_stream_cleanly() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = HangingSource {
            chunks: Vec::new(),
            dropped: dropped.clone(),
        };
        let ctx = RequestContext::background().with_timeout(Duration::from_secs(1));
        let mut watch: WatchStream<ConfigMap> = WatchStream::new(Box::new(source), ctx.clone());

        assert!(watch.next().await.is_none());
        assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_large_frame_in_small_chunks() {
        let data: String = "x".repeat(64 * 1024);
        let frame = format!(
            r#"{{"type":"ADDED","object":{{"metadata":{{"name":"big"}},"data":{{"blob":"{}"}}}}}}"#,
            data
        );
        let chunks: Vec<String> = format!("{}\n{}\n", frame, DELETED)
            .as_bytes()
            .chunks(7)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let mut watch = stream(chunks);

        let event = watch.next().await.unwrap().unwrap();
        assert_eq!(event.object().unwrap().data.as_ref().unwrap()["blob"].len(), data.len());
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "DELETED");
        assert!(watch.next().await.is_none());
    }

    #[test]
    fn test_frame_buffer_resumes_scan() {
        let mut frames = FrameBuffer::new(DEFAULT_MAX_FRAME_BYTES);
        frames.push(b"abc");
        assert!(frames.next_frame().is_none());
        assert_eq!(frames.scanned, 3);
        frames.push(b"def\nrest");
        match frames.next_frame() {
            Some(Frame::Line(line)) => assert_eq!(&line[..], b"abcdef"),
            other => panic!("expected a line, got {:?}", other),
        }
        assert!(frames.next_frame().is_none());
        assert_eq!(frames.scanned, 4);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_reported_once_and_skipped() {
        let huge = format!(r#"{{"type":"ADDED","object":{{"data":{{"k":"{}"}}}}}}"#, "y".repeat(4096));
        let (head, tail) = huge.split_at(1000);
        let mut watch = stream(vec![
            format!("{}\n", ADDED),
            head.to_string(),
            tail[..1500].to_string(),
            tail[1500..].to_string(),
            format!("\n{}\n", DELETED),
        ])
        .with_max_frame_bytes(1024);

        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");
        match watch.next().await.unwrap().unwrap() {
            WatchEvent::Error(status) => {
                assert!(status.is_decode_failure());
                assert!(status.message.unwrap().contains("1024 byte limit"));
            }
            other => panic!("expected decode failure, got {:?}", other),
        }
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "DELETED");
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_in_one_chunk() {
        let line = "z".repeat(200);
        let mut watch = stream(vec![format!("{}\n{}\n", line, ADDED)]).with_max_frame_bytes(100);

        assert!(matches!(
            watch.next().await.unwrap().unwrap(),
            WatchEvent::Error(ref status) if status.is_decode_failure()
        ));
        assert_eq!(watch.next().await.unwrap().unwrap().type_name(), "ADDED");
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_into_stream() {
        use futures::StreamExt;

        let events: Vec<_> = stream(vec![format!("{}\n{}\n", ADDED, MODIFIED)])
            .into_stream()
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_ok()));
    }
}
