//! Incremental JSON array encoding of cursor results.
//!
//! [`stream_results`] turns a record stream into byte chunks that concatenate
//! to one JSON array:
//!
//! ```text
//! [
//! {"name":"B","age":25},
//! {"name":"A","age":25}
//! ]
//! ```
//!
//! A record is pulled from the cursor and serialized only when the consumer
//! asks for the next chunk, so at most one record is held in memory.
//!
//! # Resource Release
//!
//! The returned stream owns the cursor. Dropping it, whether after the closing
//! bracket or because the client went away, drops the cursor. [`OpenStreams`]
//! counts streams that are still alive.

use crate::db::connector::RecordStream;
use crate::db::types::document_to_json;
use crate::error::MountError;
use axum::body::Bytes;
use bson::Document;
use futures_util::Stream;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tracing::{debug, error, warn};

/// Byte chunks of a streamed JSON array.
pub type JsonArrayStream = BoxStream<'static, Result<Bytes, MountError>>;

const OPEN: &[u8] = b"[\n";
const SEPARATOR: &[u8] = b",\n";
const CLOSE: &[u8] = b"\n]";

enum State {
    Open(RecordStream),
    Records { records: RecordStream, first: bool },
    Done,
}

/// Encode `records` as a lazily produced JSON array.
///
/// A cursor error after the opening bracket is logged and yielded as
/// [`MountError::Streaming`]; the stream ends there and the array is left
/// unterminated.
pub fn stream_results(records: RecordStream) -> JsonArrayStream {
    stream::unfold(State::Open(records), |state| async move {
        match state {
            State::Open(records) => Some((
                Ok(Bytes::from_static(OPEN)),
                State::Records {
                    records,
                    first: true,
                },
            )),
            State::Records { mut records, first } => match records.next().await {
                Some(Ok(document)) => match encode_record(&document, first) {
                    Ok(chunk) => Some((
                        Ok(chunk),
                        State::Records {
                            records,
                            first: false,
                        },
                    )),
                    Err(e) => {
                        error!(error = %e, "Failed to serialize record");
                        Some((Err(e), State::Done))
                    }
                },
                Some(Err(e)) => {
                    error!(error = %e, "Cursor failed while streaming results");
                    Some((Err(MountError::streaming(e.to_string())), State::Done))
                }
                None => Some((Ok(Bytes::from_static(CLOSE)), State::Done)),
            },
            State::Done => None,
        }
    })
    .boxed()
}

fn encode_record(document: &Document, first: bool) -> Result<Bytes, MountError> {
    let mut chunk = if first {
        Vec::new()
    } else {
        SEPARATOR.to_vec()
    };
    serde_json::to_writer(&mut chunk, &document_to_json(document))
        .map_err(|e| MountError::streaming(format!("Failed to serialize record: {}", e)))?;
    Ok(Bytes::from(chunk))
}

/// Gauge of result streams that have not been dropped yet.
#[derive(Debug, Clone, Default)]
pub struct OpenStreams {
    count: Arc<AtomicUsize>,
}

impl OpenStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of open streams.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wrap `stream` so that it is counted until dropped.
    pub fn track(&self, resource_id: impl Into<String>, stream: JsonArrayStream) -> JsonArrayStream {
        TrackedStream {
            inner: stream,
            guard: self.acquire(resource_id),
        }
        .boxed()
    }

    /// Count one stream; the returned guard releases it on drop.
    pub fn acquire(&self, resource_id: impl Into<String>) -> StreamGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        StreamGuard {
            count: Arc::clone(&self.count),
            resource_id: resource_id.into(),
            chunks: 0,
            finished: false,
        }
    }
}

/// Releases one [`OpenStreams`] slot when dropped.
#[derive(Debug)]
pub struct StreamGuard {
    count: Arc<AtomicUsize>,
    resource_id: String,
    chunks: usize,
    finished: bool,
}

impl StreamGuard {
    /// Mark the stream as fully consumed.
    pub fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        // Saturate at 0
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            });

        if self.finished {
            debug!(
                resource_id = %self.resource_id,
                chunks = self.chunks,
                "Result stream finished"
            );
        } else {
            warn!(
                resource_id = %self.resource_id,
                chunks = self.chunks,
                "Result stream dropped before completion"
            );
        }
    }
}

/// A stream that holds a [`StreamGuard`] for as long as it lives.
struct TrackedStream {
    inner: JsonArrayStream,
    guard: StreamGuard,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, MountError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let polled = this.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(_))) => this.guard.chunks += 1,
            Poll::Ready(None) => this.guard.finish(),
            _ => {}
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures_util::TryStreamExt;

    fn records(documents: Vec<Document>) -> RecordStream {
        stream::iter(documents.into_iter().map(Ok)).boxed()
    }

    async fn collect_text(stream: JsonArrayStream) -> String {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        String::from_utf8(chunks.concat()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_array() {
        let text = collect_text(stream_results(records(vec![]))).await;
        assert_eq!(text, "[\n\n]");
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_separators() {
        let text = collect_text(stream_results(records(vec![
            doc! { "n": 1 },
            doc! { "n": 2 },
        ])))
        .await;
        assert_eq!(text, "[\n{\"n\":1},\n{\"n\":2}\n]");
    }

    #[tokio::test]
    async fn test_non_ascii_preserved() {
        let text = collect_text(stream_results(records(vec![doc! { "name": "Zoë" }]))).await;
        assert!(text.contains("Zoë"));
    }

    #[tokio::test]
    async fn test_cursor_error_truncates() {
        let source = stream::iter(vec![
            Ok(doc! { "n": 1 }),
            Err(MountError::database("cursor killed", None)),
            Ok(doc! { "n": 2 }),
        ])
        .boxed();
        let chunks: Vec<_> = stream_results(source).collect().await;

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].is_ok());
        assert!(chunks[1].is_ok());
        assert!(matches!(chunks[2], Err(MountError::Streaming { .. })));
    }

    #[tokio::test]
    async fn test_gauge_released_on_completion() {
        let gauge = OpenStreams::new();
        let stream = gauge.track("item", stream_results(records(vec![doc! { "n": 1 }])));
        assert_eq!(gauge.count(), 1);

        collect_text(stream).await;
        assert_eq!(gauge.count(), 0);
    }

    #[tokio::test]
    async fn test_gauge_released_on_abandon() {
        let gauge = OpenStreams::new();
        let mut stream = gauge.track("item", stream_results(records(vec![doc! { "n": 1 }])));
        stream.next().await;
        assert_eq!(gauge.count(), 1);

        drop(stream);
        assert_eq!(gauge.count(), 0);
    }
}
