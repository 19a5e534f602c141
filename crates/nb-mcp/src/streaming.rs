//! Streaming Transport
//!
//! Delivers a lazily produced sequence of chunks to an already open
//! response channel. Headers are committed once, before the first chunk is
//! pulled, and always declare a chunked payload so the receiver never needs
//! a content length. Each chunk is written with a single awaited `write`
//! before the next one is requested from the producer.
//!
//! Producers are plain `futures::Stream`s and are consumed exactly once.
//! Nothing here buffers, caches or replays them.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

use crate::error::{McpError, Result};

/// Sink side of an HTTP-style response
#[async_trait]
pub trait ResponseChannel: Send {
    /// Commit status and headers. Must happen exactly once, before any write.
    async fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<()>;

    /// Write one chunk of the body
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Terminate the body
    async fn end(&mut self) -> Result<()>;

    /// Terminate the body after a producer failure. Channels that can
    /// signal an incomplete body should do so; the default just ends it.
    async fn abort(&mut self, reason: &str) -> Result<()> {
        debug!(reason, "Aborting response body");
        self.end().await
    }

    fn is_closed(&self) -> bool;
}

/// Per-call options for [`stream_to_channel`]
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Merged over the default headers; a key given here replaces the default
    pub headers: HeaderMap,
    pub status: StatusCode,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            status: StatusCode::OK,
        }
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Default framing headers with the caller's headers applied on top
    pub fn response_headers(&self) -> HeaderMap {
        let mut headers = default_headers();
        for key in self.headers.keys() {
            headers.remove(key);
        }
        for (key, value) in self.headers.iter() {
            headers.append(key.clone(), value.clone());
        }
        headers
    }
}

pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    headers
}

/// What a completed stream delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: usize,
}

/// Pipe `producer` into `channel`.
///
/// On producer failure the channel is still terminated through
/// [`ResponseChannel::abort`] (a failing close is only logged) and the
/// failure is returned as [`McpError::UpstreamFailure`].
/// Writing to a closed channel is fatal and never retried.
pub async fn stream_to_channel<S, T, E, C>(
    producer: S,
    channel: &mut C,
    options: &StreamOptions,
) -> Result<StreamSummary>
where
    S: Stream<Item = std::result::Result<T, E>>,
    T: Into<Bytes>,
    E: std::fmt::Display,
    C: ResponseChannel + ?Sized,
{
    if channel.is_closed() {
        return Err(McpError::ChannelClosed);
    }

    channel
        .write_head(options.status, options.response_headers())
        .await?;

    futures::pin_mut!(producer);
    let mut summary = StreamSummary::default();

    while let Some(item) = producer.next().await {
        match item {
            Ok(chunk) => {
                if channel.is_closed() {
                    debug!(chunks = summary.chunks, "Channel closed by receiver");
                    return Err(McpError::ChannelClosed);
                }
                let bytes: Bytes = chunk.into();
                let len = bytes.len();
                channel.write(bytes).await?;
                summary.chunks += 1;
                summary.bytes += len;
                trace!(chunk = summary.chunks, len, "Chunk written");
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(close_err) = channel.abort(&message).await {
                    warn!(error = %close_err, "Failed to end channel after producer error");
                }
                return Err(McpError::UpstreamFailure(message));
            }
        }
    }

    channel.end().await?;
    debug!(chunks = summary.chunks, bytes = summary.bytes, "Stream complete");
    Ok(summary)
}

/// Drain a producer into one string
///
/// Used where the wire cannot carry a chunked body (JSON-RPC over stdio).
pub async fn collect_text<S, T, E>(producer: S) -> Result<String>
where
    S: Stream<Item = std::result::Result<T, E>>,
    T: Into<Bytes>,
    E: std::fmt::Display,
{
    futures::pin_mut!(producer);
    let mut buf = Vec::new();
    while let Some(item) = producer.next().await {
        let chunk: Bytes = item
            .map_err(|e| McpError::UpstreamFailure(e.to_string()))?
            .into();
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

type BodyItem = std::result::Result<Bytes, std::io::Error>;

/// [`ResponseChannel`] backed by an axum streaming body
///
/// The bounded chunk buffer is the backpressure point: `write` waits for
/// the HTTP side to drain before accepting more.
pub struct BodyChannel {
    head: Option<oneshot::Sender<(StatusCode, HeaderMap)>>,
    body: Option<mpsc::Sender<BodyItem>>,
}

/// Receiving half of a [`BodyChannel`]
pub struct PendingResponse {
    head: oneshot::Receiver<(StatusCode, HeaderMap)>,
    body: mpsc::Receiver<BodyItem>,
}

/// Create a connected channel / response pair
pub fn body_channel(buffer: usize) -> (BodyChannel, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(buffer.max(1));
    (
        BodyChannel {
            head: Some(head_tx),
            body: Some(body_tx),
        },
        PendingResponse {
            head: head_rx,
            body: body_rx,
        },
    )
}

#[async_trait]
impl ResponseChannel for BodyChannel {
    async fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<()> {
        if self.body.is_none() {
            return Err(McpError::ChannelClosed);
        }
        let head = self
            .head
            .take()
            .ok_or_else(|| McpError::internal("response headers already committed"))?;
        head.send((status, headers)).map_err(|_| {
            self.body = None;
            McpError::ChannelClosed
        })
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        if self.head.is_some() {
            return Err(McpError::internal("write before response headers"));
        }
        let body = self.body.as_ref().ok_or(McpError::ChannelClosed)?;
        if body.send(Ok(chunk)).await.is_err() {
            self.body = None;
            return Err(McpError::ChannelClosed);
        }
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        // Dropping the sender finishes the body stream
        match self.body.take() {
            Some(_) => Ok(()),
            None => Err(McpError::ChannelClosed),
        }
    }

    /// Push an error into the body so the HTTP side resets the response
    /// instead of finishing it cleanly
    async fn abort(&mut self, reason: &str) -> Result<()> {
        let body = self.body.take().ok_or(McpError::ChannelClosed)?;
        let err = std::io::Error::new(std::io::ErrorKind::Other, reason.to_string());
        if body.send(Err(err)).await.is_err() {
            return Err(McpError::ChannelClosed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.body.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

impl PendingResponse {
    /// Wait for the committed head, then hand the body over to axum
    pub async fn into_response(self) -> Response {
        match self.head.await {
            Ok((status, headers)) => {
                let mut response = Response::new(Body::from_stream(ReceiverStream::new(self.body)));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(_) => {
                warn!("Stream ended before response headers were committed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::{Arc, Mutex};

    /// Records every channel call, in order, into a shared log
    struct RecordingChannel {
        log: Arc<Mutex<Vec<String>>>,
        headers: Option<HeaderMap>,
        closed: bool,
        close_after_writes: Option<usize>,
        writes: usize,
    }

    impl RecordingChannel {
        fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                log,
                headers: None,
                closed: false,
                close_after_writes: None,
                writes: 0,
            }
        }
    }

    #[async_trait]
    impl ResponseChannel for RecordingChannel {
        async fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> Result<()> {
            self.log.lock().unwrap().push(format!("head:{}", status.as_u16()));
            self.headers = Some(headers);
            Ok(())
        }

        async fn write(&mut self, chunk: Bytes) -> Result<()> {
            if self.closed {
                return Err(McpError::ChannelClosed);
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("write:{}", String::from_utf8_lossy(&chunk)));
            self.writes += 1;
            if Some(self.writes) == self.close_after_writes {
                self.closed = true;
            }
            Ok(())
        }

        async fn end(&mut self) -> Result<()> {
            if self.closed {
                return Err(McpError::ChannelClosed);
            }
            self.closed = true;
            self.log.lock().unwrap().push("end".to_string());
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_three_chunks_in_order() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        let producer = stream::iter(vec![Ok::<_, anyhow::Error>("a"), Ok("b"), Ok("c")]);

        let summary = stream_to_channel(producer, &mut channel, &StreamOptions::default())
            .await
            .unwrap();

        assert_eq!(summary, StreamSummary { chunks: 3, bytes: 3 });
        assert_eq!(
            *log.lock().unwrap(),
            vec!["head:200", "write:a", "write:b", "write:c", "end"]
        );
        let headers = channel.headers.unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::TRANSFER_ENCODING], "chunked");
    }

    #[tokio::test]
    async fn test_producer_failure_still_ends_channel() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        let producer = stream::iter(vec![
            Ok("a"),
            Err(anyhow::anyhow!("kernel died")),
            Ok("never"),
        ]);

        let err = stream_to_channel(producer, &mut channel, &StreamOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, McpError::UpstreamFailure(ref m) if m.contains("kernel died")));
        assert_eq!(*log.lock().unwrap(), vec!["head:200", "write:a", "end"]);
    }

    #[tokio::test]
    async fn test_empty_producer_commits_head_and_ends() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        let producer = stream::iter(Vec::<std::result::Result<Bytes, anyhow::Error>>::new());

        let summary = stream_to_channel(producer, &mut channel, &StreamOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.chunks, 0);
        assert_eq!(*log.lock().unwrap(), vec!["head:200", "end"]);
    }

    #[tokio::test]
    async fn test_closed_channel_is_fatal() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        channel.closed = true;
        let producer = stream::iter(vec![Ok::<_, anyhow::Error>("a")]);

        let err = stream_to_channel(producer, &mut channel, &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ChannelClosed));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_closing_mid_stream_halts() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        channel.close_after_writes = Some(1);
        let producer = stream::iter(vec![Ok::<_, anyhow::Error>("a"), Ok("b"), Ok("c")]);

        let err = stream_to_channel(producer, &mut channel, &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ChannelClosed));
        assert_eq!(*log.lock().unwrap(), vec!["head:200", "write:a"]);
    }

    #[tokio::test]
    async fn test_each_write_precedes_next_pull() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        let pulls = log.clone();
        let producer = stream::unfold(0u8, move |n| {
            let pulls = pulls.clone();
            async move {
                pulls.lock().unwrap().push(format!("pull:{}", n));
                if n < 2 {
                    Some((Ok::<_, anyhow::Error>(format!("{}", n)), n + 1))
                } else {
                    None
                }
            }
        });

        stream_to_channel(producer, &mut channel, &StreamOptions::default())
            .await
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["head:200", "pull:0", "write:0", "pull:1", "write:1", "pull:2", "end"]
        );
    }

    #[tokio::test]
    async fn test_options_override_defaults() {
        let log = log();
        let mut channel = RecordingChannel::new(log.clone());
        let options = StreamOptions::new()
            .with_status(StatusCode::PARTIAL_CONTENT)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/x-python"))
            .with_header(
                HeaderName::from_static("x-session-id"),
                HeaderValue::from_static("abc"),
            );

        stream_to_channel(stream::iter(vec![Ok::<_, anyhow::Error>("x")]), &mut channel, &options)
            .await
            .unwrap();

        assert_eq!(log.lock().unwrap()[0], "head:206");
        let headers = channel.headers.unwrap();
        assert_eq!(headers.get_all(header::CONTENT_TYPE).iter().count(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "text/x-python");
        assert_eq!(headers[header::TRANSFER_ENCODING], "chunked");
        assert_eq!(headers["x-session-id"], "abc");
    }

    #[tokio::test]
    async fn test_collect_text() {
        let text = collect_text(stream::iter(vec![
            Ok::<_, anyhow::Error>("print(1)\n".to_string()),
            Ok("print(2)\n".to_string()),
        ]))
        .await
        .unwrap();
        assert_eq!(text, "print(1)\nprint(2)\n");

        let err = collect_text(stream::iter(vec![
            Ok("a".to_string()),
            Err(anyhow::anyhow!("boom")),
        ]))
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::UpstreamFailure(_)));
    }

    #[tokio::test]
    async fn test_body_channel_delivers_response() {
        let (mut channel, pending) = body_channel(1);
        let task = tokio::spawn(async move {
            let producer = stream::iter(vec![Ok::<_, anyhow::Error>("a"), Ok("b"), Ok("c")]);
            stream_to_channel(producer, &mut channel, &StreamOptions::default()).await
        });

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::TRANSFER_ENCODING], "chunked");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"abc");
        assert_eq!(task.await.unwrap().unwrap().chunks, 3);
    }

    #[tokio::test]
    async fn test_body_channel_producer_failure_breaks_body() {
        let (mut channel, pending) = body_channel(4);
        let task = tokio::spawn(async move {
            let producer = stream::iter(vec![Ok("a"), Err(anyhow::anyhow!("boom"))]);
            stream_to_channel(producer, &mut channel, &StreamOptions::default()).await
        });

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .is_err());

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::UpstreamFailure(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn test_body_channel_receiver_dropped() {
        let (mut channel, pending) = body_channel(1);
        channel
            .write_head(StatusCode::OK, default_headers())
            .await
            .unwrap();
        drop(pending);

        assert!(channel.is_closed());
        let err = channel.write(Bytes::from_static(b"a")).await.unwrap_err();
        assert!(matches!(err, McpError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_body_channel_head_once() {
        let (mut channel, _pending) = body_channel(1);
        channel
            .write_head(StatusCode::OK, default_headers())
            .await
            .unwrap();
        assert!(channel
            .write_head(StatusCode::OK, default_headers())
            .await
            .is_err());
    }
}
