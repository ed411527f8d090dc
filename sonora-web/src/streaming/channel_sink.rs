//! Response sink backed by channels into a hyper body.
//!
//! The stream task owns the [`ChannelSink`]; the handler owns the matching
//! [`PendingResponse`]. Status and headers travel once through a oneshot,
//! chunks through a bounded mpsc that feeds `Body::from_stream`. When the
//! client goes away hyper drops the body, the receiver closes, and the sink
//! reports the peer as disconnected.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use futures::stream;
use sonora_core::streaming::{ResponseSink, SinkClosed};
use tokio::sync::{mpsc, oneshot};

/// Status and headers accumulated before the first chunk.
#[derive(Debug, Default)]
pub struct ResponseHead {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
}

/// Stream-task half of a channel-backed response.
#[derive(Debug)]
pub struct ChannelSink {
    head: ResponseHead,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::Sender<Bytes>,
}

/// Handler half of a channel-backed response.
#[derive(Debug)]
pub struct PendingResponse {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::Receiver<Bytes>,
}

impl ChannelSink {
    /// Creates a connected sink and pending response.
    ///
    /// `capacity` bounds how many chunks may wait for the client.
    pub fn channel(capacity: usize) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(capacity.max(1));

        let sink = Self {
            head: ResponseHead::default(),
            head_tx: Some(head_tx),
            body_tx,
        };
        (sink, PendingResponse { head_rx, body_rx })
    }

    /// Sends status and headers if they have not been sent yet.
    fn commit_head(&mut self) -> Result<(), SinkClosed> {
        match self.head_tx.take() {
            Some(head_tx) => head_tx
                .send(std::mem::take(&mut self.head))
                .map_err(|_| SinkClosed),
            None => Ok(()),
        }
    }

    /// Ends the response, sending the head when no chunk did.
    ///
    /// Only called after a successful stream; a sink dropped without
    /// `finish` and without chunks never produces a response head.
    pub fn finish(mut self) {
        let _ = self.commit_head();
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn set_status(&mut self, status: StatusCode) {
        self.head.status = status;
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.head.headers.insert(name, value);
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.commit_head()?;
        self.body_tx.send(chunk).await.map_err(|_| SinkClosed)
    }

    fn is_client_connected(&self) -> bool {
        !self.body_tx.is_closed()
    }
}

impl PendingResponse {
    /// Waits for the stream task to commit a head.
    ///
    /// Returns `None` when the task ended without one, i.e. it failed before
    /// sending anything and its error must be reported instead.
    pub async fn into_response(self) -> Option<Response<Body>> {
        let head = self.head_rx.await.ok()?;

        let chunks = stream::unfold(self.body_rx, |mut body_rx| async move {
            body_rx
                .recv()
                .await
                .map(|chunk| (Ok::<_, Infallible>(chunk), body_rx))
        });

        let mut response = Response::new(Body::from_stream(chunks));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        Some(response)
    }
}
