use async_trait::async_trait;
use axum::body::{Body, Bytes};
use chatstream_core::{ChatStreamError, ChatStreamResult};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Destination for encoded frames of one connection.
///
/// `write` resolves only once the sink has accepted the frame, so a caller
/// that awaits each write never has two frames in flight.
#[async_trait]
pub trait FrameSink: Send {
    /// Hand one complete frame to the transport.
    async fn write(&mut self, frame: String) -> ChatStreamResult<()>;

    /// Release the sink. Called once, after the terminal frame.
    async fn close(&mut self) -> ChatStreamResult<()>;
}

/// Sink feeding a bounded channel that backs an HTTP response body.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Result<Bytes, Infallible>>>,
}

impl ChannelSink {
    /// Create a sink and the response body it writes into.
    ///
    /// `capacity` is the number of frames that may queue before `write`
    /// waits for the client to drain the body.
    pub fn pair(capacity: usize) -> (Self, Body) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, Body::from_stream(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn write(&mut self, frame: String) -> ChatStreamResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ChatStreamError::Gateway("write after close".to_string()))?;
        tx.send(Ok(Bytes::from(frame)))
            .await
            .map_err(|_| ChatStreamError::Gateway("client disconnected".to_string()))
    }

    async fn close(&mut self) -> ChatStreamResult<()> {
        match self.tx.take() {
            Some(_) => Ok(()),
            None => Err(ChatStreamError::Gateway("sink already closed".to_string())),
        }
    }
}
