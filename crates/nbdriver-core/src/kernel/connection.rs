//! Listener-backed connection to a kernel's stdio streams.
//!
//! A dedicated task reads every line the kernel writes and routes it by
//! channel into one of two FIFO queues. The executor then performs bounded
//! receives against those queues.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};

use super::channels::{KernelChannels, Telemetry};
use super::protocol::{
    Channel, ReplyStatus, RequestId, TelemetryMessage, WireMessage, read_message, write_message,
};

/// Connection to a running kernel.
pub struct KernelConnection<W> {
    /// Kernel stdin, `None` once closed.
    writer: Option<W>,
    /// Shell-channel messages, in arrival order.
    replies: mpsc::UnboundedReceiver<WireMessage>,
    /// Iopub-channel messages, in arrival order.
    telemetry: mpsc::UnboundedReceiver<WireMessage>,
    /// Task draining kernel stdout.
    listener: JoinHandle<()>,
}

impl<W: AsyncWrite + Unpin> KernelConnection<W> {
    /// Start listening on `reader` and write requests to `writer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let (telemetry_tx, telemetry) = mpsc::unbounded_channel();
        let listener = tokio::spawn(listen(BufReader::new(reader), reply_tx, telemetry_tx));

        Self {
            writer: Some(writer),
            replies,
            telemetry,
            listener,
        }
    }

    /// Send a raw message to the kernel.
    pub async fn send(&mut self, message: &WireMessage) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Ipc("kernel input already closed".to_string()))?;
        write_message(writer, message).await
    }

    /// Close the kernel's input. Kernels treat end of input as a shutdown.
    pub fn close_writer(&mut self) {
        self.writer = None;
    }
}

impl<W> Drop for KernelConnection<W> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen<R>(
    mut reader: R,
    replies: mpsc::UnboundedSender<WireMessage>,
    telemetry: mpsc::UnboundedSender<WireMessage>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => {
                let queue = match message.channel {
                    Channel::Shell => &replies,
                    Channel::Iopub => &telemetry,
                };
                if queue.send(message).is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Kernel output stream closed");
                break;
            }
            Err(Error::Json(e)) => {
                tracing::warn!("Skipping malformed kernel message: {}", e);
            }
            Err(e) => {
                tracing::warn!("Kernel listener stopped: {}", e);
                break;
            }
        }
    }
}

impl<W: AsyncWrite + Unpin> KernelChannels for KernelConnection<W> {
    async fn send_code(&mut self, code: &str) -> Result<RequestId> {
        let message = WireMessage::execute_request(code);
        self.send(&message).await?;
        Ok(RequestId::new(message.header.msg_id))
    }

    async fn await_reply(
        &mut self,
        request: &RequestId,
        timeout: Duration,
    ) -> Result<ReplyStatus> {
        let deadline = Instant::now() + timeout;

        loop {
            let message = match tokio::time::timeout_at(deadline, self.replies.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => return Err(Error::KernelExited),
                Err(_) => return Err(Error::ReplyTimeout(timeout)),
            };

            if message.parent_id() != Some(request.as_str()) {
                tracing::debug!(
                    "Discarding stale {} for {:?}",
                    message.msg_type(),
                    message.parent_id()
                );
                continue;
            }
            if message.msg_type() != "execute_reply" {
                tracing::debug!("Ignoring shell message {}", message.msg_type());
                continue;
            }

            return ReplyStatus::from_content(message.content);
        }
    }

    async fn poll_telemetry(&mut self, timeout: Duration) -> Result<Telemetry> {
        match tokio::time::timeout(timeout, self.telemetry.recv()).await {
            Ok(Some(message)) => Ok(Telemetry::Message(TelemetryMessage::from_wire(message))),
            Ok(None) => Err(Error::KernelExited),
            Err(_) => Ok(Telemetry::Quiet),
        }
    }
}
