//! The control/telemetry contract the executor drives.

use std::time::Duration;

use crate::error::Result;

use super::protocol::{ReplyStatus, RequestId, TelemetryMessage};

/// Result of one bounded telemetry poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// A message arrived within the bound.
    Message(TelemetryMessage),
    /// Nothing arrived within the bound. Ends the current burst.
    Quiet,
}

/// Two views into one kernel: a single-in-flight request/reply stream and a
/// broadcast event stream.
///
/// Implementations do not retry; timeout and retry policy belong to the
/// caller.
#[allow(async_fn_in_trait)]
pub trait KernelChannels {
    /// Submit a code fragment for execution.
    async fn send_code(&mut self, code: &str) -> Result<RequestId>;

    /// Wait for the reply to `request`.
    ///
    /// Fails with [`Error::ReplyTimeout`](crate::Error::ReplyTimeout) if no
    /// matching reply arrives within `timeout`.
    async fn await_reply(&mut self, request: &RequestId, timeout: Duration)
    -> Result<ReplyStatus>;

    /// Wait up to `timeout` for the next telemetry message.
    async fn poll_telemetry(&mut self, timeout: Duration) -> Result<Telemetry>;
}

impl<C: KernelChannels + ?Sized> KernelChannels for &mut C {
    async fn send_code(&mut self, code: &str) -> Result<RequestId> {
        (**self).send_code(code).await
    }

    async fn await_reply(
        &mut self,
        request: &RequestId,
        timeout: Duration,
    ) -> Result<ReplyStatus> {
        (**self).await_reply(request, timeout).await
    }

    async fn poll_telemetry(&mut self, timeout: Duration) -> Result<Telemetry> {
        (**self).poll_telemetry(timeout).await
    }
}
