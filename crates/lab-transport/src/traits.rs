use crate::{Reply, Result};
use async_trait::async_trait;

/// A blocking request/response connection to the device's command channel.
pub trait CommandConnection: Send {
    /// Issue one request for `target` using the channel's baseline verb and
    /// block until the reply (or the connection's timeout).
    fn send(&mut self, target: &str) -> Result<Reply>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// One open telemetry stream.
#[async_trait]
pub trait TelemetryLink: Send {
    /// Next inbound text message. `None` means the peer closed the stream.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Send one outbound text message.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the stream from our side.
    async fn close(&mut self) -> Result<()>;
}

/// Opens telemetry streams; called again after every disconnect.
#[async_trait]
pub trait TelemetryConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TelemetryLink>>;

    fn backend(&self) -> &'static str;
}
