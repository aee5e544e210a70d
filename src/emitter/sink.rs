//! Destinations for batched log messages.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use crate::models::Snowflake;
use crate::platform::RestClient;
use crate::Result;

/// Where the emitter delivers batched lines.
pub trait LogSink: Send + Sync {
    /// Deliver one message of newline-separated lines.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` means the destination is gone for good and
    /// stops the emitter. Other errors drop the message.
    fn send<'a>(&'a self, content: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Writes messages to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn send<'a>(&'a self, content: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(content.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
            Ok(())
        })
    }
}

/// Posts messages to a guild text channel.
pub struct ChannelSink {
    client: Arc<RestClient>,
    channel_id: Snowflake,
}

impl ChannelSink {
    /// Sink posting to `channel_id` through `client`.
    #[must_use]
    pub fn new(client: Arc<RestClient>, channel_id: Snowflake) -> Self {
        Self { client, channel_id }
    }
}

impl LogSink for ChannelSink {
    fn send<'a>(&'a self, content: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.client.create_message(self.channel_id, content))
    }
}
