//! Binary assets kept as attachments in a dedicated chat channel
//!
//! The database only knows which channel holds the assets; moving bytes is
//! the transport's job.

use async_trait::async_trait;

use crate::{DbError, Result};

/// Host collaborator that moves attachments in and out of a channel
#[async_trait]
pub trait AssetTransport: Send + Sync {
    /// Upload `payload` to `channel`, returning the id of the new message
    async fn send_attachment(&self, channel: i64, payload: Vec<u8>) -> Result<i64>;

    /// Download the attachment of message `id`, `None` when it is gone
    async fn fetch_attachment(&self, channel: i64, id: i64) -> Result<Option<Vec<u8>>>;
}

/// Asset store bound to one channel
#[derive(Debug)]
pub struct AssetStore<T> {
    transport: T,
    channel: Option<i64>,
}

impl<T: AssetTransport> AssetStore<T> {
    pub fn new(transport: T, channel: Option<i64>) -> Self {
        Self { transport, channel }
    }

    pub fn channel(&self) -> Option<i64> {
        self.channel
    }

    fn require_channel(&self) -> Result<i64> {
        self.channel.ok_or(DbError::NoAssetsChannel)
    }

    /// Save an asset, returning its id
    pub async fn store_asset(&self, payload: Vec<u8>) -> Result<i64> {
        let channel = self.require_channel()?;
        let id = self.transport.send_attachment(channel, payload).await?;
        tracing::debug!("Stored asset {} in channel {}", id, channel);
        Ok(id)
    }

    /// Fetch an asset by id
    pub async fn fetch_asset(&self, id: i64) -> Result<Option<Vec<u8>>> {
        let channel = self.require_channel()?;
        self.transport.fetch_attachment(channel, id).await
    }
}
