use async_trait::async_trait;
use shared::{domain::ChatId, protocol::Reply};

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()>;
    /// Confirms receipt of a button press so the client stops its loading indicator.
    async fn acknowledge(&self, callback_id: &str) -> anyhow::Result<()>;
}
