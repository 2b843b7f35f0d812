use crate::error::LineError;
use crate::types::ReplyToken;
use async_trait::async_trait;

#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send one text message back through the conversation identified by `reply_token`.
    async fn reply_text(&self, reply_token: &ReplyToken, text: &str) -> Result<(), LineError>;
}
