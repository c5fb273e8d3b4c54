//! Message handler supplied by the caller.

use std::future::Future;

use async_trait::async_trait;

use crate::inbox::Message;

/// Handles one inbox message. The returned value becomes the `result` of
/// `message:process:completed`; an error becomes `message:process:failed`.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> anyhow::Result<serde_json::Value>;
}

/// Any `async` closure over a message is a handler.
#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> anyhow::Result<serde_json::Value> {
        (self)(message).await
    }
}
