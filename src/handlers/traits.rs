use crate::client::Client;
use crate::frames::Frame;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for handling one wire frame `type`.
///
/// Each handler consumes a single discriminator value and delegates into
/// the owning engine, so the client never grows a monolithic match over
/// every frame kind.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// The `type` discriminator this handler consumes.
    fn kind(&self) -> &'static str;

    /// Handle the frame. Returns `true` if it was processed.
    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool;
}
