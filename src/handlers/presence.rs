use super::traits::FrameHandler;
use crate::client::Client;
use crate::frames::{Frame, PresenceStatus};
use crate::types::events::PresenceUpdate;
use async_trait::async_trait;
use std::sync::Arc;

/// Relays the peer's online/offline transitions to the presentation layer.
#[derive(Default)]
pub struct PresenceHandler;

#[async_trait]
impl FrameHandler for PresenceHandler {
    fn kind(&self) -> &'static str {
        "presence"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        let Frame::Presence { user_id, status } = frame else {
            return false;
        };
        let _ = client.event_bus.presence.send(Arc::new(PresenceUpdate {
            user_id,
            online: status == PresenceStatus::Online,
        }));
        true
    }
}
