use super::traits::FrameHandler;
use crate::client::Client;
use crate::frames::Frame;
use async_trait::async_trait;
use std::sync::Arc;

/// Peer-side receipt acknowledgment for a single message.
#[derive(Default)]
pub struct DeliveredHandler;

#[async_trait]
impl FrameHandler for DeliveredHandler {
    fn kind(&self) -> &'static str {
        "delivered"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        let Frame::Delivered { client_id } = frame else {
            return false;
        };
        client.delivery.handle_delivered(&client_id);
        true
    }
}

/// The peer's read broadcast, advancing every delivered message at once.
#[derive(Default)]
pub struct SeenHandler;

#[async_trait]
impl FrameHandler for SeenHandler {
    fn kind(&self) -> &'static str {
        "seen"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        if !matches!(frame, Frame::Seen) {
            return false;
        }
        client.delivery.handle_seen();
        true
    }
}
