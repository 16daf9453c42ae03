use super::traits::FrameHandler;
use crate::client::Client;
use crate::frames::Frame;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler shared by the three renderable message kinds (`text`,
/// `voice_note`, `file`); all of them flow through the delivery engine's
/// echo-match path.
pub struct MessageFrameHandler {
    kind: &'static str,
}

impl MessageFrameHandler {
    pub fn for_text() -> Self {
        Self { kind: "text" }
    }

    pub fn for_voice_note() -> Self {
        Self { kind: "voice_note" }
    }

    pub fn for_file() -> Self {
        Self { kind: "file" }
    }
}

#[async_trait]
impl FrameHandler for MessageFrameHandler {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        client.delivery.handle_message(frame).await;
        true
    }
}
