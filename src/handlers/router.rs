use super::traits::FrameHandler;
use crate::client::Client;
use crate::frames::Frame;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry mapping wire `type` discriminators to their handlers.
#[derive(Default)]
pub struct FrameRouter {
    handlers: HashMap<&'static str, Arc<dyn FrameHandler>>,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Panics if the discriminator is already taken;
    /// duplicate registration is a programming error caught at startup.
    pub fn register(&mut self, handler: Arc<dyn FrameHandler>) {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            panic!("duplicate frame handler registered for '{kind}'");
        }
    }

    /// Dispatch a frame to its handler. Returns `false` when no handler
    /// claims the discriminator.
    pub async fn dispatch(&self, client: Arc<Client>, frame: Frame) -> bool {
        match self.handlers.get(frame.kind()) {
            Some(handler) => handler.handle(client, frame).await,
            None => false,
        }
    }
}
