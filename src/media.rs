//! External media collaborator boundary.
//!
//! The signaling engine never touches capture devices or codecs itself.
//! An embedding application provides a [`MediaEngine`] that can acquire
//! local media and build peer sessions; the engine drives it through the
//! offer/answer/ICE exchange and releases everything on teardown.

use crate::types::call::CallKind;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media permission denied")]
    PermissionDenied,
    #[error("no capture device available")]
    NoDevice,
    #[error("peer session failure: {0}")]
    Peer(String),
}

/// An acquired local media stream (microphone, or microphone + camera).
///
/// Owned by the call session; `stop` is called on every terminal
/// transition so devices are never left captured.
pub trait LocalMedia: Send + Sync {
    fn stop(&self);
}

/// One peer media session negotiated through the offer/answer exchange.
///
/// Descriptions and candidates are opaque JSON blobs; the signaling layer
/// relays them without interpreting their contents.
#[async_trait]
pub trait PeerSession: Send + Sync {
    async fn create_offer(&self) -> Result<Value, MediaError>;
    async fn create_answer(&self) -> Result<Value, MediaError>;
    async fn set_local_description(&self, description: Value) -> Result<(), MediaError>;
    async fn set_remote_description(&self, description: Value) -> Result<(), MediaError>;
    /// Apply a remote candidate. Must only be called once the remote
    /// description is known.
    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), MediaError>;
    async fn close(&self);
}

/// Factory boundary implemented by the embedding application.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Acquire local media of the requested kind. May prompt the user;
    /// failure (denied, no device) aborts the in-progress call transition.
    async fn acquire_local_media(&self, kind: CallKind) -> Result<Box<dyn LocalMedia>, MediaError>;

    /// Build a peer session around the local stream. The returned channel
    /// yields locally discovered ICE candidates as they appear; the
    /// signaling engine forwards each one to the remote party.
    async fn create_peer_session(
        &self,
        local: &dyn LocalMedia,
    ) -> Result<(Box<dyn PeerSession>, mpsc::Receiver<Value>), MediaError>;
}
