//! Shared test doubles: a frame-capturing transport, a scripted media
//! engine and a helper that wires them into a client driven directly by
//! tests (no `run` loop, frames injected through `dispatch_frame`).

use crate::client::Client;
use crate::config::ClientConfig;
use crate::frames::Frame;
use crate::media::{LocalMedia, MediaEngine, MediaError, PeerSession};
use crate::transport::{Transport, TransportEvent, TransportFactory};
use crate::types::call::CallKind;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Transport that records every frame handed to it.
pub struct CapturingTransport {
    sent: mpsc::UnboundedSender<String>,
}

impl CapturingTransport {
    pub fn new(sent: mpsc::UnboundedSender<String>) -> Self {
        Self { sent }
    }
}

#[async_trait]
impl Transport for CapturingTransport {
    async fn send_frame(&self, frame: &str) -> Result<(), anyhow::Error> {
        self.sent
            .send(frame.to_string())
            .map_err(|_| anyhow::anyhow!("capture channel closed"))
    }

    async fn disconnect(&self) {}
}

/// Factory for clients that are driven directly; connecting through it is
/// an error because tests never call `run`.
#[derive(Default)]
pub struct NullTransportFactory;

#[async_trait]
impl TransportFactory for NullTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        Err(anyhow::anyhow!("test clients are driven directly"))
    }
}

/// Observation points shared by every scripted media object.
#[derive(Default)]
pub struct MediaProbe {
    pub acquired: AtomicUsize,
    pub stopped: AtomicUsize,
    pub peers_closed: AtomicUsize,
    pub applied_candidates: Mutex<Vec<Value>>,
    pub remote_descriptions: Mutex<Vec<Value>>,
}

/// Media engine whose behavior is scripted up front.
#[derive(Default)]
pub struct ScriptedMediaEngine {
    pub probe: Arc<MediaProbe>,
    /// When set, `acquire_local_media` fails with a permission error.
    pub fail_acquire: AtomicBool,
    /// Candidates every peer session "discovers" at creation, fed through
    /// the discovery channel.
    pub discovered: Mutex<Vec<Value>>,
}

impl ScriptedMediaEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

struct ScriptedLocalMedia {
    probe: Arc<MediaProbe>,
}

impl LocalMedia for ScriptedLocalMedia {
    fn stop(&self) {
        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedPeerSession {
    probe: Arc<MediaProbe>,
}

#[async_trait]
impl PeerSession for ScriptedPeerSession {
    async fn create_offer(&self) -> Result<Value, MediaError> {
        Ok(json!({"type": "offer", "sdp": "v=0 scripted"}))
    }

    async fn create_answer(&self) -> Result<Value, MediaError> {
        Ok(json!({"type": "answer", "sdp": "v=0 scripted"}))
    }

    async fn set_local_description(&self, _description: Value) -> Result<(), MediaError> {
        Ok(())
    }

    async fn set_remote_description(&self, description: Value) -> Result<(), MediaError> {
        self.probe
            .remote_descriptions
            .lock()
            .unwrap()
            .push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), MediaError> {
        self.probe.applied_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.probe.peers_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaEngine for ScriptedMediaEngine {
    async fn acquire_local_media(
        &self,
        _kind: CallKind,
    ) -> Result<Box<dyn LocalMedia>, MediaError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }
        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLocalMedia {
            probe: self.probe.clone(),
        }))
    }

    async fn create_peer_session(
        &self,
        _local: &dyn LocalMedia,
    ) -> Result<(Box<dyn PeerSession>, mpsc::Receiver<Value>), MediaError> {
        let (tx, rx) = mpsc::channel(16);
        for candidate in self.discovered.lock().unwrap().iter().cloned() {
            let _ = tx.try_send(candidate);
        }
        Ok((
            Box::new(ScriptedPeerSession {
                probe: self.probe.clone(),
            }),
            rx,
        ))
    }
}

/// Everything a test needs to observe a client built by
/// [`create_test_client`].
pub struct TestHarness {
    pub sent_rx: mpsc::UnboundedReceiver<String>,
    pub media: Arc<ScriptedMediaEngine>,
}

impl TestHarness {
    /// Next captured outbound frame, parsed. `None` when nothing was sent.
    pub fn try_next_sent(&mut self) -> Option<Frame> {
        self.sent_rx
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("captured frame should parse"))
    }

    /// Next captured outbound frame, waiting for it if necessary.
    pub async fn next_sent(&mut self) -> Frame {
        let text = self
            .sent_rx
            .recv()
            .await
            .expect("a frame should have been sent");
        serde_json::from_str(&text).expect("captured frame should parse")
    }
}

pub async fn create_test_client() -> (Arc<Client>, TestHarness) {
    create_test_client_with_media(Arc::new(ScriptedMediaEngine::new())).await
}

pub async fn create_test_client_with_media(
    media: Arc<ScriptedMediaEngine>,
) -> (Arc<Client>, TestHarness) {
    let config = ClientConfig::new("wss://chat.test", "1", "2");
    let client = Client::new(config, Arc::new(NullTransportFactory), media.clone());
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    client
        .install_transport(Arc::new(CapturingTransport::new(sent_tx)))
        .await;
    (client, TestHarness { sent_rx, media })
}
