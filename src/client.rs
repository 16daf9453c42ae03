use crate::calls::{CallError, CallManager, CallManagerConfig};
use crate::config::ClientConfig;
use crate::delivery::DeliveryEngine;
use crate::frames::Frame;
use crate::handlers::ack::{DeliveredHandler, SeenHandler};
use crate::handlers::call::{
    CallAnswerHandler, CallEndHandler, CallMissedHandler, CallOfferHandler, IceCandidateHandler,
};
use crate::handlers::message::MessageFrameHandler;
use crate::handlers::presence::PresenceHandler;
use crate::handlers::router::FrameRouter;
use crate::media::MediaEngine;
use crate::transport::{
    TokioWebSocketTransportFactory, Transport, TransportEvent, TransportFactory,
};
use crate::types::call::CallKind;
use crate::types::events::{Connected, Disconnected, EventBus};
use crate::types::message::ClientId;
use log::{debug, info, warn};
use std::cmp;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::time::sleep;

type TransportSlot = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// Outbound frame path shared by the engines.
///
/// Sending while the channel is not open is logged and dropped, matching
/// an at-most-once-per-attempt delivery policy. The reconnect loop is the
/// sole recovery mechanism; no frame is retried at this layer.
#[derive(Clone)]
pub(crate) struct FrameSink {
    transport: TransportSlot,
    connected: Arc<AtomicBool>,
}

impl FrameSink {
    pub(crate) fn new(transport: TransportSlot, connected: Arc<AtomicBool>) -> Self {
        Self {
            transport,
            connected,
        }
    }

    pub(crate) async fn send(&self, frame: &Frame) {
        if !self.connected.load(Ordering::Relaxed) {
            warn!(target: "Client", "Channel not open, dropping {} frame", frame.kind());
            return;
        }
        let transport = self.transport.read().await.clone();
        let Some(transport) = transport else {
            warn!(target: "Client", "No transport, dropping {} frame", frame.kind());
            return;
        };
        match serde_json::to_string(frame) {
            Ok(text) => {
                if let Err(e) = transport.send_frame(&text).await {
                    warn!(target: "Client", "Failed to send {} frame: {e:#}", frame.kind());
                }
            }
            Err(e) => warn!(target: "Client", "Failed to encode {} frame: {e}", frame.kind()),
        }
    }
}

/// Multiplicative reconnect backoff with a floor and a ceiling.
#[derive(Debug)]
pub(crate) struct ReconnectBackoff {
    floor: Duration,
    ceiling: Duration,
    factor: f64,
    current: Duration,
}

impl ReconnectBackoff {
    fn from_config(config: &ClientConfig) -> Self {
        Self {
            floor: config.reconnect_floor,
            ceiling: config.reconnect_ceiling,
            factor: config.reconnect_factor,
            current: config.reconnect_floor,
        }
    }

    /// Delay to wait before the next attempt; grows after each call.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = cmp::min(self.current.mul_f64(self.factor), self.ceiling);
        delay
    }

    /// A successful open resets the schedule to the floor.
    fn reset(&mut self) {
        self.current = self.floor;
    }
}

/// Client for one chat pair: a supervised reconnecting connection carrying
/// both the message delivery protocol and call signaling.
///
/// User intents come in through the public methods; everything the
/// presentation adapter needs to render goes out through the
/// [`EventBus`](crate::types::events::EventBus).
pub struct Client {
    config: ClientConfig,
    transport_factory: Arc<dyn TransportFactory>,
    transport: TransportSlot,
    connected: Arc<AtomicBool>,
    pub(crate) delivery: DeliveryEngine,
    pub(crate) calls: Arc<CallManager>,
    pub(crate) event_bus: Arc<EventBus>,
    router: FrameRouter,
    backoff: Mutex<ReconnectBackoff>,
    is_running: AtomicBool,
    shutdown_notifier: Notify,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        transport_factory: Arc<dyn TransportFactory>,
        media: Arc<dyn MediaEngine>,
    ) -> Arc<Self> {
        let transport: TransportSlot = Arc::new(RwLock::new(None));
        let connected = Arc::new(AtomicBool::new(false));
        let sink = FrameSink::new(transport.clone(), connected.clone());
        let event_bus = Arc::new(EventBus::new());
        let delivery =
            DeliveryEngine::new(config.user_id.clone(), sink.clone(), event_bus.clone());
        let calls = CallManager::new(
            config.user_id.clone(),
            CallManagerConfig {
                ring_timeout: config.ring_timeout,
                ..Default::default()
            },
            media,
            sink,
            event_bus.clone(),
        );
        let backoff = Mutex::new(ReconnectBackoff::from_config(&config));

        Arc::new(Self {
            config,
            transport_factory,
            transport,
            connected,
            delivery,
            calls,
            event_bus,
            router: build_frame_router(),
            backoff,
            is_running: AtomicBool::new(false),
            shutdown_notifier: Notify::new(),
        })
    }

    /// Client over the standard WebSocket transport, dialing the endpoint
    /// derived from the configured remote party.
    pub fn websocket(config: ClientConfig, media: Arc<dyn MediaEngine>) -> Arc<Self> {
        let factory = Arc::new(TokioWebSocketTransportFactory::new(config.chat_url()));
        Self::new(config, factory, media)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn delivery(&self) -> &DeliveryEngine {
        &self.delivery
    }

    pub fn calls(&self) -> &Arc<CallManager> {
        &self.calls
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    // ---- User intents (presentation adapter boundary) ----

    pub async fn send_text(&self, body: &str) -> ClientId {
        self.delivery.send_text(body).await
    }

    pub async fn send_voice_note(&self, audio: &[u8], mime_type: &str) -> ClientId {
        self.delivery.send_voice_note(audio, mime_type).await
    }

    pub async fn send_file(&self, content: &[u8], filename: &str) -> ClientId {
        self.delivery.send_file(content, filename).await
    }

    /// The viewing window regained focus: everything currently rendered
    /// has been read, so tell the peer.
    pub async fn notify_focus(&self) {
        self.delivery.notify_focus().await
    }

    pub async fn start_call(&self, kind: CallKind) -> Result<(), CallError> {
        self.calls.start_call(kind).await
    }

    pub async fn accept_call(&self) -> Result<(), CallError> {
        self.calls.accept_call().await
    }

    pub async fn reject_call(&self) -> Result<(), CallError> {
        self.calls.reject_call().await
    }

    pub async fn end_call(&self) {
        self.calls.end_call().await
    }

    pub fn shutdown(&self) {
        self.is_running.store(false, Ordering::Relaxed);
        self.shutdown_notifier.notify_waiters();
    }

    // ---- Connection supervision ----

    /// Run the connection forever: dial, pump events until the channel
    /// closes, back off, redial. Returns only after [`Client::shutdown`].
    pub async fn run(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "Client", "Client `run` called while already running.");
            return;
        }
        let client = self.clone();
        let _running = scopeguard::guard((), move |_| {
            client.is_running.store(false, Ordering::Relaxed);
        });

        while self.is_running.load(Ordering::Relaxed) {
            match self.transport_factory.create_transport().await {
                Ok((transport, events)) => {
                    *self.transport.write().await = Some(transport);
                    self.pump_events(events).await;
                    self.connected.store(false, Ordering::Relaxed);
                    if let Some(transport) = self.transport.write().await.take() {
                        transport.disconnect().await;
                    }
                    let _ = self.event_bus.disconnected.send(Arc::new(Disconnected));
                }
                Err(e) => warn!(target: "Client", "Connection attempt failed: {e:#}"),
            }

            if !self.is_running.load(Ordering::Relaxed) {
                break;
            }
            let delay = self.backoff.lock().await.next_delay();
            info!(target: "Client", "Reconnecting in {delay:?}");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_notifier.notified() => break,
            }
        }
        info!(target: "Client", "Client run loop has shut down.");
    }

    async fn pump_events(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown_notifier.notified() => {
                    self.is_running.store(false, Ordering::Relaxed);
                    return;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        info!(target: "Client", "Channel open");
                        self.connected.store(true, Ordering::Relaxed);
                        self.backoff.lock().await.reset();
                        let _ = self.event_bus.connected.send(Arc::new(Connected));
                    }
                    Some(TransportEvent::FrameReceived(text)) => {
                        self.handle_raw_frame(&text).await;
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        warn!(target: "Client", "Channel closed");
                        return;
                    }
                }
            }
        }
    }

    async fn handle_raw_frame(self: &Arc<Self>, text: &str) {
        match serde_json::from_str::<Frame>(text) {
            Ok(frame) => self.dispatch_frame(frame).await,
            Err(e) => debug!(target: "Client", "Dropping unparseable frame: {e}"),
        }
    }

    /// Dispatch one inbound frame to its handler.
    pub async fn dispatch_frame(self: &Arc<Self>, frame: Frame) {
        let kind = frame.kind();
        if !self.router.dispatch(self.clone(), frame).await {
            debug!(target: "Client", "No handler consumed {kind} frame");
        }
    }

    /// Place a transport directly into the slot and mark the channel open.
    /// Used by the shared test harness, which drives clients without `run`.
    pub(crate) async fn install_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = Some(transport);
        self.connected.store(true, Ordering::Relaxed);
    }
}

/// Central registry of frame handlers, one per `type` discriminator.
fn build_frame_router() -> FrameRouter {
    let mut router = FrameRouter::new();

    // Message delivery
    router.register(Arc::new(MessageFrameHandler::for_text()));
    router.register(Arc::new(MessageFrameHandler::for_voice_note()));
    router.register(Arc::new(MessageFrameHandler::for_file()));
    router.register(Arc::new(DeliveredHandler));
    router.register(Arc::new(SeenHandler));

    // Call signaling
    router.register(Arc::new(CallOfferHandler));
    router.register(Arc::new(CallAnswerHandler));
    router.register(Arc::new(IceCandidateHandler));
    router.register(Arc::new(CallEndHandler));
    router.register(Arc::new(CallMissedHandler));

    router.register(Arc::new(PresenceHandler));

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> ReconnectBackoff {
        ReconnectBackoff::from_config(&ClientConfig::default())
    }

    #[test]
    fn test_backoff_grows_multiplicatively_to_the_ceiling() {
        let mut backoff = backoff();
        let delays: Vec<u128> = (0..8).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1000, 1500, 2250, 3375, 5062, 7593, 10000, 10000]);
    }

    #[test]
    fn test_backoff_resets_on_successful_open() {
        let mut backoff = backoff();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1500));
    }
}
