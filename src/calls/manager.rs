//! Orchestration of the offer/answer/ICE exchange.

use super::error::CallError;
use super::state::{CallPhase, CallSession};
use crate::client::FrameSink;
use crate::frames::Frame;
use crate::media::{LocalMedia, MediaEngine, PeerSession};
use crate::types::call::{CallKind, CallRole};
use crate::types::events::{
    CallConnected, CallEnded, CallFailed, CallTick, EventBus, IncomingCall, SystemNotice,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct CallManagerConfig {
    /// How long an unanswered call rings before both sides give up.
    pub ring_timeout: Duration,
    /// Cadence of the elapsed-duration event while connected.
    pub tick_interval: Duration,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Manages the at-most-one call session per chat pair.
///
/// Long-running media awaits (device acquisition, offer/answer creation)
/// happen outside the session lock; each carries the generation it was
/// started under and re-checks it before attaching results, so a call
/// that was torn down mid-setup releases its resources instead of
/// resurrecting the session.
pub struct CallManager {
    our_id: String,
    config: CallManagerConfig,
    session: Mutex<Option<CallSession>>,
    generation: AtomicU64,
    media: Arc<dyn MediaEngine>,
    sink: FrameSink,
    bus: Arc<EventBus>,
}

type SessionParts = (
    Box<dyn LocalMedia>,
    Box<dyn PeerSession>,
    mpsc::Receiver<Value>,
    Value,
);

impl CallManager {
    pub(crate) fn new(
        our_id: String,
        config: CallManagerConfig,
        media: Arc<dyn MediaEngine>,
        sink: FrameSink,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            our_id,
            config,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            media,
            sink,
            bus,
        })
    }

    /// Current phase, `Idle` when no session exists.
    pub async fn phase(&self) -> CallPhase {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    /// Candidates queued while waiting for the remote description.
    pub async fn queued_candidates(&self) -> usize {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.pending_ice.len())
            .unwrap_or(0)
    }

    // ---- User intents ----

    /// Place an outgoing call: acquire media, create the offer and send it,
    /// then ring until answered or timed out.
    pub async fn start_call(self: &Arc<Self>, kind: CallKind) -> Result<(), CallError> {
        let generation = {
            let mut slot = self.session.lock().await;
            if slot.is_some() {
                warn!(target: "Client/Calls", "start_call while a call is already active");
                return Err(CallError::CallInProgress);
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Some(CallSession::new_outgoing(kind, generation));
            generation
        };

        let (media, peer, ice_rx, offer) = match self.build_caller_session(kind).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_setup(generation, false, &e).await;
                return Err(e);
            }
        };

        let mut slot = self.session.lock().await;
        match slot.as_mut() {
            Some(s) if s.generation == generation && s.phase == CallPhase::Offering => {
                s.local_media = Some(media);
                s.peer = Some(peer);
                self.spawn_ice_pump(s, ice_rx);
                self.arm_ring_timer(s);
                self.sink
                    .send(&Frame::CallOffer {
                        offer,
                        caller_id: self.our_id.clone(),
                        call_type: kind,
                    })
                    .await;
                info!(target: "Client/Calls", "Outgoing {kind:?} call offer sent");
                Ok(())
            }
            _ => {
                // Torn down while we were setting up.
                media.stop();
                peer.close().await;
                Err(CallError::Superseded)
            }
        }
    }

    /// Accept the ringing incoming call: acquire media, apply the stored
    /// offer, flush queued candidates and send the answer back.
    pub async fn accept_call(self: &Arc<Self>) -> Result<(), CallError> {
        let (generation, kind, offer) = {
            let mut slot = self.session.lock().await;
            match slot.as_mut() {
                Some(s) if s.role == CallRole::Callee && s.phase == CallPhase::Ringing => {
                    s.disarm_ring_timer();
                    let offer = s.stored_offer.clone().ok_or(CallError::NoIncomingCall)?;
                    (s.generation, s.kind, offer)
                }
                _ => return Err(CallError::NoIncomingCall),
            }
        };

        let (media, peer, ice_rx, answer) = match self.build_callee_session(kind, offer).await {
            Ok(parts) => parts,
            Err(e) => {
                // The caller is still ringing; tell them to stop.
                self.abort_setup(generation, true, &e).await;
                return Err(e);
            }
        };

        let mut slot = self.session.lock().await;
        let attached = match slot.as_mut() {
            Some(s) if s.generation == generation && s.phase == CallPhase::Ringing => {
                s.remote_description_set = true;
                // Drain queued candidates in arrival order, exactly once.
                for candidate in std::mem::take(&mut s.pending_ice) {
                    if let Err(e) = peer.add_ice_candidate(candidate).await {
                        warn!(target: "Client/Calls", "Failed to apply queued candidate: {e}");
                    }
                }
                s.local_media = Some(media);
                s.peer = Some(peer);
                self.spawn_ice_pump(s, ice_rx);
                self.sink.send(&Frame::CallAnswer { answer }).await;
                s.transition(CallPhase::Connected)?;
                s.connected_at = Some(Instant::now());
                self.start_duration_ticker(s);
                true
            }
            _ => {
                media.stop();
                peer.close().await;
                false
            }
        };
        drop(slot);
        if attached {
            let _ = self.bus.call_connected.send(Arc::new(CallConnected { kind }));
            info!(target: "Client/Calls", "Incoming {kind:?} call accepted");
            Ok(())
        } else {
            Err(CallError::Superseded)
        }
    }

    /// Decline the ringing incoming call and tell the caller.
    pub async fn reject_call(&self) -> Result<(), CallError> {
        let mut slot = self.session.lock().await;
        let ringing_callee = matches!(
            slot.as_ref(),
            Some(s) if s.role == CallRole::Callee && s.phase == CallPhase::Ringing
        );
        if !ringing_callee {
            return Err(CallError::NoIncomingCall);
        }
        info!(target: "Client/Calls", "Rejecting incoming call");
        self.cleanup_locked(&mut slot, true).await;
        Ok(())
    }

    /// Hang up, whatever phase the call is in. A no-op when idle, so the
    /// local end racing a remote `call_end` is harmless.
    pub async fn end_call(&self) {
        let mut slot = self.session.lock().await;
        if slot.is_none() {
            debug!(target: "Client/Calls", "end_call with no active call is a no-op");
            return;
        }
        self.cleanup_locked(&mut slot, true).await;
    }

    // ---- Inbound signaling ----

    pub(crate) async fn handle_offer(self: &Arc<Self>, offer: Value, caller_id: &str, kind: CallKind) {
        if caller_id == self.our_id {
            // Our own offer relayed back.
            return;
        }
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            warn!(target: "Client/Calls", "Dropping call_offer while a call is already active");
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut session = CallSession::new_incoming(kind, offer, generation);
        self.arm_ring_timer(&mut session);
        *slot = Some(session);
        drop(slot);
        let _ = self.bus.incoming_call.send(Arc::new(IncomingCall { kind }));
        info!(target: "Client/Calls", "Incoming {kind:?} call from {caller_id}");
    }

    pub(crate) async fn handle_answer(self: &Arc<Self>, answer: Value) {
        let mut slot = self.session.lock().await;

        let expecting_answer = matches!(
            slot.as_ref(),
            Some(s) if s.role == CallRole::Caller && s.phase == CallPhase::Offering && s.peer.is_some()
        );
        if !expecting_answer {
            debug!(target: "Client/Calls", "Ignoring stale call_answer");
            return;
        }

        let apply_error = {
            let Some(s) = slot.as_mut() else { return };
            s.disarm_ring_timer();
            match s.peer.as_ref() {
                Some(peer) => peer.set_remote_description(answer).await.err(),
                None => return,
            }
        };
        if let Some(e) = apply_error {
            warn!(target: "Client/Calls", "Failed to apply call answer: {e}");
            self.cleanup_locked(&mut slot, true).await;
            let _ = self
                .bus
                .call_failed
                .send(Arc::new(CallFailed { reason: e.to_string() }));
            return;
        }

        let kind = {
            let Some(s) = slot.as_mut() else { return };
            s.remote_description_set = true;
            let queued = std::mem::take(&mut s.pending_ice);
            if let Some(peer) = s.peer.as_ref() {
                for candidate in queued {
                    if let Err(e) = peer.add_ice_candidate(candidate).await {
                        warn!(target: "Client/Calls", "Failed to apply queued candidate: {e}");
                    }
                }
            }
            if let Err(e) = s.transition(CallPhase::Connected) {
                warn!(target: "Client/Calls", "{e}");
                return;
            }
            s.connected_at = Some(Instant::now());
            self.start_duration_ticker(s);
            s.kind
        };
        drop(slot);
        let _ = self.bus.call_connected.send(Arc::new(CallConnected { kind }));
        info!(target: "Client/Calls", "Call answered, media connected");
    }

    pub(crate) async fn handle_ice_candidate(&self, candidate: Value) {
        let mut slot = self.session.lock().await;
        match slot.as_mut() {
            None => debug!(target: "Client/Calls", "Discarding ICE candidate with no active call"),
            Some(s) => {
                if s.remote_description_set {
                    if let Some(peer) = s.peer.as_ref() {
                        if let Err(e) = peer.add_ice_candidate(candidate).await {
                            warn!(target: "Client/Calls", "Failed to apply candidate: {e}");
                        }
                    }
                } else {
                    s.pending_ice.push(candidate);
                    debug!(
                        target: "Client/Calls",
                        "Queued early ICE candidate ({} waiting)",
                        s.pending_ice.len()
                    );
                }
            }
        }
    }

    /// Remote hangup. No signal back; the remote end already knows.
    pub(crate) async fn handle_call_end(&self) {
        let mut slot = self.session.lock().await;
        self.cleanup_locked(&mut slot, false).await;
    }

    /// The remote side gave up ringing.
    pub(crate) async fn handle_call_missed(&self, kind: CallKind) {
        let mut slot = self.session.lock().await;
        let was_caller = matches!(slot.as_ref(), Some(s) if s.role == CallRole::Caller);
        let had_session = slot.is_some();
        self.cleanup_locked(&mut slot, false).await;
        drop(slot);
        if had_session && was_caller {
            let _ = self.bus.system_notice.send(Arc::new(SystemNotice {
                text: format!("{} call not answered", kind.display_name()),
            }));
        }
    }

    // ---- Internals ----

    async fn build_caller_session(&self, kind: CallKind) -> Result<SessionParts, CallError> {
        let media = self.media.acquire_local_media(kind).await?;
        let (peer, ice_rx) = match self.media.create_peer_session(&*media).await {
            Ok(parts) => parts,
            Err(e) => {
                media.stop();
                return Err(e.into());
            }
        };
        let offer = match peer.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                media.stop();
                peer.close().await;
                return Err(e.into());
            }
        };
        if let Err(e) = peer.set_local_description(offer.clone()).await {
            media.stop();
            peer.close().await;
            return Err(e.into());
        }
        Ok((media, peer, ice_rx, offer))
    }

    async fn build_callee_session(
        &self,
        kind: CallKind,
        offer: Value,
    ) -> Result<SessionParts, CallError> {
        let media = self.media.acquire_local_media(kind).await?;
        let (peer, ice_rx) = match self.media.create_peer_session(&*media).await {
            Ok(parts) => parts,
            Err(e) => {
                media.stop();
                return Err(e.into());
            }
        };
        let result = async {
            peer.set_remote_description(offer).await?;
            let answer = peer.create_answer().await?;
            peer.set_local_description(answer.clone()).await?;
            Ok::<_, crate::media::MediaError>(answer)
        }
        .await;
        match result {
            Ok(answer) => Ok((media, peer, ice_rx, answer)),
            Err(e) => {
                media.stop();
                peer.close().await;
                Err(e.into())
            }
        }
    }

    /// A media failure mid-setup: tear down whatever session the failed
    /// setup belonged to and surface the failure.
    async fn abort_setup(&self, generation: u64, send_signal: bool, error: &CallError) {
        warn!(target: "Client/Calls", "Call setup failed: {error}");
        let mut slot = self.session.lock().await;
        if matches!(slot.as_ref(), Some(s) if s.generation == generation) {
            self.cleanup_locked(&mut slot, send_signal).await;
        }
        drop(slot);
        let _ = self.bus.call_failed.send(Arc::new(CallFailed {
            reason: error.to_string(),
        }));
    }

    /// Tear down the live session: abort every timer, release media,
    /// close the peer. A no-op on an idle slot, so duplicate teardown
    /// paths (remote end then local end, timeout then hangup) are safe.
    async fn cleanup_locked(&self, slot: &mut Option<CallSession>, send_signal: bool) {
        let Some(mut session) = slot.take() else {
            return;
        };
        session.disarm_ring_timer();
        if let Some(task) = session.duration_task.take() {
            task.abort();
        }
        if let Some(pump) = session.ice_pump.take() {
            pump.abort();
        }
        if let Some(media) = session.local_media.take() {
            media.stop();
        }
        if let Some(peer) = session.peer.take() {
            peer.close().await;
        }
        session.pending_ice.clear();
        // Invalidate any setup still in flight for this session.
        self.generation.fetch_add(1, Ordering::SeqCst);
        if send_signal {
            self.sink.send(&Frame::CallEnd).await;
        }
        let _ = self.bus.call_ended.send(Arc::new(CallEnded));
        info!(target: "Client/Calls", "Call session cleaned up");
    }

    fn arm_ring_timer(self: &Arc<Self>, session: &mut CallSession) {
        let manager = self.clone();
        let generation = session.generation;
        let timeout = self.config.ring_timeout;
        session.ring_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.on_ring_timeout(generation).await;
        }));
    }

    async fn on_ring_timeout(&self, generation: u64) {
        let mut slot = self.session.lock().await;
        let (role, kind) = match slot.as_mut() {
            Some(s) if s.generation == generation => {
                // We *are* the ring timer task; detach our own handle so
                // cleanup does not abort us mid-teardown.
                drop(s.ring_timer.take());
                (s.role, s.kind)
            }
            // A stale timer that lost the race with its own abort.
            _ => return,
        };
        info!(target: "Client/Calls", "{kind:?} call rang out after {:?}", self.config.ring_timeout);
        self.cleanup_locked(&mut slot, false).await;
        drop(slot);
        self.sink.send(&Frame::CallMissed { call_type: kind }).await;
        if role == CallRole::Caller {
            let _ = self.bus.system_notice.send(Arc::new(SystemNotice {
                text: format!("{} call not answered", kind.display_name()),
            }));
        }
    }

    fn start_duration_ticker(&self, session: &mut CallSession) {
        let bus = self.bus.clone();
        let tick = self.config.tick_interval;
        let connected_at = session.connected_at.unwrap_or_else(Instant::now);
        session.duration_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // The first tick of an interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let elapsed_secs = connected_at.elapsed().as_secs();
                let _ = bus.call_tick.send(Arc::new(CallTick { elapsed_secs }));
            }
        }));
    }

    /// Forward locally discovered candidates to the remote party as they
    /// appear.
    fn spawn_ice_pump(&self, session: &mut CallSession, mut discovered: mpsc::Receiver<Value>) {
        let sink = self.sink.clone();
        session.ice_pump = Some(tokio::spawn(async move {
            while let Some(candidate) = discovered.recv().await {
                sink.send(&Frame::IceCandidate { candidate }).await;
            }
        }));
    }
}
