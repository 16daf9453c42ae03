//! Call session state.

use crate::media::{LocalMedia, PeerSession};
use crate::types::call::{CallKind, CallRole};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Lifecycle phase of the (at most one) call per chat pair.
///
/// `Idle` is the resting phase: every terminal transition (answered and
/// ended, rejected, missed, explicit end) collapses back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPhase {
    #[default]
    Idle,
    /// Caller: offer sent, ring timer armed, waiting for the answer.
    Offering,
    /// Callee: offer received, prompt shown, ring timer armed.
    Ringing,
    /// Remote description applied on both sides, media flowing.
    Connected,
}

impl CallPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Offering | Self::Ringing)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// The single live call session.
///
/// Owns the opaque media resources and every timer attached to the call;
/// all of them are released or aborted on cleanup.
pub struct CallSession {
    pub role: CallRole,
    pub kind: CallKind,
    pub phase: CallPhase,
    /// Distinguishes this session from any successor. In-flight awaits
    /// and armed timers carry the generation they were started under and
    /// are ignored if it no longer matches.
    pub generation: u64,
    /// The remote offer, held between `call_offer` receipt and accept.
    pub(crate) stored_offer: Option<Value>,
    pub(crate) local_media: Option<Box<dyn LocalMedia>>,
    pub(crate) peer: Option<Box<dyn PeerSession>>,
    /// Candidates may only be applied once the remote description is set.
    pub(crate) remote_description_set: bool,
    /// FIFO of candidates that arrived before the remote description.
    pub(crate) pending_ice: Vec<Value>,
    pub(crate) ring_timer: Option<JoinHandle<()>>,
    pub(crate) duration_task: Option<JoinHandle<()>>,
    pub(crate) ice_pump: Option<JoinHandle<()>>,
    pub(crate) connected_at: Option<Instant>,
}

impl CallSession {
    pub(crate) fn new_outgoing(kind: CallKind, generation: u64) -> Self {
        Self {
            role: CallRole::Caller,
            kind,
            phase: CallPhase::Offering,
            generation,
            stored_offer: None,
            local_media: None,
            peer: None,
            remote_description_set: false,
            pending_ice: Vec::new(),
            ring_timer: None,
            duration_task: None,
            ice_pump: None,
            connected_at: None,
        }
    }

    pub(crate) fn new_incoming(kind: CallKind, offer: Value, generation: u64) -> Self {
        Self {
            role: CallRole::Callee,
            kind,
            phase: CallPhase::Ringing,
            generation,
            stored_offer: Some(offer),
            local_media: None,
            peer: None,
            remote_description_set: false,
            pending_ice: Vec::new(),
            ring_timer: None,
            duration_task: None,
            ice_pump: None,
            connected_at: None,
        }
    }

    /// Move to a new phase, validating the edge.
    pub(crate) fn transition(&mut self, to: CallPhase) -> Result<(), InvalidTransition> {
        let legal = matches!(
            (self.phase, to),
            (CallPhase::Offering, CallPhase::Connected) | (CallPhase::Ringing, CallPhase::Connected)
        );
        if !legal {
            return Err(InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    pub(crate) fn disarm_ring_timer(&mut self) {
        if let Some(timer) = self.ring_timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("role", &self.role)
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .field("remote_description_set", &self.remote_description_set)
            .field("pending_ice", &self.pending_ice.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub from: CallPhase,
    pub to: CallPhase,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot move from {:?} to {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}
