//! Typed event bus: the presentation adapter boundary.
//!
//! The engines publish everything the UI needs to render through separate
//! broadcast channels, one per event type. The adapter subscribes to the
//! channels it cares about and feeds user intents back through the
//! [`crate::Client`] methods.

use crate::types::call::CallKind;
use crate::types::message::{AckState, ClientId};
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// The transport opened successfully.
#[derive(Debug, Clone)]
pub struct Connected;

/// The transport was lost; the client is backing off before redialing.
#[derive(Debug, Clone)]
pub struct Disconnected;

/// A message to render: either a genuinely new inbound message or the
/// optimistic local rendering of our own send (`mine` is true and the
/// entry starts in the `Sending` ack state).
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub client_id: Option<ClientId>,
    pub sender_id: Option<String>,
    pub mine: bool,
    pub is_system: bool,
    pub body: MessageBody,
    pub msg_id: Option<i64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone)]
pub enum MessageBody {
    Text(String),
    VoiceNote {
        audio_data: String,
        mime_type: String,
    },
    File {
        file_b64: String,
        filename: String,
    },
}

/// The ack state of one of our messages changed.
#[derive(Debug, Clone)]
pub struct AckUpdate {
    pub client_id: ClientId,
    pub state: AckState,
}

/// A locally generated notice to show inline in the conversation.
#[derive(Debug, Clone)]
pub struct SystemNotice {
    pub text: String,
}

/// The remote party went online or offline.
#[derive(Debug, Clone)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub online: bool,
}

/// An inbound call offer is ringing; show the incoming-call prompt.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub kind: CallKind,
}

/// The call connected; show the in-call surface.
#[derive(Debug, Clone)]
pub struct CallConnected {
    pub kind: CallKind,
}

/// Periodic duration tick while a call is connected.
#[derive(Debug, Clone)]
pub struct CallTick {
    pub elapsed_secs: u64,
}

/// The call ended (any terminal transition); tear down the call surface.
#[derive(Debug, Clone)]
pub struct CallEnded;

/// A call transition was aborted, e.g. media acquisition was denied.
#[derive(Debug, Clone)]
pub struct CallFailed {
    pub reason: String,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus that provides separate broadcast channels for
        /// each event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),

    // Message delivery events
    (message, Arc<NewMessage>),
    (ack_update, Arc<AckUpdate>),
    (system_notice, Arc<SystemNotice>),
    (presence, Arc<PresenceUpdate>),

    // Call signaling events
    (incoming_call, Arc<IncomingCall>),
    (call_connected, Arc<CallConnected>),
    (call_tick, Arc<CallTick>),
    (call_ended, Arc<CallEnded>),
    (call_failed, Arc<CallFailed>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
