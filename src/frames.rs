//! Wire frames exchanged over the chat socket.
//!
//! Every frame is a JSON object with a mandatory `type` discriminator.
//! The relay forwards signaling frames between the two participants
//! verbatim; message frames are echoed back to both sides with the
//! server-assigned metadata (`sender_id`, `msg_id`, `timestamp`) attached.

use crate::types::call::CallKind;
use crate::types::message::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// A text chat message. Outbound it carries only `message` and
    /// `client_id`; the server echo adds sender metadata.
    Text {
        message: String,
        client_id: ClientId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_system: bool,
    },
    /// A voice note, base64 audio plus its MIME type.
    VoiceNote {
        client_id: ClientId,
        audio_data: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// A file attachment, base64 content plus the original filename.
    File {
        client_id: ClientId,
        file_b64: String,
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Receiver-side acknowledgment that a message reached the peer.
    Delivered { client_id: ClientId },
    /// Broadcast acknowledgment that all rendered messages have been read.
    Seen,
    /// Media session offer from the caller.
    CallOffer {
        offer: Value,
        caller_id: String,
        call_type: CallKind,
    },
    /// Media session answer from the callee.
    CallAnswer { answer: Value },
    /// A single network-path proposal discovered during session setup.
    IceCandidate { candidate: Value },
    /// Either side has terminated (or rejected) the call.
    CallEnd,
    /// The ring window elapsed without an answer.
    CallMissed { call_type: CallKind },
    /// Presence change relayed by the server.
    Presence {
        user_id: String,
        status: PresenceStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl Frame {
    /// The wire `type` discriminator, used to key handler dispatch.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text { .. } => "text",
            Frame::VoiceNote { .. } => "voice_note",
            Frame::File { .. } => "file",
            Frame::Delivered { .. } => "delivered",
            Frame::Seen => "seen",
            Frame::CallOffer { .. } => "call_offer",
            Frame::CallAnswer { .. } => "call_answer",
            Frame::IceCandidate { .. } => "ice_candidate",
            Frame::CallEnd => "call_end",
            Frame::CallMissed { .. } => "call_missed",
            Frame::Presence { .. } => "presence",
        }
    }

    /// Build a bare outbound text frame (no server metadata).
    pub fn text(message: impl Into<String>, client_id: ClientId) -> Self {
        Frame::Text {
            message: message.into(),
            client_id,
            sender_id: None,
            msg_id: None,
            timestamp: None,
            is_system: false,
        }
    }

    /// Build a bare outbound voice note frame.
    pub fn voice_note(
        client_id: ClientId,
        audio_data: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Frame::VoiceNote {
            client_id,
            audio_data: audio_data.into(),
            mime_type: mime_type.into(),
            sender_id: None,
            msg_id: None,
            timestamp: None,
        }
    }

    /// Build a bare outbound file frame.
    pub fn file(
        client_id: ClientId,
        file_b64: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Frame::File {
            client_id,
            file_b64: file_b64.into(),
            filename: filename.into(),
            sender_id: None,
            msg_id: None,
            timestamp: None,
        }
    }
}
