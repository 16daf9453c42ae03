//! Reliable message delivery: optimistic local echo reconciled against the
//! server-confirmed record, plus the delivered/seen acknowledgment flow.

use crate::client::FrameSink;
use crate::frames::Frame;
use crate::types::events::{AckUpdate, EventBus, MessageBody, NewMessage};
use crate::types::message::{AckState, ClientId, PendingMessage};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// The message delivery engine for one chat pair.
///
/// Every locally originated message is rendered optimistically, tracked in
/// the outbox under its generated [`ClientId`], and advanced through the
/// ack lifecycle by the echo, `delivered` and `seen` frames. An echo whose
/// `client_id` matches an outbox entry is *only* an ack; it is never
/// rendered a second time.
pub struct DeliveryEngine {
    our_id: String,
    outbox: DashMap<ClientId, PendingMessage>,
    sink: FrameSink,
    bus: Arc<EventBus>,
}

impl DeliveryEngine {
    pub(crate) fn new(our_id: String, sink: FrameSink, bus: Arc<EventBus>) -> Self {
        Self {
            our_id,
            outbox: DashMap::new(),
            sink,
            bus,
        }
    }

    // ---- Outbound ----

    pub async fn send_text(&self, body: &str) -> ClientId {
        let client_id = ClientId::generate();
        self.register(client_id.clone());
        self.publish_local_echo(client_id.clone(), MessageBody::Text(body.to_string()));
        self.sink.send(&Frame::text(body, client_id.clone())).await;
        client_id
    }

    pub async fn send_voice_note(&self, audio: &[u8], mime_type: &str) -> ClientId {
        let client_id = ClientId::generate();
        let audio_data = BASE64.encode(audio);
        self.register(client_id.clone());
        self.publish_local_echo(
            client_id.clone(),
            MessageBody::VoiceNote {
                audio_data: audio_data.clone(),
                mime_type: mime_type.to_string(),
            },
        );
        self.sink
            .send(&Frame::voice_note(client_id.clone(), audio_data, mime_type))
            .await;
        client_id
    }

    pub async fn send_file(&self, content: &[u8], filename: &str) -> ClientId {
        let client_id = ClientId::generate();
        let file_b64 = BASE64.encode(content);
        self.register(client_id.clone());
        self.publish_local_echo(
            client_id.clone(),
            MessageBody::File {
                file_b64: file_b64.clone(),
                filename: filename.to_string(),
            },
        );
        self.sink
            .send(&Frame::file(client_id.clone(), file_b64, filename))
            .await;
        client_id
    }

    /// The viewing window regained focus; broadcast that everything
    /// rendered so far has been read.
    pub(crate) async fn notify_focus(&self) {
        self.sink.send(&Frame::Seen).await;
    }

    // ---- Inbound ----

    pub(crate) async fn handle_message(&self, frame: Frame) {
        let Some(inbound) = InboundMessage::from_frame(frame) else {
            return;
        };

        // An echo of our own send acks the outbox entry and is never
        // rendered again.
        if self.outbox.contains_key(&inbound.client_id) {
            self.apply_ack(&inbound.client_id, AckState::Sent);
            return;
        }

        let mine = inbound.sender_id.as_deref() == Some(self.our_id.as_str());
        let is_system = inbound.is_system;
        let client_id = inbound.client_id.clone();
        let _ = self.bus.message.send(Arc::new(NewMessage {
            client_id: Some(inbound.client_id),
            sender_id: inbound.sender_id,
            mine,
            is_system,
            body: inbound.body,
            msg_id: inbound.msg_id,
            timestamp: inbound.timestamp,
        }));

        // Only genuine peer messages are acknowledged; system notices and
        // our own relayed sends are not.
        if !is_system && !mine {
            self.sink.send(&Frame::Delivered { client_id }).await;
        }
    }

    pub(crate) fn handle_delivered(&self, client_id: &ClientId) {
        if !self.apply_ack(client_id, AckState::Delivered) {
            debug!(target: "Client/Delivery", "Delivered ack for unknown or settled id {client_id}");
        }
    }

    /// The peer read everything: advance every delivered entry to seen.
    pub(crate) fn handle_seen(&self) {
        for mut entry in self.outbox.iter_mut() {
            if entry.ack == AckState::Delivered {
                entry.ack = AckState::Seen;
                let _ = self.bus.ack_update.send(Arc::new(AckUpdate {
                    client_id: entry.client_id.clone(),
                    state: AckState::Seen,
                }));
            }
        }
    }

    // ---- Observation ----

    /// Messages still awaiting their server echo.
    pub fn pending_count(&self) -> usize {
        self.outbox
            .iter()
            .filter(|entry| entry.ack == AckState::Sending)
            .count()
    }

    pub fn ack_state(&self, client_id: &ClientId) -> Option<AckState> {
        self.outbox.get(client_id).map(|entry| entry.ack)
    }

    // ---- Internals ----

    fn register(&self, client_id: ClientId) {
        self.outbox
            .insert(client_id.clone(), PendingMessage::new(client_id));
    }

    fn publish_local_echo(&self, client_id: ClientId, body: MessageBody) {
        let _ = self.bus.message.send(Arc::new(NewMessage {
            client_id: Some(client_id),
            sender_id: Some(self.our_id.clone()),
            mine: true,
            is_system: false,
            body,
            msg_id: None,
            timestamp: None,
        }));
    }

    /// Forward-only ack advance; a successful advance is published.
    fn apply_ack(&self, client_id: &ClientId, next: AckState) -> bool {
        let Some(mut entry) = self.outbox.get_mut(client_id) else {
            return false;
        };
        if entry.ack.advance(next) {
            let _ = self.bus.ack_update.send(Arc::new(AckUpdate {
                client_id: client_id.clone(),
                state: next,
            }));
            true
        } else {
            debug!(target: "Client/Delivery", "Refusing stale {next:?} ack for {client_id}");
            false
        }
    }
}

/// The renderable fields common to the three message frame kinds.
struct InboundMessage {
    client_id: ClientId,
    sender_id: Option<String>,
    is_system: bool,
    body: MessageBody,
    msg_id: Option<i64>,
    timestamp: Option<String>,
}

impl InboundMessage {
    fn from_frame(frame: Frame) -> Option<Self> {
        match frame {
            Frame::Text {
                message,
                client_id,
                sender_id,
                msg_id,
                timestamp,
                is_system,
            } => Some(Self {
                client_id,
                sender_id,
                is_system,
                body: MessageBody::Text(message),
                msg_id,
                timestamp,
            }),
            Frame::VoiceNote {
                client_id,
                audio_data,
                mime_type,
                sender_id,
                msg_id,
                timestamp,
            } => Some(Self {
                client_id,
                sender_id,
                is_system: false,
                body: MessageBody::VoiceNote {
                    audio_data,
                    mime_type,
                },
                msg_id,
                timestamp,
            }),
            Frame::File {
                client_id,
                file_b64,
                filename,
                sender_id,
                msg_id,
                timestamp,
            } => Some(Self {
                client_id,
                sender_id,
                is_system: false,
                body: MessageBody::File { file_b64, filename },
                msg_id,
                timestamp,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_client;

    #[tokio::test]
    async fn test_send_text_registers_a_pending_entry() {
        let (client, mut harness) = create_test_client().await;
        let client_id = client.send_text("hello").await;

        assert_eq!(client.delivery().pending_count(), 1);
        assert_eq!(
            client.delivery().ack_state(&client_id),
            Some(AckState::Sending)
        );
        match harness.next_sent().await {
            Frame::Text {
                message,
                client_id: sent_id,
                ..
            } => {
                assert_eq!(message, "hello");
                assert_eq!(sent_id, client_id);
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_voice_note_is_base64_encoded() {
        let (client, mut harness) = create_test_client().await;
        client.send_voice_note(b"\x00\x01\x02", "audio/webm").await;

        match harness.next_sent().await {
            Frame::VoiceNote {
                audio_data,
                mime_type,
                ..
            } => {
                assert_eq!(audio_data, "AAEC");
                assert_eq!(mime_type, "audio/webm");
            }
            other => panic!("expected voice_note frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_delivered_never_regresses_seen() {
        let (client, _harness) = create_test_client().await;
        let client_id = client.send_text("x").await;

        client.delivery().handle_delivered(&client_id);
        client.delivery().handle_seen();
        assert_eq!(
            client.delivery().ack_state(&client_id),
            Some(AckState::Seen)
        );

        // A duplicate delivered arriving late must not move it back.
        client.delivery().handle_delivered(&client_id);
        assert_eq!(
            client.delivery().ack_state(&client_id),
            Some(AckState::Seen)
        );
    }

    #[tokio::test]
    async fn test_seen_skips_entries_not_yet_delivered() {
        let (client, _harness) = create_test_client().await;
        let delivered = client.send_text("a").await;
        let still_sending = client.send_text("b").await;
        client.delivery().handle_delivered(&delivered);

        client.delivery().handle_seen();

        assert_eq!(
            client.delivery().ack_state(&delivered),
            Some(AckState::Seen)
        );
        assert_eq!(
            client.delivery().ack_state(&still_sending),
            Some(AckState::Sending)
        );
    }
}
