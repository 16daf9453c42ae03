use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-generated correlation id for a locally originated message.
///
/// Matches a locally optimistic send against its server-confirmed echo.
/// The token space is large enough that collisions are negligible for a
/// session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh id in the `c_xxxxxxxx` wire format.
    pub fn generate() -> Self {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        Self(format!("c_{token}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Acknowledgment lifecycle of a locally originated message.
///
/// The ordering of the variants is the ordering of the lifecycle; see
/// [`AckState::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckState {
    /// Rendered optimistically, awaiting the server echo.
    Sending,
    /// The server echo confirmed the message was accepted.
    Sent,
    /// The peer acknowledged receipt.
    Delivered,
    /// The peer's viewing window was focused after delivery.
    Seen,
}

impl AckState {
    /// Apply a forward-only transition. Returns `false` and leaves the
    /// state untouched when `next` would move backwards or is a
    /// duplicate, so a stale ack arriving after a later one can never
    /// regress the display.
    pub fn advance(&mut self, next: AckState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// A locally originated message awaiting (or past) server confirmation.
///
/// The engine stores only the correlation key; the payload and its
/// rendered representation are owned exclusively by the presentation
/// adapter.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub client_id: ClientId,
    pub ack: AckState,
    pub created_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            ack: AckState::Sending,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_wire_format() {
        let id = ClientId::generate();
        assert!(id.as_str().starts_with("c_"));
        assert_eq!(id.as_str().len(), 10);
        assert!(
            id.as_str()[2..]
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ack_state_advances_forward_only() {
        let mut state = AckState::Sending;
        assert!(state.advance(AckState::Sent));
        assert!(state.advance(AckState::Delivered));
        assert!(state.advance(AckState::Seen));
        assert_eq!(state, AckState::Seen);
    }

    #[test]
    fn test_ack_state_refuses_backward_transition() {
        let mut state = AckState::Seen;
        assert!(!state.advance(AckState::Delivered));
        assert_eq!(state, AckState::Seen);

        let mut state = AckState::Delivered;
        assert!(!state.advance(AckState::Delivered));
        assert_eq!(state, AckState::Delivered);
    }

    #[test]
    fn test_ack_state_may_skip_forward() {
        // A delivered ack can legitimately arrive before the echo.
        let mut state = AckState::Sending;
        assert!(state.advance(AckState::Delivered));
        assert_eq!(state, AckState::Delivered);
    }
}
