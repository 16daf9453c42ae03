use std::time::Duration;

/// Configuration for a [`crate::Client`].
///
/// One client serves exactly one chat pair: the local user and one remote
/// party. The websocket endpoint is derived from the remote party's
/// identifier.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the signaling server, e.g. `wss://chat.example.com`.
    pub endpoint_base: String,
    /// Identifier of the local user.
    pub user_id: String,
    /// Identifier of the remote chat party.
    pub peer_id: String,
    /// How long an outstanding call offer may ring before it is treated
    /// as missed.
    pub ring_timeout: Duration,
    /// Initial reconnect delay after a lost connection.
    pub reconnect_floor: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_ceiling: Duration,
    /// Multiplier applied to the reconnect delay after each consecutive
    /// failed attempt.
    pub reconnect_factor: f64,
}

impl ClientConfig {
    pub fn new(
        endpoint_base: impl Into<String>,
        user_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_base: endpoint_base.into(),
            user_id: user_id.into(),
            peer_id: peer_id.into(),
            ..Default::default()
        }
    }

    /// Endpoint URL for the chat pair, derived from the remote party's id.
    pub fn chat_url(&self) -> String {
        format!(
            "{}/ws/chat/{}/",
            self.endpoint_base.trim_end_matches('/'),
            self.peer_id
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_base: String::new(),
            user_id: String::new(),
            peer_id: String::new(),
            ring_timeout: Duration::from_secs(30),
            reconnect_floor: Duration::from_millis(1000),
            reconnect_ceiling: Duration::from_millis(10_000),
            reconnect_factor: 1.5,
        }
    }
}
