use serde::{Deserialize, Serialize};

/// Media kind of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    #[default]
    Audio,
    Video,
}

impl CallKind {
    /// Human-facing name, as used in system notices ("Audio call not
    /// answered").
    pub fn display_name(&self) -> &'static str {
        match self {
            CallKind::Audio => "Audio",
            CallKind::Video => "Video",
        }
    }
}

/// Which side of the offer/answer exchange this peer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}
