//! Inbound frame dispatch: a registry of per-`type` handlers.

pub mod ack;
pub mod call;
pub mod message;
pub mod presence;
pub mod router;
pub mod traits;
