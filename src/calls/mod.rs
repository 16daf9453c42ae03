//! Call signaling: the offer/answer/ICE state machine.

pub mod error;
pub mod manager;
pub mod state;

pub use error::CallError;
pub use manager::{CallManager, CallManagerConfig};
pub use state::{CallPhase, CallSession};
