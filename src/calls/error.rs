use crate::calls::state::InvalidTransition;
use crate::media::MediaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("a call is already in progress")]
    CallInProgress,
    #[error("no incoming call to act on")]
    NoIncomingCall,
    #[error("call setup was superseded by a terminal transition")]
    Superseded,
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("invalid call transition: {0}")]
    Transition(#[from] InvalidTransition),
}
