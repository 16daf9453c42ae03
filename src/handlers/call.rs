//! Call signaling frame handlers, all thin delegations into the
//! [`CallManager`](crate::calls::CallManager).

use super::traits::FrameHandler;
use crate::client::Client;
use crate::frames::Frame;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Default)]
pub struct CallOfferHandler;

#[async_trait]
impl FrameHandler for CallOfferHandler {
    fn kind(&self) -> &'static str {
        "call_offer"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        let Frame::CallOffer {
            offer,
            caller_id,
            call_type,
        } = frame
        else {
            return false;
        };
        client.calls.handle_offer(offer, &caller_id, call_type).await;
        true
    }
}

#[derive(Default)]
pub struct CallAnswerHandler;

#[async_trait]
impl FrameHandler for CallAnswerHandler {
    fn kind(&self) -> &'static str {
        "call_answer"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        let Frame::CallAnswer { answer } = frame else {
            return false;
        };
        client.calls.handle_answer(answer).await;
        true
    }
}

#[derive(Default)]
pub struct IceCandidateHandler;

#[async_trait]
impl FrameHandler for IceCandidateHandler {
    fn kind(&self) -> &'static str {
        "ice_candidate"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        let Frame::IceCandidate { candidate } = frame else {
            return false;
        };
        client.calls.handle_ice_candidate(candidate).await;
        true
    }
}

#[derive(Default)]
pub struct CallEndHandler;

#[async_trait]
impl FrameHandler for CallEndHandler {
    fn kind(&self) -> &'static str {
        "call_end"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        if !matches!(frame, Frame::CallEnd) {
            return false;
        }
        client.calls.handle_call_end().await;
        true
    }
}

#[derive(Default)]
pub struct CallMissedHandler;

#[async_trait]
impl FrameHandler for CallMissedHandler {
    fn kind(&self) -> &'static str {
        "call_missed"
    }

    async fn handle(&self, client: Arc<Client>, frame: Frame) -> bool {
        let Frame::CallMissed { call_type } = frame else {
            return false;
        };
        client.calls.handle_call_missed(call_type).await;
        true
    }
}
