use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use wirechat::Frame;
use wirechat::calls::{CallError, CallPhase};
use wirechat::test_utils::{ScriptedMediaEngine, create_test_client, create_test_client_with_media};
use wirechat::types::call::CallKind;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn offer_from_peer() -> Frame {
    Frame::CallOffer {
        offer: json!({"type": "offer", "sdp": "v=0 remote"}),
        caller_id: "2".to_string(),
        call_type: CallKind::Audio,
    }
}

#[tokio::test]
async fn test_outgoing_call_sends_offer() {
    init_logs();
    let (client, mut harness) = create_test_client().await;

    client.start_call(CallKind::Video).await.unwrap();

    match harness.next_sent().await {
        Frame::CallOffer {
            caller_id,
            call_type,
            ..
        } => {
            assert_eq!(caller_id, "1");
            assert_eq!(call_type, CallKind::Video);
        }
        other => panic!("expected call_offer, got {other:?}"),
    }
    assert_eq!(client.calls().phase().await, CallPhase::Offering);
}

#[tokio::test]
async fn test_second_call_attempt_is_refused() {
    init_logs();
    let (client, _harness) = create_test_client().await;
    client.start_call(CallKind::Audio).await.unwrap();
    assert!(matches!(
        client.start_call(CallKind::Audio).await,
        Err(CallError::CallInProgress)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_outgoing_call_rings_out() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut notices = client.events().system_notice.subscribe();
    let mut ended = client.events().call_ended.subscribe();

    client.start_call(CallKind::Audio).await.unwrap();
    let _offer = harness.next_sent().await;

    tokio::time::sleep(Duration::from_secs(31)).await;

    match harness.next_sent().await {
        Frame::CallMissed { call_type } => assert_eq!(call_type, CallKind::Audio),
        other => panic!("expected call_missed, got {other:?}"),
    }
    // Exactly one missed signal.
    assert!(harness.try_next_sent().is_none());
    assert_eq!(notices.recv().await.unwrap().text, "Audio call not answered");
    assert!(ended.recv().await.is_ok());
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    assert_eq!(harness.media.probe.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(harness.media.probe.peers_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_answer_after_ring_timeout_is_ignored() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut connected = client.events().call_connected.subscribe();

    client.start_call(CallKind::Audio).await.unwrap();
    let _offer = harness.next_sent().await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    let _missed = harness.next_sent().await;

    client
        .dispatch_frame(Frame::CallAnswer {
            answer: json!({"type": "answer", "sdp": "v=0 late"}),
        })
        .await;

    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    assert!(connected.try_recv().is_err());
}

#[tokio::test]
async fn test_answer_connects_and_drains_queued_candidates() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut connected = client.events().call_connected.subscribe();

    client.start_call(CallKind::Audio).await.unwrap();
    let _offer = harness.next_sent().await;

    // Candidate racing ahead of the answer is queued, not applied.
    client
        .dispatch_frame(Frame::IceCandidate {
            candidate: json!({"candidate": "early"}),
        })
        .await;
    assert_eq!(client.calls().queued_candidates().await, 1);

    client
        .dispatch_frame(Frame::CallAnswer {
            answer: json!({"type": "answer", "sdp": "v=0 remote"}),
        })
        .await;

    assert_eq!(client.calls().phase().await, CallPhase::Connected);
    assert!(connected.recv().await.is_ok());
    assert_eq!(client.calls().queued_candidates().await, 0);
    let applied = harness.media.probe.applied_candidates.lock().unwrap().clone();
    assert_eq!(applied, vec![json!({"candidate": "early"})]);

    // Candidates arriving after connect are applied directly.
    client
        .dispatch_frame(Frame::IceCandidate {
            candidate: json!({"candidate": "late"}),
        })
        .await;
    let applied = harness.media.probe.applied_candidates.lock().unwrap().clone();
    assert_eq!(applied.len(), 2);
}

#[tokio::test]
async fn test_incoming_call_rings_and_accept_answers() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut incoming = client.events().incoming_call.subscribe();

    client.dispatch_frame(offer_from_peer()).await;
    assert_eq!(incoming.recv().await.unwrap().kind, CallKind::Audio);
    assert_eq!(client.calls().phase().await, CallPhase::Ringing);

    // Three candidates arrive before accept; all must wait for the
    // remote description.
    for tag in ["c1", "c2", "c3"] {
        client
            .dispatch_frame(Frame::IceCandidate {
                candidate: json!({"candidate": tag}),
            })
            .await;
    }
    assert_eq!(client.calls().queued_candidates().await, 3);

    client.accept_call().await.unwrap();

    match harness.next_sent().await {
        Frame::CallAnswer { answer } => assert_eq!(answer["type"], "answer"),
        other => panic!("expected call_answer, got {other:?}"),
    }
    assert_eq!(client.calls().phase().await, CallPhase::Connected);
    assert_eq!(client.calls().queued_candidates().await, 0);

    let applied = harness.media.probe.applied_candidates.lock().unwrap().clone();
    assert_eq!(
        applied,
        vec![
            json!({"candidate": "c1"}),
            json!({"candidate": "c2"}),
            json!({"candidate": "c3"}),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_offer_is_dropped() {
    init_logs();
    let (client, _harness) = create_test_client().await;
    let mut incoming = client.events().incoming_call.subscribe();

    client.dispatch_frame(offer_from_peer()).await;
    client.dispatch_frame(offer_from_peer()).await;

    assert!(incoming.recv().await.is_ok());
    assert!(incoming.try_recv().is_err());
    assert_eq!(client.calls().phase().await, CallPhase::Ringing);
}

#[tokio::test]
async fn test_our_own_relayed_offer_is_ignored() {
    init_logs();
    let (client, _harness) = create_test_client().await;
    client
        .dispatch_frame(Frame::CallOffer {
            offer: json!({"type": "offer"}),
            caller_id: "1".to_string(),
            call_type: CallKind::Audio,
        })
        .await;
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
}

#[tokio::test]
async fn test_end_call_signals_exactly_once() {
    init_logs();
    let (client, mut harness) = create_test_client().await;

    client.dispatch_frame(offer_from_peer()).await;
    client.accept_call().await.unwrap();
    let _answer = harness.next_sent().await;

    client.end_call().await;
    assert_eq!(harness.next_sent().await, Frame::CallEnd);
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    assert_eq!(harness.media.probe.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(harness.media.probe.peers_closed.load(Ordering::SeqCst), 1);

    // Ending an already idle call sends nothing further.
    client.end_call().await;
    assert!(harness.try_next_sent().is_none());
}

#[tokio::test]
async fn test_remote_call_end_tears_down_without_signaling_back() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut ended = client.events().call_ended.subscribe();

    client.dispatch_frame(offer_from_peer()).await;
    client.accept_call().await.unwrap();
    let _answer = harness.next_sent().await;

    client.dispatch_frame(Frame::CallEnd).await;

    assert!(ended.recv().await.is_ok());
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    assert!(harness.try_next_sent().is_none());
}

#[tokio::test]
async fn test_reject_call_signals_the_caller() {
    init_logs();
    let (client, mut harness) = create_test_client().await;

    client.dispatch_frame(offer_from_peer()).await;
    client.reject_call().await.unwrap();

    assert_eq!(harness.next_sent().await, Frame::CallEnd);
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    assert!(matches!(
        client.reject_call().await,
        Err(CallError::NoIncomingCall)
    ));
}

#[tokio::test]
async fn test_media_denied_aborts_outgoing_call() {
    init_logs();
    let media = Arc::new(ScriptedMediaEngine::new());
    media.fail_acquire.store(true, Ordering::SeqCst);
    let (client, mut harness) = create_test_client_with_media(media).await;
    let mut failed = client.events().call_failed.subscribe();

    assert!(matches!(
        client.start_call(CallKind::Audio).await,
        Err(CallError::Media(_))
    ));

    assert!(failed.recv().await.is_ok());
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    // No offer ever left; the remote party never saw this attempt.
    assert!(harness.try_next_sent().is_none());
}

#[tokio::test]
async fn test_media_denied_on_accept_signals_the_caller() {
    init_logs();
    let media = Arc::new(ScriptedMediaEngine::new());
    let (client, mut harness) = create_test_client_with_media(media.clone()).await;
    let mut failed = client.events().call_failed.subscribe();

    client.dispatch_frame(offer_from_peer()).await;
    media.fail_acquire.store(true, Ordering::SeqCst);

    assert!(client.accept_call().await.is_err());

    // The caller is still ringing and must be told to stop.
    assert_eq!(harness.next_sent().await, Frame::CallEnd);
    assert!(failed.recv().await.is_ok());
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_incoming_call_rings_out() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut ended = client.events().call_ended.subscribe();

    client.dispatch_frame(offer_from_peer()).await;
    tokio::time::sleep(Duration::from_secs(31)).await;

    match harness.next_sent().await {
        Frame::CallMissed { call_type } => assert_eq!(call_type, CallKind::Audio),
        other => panic!("expected call_missed, got {other:?}"),
    }
    assert!(ended.recv().await.is_ok());
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_connected_call_ticks_elapsed_seconds() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut ticks = client.events().call_tick.subscribe();

    client.dispatch_frame(offer_from_peer()).await;
    client.accept_call().await.unwrap();
    let _answer = harness.next_sent().await;

    tokio::time::sleep(Duration::from_millis(3500)).await;

    let mut elapsed = Vec::new();
    for _ in 0..3 {
        elapsed.push(ticks.recv().await.unwrap().elapsed_secs);
    }
    assert_eq!(elapsed, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_candidate_with_no_session_is_discarded() {
    init_logs();
    let (client, _harness) = create_test_client().await;
    client
        .dispatch_frame(Frame::IceCandidate {
            candidate: json!({"candidate": "orphan"}),
        })
        .await;
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
    assert_eq!(client.calls().queued_candidates().await, 0);
}

#[tokio::test]
async fn test_remote_call_missed_notifies_the_caller_side() {
    init_logs();
    let (client, mut harness) = create_test_client().await;
    let mut notices = client.events().system_notice.subscribe();

    client.start_call(CallKind::Video).await.unwrap();
    let _offer = harness.next_sent().await;

    client
        .dispatch_frame(Frame::CallMissed {
            call_type: CallKind::Video,
        })
        .await;

    assert_eq!(notices.recv().await.unwrap().text, "Video call not answered");
    assert_eq!(client.calls().phase().await, CallPhase::Idle);
}
