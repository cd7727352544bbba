//! Room switching, microphone ownership, barge-in, and event routing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeFactory, FakeMicrophone, RecordingSink};
use deskvoice::audio::{AudioChunk, SpeakerId};
use deskvoice::desk::{DeskEvent, DeskSetup, VoiceDesk};
use deskvoice::dispatch::{ActivityLog, InvocationStatus, ToolDispatcher};
use deskvoice::error::{RecoverySuggestion, VoiceError};
use deskvoice::provider::ProviderKind;
use deskvoice::room::{RoomId, RoomRegistry};
use deskvoice::session::{RealtimeSession, SessionEvent, SessionState, ToolCallRequest};
use deskvoice::tools::{FnTool, Tool, ToolParameters, ToolSpec};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

struct Harness {
    desk: VoiceDesk,
    events: mpsc::UnboundedReceiver<DeskEvent>,
    factory: Arc<FakeFactory>,
    mic: Arc<FakeMicrophone>,
}

fn harness() -> Harness {
    let snapshot = FnTool::new(
        ToolSpec::new("get_broker_snapshot", "Snapshot", ToolParameters::empty()),
        |_args, _ctx| async move { Ok::<_, VoiceError>(json!({ "equity": 10_000 })) },
    );
    let factory = Arc::new(FakeFactory::default());
    let mic = Arc::new(FakeMicrophone::default());
    let (desk, events) = VoiceDesk::new(
        DeskSetup::builder()
            .registry(Arc::new(RoomRegistry::desk_default().unwrap()))
            .factory(factory.clone())
            .dispatcher(ToolDispatcher::with_tools(
                Arc::new(ActivityLog::default()),
                [Arc::new(snapshot) as Arc<dyn Tool>],
            ))
            .microphone(mic.clone())
            .speaker(Arc::new(RecordingSink::new(Duration::from_secs(10))))
            .build(),
    );
    Harness {
        desk,
        events,
        factory,
        mic,
    }
}

/// Wait for the first desk event matching `predicate`, skipping others.
async fn expect_event(
    events: &mut mpsc::UnboundedReceiver<DeskEvent>,
    predicate: impl Fn(&DeskEvent) -> bool,
) -> DeskEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("desk event stream open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("matching desk event should arrive")
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within two seconds");
}

#[tokio::test]
async fn switching_rooms_tears_down_before_connecting() {
    let mut h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    assert!(h.desk.toggle_mic().await.unwrap());
    assert_eq!(h.mic.open_handles(), 1);

    h.desk.join_room(RoomId::Journal).await.unwrap();

    assert_eq!(
        h.factory.journal(),
        vec![
            "create:desk-1",
            "connect:desk-1",
            "active:desk-1",
            "close:desk-1",
            "create:journal-2",
            "connect:journal-2",
            "active:journal-2",
        ]
    );
    assert_eq!(h.mic.open_handles(), 0, "microphone released by the switch");
    assert!(!h.desk.is_mic_on());
    assert_eq!(h.desk.active_room().await, Some(RoomId::Journal));
    assert_eq!(h.desk.session_state().await, Some(SessionState::Active));

    let old = &h.factory.sessions()[0];
    assert_eq!(old.state(), SessionState::Closed);

    // Status events for the new room arrive after the old one closed.
    expect_event(&mut h.events, |event| {
        matches!(event, DeskEvent::ConnectionStatus { room: RoomId::Desk, state: SessionState::Closed })
    })
    .await;
    expect_event(&mut h.events, |event| {
        matches!(event, DeskEvent::ConnectionStatus { room: RoomId::Journal, state: SessionState::Active })
    })
    .await;
}

#[tokio::test]
async fn rejoining_twice_closes_each_session_once() {
    let h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    h.desk.join_room(RoomId::Autopilot).await.unwrap();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    h.desk.leave_room().await.unwrap();
    h.desk.leave_room().await.unwrap();

    let journal = h.factory.journal();
    for id in ["desk-1", "autopilot-2", "desk-3"] {
        let closes = journal.iter().filter(|entry| **entry == format!("close:{id}")).count();
        assert_eq!(closes, 1, "{id} closed {closes} times");
    }
    assert_eq!(h.desk.active_room().await, None);
}

#[tokio::test]
async fn toggle_mic_without_a_room_is_an_error() {
    let mut h = harness();
    let error = h.desk.toggle_mic().await.unwrap_err();
    assert!(matches!(error, VoiceError::InvalidState(_)));
    assert_eq!(h.mic.open_count(), 0);
    expect_event(&mut h.events, |event| matches!(event, DeskEvent::Error { .. })).await;
}

#[tokio::test]
async fn mic_streams_into_session_until_toggled_off() {
    let h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();

    assert!(h.desk.toggle_mic().await.unwrap());
    let request = h.mic.last_request().unwrap();
    assert_eq!(request.sample_rate, 16_000);
    assert_eq!(request.buffer_size, 4096);

    assert!(h.mic.push_frame(vec![0.5, -1.0]));
    let session = h.factory.last();
    eventually(|| !session.audio_frames.lock().unwrap().is_empty()).await;
    assert_eq!(session.audio_frames.lock().unwrap()[0], vec![16383, -32768]);

    assert!(!h.desk.toggle_mic().await.unwrap());
    assert_eq!(h.mic.open_handles(), 0);
    assert!(!h.mic.push_frame(vec![0.1]));
}

#[tokio::test]
async fn leaving_releases_the_microphone() {
    let h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    h.desk.toggle_mic().await.unwrap();

    h.desk.leave_room().await.unwrap();

    assert_eq!(h.mic.open_handles(), 0);
    assert!(!h.desk.is_mic_on());
    assert_eq!(h.desk.session_state().await, None);
}

#[tokio::test]
async fn denied_microphone_is_reported_with_a_hint() {
    let factory = Arc::new(FakeFactory::default());
    let (desk, mut events) = VoiceDesk::new(
        DeskSetup::builder()
            .registry(Arc::new(RoomRegistry::desk_default().unwrap()))
            .factory(factory)
            .dispatcher(ToolDispatcher::new(Arc::new(ActivityLog::default())))
            .microphone(Arc::new(FakeMicrophone::denying()))
            .speaker(Arc::new(RecordingSink::new(Duration::from_millis(10))))
            .build(),
    );
    desk.join_room(RoomId::Desk).await.unwrap();

    assert!(matches!(desk.toggle_mic().await, Err(VoiceError::Permission(_))));
    assert!(!desk.is_mic_on());
    let event = expect_event(&mut events, |event| matches!(event, DeskEvent::Error { .. })).await;
    assert!(matches!(
        event,
        DeskEvent::Error { suggestion: RecoverySuggestion::GrantMicrophoneAccess, .. }
    ));
}

#[tokio::test]
async fn typed_turn_interrupts_assistant_speech() {
    let h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    let session = h.factory.last();

    for _ in 0..3 {
        session.inject(SessionEvent::Audio(AudioChunk::playback(
            SpeakerId::new("strategist"),
            vec![1i16; 240],
            24_000,
        )));
    }
    eventually(|| h.desk.active_speaker().is_some()).await;

    h.desk.send_user_text("cut the size in half").await.unwrap();

    assert_eq!(h.desk.active_speaker(), None);
    assert_eq!(*session.texts.lock().unwrap(), vec!["cut the size in half".to_string()]);
}

#[tokio::test]
async fn provider_interruption_stops_playback() {
    let h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    let session = h.factory.last();

    session.inject(SessionEvent::Audio(AudioChunk::playback(
        SpeakerId::new("strategist"),
        vec![1i16; 240],
        24_000,
    )));
    eventually(|| h.desk.active_speaker().is_some()).await;
    session.inject(SessionEvent::Interrupted);
    eventually(|| h.desk.active_speaker().is_none()).await;
}

#[tokio::test]
async fn tool_calls_are_answered_and_surface_activity() {
    let mut h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    let session = h.factory.last();

    session.inject(SessionEvent::ToolCalls(vec![ToolCallRequest {
        call_id: "c1".into(),
        name: "get_broker_snapshot".into(),
        args: json!({}),
    }]));

    eventually(|| session.results.lock().unwrap().len() == 1).await;
    assert_eq!(session.results.lock().unwrap()[0].payload, json!({ "equity": 10_000 }));

    let event = expect_event(&mut h.events, |event| {
        matches!(event, DeskEvent::ToolActivity { invocation } if invocation.status == InvocationStatus::Ok)
    })
    .await;
    let DeskEvent::ToolActivity { invocation } = event else { unreachable!() };
    assert_eq!(invocation.session_id, "desk-1");
    assert_eq!(h.desk.activity().len(), 1);
}

#[tokio::test]
async fn transcripts_carry_room_and_speaker() {
    let mut h = harness();
    h.desk.join_room(RoomId::Journal).await.unwrap();
    h.factory.last().inject(SessionEvent::Text {
        text: "What did you learn today?".into(),
        is_final: false,
    });

    let event = expect_event(&mut h.events, |event| matches!(event, DeskEvent::Transcript { .. })).await;
    assert_eq!(
        event,
        DeskEvent::Transcript {
            room: RoomId::Journal,
            speaker: SpeakerId::new("journal"),
            text: "What did you learn today?".into(),
            is_final: false,
        }
    );
}

#[tokio::test]
async fn fatal_session_error_releases_the_microphone() {
    let mut h = harness();
    h.desk.join_room(RoomId::Desk).await.unwrap();
    h.desk.toggle_mic().await.unwrap();
    let session = h.factory.last();

    session.set_state(SessionState::Error);
    session.inject(SessionEvent::Error {
        message: "socket reset".into(),
    });

    let event = expect_event(&mut h.events, |event| matches!(event, DeskEvent::Error { .. })).await;
    assert_eq!(
        event,
        DeskEvent::Error {
            message: "socket reset".into(),
            suggestion: RecoverySuggestion::RejoinRoom,
        }
    );
    eventually(|| h.mic.open_handles() == 0).await;
}

#[tokio::test]
async fn failed_connect_is_reported_and_cleaned_up() {
    let mut h = harness();
    h.factory.fail_next_connect();

    let error = h.desk.join_room(RoomId::Autopilot).await.unwrap_err();
    assert!(matches!(error, VoiceError::Transport(_)));
    assert_eq!(h.desk.active_room().await, None);
    assert!(h.factory.journal().contains(&"close:autopilot-1".to_string()));

    let event = expect_event(&mut h.events, |event| matches!(event, DeskEvent::Error { .. })).await;
    assert!(matches!(
        event,
        DeskEvent::Error { suggestion: RecoverySuggestion::RejoinRoom, .. }
    ));

    // The desk recovers on the next join.
    h.desk.join_room(RoomId::Autopilot).await.unwrap();
    assert_eq!(h.desk.active_room().await, Some(RoomId::Autopilot));
}

#[tokio::test]
async fn provider_selection_applies_to_the_next_join() {
    let h = harness();
    h.desk.set_provider(ProviderKind::OpenAi);
    h.desk.join_room(RoomId::Desk).await.unwrap();

    let session = h.factory.last();
    assert_eq!(session.provider(), ProviderKind::OpenAi);
    assert_eq!(session.profile().voice, "ash");
}

#[cfg(feature = "gemini")]
#[tokio::test]
async fn leaving_closes_a_session_stuck_in_its_handshake() {
    use common::{recv_json, serve_once, wait_for_close};
    use deskvoice::config::VoiceConfig;
    use tokio::sync::oneshot;

    let (setup_seen_tx, setup_seen) = oneshot::channel();
    let (url, server) = serve_once(|mut ws, _| async move {
        let _setup = recv_json(&mut ws).await;
        let _ = setup_seen_tx.send(());
        // Never acknowledges the setup.
        wait_for_close(&mut ws).await;
    })
    .await;

    let mut config = VoiceConfig::default();
    config.gemini.base_url = url;
    config.gemini.api_key = Some("test-key".into());
    config.handshake_timeout = Duration::from_secs(30);
    let (desk, _events) = VoiceDesk::from_config(
        config,
        ProviderKind::Gemini,
        Arc::new(FakeMicrophone::default()),
        Arc::new(RecordingSink::new(Duration::from_millis(10))),
    )
    .unwrap();

    let leave = async {
        setup_seen.await.unwrap();
        assert_eq!(desk.active_room().await, Some(RoomId::Desk));
        assert_eq!(desk.session_state().await, Some(SessionState::Connecting));
        timeout(Duration::from_secs(1), desk.leave_room())
            .await
            .expect("leaving should not wait for the handshake")
    };
    let (joined, left) = timeout(Duration::from_secs(5), async {
        tokio::join!(desk.join_room(RoomId::Desk), leave)
    })
    .await
    .expect("join should end once the session is closed");

    left.unwrap();
    assert!(matches!(joined, Err(VoiceError::Transport(_))), "{joined:?}");
    assert_eq!(desk.active_room().await, None);
    server.await.expect("server should see the close");
}
