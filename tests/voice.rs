//! Voice session integration tests
//!
//! Sessions run against the scripted speech backend and a fake chat
//! backend, so every scenario is deterministic and hardware-free.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use whisker::Config;
use whisker::chat::{ChatClient, ConversationLog};
use whisker::speech::scripted::{ScriptStep, ScriptedRecognizer, ScriptedSynthesizer};
use whisker::speech::{LeaseHolder, RecognitionErrorKind, SpeechArbiter};
use whisker::voice::{
    DictationSession, DictationState, UiSink, VoiceDeps, VoiceModeSession, VoiceModeState,
    WakeState, WakeWordSession,
};

mod common;

use common::TestBackend;

struct Harness {
    backend: TestBackend,
    recognizer: Arc<ScriptedRecognizer>,
    synth: Arc<ScriptedSynthesizer>,
    arbiter: Arc<SpeechArbiter>,
    deps: VoiceDeps,
    config: Config,
}

async fn harness(reply: &str) -> Harness {
    harness_with_latency(reply, Duration::from_millis(5)).await
}

async fn harness_with_latency(reply: &str, speech_latency: Duration) -> Harness {
    let backend = TestBackend::spawn(reply).await;
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let synth = Arc::new(ScriptedSynthesizer::new(speech_latency));
    let arbiter = Arc::new(SpeechArbiter::new(synth.clone(), None));
    let chat = ChatClient::new(&backend.url).expect("bad backend url");
    let log = Arc::new(Mutex::new(ConversationLog::new()));

    let mut config = Config::default();
    config.timing.restart_debounce = Duration::from_millis(5);
    config.timing.error_restart_delay = Duration::from_millis(10);
    config.timing.relisten_delay = Duration::from_millis(10);

    let deps = VoiceDeps {
        arbiter: arbiter.clone(),
        recognizer: recognizer.clone(),
        chat,
        log,
    };

    Harness {
        backend,
        recognizer,
        synth,
        arbiter,
        deps,
        config,
    }
}

#[tokio::test]
async fn test_dictation_captures_sends_and_speaks() {
    let h = harness("Hi friend!").await;
    h.recognizer.push_script(vec![
        ScriptStep::partial("hel"),
        ScriptStep::partial("hello th"),
        ScriptStep::done("hello there"),
    ]);

    let session = DictationSession::new(h.deps.clone(), &h.config, UiSink::none());
    let reply = session.capture_and_send().await.unwrap();

    assert_eq!(reply.as_deref(), Some("Hi friend!"));
    assert_eq!(h.backend.received(), ["hello there"]);
    assert_eq!(h.synth.spoken(), ["Hi friend!"]);
    assert_eq!(session.state(), DictationState::Idle);
    assert_eq!(h.arbiter.mic_holder(), None);
}

#[tokio::test]
async fn test_dictation_blocked_while_mic_held() {
    let h = harness("unused").await;
    assert!(h.arbiter.acquire_mic(LeaseHolder::VoiceMode));

    let session = DictationSession::new(h.deps.clone(), &h.config, UiSink::none());
    let reply = session.capture_and_send().await.unwrap();

    assert_eq!(reply, None);
    assert_eq!(h.recognizer.starts(), 0, "capture must never start");
    assert_eq!(h.arbiter.mic_holder(), Some(LeaseHolder::VoiceMode));
}

#[tokio::test]
async fn test_dictation_silence_returns_none() {
    let h = harness("unused").await;
    h.recognizer.push_script(vec![ScriptStep::Ended]);

    let session = DictationSession::new(h.deps.clone(), &h.config, UiSink::none());
    let reply = session.capture_and_send().await.unwrap();

    assert_eq!(reply, None);
    assert!(h.backend.received().is_empty());
    assert!(h.synth.spoken().is_empty());
}

#[tokio::test]
async fn test_dictation_apologizes_on_backend_failure() {
    let backend = TestBackend::spawn_failing().await;
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let synth = Arc::new(ScriptedSynthesizer::new(Duration::from_millis(5)));
    let arbiter = Arc::new(SpeechArbiter::new(synth.clone(), None));
    let deps = VoiceDeps {
        arbiter,
        recognizer: recognizer.clone(),
        chat: ChatClient::new(&backend.url).unwrap(),
        log: Arc::new(Mutex::new(ConversationLog::new())),
    };
    let config = Config::default();
    recognizer.push_script(vec![ScriptStep::done("hello")]);

    let session = DictationSession::new(deps, &config, UiSink::none());
    let reply = session.capture_and_send().await.unwrap();

    assert_eq!(reply.as_deref(), Some(config.apology_text.as_str()));
    assert_eq!(synth.spoken(), [config.apology_text.clone()]);
}

#[tokio::test]
async fn test_dictation_stop_capture_ends_early() {
    let h = harness("unused").await;
    // Without an explicit stop the capture would sit in the long wait.
    h.recognizer.push_script(vec![
        ScriptStep::partial("hel"),
        ScriptStep::Wait(Duration::from_secs(30)),
        ScriptStep::done("never heard"),
    ]);

    let session = Arc::new(DictationSession::new(
        h.deps.clone(),
        &h.config,
        UiSink::none(),
    ));
    let mut state_rx = session.watch_state();
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.capture_and_send().await }
    });

    state_rx
        .wait_for(|s| *s == DictationState::Capturing)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.stop_capture();

    let reply = tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("stop must end the capture promptly")
        .unwrap()
        .unwrap();
    assert_eq!(reply, None, "no final transcript, nothing sent");
    assert_eq!(session.state(), DictationState::Idle);
    assert_eq!(h.arbiter.mic_holder(), None);
    assert!(h.backend.received().is_empty());
}

#[tokio::test]
async fn test_voice_mode_exit_phrase_says_farewell_once() {
    let h = harness("unused").await;
    h.recognizer
        .push_script(vec![ScriptStep::done("okay goodbye")]);

    let session = VoiceModeSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    assert_eq!(h.synth.spoken(), [h.config.wake.farewell_text.clone()]);
    assert!(h.backend.received().is_empty(), "exit phrase is not sent");
    assert_eq!(session.state(), VoiceModeState::Inactive);
    assert!(!session.is_active());
    assert_eq!(h.arbiter.mic_holder(), None);
    assert!(!h.arbiter.is_speaking());
}

#[tokio::test]
async fn test_voice_mode_round_trip_then_relistens() {
    let h = harness("It is noon.").await;
    h.recognizer
        .push_script(vec![ScriptStep::done("what time is it")]);
    h.recognizer.push_script(vec![ScriptStep::done("goodbye")]);

    let session = VoiceModeSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    assert_eq!(h.backend.received(), ["what time is it"]);
    assert_eq!(
        h.synth.spoken(),
        ["It is noon.".to_string(), h.config.wake.farewell_text.clone()]
    );
    assert_eq!(h.recognizer.starts(), 2, "loop re-listened after speaking");
}

#[tokio::test]
async fn test_voice_mode_retrigger_after_silence() {
    let h = harness("It is noon.").await;
    h.recognizer
        .push_script(vec![ScriptStep::Error(RecognitionErrorKind::NoSpeech)]);
    h.recognizer
        .push_script(vec![ScriptStep::done("what time is it")]);
    h.recognizer.push_script(vec![ScriptStep::done("goodbye")]);

    let session = Arc::new(VoiceModeSession::new(
        h.deps.clone(),
        &h.config,
        UiSink::none(),
    ));
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    // Let the silent capture play out, then tap to listen again.
    while h.recognizer.starts() < 1 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.retrigger_listening();
    running.await.unwrap().unwrap();

    assert_eq!(h.backend.received(), ["what time is it"]);
    assert_eq!(
        h.synth.spoken(),
        ["It is noon.".to_string(), h.config.wake.farewell_text.clone()]
    );
    assert_eq!(h.recognizer.starts(), 3, "silence, retriggered, farewell");
}

#[tokio::test]
async fn test_voice_mode_deactivate_silences_and_releases() {
    let h = harness_with_latency("A very long story...", Duration::from_secs(5)).await;
    h.recognizer
        .push_script(vec![ScriptStep::done("tell me a story")]);

    let session = Arc::new(VoiceModeSession::new(
        h.deps.clone(),
        &h.config,
        UiSink::none(),
    ));
    let mut state_rx = session.watch_state();
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    state_rx
        .wait_for(|s| *s == VoiceModeState::Speaking)
        .await
        .unwrap();
    session.deactivate();
    running.await.unwrap().unwrap();

    assert_eq!(session.state(), VoiceModeState::Inactive);
    assert!(!h.arbiter.is_speaking());
    assert_eq!(h.arbiter.mic_holder(), None);
}

#[tokio::test]
async fn test_voice_mode_displaces_previous_mic_holder() {
    let h = harness("unused").await;
    assert!(h.arbiter.acquire_mic(LeaseHolder::Dictation));
    h.recognizer.push_script(vec![ScriptStep::done("bye")]);

    let session = VoiceModeSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    // The explicit mode switch won the lease and released it at teardown.
    assert_eq!(h.arbiter.mic_holder(), None);
}

#[tokio::test]
async fn test_wake_word_full_activation_flow() {
    let h = harness("It's sunny!").await;
    // Background scan hears chatter, then the wake phrase.
    h.recognizer.push_script(vec![
        ScriptStep::partial("hello"),
        ScriptStep::done("just talking to myself"),
        ScriptStep::done("hello kitty wake up"),
    ]);
    // Command capture.
    h.recognizer.push_script(vec![
        ScriptStep::partial("what's"),
        ScriptStep::done("what's the weather"),
    ]);
    // Back to waiting; second activation exits.
    h.recognizer.push_script(vec![ScriptStep::done("hey kitty")]);
    h.recognizer.push_script(vec![ScriptStep::done("goodbye")]);

    let session = WakeWordSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    assert_eq!(h.backend.received(), ["what's the weather"]);
    assert_eq!(
        h.synth.spoken(),
        [
            h.config.wake.ack_text.clone(),
            "It's sunny!".to_string(),
            h.config.wake.ack_text.clone(),
            h.config.wake.farewell_text.clone(),
        ]
    );
    assert_eq!(session.state(), WakeState::Disabled);
    assert_eq!(h.arbiter.mic_holder(), None);
}

#[tokio::test]
async fn test_wake_phrase_in_same_capture_not_double_activated() {
    let h = harness("unused").await;
    // Two wake finals in one capture; the second arrives after the
    // session already stopped the background scan.
    h.recognizer.push_script(vec![
        ScriptStep::done("hello kitty"),
        ScriptStep::done("hello kitty again"),
    ]);
    // No command heard.
    h.recognizer.push_script(vec![ScriptStep::Ended]);
    // Next activation shuts the session down.
    h.recognizer.push_script(vec![ScriptStep::done("hello kitty")]);
    h.recognizer.push_script(vec![ScriptStep::done("bye")]);

    let session = WakeWordSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    let ack = h.config.wake.ack_text.as_str();
    let acks = h
        .synth
        .spoken()
        .iter()
        .filter(|t| t.as_str() == ack)
        .count();
    assert_eq!(acks, 2, "one ack per activation, not per wake final");
    assert_eq!(h.recognizer.starts(), 4);
}

#[tokio::test]
async fn test_wake_permission_denied_disables() {
    let h = harness("unused").await;
    h.recognizer.push_script(vec![ScriptStep::Error(
        RecognitionErrorKind::PermissionDenied,
    )]);

    let session = WakeWordSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    assert!(!session.is_enabled());
    assert_eq!(session.state(), WakeState::Disabled);
    assert_eq!(h.arbiter.mic_holder(), None);
    assert!(h.synth.spoken().is_empty());
}

#[tokio::test]
async fn test_wake_idle_capture_end_restarts_scan() {
    let h = harness("unused").await;
    // First capture times out silently; the loop debounces and rescans.
    h.recognizer.push_script(vec![ScriptStep::Ended]);
    h.recognizer.push_script(vec![ScriptStep::done("hello katie")]);
    h.recognizer.push_script(vec![ScriptStep::done("goodbye")]);

    let session = WakeWordSession::new(h.deps.clone(), &h.config, UiSink::none());
    session.run().await.unwrap();

    assert_eq!(h.recognizer.starts(), 3);
    assert_eq!(
        h.synth.spoken(),
        [
            h.config.wake.ack_text.clone(),
            h.config.wake.farewell_text.clone(),
        ]
    );
}

#[tokio::test]
async fn test_wake_disable_tears_down_mid_scan() {
    let h = harness("unused").await;
    // A long wait keeps the background capture open.
    h.recognizer.push_script(vec![
        ScriptStep::Wait(Duration::from_secs(30)),
        ScriptStep::done("hello kitty"),
    ]);

    let session = Arc::new(WakeWordSession::new(
        h.deps.clone(),
        &h.config,
        UiSink::none(),
    ));
    let mut state_rx = session.watch_state();
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    state_rx
        .wait_for(|s| *s == WakeState::Waiting)
        .await
        .unwrap();
    session.disable();
    running.await.unwrap().unwrap();

    assert_eq!(session.state(), WakeState::Disabled);
    assert_eq!(h.arbiter.mic_holder(), None);
    assert!(h.synth.spoken().is_empty());
}
