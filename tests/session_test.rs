//! End-to-end session scenarios against the scripted backend

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use ultralm::engine::{EngineEvent, ScriptedBackend};
use ultralm::session::{SessionController, SessionError, SessionState};
use ultralm::types::{Channel, SessionSettings};
use ultralm::ui::UiGateway;

/// Minimal display sink recording what the session shows
#[derive(Default)]
struct TestGateway {
    messages: Mutex<Vec<(String, Channel)>>,
    snapshots: Mutex<Vec<String>>,
    input_toggles: Mutex<Vec<bool>>,
    statuses: Mutex<Vec<(String, bool)>>,
}

impl TestGateway {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    fn last_snapshot(&self) -> Option<String> {
        self.snapshots.lock().last().cloned()
    }

    fn last_status(&self) -> Option<(String, bool)> {
        self.statuses.lock().last().cloned()
    }

    fn input_enabled(&self) -> Option<bool> {
        self.input_toggles.lock().last().copied()
    }
}

impl UiGateway for TestGateway {
    fn append_message(&self, text: &str, channel: Channel) {
        self.messages.lock().push((text.to_string(), channel));
    }

    fn update_status(&self, label: &str, online: bool) {
        self.statuses.lock().push((label.to_string(), online));
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.input_toggles.lock().push(enabled);
    }

    fn upsert_streaming(&self, _id: Uuid, text: &str) {
        self.snapshots.lock().push(text.to_string());
    }
}

fn make_session() -> (SessionController, ScriptedBackend, Arc<TestGateway>) {
    let backend = ScriptedBackend::new();
    let gateway = Arc::new(TestGateway::default());
    let settings = SessionSettings::default();
    let controller = SessionController::new(
        Arc::new(backend.clone()),
        settings.base_config(),
        settings.registry(),
        gateway.clone(),
    );
    (controller, backend, gateway)
}

#[tokio::test]
async fn boot_and_first_prompt_round_trip() {
    let (mut session, backend, gateway) = make_session();
    backend.script_reply("hello", &["Hi", " there", ""]);

    session.boot().await.unwrap();
    assert_eq!(session.state(), SessionState::Online);
    assert_eq!(gateway.last_status().unwrap(), ("ONLINE".to_string(), true));

    session.submit_prompt("hello").await.unwrap();
    assert_eq!(session.state(), SessionState::Online);
    assert_eq!(gateway.input_enabled(), Some(true));
    assert_eq!(gateway.last_snapshot().unwrap(), "Hi there");
    assert_eq!(backend.count(EngineEvent::ConstructCompleted), 1);
    assert_eq!(backend.count(EngineEvent::GenerateCompleted), 1);

    let rendered: Vec<String> = session.transcript().iter().map(|l| l.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "[System booting...]",
            "[Loading text engine...]",
            "[Text engine ONLINE]",
            "[UltraLM operational. Awaiting input.]",
            "[USER]: hello",
            "[MODEL]: Hi there",
        ]
    );
}

#[tokio::test]
async fn adapter_swap_never_overlaps_instances() {
    let (mut session, backend, gateway) = make_session();
    session.boot().await.unwrap();
    session.submit_prompt("warm up").await.unwrap();

    session.change_adapter("hut-8").await.unwrap();

    assert_eq!(session.active_adapter(), Some("hut-8"));
    assert_eq!(backend.max_live_instances(), 1);
    assert_eq!(backend.count(EngineEvent::CloseCompleted), 1);
    assert_eq!(backend.count(EngineEvent::ConstructCompleted), 2);

    let history = backend.history();
    let close_done = history
        .iter()
        .position(|e| *e == EngineEvent::CloseCompleted)
        .unwrap();
    let swap_construct = history
        .iter()
        .rposition(|e| *e == EngineEvent::ConstructStarted)
        .unwrap();
    assert!(close_done < swap_construct);

    assert!(gateway
        .messages()
        .contains(&"[HUT-8 adapter ONLINE]".to_string()));

    // the swapped engine answers with the adapter applied
    session.submit_prompt("ping").await.unwrap();
    assert_eq!(
        gateway.last_snapshot().unwrap(),
        "(hut-8-adapter) You said: ping"
    );
}

#[tokio::test]
async fn reselecting_the_active_adapter_cycles_the_engine() {
    let (mut session, backend, _gateway) = make_session();
    session.boot().await.unwrap();
    session.change_adapter("hut-6").await.unwrap();

    session.change_adapter("hut-6").await.unwrap();

    assert_eq!(backend.count(EngineEvent::ConstructCompleted), 3);
    assert_eq!(backend.count(EngineEvent::CloseCompleted), 2);
    assert_eq!(backend.max_live_instances(), 1);
    assert_eq!(session.active_adapter(), Some("hut-6"));
}

#[tokio::test]
async fn unknown_adapter_leaves_engine_untouched() {
    let (mut session, backend, gateway) = make_session();
    session.boot().await.unwrap();
    let history_before = backend.history();

    let err = session.change_adapter("hut-9").await.unwrap_err();

    assert!(matches!(err, SessionError::UnknownAdapter(_)));
    assert_eq!(session.state(), SessionState::Online);
    assert_eq!(backend.history(), history_before);
    assert!(gateway
        .messages()
        .contains(&"[ADAPTER ERROR: no adapter named 'hut-9' is registered]".to_string()));
}

#[tokio::test]
async fn boot_failure_latches_the_session() {
    let (mut session, backend, gateway) = make_session();
    backend.fail_next_construct("weights truncated");

    let err = session.boot().await.unwrap_err();
    assert!(matches!(err, SessionError::Engine(_)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(
        gateway.last_status().unwrap(),
        ("SYSTEM FAILURE".to_string(), false)
    );
    assert_eq!(gateway.input_enabled(), Some(false));

    let err = session.submit_prompt("hello").await.unwrap_err();
    assert!(matches!(err, SessionError::Rejected(SessionState::Failed)));
    assert_eq!(backend.count(EngineEvent::GenerateStarted), 0);
}

#[tokio::test]
async fn failed_swap_rolls_back_to_previous_engine() {
    let (mut session, backend, gateway) = make_session();
    session.boot().await.unwrap();
    let config_before = session.engine_config().unwrap().clone();

    backend.fail_next_construct("adapter weights corrupt");
    let err = session.change_adapter("hut-8").await.unwrap_err();

    assert!(matches!(err, SessionError::Engine(_)));
    assert_eq!(session.state(), SessionState::Online);
    assert_eq!(session.engine_config().unwrap(), &config_before);
    assert_eq!(session.active_adapter(), None);
    assert!(gateway
        .messages()
        .contains(&"[Previous engine configuration restored]".to_string()));

    session.submit_prompt("still here").await.unwrap();
    assert_eq!(gateway.last_snapshot().unwrap(), "You said: still here");
}

#[tokio::test]
async fn failed_swap_without_recovery_is_fatal() {
    let (mut session, backend, gateway) = make_session();
    session.boot().await.unwrap();

    backend.fail_next_construct("adapter weights corrupt");
    backend.fail_next_construct("device lost");
    session.change_adapter("hut-8").await.unwrap_err();

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(gateway.input_enabled(), Some(false));
    assert_eq!(
        gateway.last_status().unwrap(),
        ("SYSTEM FAILURE".to_string(), false)
    );

    let err = session.change_adapter("hut-6").await.unwrap_err();
    assert!(matches!(err, SessionError::Rejected(SessionState::Failed)));
}

#[tokio::test]
async fn full_conversation_flow() {
    let (mut session, _backend, gateway) = make_session();
    session.boot().await.unwrap();

    session.submit_prompt("first").await.unwrap();
    assert_eq!(gateway.last_snapshot().unwrap(), "You said: first");

    session.change_adapter("hut-8").await.unwrap();
    session.submit_prompt("second").await.unwrap();
    assert_eq!(
        gateway.last_snapshot().unwrap(),
        "(hut-8-adapter) You said: second"
    );

    session.change_adapter("default").await.unwrap();
    assert_eq!(session.active_adapter(), None);
    session.submit_prompt("third").await.unwrap();
    assert_eq!(gateway.last_snapshot().unwrap(), "You said: third");

    let user_lines: Vec<&str> = session
        .transcript()
        .iter()
        .filter(|l| l.channel == Channel::User)
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(user_lines, vec!["first", "second", "third"]);

    let model_lines: Vec<&str> = session
        .transcript()
        .iter()
        .filter(|l| l.channel == Channel::Model)
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(
        model_lines,
        vec![
            "You said: first",
            "(hut-8-adapter) You said: second",
            "You said: third",
        ]
    );
}
