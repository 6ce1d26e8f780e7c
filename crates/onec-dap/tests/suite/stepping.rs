use onec_rdbg::{
    DebugTargetIdLight, DebugTargetType, MockCall, MockDebugServer, StepAction, TargetState,
    TargetStateItem,
};
use serde_json::json;

use crate::harness::{target, TestSession};

fn step_calls(server: &MockDebugServer) -> Vec<(String, StepAction)> {
    server
        .calls_of("step")
        .into_iter()
        .filter_map(|call| match call {
            MockCall::Step { target, action } => Some((target.id, action)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn continue_resumes_every_thread() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    session.stop_at("t1", thread, &[("Main", 4)]).await;

    let resp = session
        .request("continue", json!({ "threadId": thread }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    assert_eq!(resp.pointer("/body/allThreadsContinued"), Some(&json!(true)));

    let continued = session.wait_for_event("continued").await;
    assert_eq!(continued.pointer("/body/threadId"), Some(&json!(thread)));
    assert_eq!(step_calls(&server), vec![("t1".to_string(), StepAction::Continue)]);

    session.disconnect().await;
}

#[tokio::test]
async fn step_commands_map_to_step_actions() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;

    for command in ["next", "stepIn", "stepOut"] {
        session.stop_at("t1", thread, &[("Main", 4)]).await;
        let resp = session
            .request(command, json!({ "threadId": thread, "singleThread": true }))
            .await;
        assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
        session.wait_for_event("continued").await;
    }

    assert_eq!(
        step_calls(&server),
        vec![
            ("t1".to_string(), StepAction::Step),
            ("t1".to_string(), StepAction::StepIn),
            ("t1".to_string(), StepAction::StepOut),
        ]
    );

    session.disconnect().await;
}

#[tokio::test]
async fn every_resumed_target_reports_continued() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let first = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    let second = session
        .start_thread(target("t2", DebugTargetType::Client))
        .await;
    session.stop_at("t1", first, &[("Main", 4)]).await;

    server.set_step_states(vec![
        TargetStateItem {
            target_id: DebugTargetIdLight::from("t1"),
            state: TargetState::Worked,
        },
        TargetStateItem {
            target_id: DebugTargetIdLight::from("t2"),
            state: TargetState::Worked,
        },
        TargetStateItem {
            target_id: DebugTargetIdLight::from("gone"),
            state: TargetState::Worked,
        },
        TargetStateItem {
            target_id: DebugTargetIdLight::from("t3"),
            state: TargetState::Stopped,
        },
    ]);

    let resp = session
        .request("next", json!({ "threadId": first }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");

    let mut resumed = vec![
        session.wait_for_event("continued").await,
        session.wait_for_event("continued").await,
    ]
    .into_iter()
    .map(|event| event.pointer("/body/threadId").and_then(|id| id.as_i64()).unwrap())
    .collect::<Vec<_>>();
    resumed.sort_unstable();
    assert_eq!(resumed, vec![first, second]);
    assert_eq!(session.pending_events("continued"), 0);

    session.disconnect().await;
}

#[tokio::test]
async fn stepping_invalidates_frames() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    let frames = session.stop_at("t1", thread, &[("Main", 4)]).await;

    session
        .request("next", json!({ "threadId": thread }))
        .await;
    let scopes = session
        .request("scopes", json!({ "frameId": frames[0] }))
        .await;
    assert_eq!(scopes.pointer("/success"), Some(&json!(false)));
    assert!(scopes["message"].as_str().unwrap().contains("unknown frameId"));

    session.disconnect().await;
}

#[tokio::test]
async fn failed_step_is_reported() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    server.fail_command("step", "target is not suspended");

    let resp = session
        .request("stepIn", json!({ "threadId": thread }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(false)));
    let message = resp["message"].as_str().unwrap();
    assert!(message.starts_with("Failed to send step command"), "{message}");
    assert!(message.contains("target is not suspended"));

    let output = session.wait_for_event("output").await;
    assert_eq!(output.pointer("/body/category"), Some(&json!("stderr")));

    let unknown = session
        .request("next", json!({ "threadId": 4242 }))
        .await;
    assert_eq!(unknown.pointer("/success"), Some(&json!(false)));
    assert!(unknown["message"].as_str().unwrap().contains("unknown thread 4242"));

    session.disconnect().await;
}
