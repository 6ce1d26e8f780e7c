use onec_rdbg::{DebugTargetIdLight, DebugTargetType, MockCall, MockDebugServer};
use serde_json::json;

use crate::harness::{target, TestSession};

#[tokio::test]
async fn started_target_of_an_auto_attach_kind_becomes_a_thread() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    session.wait_for_event("DebugTargetsUpdated").await;

    assert_eq!(
        server.calls_of("attachDetachDbgTargets"),
        vec![MockCall::AttachDetachTargets {
            attach: true,
            targets: vec![DebugTargetIdLight::from("t1")],
        }]
    );

    let threads = session.request("threads", json!({})).await;
    assert_eq!(
        threads.pointer("/body/threads"),
        Some(&json!([{ "id": thread, "name": "Thick client (Admin, 3)" }]))
    );

    session.disconnect().await;
}

#[tokio::test]
async fn other_kinds_are_listed_and_attached_on_request() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let client_thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    server.start_target(target("srv", DebugTargetType::Server));

    let listed = session.request("DebugTargetsRequest", json!({})).await;
    assert_eq!(listed.pointer("/success"), Some(&json!(true)), "{listed}");
    assert_eq!(
        listed.pointer("/body/items"),
        Some(&json!([{ "id": "srv", "user": "Admin", "type": "Server", "seance": "3" }]))
    );
    assert!(!server.attached_targets().contains("srv"));

    let resp = session
        .request("AttachDebugTargetRequest", json!({ "id": "srv" }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    let started = session.wait_for_event("thread").await;
    let server_thread = started.pointer("/body/threadId").cloned().unwrap();
    assert_ne!(server_thread, json!(client_thread));
    assert!(server.attached_targets().contains("srv"));

    let listed = session.request("DebugTargetsRequest", json!({})).await;
    assert_eq!(listed.pointer("/body/items"), Some(&json!([])));

    let again = session
        .request("AttachDebugTargetRequest", json!({ "id": "srv" }))
        .await;
    assert_eq!(again.pointer("/success"), Some(&json!(false)));
    assert!(again["message"].as_str().unwrap().contains("already attached"));

    let unknown = session
        .request("AttachDebugTargetRequest", json!({ "id": "nope" }))
        .await;
    assert_eq!(unknown.pointer("/success"), Some(&json!(false)));
    assert!(unknown["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to attach debug target"));

    session.disconnect().await;
}

#[tokio::test]
async fn auto_attach_types_can_be_changed_mid_session() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    assert_eq!(server.auto_attach(), vec![DebugTargetType::Client]);

    let resp = session
        .request(
            "SetAutoAttachTargetTypesRequest",
            json!({ "types": ["Server", "ManagedClient"] }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    assert_eq!(
        server.auto_attach(),
        vec![DebugTargetType::Server, DebugTargetType::ManagedClient]
    );

    let rejected = session
        .request("SetAutoAttachTargetTypesRequest", json!({ "types": ["Toaster"] }))
        .await;
    assert_eq!(rejected.pointer("/success"), Some(&json!(false)));
    assert!(rejected["message"].as_str().unwrap().contains("Toaster"));
    assert_eq!(
        server.auto_attach(),
        vec![DebugTargetType::Server, DebugTargetType::ManagedClient]
    );

    let thread = session
        .start_thread(target("srv", DebugTargetType::Server))
        .await;
    assert!(thread > 0);

    session.disconnect().await;
}

#[tokio::test]
async fn quitting_target_exits_its_thread() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let client = target("t1", DebugTargetType::Client);
    let thread = session.start_thread(client.clone()).await;
    session.stop_at("t1", thread, &[("Main", 1)]).await;

    server.quit_target(&client);
    let exited = session.wait_for_event("thread").await;
    assert_eq!(exited.pointer("/body/reason"), Some(&json!("exited")));
    assert_eq!(exited.pointer("/body/threadId"), Some(&json!(thread)));

    let threads = session.request("threads", json!({})).await;
    assert_eq!(threads.pointer("/body/threads"), Some(&json!([])));
    let trace = session
        .request("stackTrace", json!({ "threadId": thread }))
        .await;
    assert_eq!(trace.pointer("/success"), Some(&json!(false)));

    let detaches: Vec<MockCall> = server
        .calls_of("attachDetachDbgTargets")
        .into_iter()
        .filter(|call| matches!(call, MockCall::AttachDetachTargets { attach: false, .. }))
        .collect();
    assert!(detaches.is_empty());

    session.disconnect().await;
}
