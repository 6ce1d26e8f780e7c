use onec_rdbg::{
    DebugTargetType, MockDebugServer, Notification, NotificationBody, NotificationKind,
};
use serde_json::{json, Value};

use crate::harness::{target, TestSession};

async fn next_error_output(session: &mut TestSession) -> String {
    let output = session.wait_for_event("output").await;
    assert_eq!(output.pointer("/body/category"), Some(&json!("stderr")));
    output
        .pointer("/body/output")
        .and_then(Value::as_str)
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn unsupported_notification_is_reported_and_polling_continues() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    server.push_notification(Notification {
        kind: NotificationKind::ShowMetadataObject,
        target_id: None,
        body: NotificationBody::None,
    });
    let text = next_error_output(&mut session).await;
    assert!(text.contains("ShowMetadataObject"), "{text}");

    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    assert!(thread > 0);

    session.disconnect().await;
}

#[tokio::test]
async fn poller_recovers_after_failed_pings() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    server.fail_command("pingDebugUIParams", "server restarting");
    let text = next_error_output(&mut session).await;
    assert!(text.contains("server restarting"), "{text}");
    server.clear_failure("pingDebugUIParams");

    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    assert!(thread > 0);

    session.disconnect().await;
}

#[tokio::test]
async fn notifications_for_unattached_targets_are_ignored() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    server.start_target(target("srv", DebugTargetType::Server));
    server.push_notification(crate::harness::breakpoint_hit("srv", &[("Main", 1)]));
    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;

    let threads = session.request("threads", json!({})).await;
    assert_eq!(
        threads.pointer("/body/threads").and_then(Value::as_array).map(Vec::len),
        Some(1)
    );
    assert_eq!(threads.pointer("/body/threads/0/id"), Some(&json!(thread)));
    assert_eq!(session.pending_events("stopped"), 0);
    assert_eq!(session.pending_events("output"), 0);

    session.disconnect().await;
}
