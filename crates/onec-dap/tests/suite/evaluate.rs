use onec_rdbg::{
    CalculationResult, DebugTargetType, EvalReply, MockCall, MockDebugServer, PathStep, ValueInfo,
    ViewInterface,
};
use serde_json::json;

use crate::harness::{target, TestSession};

fn number(presentation: &str) -> ValueInfo {
    ValueInfo {
        type_name: "Number".to_string(),
        presentation: presentation.to_string(),
        ..ValueInfo::default()
    }
}

fn reply_for(server: &MockDebugServer, expression: &str, value: ValueInfo) {
    server.set_eval_reply(
        vec![PathStep::Expression(expression.to_string())],
        ViewInterface::Context,
        EvalReply::value(value, CalculationResult::empty(ViewInterface::Context)),
    );
}

async fn stopped_session(server: &MockDebugServer) -> (TestSession, Vec<i64>) {
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    let thread = session
        .start_thread(target("t1", DebugTargetType::Client))
        .await;
    let frames = session
        .stop_at("t1", thread, &[("Outer", 3), ("Inner", 9)])
        .await;
    (session, frames)
}

#[tokio::test]
async fn evaluate_returns_presentation_and_type() {
    let server = MockDebugServer::new();
    let (mut session, frames) = stopped_session(&server).await;
    reply_for(&server, "Total", number("42"));
    reply_for(
        &server,
        "Query",
        ValueInfo {
            type_name: "Query".to_string(),
            presentation: "Query".to_string(),
            is_expandable: true,
            ..ValueInfo::default()
        },
    );

    let resp = session
        .request(
            "evaluate",
            json!({ "expression": "Total", "frameId": frames[1], "context": "watch" }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    assert_eq!(resp.pointer("/body/result"), Some(&json!("42")));
    assert_eq!(resp.pointer("/body/type"), Some(&json!("Number")));
    assert_eq!(resp.pointer("/body/variablesReference"), Some(&json!(0)));

    let resp = session
        .request("evaluate", json!({ "expression": "Query", "frameId": frames[0] }))
        .await;
    let reference = resp
        .pointer("/body/variablesReference")
        .and_then(|v| v.as_i64())
        .unwrap();
    assert!(reference > 0);

    let levels: Vec<u32> = server
        .calls_of("evalExpr")
        .into_iter()
        .filter_map(|call| match call {
            MockCall::EvalExpr(request) => Some(request.stack_level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![1, 0]);

    session.disconnect().await;
}

#[tokio::test]
async fn evaluation_error_is_shown_as_the_result() {
    let server = MockDebugServer::new();
    let (mut session, frames) = stopped_session(&server).await;
    server.set_eval_reply(
        vec![PathStep::Expression("Missing".to_string())],
        ViewInterface::Context,
        EvalReply::Error("Variable not defined (Missing)".to_string()),
    );

    let resp = session
        .request("evaluate", json!({ "expression": "Missing", "frameId": frames[0] }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    assert_eq!(
        resp.pointer("/body/result"),
        Some(&json!("Variable not defined (Missing)"))
    );
    assert_eq!(resp.pointer("/body/variablesReference"), Some(&json!(0)));

    session.disconnect().await;
}

#[tokio::test]
async fn deferred_results_are_matched_to_their_requests() {
    let server = MockDebugServer::new();
    let (mut session, frames) = stopped_session(&server).await;
    server.set_deferred_evaluations(true);
    reply_for(&server, "A", number("1"));
    reply_for(&server, "B", number("2"));

    let first = session
        .send("evaluate", json!({ "expression": "A", "frameId": frames[0] }))
        .await;
    let second = session
        .send("evaluate", json!({ "expression": "B", "frameId": frames[0] }))
        .await;

    let resp = session.response(second).await;
    assert_eq!(resp.pointer("/body/result"), Some(&json!("2")), "{resp}");
    let resp = session.response(first).await;
    assert_eq!(resp.pointer("/body/result"), Some(&json!("1")), "{resp}");

    session.disconnect().await;
}

#[tokio::test]
async fn evaluate_requires_a_frame() {
    let server = MockDebugServer::new();
    let (mut session, _frames) = stopped_session(&server).await;

    let resp = session
        .request("evaluate", json!({ "expression": "1 + 1" }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(false)));
    assert!(resp["message"]
        .as_str()
        .unwrap()
        .contains("frameId is required"));

    let resp = session
        .request("evaluate", json!({ "expression": "1 + 1", "frameId": 9999 }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(false)));
    assert!(resp["message"].as_str().unwrap().contains("unknown frameId"));

    session.disconnect().await;
}
