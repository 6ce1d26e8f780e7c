use onec_rdbg::{MockCall, MockDebugServer, ModuleId, ModuleType, RteFilterItem};
use serde_json::json;

use crate::harness::{module, TestSession};

#[tokio::test]
async fn conditional_breakpoints_and_logpoints_reach_the_debug_server() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    let resp = session
        .request(
            "setBreakpoints",
            json!({
                "source": { "name": "CommonModule.bsl", "path": "c:\\src\\CommonModule.bsl" },
                "breakpoints": [
                    { "line": 10, "condition": "a>1" },
                    { "line": 14, "logMessage": "a = {a}" },
                ],
            }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    assert_eq!(resp.pointer("/body/breakpoints/0/verified"), Some(&json!(true)));
    assert_eq!(resp.pointer("/body/breakpoints/0/line"), Some(&json!(10)));
    assert_eq!(resp.pointer("/body/breakpoints/1/line"), Some(&json!(14)));
    assert_eq!(
        resp.pointer("/body/breakpoints/0/source/path"),
        Some(&json!("C:\\src\\CommonModule.bsl"))
    );

    let sent = server.calls_of("setBreakpoints");
    let MockCall::SetBreakpoints(modules) = &sent[0] else {
        panic!("expected setBreakpoints, got {:?}", sent[0]);
    };
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].module, module());

    let conditional = &modules[0].breakpoints[0];
    assert_eq!(conditional.line, 10);
    assert!(conditional.break_on_condition);
    assert_eq!(conditional.condition, "a>1");
    assert!(!conditional.continue_execution);

    let logpoint = &modules[0].breakpoints[1];
    assert_eq!(logpoint.put_description.as_deref(), Some("a = {a}"));
    assert!(logpoint.show_output_message);
    assert!(logpoint.continue_execution);

    session.disconnect().await;
}

#[tokio::test]
async fn extension_sources_map_to_extension_modules() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    let form = ModuleId::new(Some("Sales".to_string()), "form".to_string(), "form-module".to_string());
    session.metadata.insert("C:\\ext\\Sales\\Form.bsl", form.clone());
    session.attach().await;

    let resp = session
        .request(
            "setBreakpoints",
            json!({
                "source": { "path": "C:\\ext\\Sales\\Form.bsl" },
                "breakpoints": [{ "line": 3 }],
            }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");

    let sent = server.calls_of("setBreakpoints");
    let MockCall::SetBreakpoints(modules) = &sent[0] else {
        panic!("expected setBreakpoints, got {:?}", sent[0]);
    };
    assert_eq!(modules[0].module, form);
    assert_eq!(modules[0].module.module_type, ModuleType::ExtensionModule);
    assert!(!modules[0].breakpoints[0].break_on_condition);

    session.disconnect().await;
}

#[tokio::test]
async fn clearing_breakpoints_sends_an_empty_set() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    let resp = session
        .request(
            "setBreakpoints",
            json!({ "source": { "path": "C:\\src\\CommonModule.bsl" }, "breakpoints": [] }),
        )
        .await;
    assert_eq!(resp.pointer("/body/breakpoints"), Some(&json!([])));
    assert!(matches!(
        &server.calls_of("setBreakpoints")[0],
        MockCall::SetBreakpoints(modules) if modules[0].breakpoints.is_empty()
    ));

    session.disconnect().await;
}

#[tokio::test]
async fn unknown_source_fails_the_request_only() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    let resp = session
        .request(
            "setBreakpoints",
            json!({ "source": { "path": "/tmp/Unknown.bsl" }, "breakpoints": [{ "line": 1 }] }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(false)));
    let message = resp["message"].as_str().unwrap();
    assert!(message.starts_with("Failed to set breakpoints"), "{message}");
    assert!(message.contains("/tmp/Unknown.bsl"), "{message}");
    assert!(server.calls_of("setBreakpoints").is_empty());

    let threads = session.request("threads", json!({})).await;
    assert_eq!(threads.pointer("/success"), Some(&json!(true)));
    session.disconnect().await;
}

#[tokio::test]
async fn backend_failure_is_reported_as_error_output() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;
    server.fail_command("setBreakpoints", "module is locked");

    let resp = session
        .request(
            "setBreakpoints",
            json!({ "source": { "path": "C:\\src\\CommonModule.bsl" }, "breakpoints": [{ "line": 3 }] }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(false)));
    assert!(resp["message"].as_str().unwrap().contains("module is locked"));

    let output = session.wait_for_event("output").await;
    assert_eq!(output.pointer("/body/category"), Some(&json!("stderr")));
    assert!(output.pointer("/body/output").unwrap().as_str().unwrap().contains("module is locked"));

    session.disconnect().await;
}

#[tokio::test]
async fn exception_filter_condition_becomes_a_substring_match() {
    let server = MockDebugServer::new();
    let mut session = TestSession::spawn(server.clone());
    session.attach().await;

    let resp = session
        .request(
            "setExceptionBreakpoints",
            json!({
                "filters": [],
                "filterOptions": [{ "filterId": "all", "condition": "Division by zero" }],
            }),
        )
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
    assert_eq!(resp.pointer("/body/breakpoints/0/verified"), Some(&json!(true)));

    let resp = session
        .request("setExceptionBreakpoints", json!({ "filters": [] }))
        .await;
    assert_eq!(resp.pointer("/success"), Some(&json!(true)));

    let filters: Vec<_> = server
        .calls_of("setBreakOnRTE")
        .into_iter()
        .filter_map(|call| match call {
            MockCall::SetBreakOnRte(filter) => Some(filter),
            _ => None,
        })
        .collect();
    assert_eq!(filters.len(), 2);
    assert!(filters[0].stop_on_errors);
    assert!(filters[0].analyze_error_str);
    assert_eq!(
        filters[0].str_template,
        vec![RteFilterItem {
            include: true,
            pattern: "Division by zero".to_string(),
        }]
    );
    assert!(!filters[1].stop_on_errors);
    assert!(filters[1].str_template.is_empty());

    session.disconnect().await;
}
