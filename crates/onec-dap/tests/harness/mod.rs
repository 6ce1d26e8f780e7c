//! Drives a full adapter over an in-memory stream against `MockDebugServer`.

use std::{sync::Arc, time::Duration};

use onec_config::SessionConfig;
use onec_dap::dap::codec::{DapError, DapReader, DapWriter};
use onec_dap::{Collaborators, InMemoryMetadata, ProcessLauncher};
use onec_rdbg::{
    CallStackFormed, DebugTargetId, DebugTargetIdLight, DebugTargetType, MockDebugServer, ModuleId,
    Notification, StackItem,
};
use serde_json::{json, Value};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub const MODULE_PATH: &str = "C:\\src\\CommonModule.bsl";

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn module() -> ModuleId {
    ModuleId::new(None, "common-module".to_string(), "module-text".to_string())
}

pub fn target(id: &str, kind: DebugTargetType) -> DebugTargetId {
    DebugTargetId {
        id: id.to_string(),
        seance_no: 3,
        target_type: kind,
        user_name: "Admin".to_string(),
    }
}

/// A call stack as the debug server sends it: outermost first.
pub fn stack(frames: &[(&str, u32)]) -> Vec<StackItem> {
    frames
        .iter()
        .map(|(presentation, line_no)| StackItem {
            presentation: presentation.to_string(),
            line_no: *line_no,
            module: module(),
        })
        .collect()
}

pub fn breakpoint_hit(target_id: &str, frames: &[(&str, u32)]) -> Notification {
    Notification::call_stack_formed(CallStackFormed {
        target_id: DebugTargetIdLight::from(target_id),
        call_stack: Some(stack(frames)),
        stop_by_bp: true,
        suspended_by_other: false,
        message: None,
        send_message_only: false,
    })
}

pub struct TestSession {
    pub server: MockDebugServer,
    pub metadata: Arc<InMemoryMetadata>,
    reader: DapReader<ReadHalf<DuplexStream>>,
    writer: DapWriter<WriteHalf<DuplexStream>>,
    seq: u64,
    backlog: Vec<Value>,
    task: JoinHandle<Result<(), DapError>>,
}

impl TestSession {
    pub fn spawn(server: MockDebugServer) -> Self {
        Self::spawn_with(server, None)
    }

    pub fn spawn_with(server: MockDebugServer, launcher: Option<Arc<dyn ProcessLauncher>>) -> Self {
        let metadata = Arc::new(InMemoryMetadata::new());
        metadata.insert(MODULE_PATH, module());

        let collaborators = Collaborators {
            connector: Arc::new(server.clone()),
            metadata: metadata.clone(),
            launcher,
        };
        let settings = SessionConfig {
            poll_interval_ms: 5,
            ..SessionConfig::default()
        };

        let (client, adapter_stream) = tokio::io::duplex(64 * 1024);
        let (adapter_read, adapter_write) = tokio::io::split(adapter_stream);
        let task = tokio::spawn(onec_dap::run_with_config(
            adapter_read,
            adapter_write,
            collaborators,
            settings,
        ));

        let (client_read, client_write) = tokio::io::split(client);
        Self {
            server,
            metadata,
            reader: DapReader::new(client_read),
            writer: DapWriter::new(client_write),
            seq: 0,
            backlog: Vec::new(),
            task,
        }
    }

    pub async fn send(&mut self, command: &str, arguments: Value) -> u64 {
        self.seq += 1;
        let msg = json!({
            "seq": self.seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        });
        self.writer.write_value(&msg).await.unwrap();
        self.seq
    }

    pub async fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments).await;
        self.response(seq).await
    }

    async fn next_message(&mut self) -> Value {
        tokio::time::timeout(READ_TIMEOUT, self.reader.read_value())
            .await
            .expect("timed out waiting for adapter output")
            .unwrap()
            .expect("adapter closed the stream")
    }

    pub async fn response(&mut self, request_seq: u64) -> Value {
        let matches = |msg: &Value| {
            msg.pointer("/type") == Some(&json!("response"))
                && msg.pointer("/request_seq") == Some(&json!(request_seq))
        };
        if let Some(pos) = self.backlog.iter().position(matches) {
            return self.backlog.remove(pos);
        }
        loop {
            let msg = self.next_message().await;
            if matches(&msg) {
                return msg;
            }
            self.backlog.push(msg);
        }
    }

    pub async fn wait_for_event(&mut self, name: &str) -> Value {
        let matches = |msg: &Value| {
            msg.pointer("/type") == Some(&json!("event")) && msg.pointer("/event") == Some(&json!(name))
        };
        if let Some(pos) = self.backlog.iter().position(matches) {
            return self.backlog.remove(pos);
        }
        loop {
            let msg = self.next_message().await;
            if matches(&msg) {
                return msg;
            }
            self.backlog.push(msg);
        }
    }

    /// Events already received but not consumed yet.
    pub fn pending_events(&self, name: &str) -> usize {
        self.backlog
            .iter()
            .filter(|msg| msg.pointer("/event") == Some(&json!(name)))
            .count()
    }

    pub async fn initialize(&mut self) -> Value {
        let resp = self
            .request("initialize", json!({ "adapterID": "onec", "linesStartAt1": true }))
            .await;
        assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
        resp
    }

    /// `initialize` + `attach` with `arguments`, waiting for `initialized`.
    pub async fn attach_with(&mut self, arguments: Value) -> Value {
        self.initialize().await;
        let resp = self.request("attach", arguments).await;
        assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
        self.wait_for_event("initialized").await;
        resp
    }

    pub async fn attach(&mut self) -> Value {
        self.attach_with(json!({ "infoBase": "DefAlias", "autoAttachTypes": ["Client"] }))
            .await
    }

    /// Starts `target` on the debug server and waits until it is attached.
    pub async fn start_thread(&mut self, target: DebugTargetId) -> i64 {
        self.server.start_target(target);
        let event = self.wait_for_event("thread").await;
        assert_eq!(event.pointer("/body/reason"), Some(&json!("started")));
        event.pointer("/body/threadId").and_then(Value::as_i64).unwrap()
    }

    /// Stops `thread_id` at `frames` and returns the frame ids, innermost first.
    pub async fn stop_at(&mut self, target_id: &str, thread_id: i64, frames: &[(&str, u32)]) -> Vec<i64> {
        self.server.push_notification(breakpoint_hit(target_id, frames));
        self.wait_for_event("stopped").await;
        let resp = self
            .request("stackTrace", json!({ "threadId": thread_id }))
            .await;
        assert_eq!(resp.pointer("/success"), Some(&json!(true)), "{resp}");
        resp.pointer("/body/stackFrames")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .map(|frame| frame["id"].as_i64().unwrap())
            .collect()
    }

    /// Closes the client side of the stream without a `disconnect` request.
    pub async fn hang_up(self) -> MockDebugServer {
        let Self {
            server,
            reader,
            writer,
            task,
            ..
        } = self;
        drop(writer);
        drop(reader);
        tokio::time::timeout(READ_TIMEOUT, task)
            .await
            .expect("adapter did not shut down")
            .unwrap()
            .unwrap();
        server
    }

    pub async fn disconnect(mut self) {
        let resp = self.request("disconnect", json!({})).await;
        assert_eq!(resp.pointer("/success"), Some(&json!(true)));
        self.wait_for_event("terminated").await;
        tokio::time::timeout(READ_TIMEOUT, self.task)
            .await
            .expect("adapter did not shut down")
            .unwrap()
            .unwrap();
    }
}
