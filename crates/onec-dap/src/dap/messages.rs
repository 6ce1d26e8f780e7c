use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// An incoming protocol message. Only `type: "request"` messages are served;
/// anything else a client sends is read and skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl Request {
    pub fn is_request(&self) -> bool {
        self.kind == "request"
    }

    /// Absent or `null` arguments deserialize like an empty object, so
    /// argument structs made of optional fields accept a bare request.
    pub fn parse_args<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let args = self
            .arguments
            .clone()
            .filter(|value| !value.is_null())
            .unwrap_or_else(|| Value::Object(Default::default()));
        serde_json::from_value(args)
    }
}

/// Adapter-originated message, tagged with its protocol `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outgoing {
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub seq: u64,
    pub request_seq: u64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub seq: u64,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Outgoing {
    pub fn success(seq: u64, request: &Request, body: Option<Value>) -> Self {
        Self::Response(Response {
            seq,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        })
    }

    pub fn failure(seq: u64, request: &Request, message: String) -> Self {
        Self::Response(Response {
            seq,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message),
            body: None,
        })
    }

    pub fn event(seq: u64, event: &str, body: Option<Value>) -> Self {
        Self::Event(Event {
            seq,
            event: event.to_owned(),
            body,
        })
    }
}
