//! Socket RPC message model
//!
//! ## Framing
//!
//! One JSON object per line in each direction. Requests carry `method`,
//! `id` and optional `params`; responses echo `id` and carry exactly one of
//! `result` or `error`.
//!
//! ```text
//! → {"id":7,"method":"resource.read","params":{"uri":"relay.0"}}
//! ← {"id":7,"result":{"contents":[{"data":"off"}]}}
//! → {"id":8,"method":"resource.read","params":{"uri":"nope"}}
//! ← {"id":8,"error":{"code":404,"message":"Resource not found"}}
//! ```
//!
//! ## Error Codes
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 400  | malformed request, unknown method, missing parameter |
//! | 404  | unknown resource or tool                  |
//! | 429  | subscription pool exhausted               |
//! | 503  | telemetry lock not acquired in time       |

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RpcError;

/// Server methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ResourcesList,
    ResourceRead,
    Subscribe,
    Unsubscribe,
    ToolExecute,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "initialize" => Method::Initialize,
            "resources.list" => Method::ResourcesList,
            "resource.read" => Method::ResourceRead,
            "subscribe" => Method::Subscribe,
            "unsubscribe" => Method::Unsubscribe,
            "tool.execute" => Method::ToolExecute,
            _ => return None,
        })
    }
}

/// A well-formed request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Value,
    pub method: String,
    pub params: Map<String, Value>,
}

impl Request {
    /// Parse one line into a request.
    ///
    /// Errors carry the response to send: `id` is null when the line was
    /// not JSON, or when it had no usable `id`.
    pub fn parse(line: &str) -> Result<Self, Response> {
        let value: Value = serde_json::from_str(line)
            .map_err(|_| Response::error(Value::Null, RpcError::bad_request("Invalid JSON")))?;

        let Value::Object(mut object) = value else {
            return Err(Response::error(
                Value::Null,
                RpcError::bad_request("Invalid request format"),
            ));
        };

        let id = object.remove("id").unwrap_or(Value::Null);
        let method = match object.remove("method") {
            Some(Value::String(method)) if !id.is_null() => method,
            _ => {
                return Err(Response::error(
                    id,
                    RpcError::bad_request("Invalid request format"),
                ))
            }
        };
        let params = match object.remove("params") {
            Some(Value::Object(params)) => params,
            _ => Map::new(),
        };

        Ok(Self { id, method, params })
    }

    /// The `uri` parameter, required by most methods
    pub fn uri(&self) -> Result<&str, RpcError> {
        self.params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::bad_request("Missing URI parameter"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Response to one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                code: error.code,
                message: error.message,
            }),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"id":null,"error":{"code":500,"message":"Encoding failure"}}"#.to_owned()
        })
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct ChangeParams<'a> {
    uri: &'a str,
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChangeNotification<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: ChangeParams<'a>,
}

/// Unsolicited `resource.change` line
pub fn change_notification(uri: &str, data: &str) -> String {
    let notification = ChangeNotification {
        jsonrpc: "2.0",
        method: "resource.change",
        params: ChangeParams {
            uri,
            contents: [Content { data }],
        },
    };
    serde_json::to_string(&notification).unwrap_or_default()
}

/// `{"contents":[{"data":...}]}` result of `resource.read`
pub fn contents(data: &str) -> Value {
    serde_json::json!({ "contents": [{ "data": data }] })
}

/// Welcome line sent when a client connects
pub fn welcome(device_name: &str) -> String {
    serde_json::json!({
        "event": "connected",
        "message": format!("Welcome to {} RPC server", device_name),
    })
    .to_string()
}
