//! JSON-RPC protocol representations and formatting utilities
//!
//! Provides envelope parsing for inbound requests and the pure builders that turn
//! dispatch outcomes into response envelopes.

use std::fmt::Display;

use rust_mcp_sdk::schema::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::mcp::{context::SessionId, method::Method};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

/// Error member of a JSON-RPC error response.
///
/// Handlers build these for `Failure` outcomes; the connection passes them to the
/// client unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(detail: impl Display) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid Request: {detail}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    /// Generic failure for contract violations. Only the method name is exposed.
    pub fn internal(method: &str) -> Self {
        Self::new(SERVER_ERROR, format!("Internal error while handling {method}"))
    }
}

/// Structurally valid inbound request.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Option<Value>,
}

/// A request refused during structural validation, with whatever id could be recovered.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub id: Option<RequestId>,
    pub error: ErrorObject,
}

impl Rejection {
    fn new(id: Option<RequestId>, detail: impl Display) -> Self {
        Self {
            id,
            error: ErrorObject::invalid_request(detail),
        }
    }

    pub fn into_envelope(self) -> Value {
        error_envelope(self.id.as_ref(), &self.error)
    }
}

impl RequestEnvelope {
    pub fn parse(payload: &Value) -> Result<Self, Rejection> {
        let Some(object) = payload.as_object() else {
            return Err(Rejection::new(None, "request must be a JSON object"));
        };

        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(value) => match value_to_request_id(value) {
                Some(id) => Some(id),
                None => {
                    return Err(Rejection::new(None, "id must be a string or an integer"));
                }
            },
        };

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(Rejection::new(id, "jsonrpc must be \"2.0\""));
        }

        let method = match object
            .get("method")
            .and_then(Value::as_str)
            .filter(|method| !method.trim().is_empty())
        {
            Some(method) => method.to_string(),
            None => return Err(Rejection::new(id, "method must be a non-empty string")),
        };

        Ok(Self {
            id,
            method,
            params: object.get("params").cloned(),
        })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

pub fn error_envelope(id: Option<&RequestId>, error: &ErrorObject) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id_value(id),
        "error": error,
    })
}

pub fn result_envelope(id: Option<&RequestId>, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id_value(id),
        "result": result,
    })
}

/// Shapes a successful handler value for `method`.
///
/// Listing methods nest their sequence under the method's collection key; all
/// other methods pass the value through as the top-level result.
pub fn format_success(method: Method, value: Value) -> Value {
    match method {
        Method::Initialize => value,
        _ => match method.collection_key() {
            Some(key) => Value::Object(Map::from_iter([(key.to_string(), value)])),
            None => value,
        },
    }
}

pub fn initialize_result(server_capabilities: &Value, session_id: Option<&SessionId>) -> Value {
    json!({
        "serverCapabilities": server_capabilities,
        "sessionId": session_id.map(SessionId::as_str),
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: &RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value.clone()),
        RequestId::Integer(value) => Value::Number((*value).into()),
    }
}

fn id_value(id: Option<&RequestId>) -> Value {
    id.map(request_id_to_value).unwrap_or(Value::Null)
}
