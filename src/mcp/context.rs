//! Per-call request context handed to handler operations
//!
//! A `RequestContext` is built fresh for every dispatch and never changes after
//! construction. It refers to its session only by `SessionId`; resolving the id to a
//! live session goes through `SessionRegistry::get`.

use std::{fmt, net::SocketAddr, sync::Arc};

use chrono::{DateTime, Utc};
use rust_mcp_sdk::schema::RequestId;
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owned copy of the transport facts a handler may look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMeta {
    pub remote_addr: Option<SocketAddr>,
    pub path: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
}

impl TransportMeta {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value for `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    session_id: SessionId,
    request_id: Option<RequestId>,
    client_capabilities: Option<Arc<Value>>,
    transport: TransportMeta,
    received_at: DateTime<Utc>,
    extensions: Map<String, Value>,
}

impl RequestContext {
    pub fn new(session_id: SessionId, transport: TransportMeta) -> Self {
        Self {
            session_id,
            request_id: None,
            client_capabilities: None,
            transport,
            received_at: Utc::now(),
            extensions: Map::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<RequestId>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_client_capabilities(mut self, capabilities: Option<Arc<Value>>) -> Self {
        self.client_capabilities = capabilities;
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// `None` for notifications and for lifecycle calls (`init`, `terminate`).
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Snapshot of the negotiated client capabilities at the time of the call.
    pub fn client_capabilities(&self) -> Option<&Value> {
        self.client_capabilities.as_deref()
    }

    pub fn supports_client_capability(&self, name: &str) -> bool {
        self.client_capabilities()
            .and_then(|capabilities| capabilities.get(name))
            .is_some()
    }

    pub fn transport(&self) -> &TransportMeta {
        &self.transport
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }
}
