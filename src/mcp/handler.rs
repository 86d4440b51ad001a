//! Contract between the dispatch engine and a capability provider
//!
//! A provider implements [`Handler`]. The engine owns the provider's state value
//! and threads it through every call; an operation hands back a replacement
//! state inside its [`Reply`] when it wants the session to move on.

use std::fmt;

use async_trait::async_trait;
use rust_mcp_sdk::schema::RequestId;
use serde_json::{Map, Value};

use crate::mcp::{context::RequestContext, rpc::ErrorObject};

pub type Params = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(ErrorObject),
    NoReply,
    Stop(String),
}

impl<T> Outcome<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
            Self::NoReply => "no_reply",
            Self::Stop(_) => "stop",
        }
    }
}

/// Outcome of a handler operation plus an optional replacement state.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<S, T> {
    pub outcome: Outcome<T>,
    pub state: Option<S>,
}

impl<S, T> Reply<S, T> {
    pub fn success(value: T) -> Self {
        Self {
            outcome: Outcome::Success(value),
            state: None,
        }
    }

    pub fn failure(error: ErrorObject) -> Self {
        Self {
            outcome: Outcome::Failure(error),
            state: None,
        }
    }

    pub fn no_reply() -> Self {
        Self {
            outcome: Outcome::NoReply,
            state: None,
        }
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Stop(reason.into()),
            state: None,
        }
    }

    pub fn with_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<S, U> {
        let outcome = match self.outcome {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(error) => Outcome::Failure(error),
            Outcome::NoReply => Outcome::NoReply,
            Outcome::Stop(reason) => Outcome::Stop(reason),
        };
        Reply {
            outcome,
            state: self.state,
        }
    }
}

/// Result of [`Handler::init`].
#[derive(Debug)]
pub enum Init<S> {
    Ready(S),
    Stop(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateReason {
    /// Explicit close requested by the client or the transport.
    Closed,
    /// Every handle to the session went away.
    Abandoned,
    Shutdown,
    /// `serverCapabilities` failed after `init` had produced a state.
    StartupFailed(String),
    /// The connection was dropped without being terminated first.
    Dropped,
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Abandoned => f.write_str("abandoned"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::StartupFailed(detail) => write!(f, "startup failed: {detail}"),
            Self::Dropped => f.write_str("dropped"),
        }
    }
}

/// Capability provider driven by a [`Connection`](crate::mcp::connection::Connection).
///
/// Required operations must answer with `Success` or `Failure`. The optional
/// operations (`handle_client_capabilities`, `handle_sampling_response`) may also
/// answer `NoReply`. Any other shape, or a panic, is reported to the client as an
/// internal error and leaves the state untouched.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type State: Send + Sync + 'static;
    type Options: Send + 'static;

    async fn init(&self, options: Self::Options) -> Init<Self::State>;

    async fn server_capabilities(
        &self,
        ctx: &RequestContext,
        state: &Self::State,
    ) -> Reply<Self::State, Value>;

    async fn handle_client_capabilities(
        &self,
        _ctx: &RequestContext,
        _capabilities: &Value,
        _state: &Self::State,
    ) -> Reply<Self::State, ()> {
        Reply::success(())
    }

    async fn list_resources(
        &self,
        ctx: &RequestContext,
        params: &Params,
        state: &Self::State,
    ) -> Reply<Self::State, Vec<Value>>;

    async fn get_resource(
        &self,
        ctx: &RequestContext,
        resource_id: &str,
        params: &Params,
        state: &Self::State,
    ) -> Reply<Self::State, Value>;

    async fn list_prompts(
        &self,
        ctx: &RequestContext,
        params: &Params,
        state: &Self::State,
    ) -> Reply<Self::State, Vec<Value>>;

    async fn get_prompt(
        &self,
        ctx: &RequestContext,
        prompt_id: &str,
        params: &Params,
        state: &Self::State,
    ) -> Reply<Self::State, Value>;

    async fn list_tools(
        &self,
        ctx: &RequestContext,
        params: &Params,
        state: &Self::State,
    ) -> Reply<Self::State, Vec<Value>>;

    async fn execute_tool(
        &self,
        ctx: &RequestContext,
        tool_id: &str,
        params: &Params,
        state: &Self::State,
    ) -> Reply<Self::State, Value>;

    async fn handle_sampling_response(
        &self,
        _ctx: &RequestContext,
        _request_id: &RequestId,
        _data: &Value,
        _state: &Self::State,
    ) -> Reply<Self::State, ()> {
        Reply::no_reply()
    }

    async fn terminate(
        &self,
        _reason: &TerminateReason,
        _ctx: &RequestContext,
        _state: &Self::State,
    ) {
    }
}
