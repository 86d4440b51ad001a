//! Per-session dispatch engine
//!
//! A `Connection` owns one handler state, the capability sets negotiated for the
//! session, and turns decoded JSON-RPC requests into response envelopes. It is not
//! `Sync`-shared: callers that need concurrent access go through
//! [`SessionHandle`](crate::session::SessionHandle), which serializes dispatches.

use std::{any::Any, collections::HashSet, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use rust_mcp_sdk::schema::RequestId;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::errors::{ConnectionError, SessionError};
use crate::mcp::{
    audit::redact_params,
    context::{RequestContext, SessionId, TransportMeta},
    handler::{Handler, Init, Outcome, Params, Reply, TerminateReason},
    method::Method,
    rpc::{self, ErrorObject, RequestEnvelope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// Client has been heard from but no handshake has succeeded yet.
    Negotiating,
    Active,
    Terminated,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Methods that may arrive without an id. Everything else requires one.
    pub notification_methods: HashSet<String>,
    /// Whether the initialize result carries the session id instead of `null`.
    pub announce_session_id: bool,
}

pub struct Connection<H: Handler> {
    handler: Arc<H>,
    session_id: SessionId,
    options: ConnectionOptions,
    // `None` once terminated; taking it is what makes termination happen once.
    state: Option<H::State>,
    server_capabilities: Value,
    client_capabilities: Option<Arc<Value>>,
    phase: Phase,
}

impl<H: Handler> Connection<H> {
    /// Runs `init` and `serverCapabilities`. A session that fails here is never
    /// usable; if `init` already produced a state, `terminate` runs before the
    /// error is returned.
    pub async fn start(
        handler: Arc<H>,
        init_options: H::Options,
        session_id: SessionId,
        options: ConnectionOptions,
    ) -> Result<Self, SessionError> {
        let ctx = RequestContext::new(session_id.clone(), TransportMeta::default());

        let state = match guarded(handler.init(init_options)).await {
            Ok(Init::Ready(state)) => state,
            Ok(Init::Stop(reason)) => {
                warn!(session_id = %session_id, reason = %reason, "handler refused to start");
                return Err(SessionError::InitStopped { reason });
            }
            Err(panic) => {
                error!(session_id = %session_id, panic = %panic, "handler init panicked");
                return Err(SessionError::ContractViolation { operation: "init" });
            }
        };

        let reply = guarded(handler.server_capabilities(&ctx, &state)).await;
        let (state, failure) = match reply {
            Ok(Reply {
                outcome: Outcome::Success(server_capabilities),
                state: next,
            }) => {
                info!(session_id = %session_id, "session started");
                return Ok(Self {
                    handler,
                    session_id,
                    options,
                    state: Some(next.unwrap_or(state)),
                    server_capabilities,
                    client_capabilities: None,
                    phase: Phase::Uninitialized,
                });
            }
            Ok(Reply {
                outcome: Outcome::Failure(error),
                state: next,
            }) => (
                next.unwrap_or(state),
                SessionError::CapabilitiesRejected {
                    code: error.code,
                    message: error.message,
                },
            ),
            Ok(Reply { outcome, .. }) => {
                error!(
                    session_id = %session_id,
                    outcome = outcome.kind(),
                    "serverCapabilities returned an outcome its contract does not allow"
                );
                (
                    state,
                    SessionError::ContractViolation {
                        operation: "serverCapabilities",
                    },
                )
            }
            Err(panic) => {
                error!(session_id = %session_id, panic = %panic, "serverCapabilities panicked");
                (
                    state,
                    SessionError::ContractViolation {
                        operation: "serverCapabilities",
                    },
                )
            }
        };

        let reason = TerminateReason::StartupFailed(failure.to_string());
        finish(handler.as_ref(), &reason, &ctx, &state).await;
        Err(failure)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn server_capabilities(&self) -> &Value {
        &self.server_capabilities
    }

    pub fn client_capabilities(&self) -> Option<&Value> {
        self.client_capabilities.as_deref()
    }

    pub fn state(&self) -> Option<&H::State> {
        self.state.as_ref()
    }

    /// Dispatches one decoded request.
    ///
    /// Returns `Ok(None)` for notifications, which never get a correlated
    /// response. Every request with an id gets exactly one envelope.
    pub async fn dispatch(
        &mut self,
        payload: Value,
        transport: TransportMeta,
    ) -> Result<Option<Value>, ConnectionError> {
        if self.phase == Phase::Terminated {
            return Err(ConnectionError::Terminated {
                session_id: self.session_id.clone(),
            });
        }

        let envelope = match RequestEnvelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(rejection) => {
                debug!(
                    session_id = %self.session_id,
                    reason = %rejection.error.message,
                    "rejected malformed envelope"
                );
                return Ok(Some(rejection.into_envelope()));
            }
        };

        if self.phase == Phase::Uninitialized {
            self.phase = Phase::Negotiating;
        }

        if envelope.is_notification()
            && !self.options.notification_methods.contains(&envelope.method)
        {
            let error = ErrorObject::invalid_request(format!(
                "id is required for {}",
                envelope.method
            ));
            return Ok(Some(rpc::error_envelope(None, &error)));
        }

        let ctx = self.request_context(envelope.id.clone(), transport);
        let outcome = self.route(&envelope, &ctx).await;

        info!(
            session_id = %self.session_id,
            method = %envelope.method,
            params = %redact_params(envelope.params.as_ref()),
            outcome = if outcome.is_ok() { "success" } else { "failure" },
            "mcp action audited"
        );

        if envelope.is_notification() {
            return Ok(None);
        }

        let id = envelope.id.as_ref();
        Ok(Some(match outcome {
            Ok(result) => rpc::result_envelope(id, result),
            Err(error) => rpc::error_envelope(id, &error),
        }))
    }

    /// Hands a client's reply to an earlier sampling request to the handler.
    ///
    /// There is no wire method for this; a transport that correlates sampling
    /// replies calls it directly. A handler-declared failure is returned so the
    /// caller can surface it.
    pub async fn deliver_sampling_response(
        &mut self,
        request_id: RequestId,
        data: Value,
        transport: TransportMeta,
    ) -> Result<Option<ErrorObject>, ConnectionError> {
        let Some(state) = self.state.as_ref() else {
            return Err(ConnectionError::Terminated {
                session_id: self.session_id.clone(),
            });
        };

        let ctx = self.request_context(None, transport);
        let reply = guarded(
            self.handler
                .handle_sampling_response(&ctx, &request_id, &data, state),
        )
        .await;

        Ok(self.commit("handleSamplingResponse", reply, true).err())
    }

    /// Moves the session to `Terminated` and runs the handler's `terminate`. Only
    /// the first call reaches the handler.
    pub async fn terminate(&mut self, reason: TerminateReason) {
        self.phase = Phase::Terminated;
        let Some(state) = self.state.take() else {
            return;
        };

        let ctx = self.lifecycle_context();
        finish(self.handler.as_ref(), &reason, &ctx, &state).await;
    }

    async fn route(
        &mut self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> Result<Value, ErrorObject> {
        let method = Method::resolve(&envelope.method)
            .ok_or_else(|| ErrorObject::method_not_found(&envelope.method))?;
        let params = extract_params(method, envelope.params.as_ref())?;

        let value = self.invoke(method, ctx, &params).await?;
        Ok(rpc::format_success(method, value))
    }

    async fn invoke(
        &mut self,
        method: Method,
        ctx: &RequestContext,
        params: &Params,
    ) -> Result<Value, ErrorObject> {
        let Some(state) = self.state.as_ref() else {
            return Err(ErrorObject::internal(method.as_str()));
        };
        let handler = self.handler.as_ref();

        let reply = match method {
            Method::Initialize => return self.negotiate(ctx, params).await,
            Method::ListResources => guarded(handler.list_resources(ctx, params, state))
                .await
                .map(|reply| reply.map(Value::Array)),
            Method::GetResource => {
                let resource_id = identifier(method, params)?;
                guarded(handler.get_resource(ctx, resource_id, params, state)).await
            }
            Method::ListPrompts => guarded(handler.list_prompts(ctx, params, state))
                .await
                .map(|reply| reply.map(Value::Array)),
            Method::GetPrompt => {
                let prompt_id = identifier(method, params)?;
                guarded(handler.get_prompt(ctx, prompt_id, params, state)).await
            }
            Method::ListTools => guarded(handler.list_tools(ctx, params, state))
                .await
                .map(|reply| reply.map(Value::Array)),
            Method::ExecuteTool => {
                let tool_id = identifier(method, params)?;
                guarded(handler.execute_tool(ctx, tool_id, params, state)).await
            }
        };

        self.commit(method.as_str(), reply, false)?
            .ok_or_else(|| ErrorObject::internal(method.as_str()))
    }

    /// Capability handshake. Client capabilities and the phase only change when
    /// the handler accepts.
    async fn negotiate(
        &mut self,
        ctx: &RequestContext,
        params: &Params,
    ) -> Result<Value, ErrorObject> {
        let capabilities = params.get("capabilities").cloned().unwrap_or(Value::Null);
        if !capabilities.is_object() {
            return Err(ErrorObject::invalid_params("capabilities must be an object"));
        }

        let Some(state) = self.state.as_ref() else {
            return Err(ErrorObject::internal(Method::Initialize.as_str()));
        };
        let reply = guarded(
            self.handler
                .handle_client_capabilities(ctx, &capabilities, state),
        )
        .await;
        self.commit(Method::Initialize.as_str(), reply, true)?;

        if self.phase == Phase::Active {
            debug!(session_id = %self.session_id, "client re-negotiated capabilities");
        }
        self.client_capabilities = Some(Arc::new(capabilities));
        self.phase = Phase::Active;

        let session_id = self
            .options
            .announce_session_id
            .then_some(&self.session_id);
        Ok(rpc::initialize_result(&self.server_capabilities, session_id))
    }

    /// Applies a handler reply. State is replaced on `Success`, `Failure` and an
    /// allowed `NoReply`; contract violations keep the previous state.
    fn commit<T>(
        &mut self,
        operation: &str,
        reply: Result<Reply<H::State, T>, String>,
        optional: bool,
    ) -> Result<Option<T>, ErrorObject> {
        let reply = match reply {
            Ok(reply) => reply,
            Err(panic) => {
                error!(
                    session_id = %self.session_id,
                    operation,
                    panic = %panic,
                    "handler panicked"
                );
                return Err(ErrorObject::internal(operation));
            }
        };

        let result = match reply.outcome {
            Outcome::Success(value) => Ok(Some(value)),
            Outcome::Failure(error) => Err(error),
            Outcome::NoReply if optional => Ok(None),
            other => {
                error!(
                    session_id = %self.session_id,
                    operation,
                    outcome = other.kind(),
                    "handler returned an outcome its contract does not allow"
                );
                return Err(ErrorObject::internal(operation));
            }
        };

        if let Some(state) = reply.state {
            self.state = Some(state);
        }
        result
    }

    fn request_context(
        &self,
        request_id: Option<RequestId>,
        transport: TransportMeta,
    ) -> RequestContext {
        RequestContext::new(self.session_id.clone(), transport)
            .with_request_id(request_id)
            .with_client_capabilities(self.client_capabilities.clone())
    }

    fn lifecycle_context(&self) -> RequestContext {
        self.request_context(None, TransportMeta::default())
    }
}

impl<H: Handler> Drop for Connection<H> {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        let handler = Arc::clone(&self.handler);
        let ctx = self.lifecycle_context();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let reason = TerminateReason::Dropped;
                    finish(handler.as_ref(), &reason, &ctx, &state).await;
                });
            }
            Err(_) => warn!(
                session_id = %self.session_id,
                "connection dropped outside a runtime, handler terminate skipped"
            ),
        }
    }
}

fn extract_params(method: Method, params: Option<&Value>) -> Result<Params, ErrorObject> {
    let params = match params {
        None | Some(Value::Null) => Params::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(ErrorObject::invalid_params(format!(
                "{method} params must be an object"
            )))
        }
    };

    if let Some(missing) = method
        .required_params()
        .iter()
        .find(|name| params.get(**name).map_or(true, Value::is_null))
    {
        return Err(ErrorObject::invalid_params(format!(
            "missing {missing} in {method} request"
        )));
    }

    Ok(params)
}

fn identifier(method: Method, params: &Params) -> Result<&str, ErrorObject> {
    let Some(name) = method.required_params().first() else {
        return Err(ErrorObject::internal(method.as_str()));
    };

    params
        .get(*name)
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorObject::invalid_params(format!("{name} must be a string")))
}

async fn finish<H: Handler>(
    handler: &H,
    reason: &TerminateReason,
    ctx: &RequestContext,
    state: &H::State,
) {
    if let Err(panic) = guarded(handler.terminate(reason, ctx, state)).await {
        error!(session_id = %ctx.session_id(), panic = %panic, "handler terminate panicked");
    }
    info!(session_id = %ctx.session_id(), reason = %reason, "session terminated");
}

async fn guarded<F: Future>(future: F) -> Result<F::Output, String> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
