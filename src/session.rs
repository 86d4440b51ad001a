//! Session runtime
//!
//! Every session runs its `Connection` inside one tokio task that drains a command
//! queue, so dispatches against a session are applied one at a time in arrival
//! order while separate sessions proceed in parallel. `SessionRegistry` maps ids
//! to the handles of running sessions.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rust_mcp_sdk::schema::RequestId;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use crate::errors::{ConnectionError, SessionError};
use crate::mcp::{
    connection::{Connection, ConnectionOptions},
    context::{SessionId, TransportMeta},
    handler::{Handler, TerminateReason},
    rpc::ErrorObject,
};

const SESSION_QUEUE_DEPTH: usize = 64;

enum Command {
    Dispatch {
        request: Value,
        transport: TransportMeta,
        reply: oneshot::Sender<Result<Option<Value>, ConnectionError>>,
    },
    SamplingResponse {
        request_id: RequestId,
        data: Value,
        transport: TransportMeta,
        reply: oneshot::Sender<Result<Option<ErrorObject>, ConnectionError>>,
    },
    Terminate {
        reason: TerminateReason,
        done: oneshot::Sender<()>,
    },
}

/// Cloneable sender side of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queues a request behind any dispatch already in flight for this session.
    ///
    /// Dropping the returned future does not cancel the dispatch once it has been
    /// queued; the session still applies it and discards the response.
    pub async fn dispatch(
        &self,
        request: Value,
        transport: TransportMeta,
    ) -> Result<Option<Value>, ConnectionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Dispatch {
            request,
            transport,
            reply,
        })
        .await?;
        response.await.map_err(|_| self.closed())?
    }

    pub async fn deliver_sampling_response(
        &self,
        request_id: RequestId,
        data: Value,
        transport: TransportMeta,
    ) -> Result<Option<ErrorObject>, ConnectionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SamplingResponse {
            request_id,
            data,
            transport,
            reply,
        })
        .await?;
        response.await.map_err(|_| self.closed())?
    }

    /// Terminates the session and waits for the handler's `terminate` to finish.
    pub async fn terminate(&self, reason: TerminateReason) -> Result<(), ConnectionError> {
        let (done, finished) = oneshot::channel();
        self.send(Command::Terminate { reason, done }).await?;
        finished.await.map_err(|_| self.closed())
    }

    async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> ConnectionError {
        ConnectionError::Closed {
            session_id: self.session_id.clone(),
        }
    }
}

/// Starts a connection and moves it onto its own task.
pub async fn spawn_session<H: Handler>(
    handler: Arc<H>,
    init_options: H::Options,
    session_id: SessionId,
    options: ConnectionOptions,
) -> Result<SessionHandle, SessionError> {
    let connection = Connection::start(handler, init_options, session_id.clone(), options).await?;
    let (commands, receiver) = mpsc::channel(SESSION_QUEUE_DEPTH);
    tokio::spawn(run_session(connection, receiver));

    Ok(SessionHandle {
        session_id,
        commands,
    })
}

async fn run_session<H: Handler>(
    mut connection: Connection<H>,
    mut commands: mpsc::Receiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Dispatch {
                request,
                transport,
                reply,
            } => {
                let response = connection.dispatch(request, transport).await;
                if reply.send(response).is_err() {
                    debug!(
                        session_id = %connection.session_id(),
                        "caller went away before the response was ready"
                    );
                }
            }
            Command::SamplingResponse {
                request_id,
                data,
                transport,
                reply,
            } => {
                let outcome = connection
                    .deliver_sampling_response(request_id, data, transport)
                    .await;
                let _ = reply.send(outcome);
            }
            Command::Terminate { reason, done } => {
                connection.terminate(reason).await;
                let _ = done.send(());
                return;
            }
        }
    }

    connection.terminate(TerminateReason::Abandoned).await;
}

/// Creates sessions for a registry without exposing the handler type.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, session_id: SessionId) -> Result<SessionHandle, SessionError>;
}

pub struct HandlerFactory<H: Handler> {
    handler: Arc<H>,
    init_options: H::Options,
    options: ConnectionOptions,
}

impl<H: Handler> HandlerFactory<H> {
    pub fn new(handler: H, init_options: H::Options, options: ConnectionOptions) -> Self {
        Self {
            handler: Arc::new(handler),
            init_options,
            options,
        }
    }
}

#[async_trait]
impl<H> SessionFactory for HandlerFactory<H>
where
    H: Handler,
    H::Options: Clone + Sync,
{
    async fn create(&self, session_id: SessionId) -> Result<SessionHandle, SessionError> {
        spawn_session(
            Arc::clone(&self.handler),
            self.init_options.clone(),
            session_id,
            self.options.clone(),
        )
        .await
    }
}

pub struct SessionRegistry {
    factory: Arc<dyn SessionFactory>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a session under a fresh id and registers it.
    pub async fn open(&self) -> Result<SessionHandle, SessionError> {
        let handle = self.factory.create(SessionId::generate()).await?;
        self.sessions
            .lock()
            .await
            .insert(handle.session_id().clone(), handle.clone());
        info!(session_id = %handle.session_id(), "session registered");
        Ok(handle)
    }

    /// Resolves a session id to its live handle.
    pub async fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            Some(handle) if handle.is_closed() => {
                sessions.remove(session_id);
                None
            }
            Some(handle) => Some(handle.clone()),
            None => None,
        }
    }

    /// Terminates and unregisters a session. Returns `false` for unknown ids.
    pub async fn close(&self, session_id: &SessionId, reason: TerminateReason) -> bool {
        let handle = self.sessions.lock().await.remove(session_id);
        let Some(handle) = handle else {
            return false;
        };

        if let Err(err) = handle.terminate(reason).await {
            debug!(session_id = %session_id, error = %err, "session already stopped");
        }
        true
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Terminates every registered session. Returns how many were still running.
    pub async fn shutdown(&self) -> usize {
        let handles: Vec<SessionHandle> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        let mut terminated = 0;
        for handle in handles {
            match handle.terminate(TerminateReason::Shutdown).await {
                Ok(()) => terminated += 1,
                Err(err) => {
                    debug!(session_id = %handle.session_id(), error = %err, "session already stopped")
                }
            }
        }
        terminated
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::mcp::{
        context::RequestContext,
        handler::{Init, Params, Reply},
    };

    #[derive(Default)]
    struct Counters {
        terminations: AtomicUsize,
    }

    /// Handler whose state is the list of call sequence numbers it has observed.
    struct Recorder {
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Handler for Recorder {
        type State = Vec<u64>;
        type Options = ();

        async fn init(&self, _options: ()) -> Init<Vec<u64>> {
            Init::Ready(Vec::new())
        }

        async fn server_capabilities(
            &self,
            _ctx: &RequestContext,
            _state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Value> {
            Reply::success(json!({"tools": {}}))
        }

        async fn list_resources(
            &self,
            _ctx: &RequestContext,
            _params: &Params,
            _state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Vec<Value>> {
            Reply::success(vec![])
        }

        async fn get_resource(
            &self,
            _ctx: &RequestContext,
            _resource_id: &str,
            _params: &Params,
            _state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Value> {
            Reply::success(json!({}))
        }

        async fn list_prompts(
            &self,
            _ctx: &RequestContext,
            _params: &Params,
            _state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Vec<Value>> {
            Reply::success(vec![])
        }

        async fn get_prompt(
            &self,
            _ctx: &RequestContext,
            _prompt_id: &str,
            _params: &Params,
            _state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Value> {
            Reply::success(json!({}))
        }

        async fn list_tools(
            &self,
            _ctx: &RequestContext,
            _params: &Params,
            _state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Vec<Value>> {
            Reply::success(vec![])
        }

        async fn execute_tool(
            &self,
            _ctx: &RequestContext,
            _tool_id: &str,
            params: &Params,
            state: &Vec<u64>,
        ) -> Reply<Vec<u64>, Value> {
            let sequence = params.get("seq").and_then(Value::as_u64).unwrap_or(0);
            // Yield mid-call so interleaving would be visible if it were possible.
            tokio::task::yield_now().await;
            let mut next = state.clone();
            next.push(sequence);
            Reply::success(json!({"observed": next.len()})).with_state(next)
        }

        async fn terminate(
            &self,
            _reason: &TerminateReason,
            _ctx: &RequestContext,
            _state: &Vec<u64>,
        ) {
            self.counters.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry(counters: &Arc<Counters>) -> SessionRegistry {
        SessionRegistry::new(Arc::new(HandlerFactory::new(
            Recorder {
                counters: Arc::clone(counters),
            },
            (),
            ConnectionOptions::default(),
        )))
    }

    fn tool_call(id: u64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "executeTool",
            "params": {"toolId": "record", "seq": id}
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_are_linearized() {
        let counters = Arc::new(Counters::default());
        let registry = registry(&counters);
        let handle = registry.open().await.expect("session opens");

        let mut tasks = Vec::new();
        for id in 1..=32u64 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .dispatch(tool_call(id), TransportMeta::default())
                    .await
                    .expect("session live")
                    .expect("response")
            }));
        }

        let mut observed = Vec::new();
        for task in tasks {
            let response = task.await.expect("task completes");
            observed.push(response["result"]["observed"].as_u64().expect("count"));
        }
        observed.sort_unstable();

        assert_eq!(observed, (1..=32).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn responses_echo_their_request_ids() {
        let counters = Arc::new(Counters::default());
        let registry = registry(&counters);
        let handle = registry.open().await.expect("session opens");

        for id in [3u64, 1, 2] {
            let response = handle
                .dispatch(tool_call(id), TransportMeta::default())
                .await
                .expect("session live")
                .expect("response");
            assert_eq!(response["id"], id);
        }
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let counters = Arc::new(Counters::default());
        let registry = registry(&counters);
        let first = registry.open().await.expect("first session");
        let second = registry.open().await.expect("second session");
        assert_ne!(first.session_id(), second.session_id());

        first
            .dispatch(tool_call(1), TransportMeta::default())
            .await
            .expect("session live");
        let response = second
            .dispatch(tool_call(2), TransportMeta::default())
            .await
            .expect("session live")
            .expect("response");

        assert_eq!(response["result"]["observed"], 1);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn close_terminates_once_and_unregisters() {
        let counters = Arc::new(Counters::default());
        let registry = registry(&counters);
        let handle = registry.open().await.expect("session opens");
        let session_id = handle.session_id().clone();

        assert!(registry.close(&session_id, TerminateReason::Closed).await);
        assert!(!registry.close(&session_id, TerminateReason::Closed).await);
        assert!(registry.get(&session_id).await.is_none());
        assert_eq!(counters.terminations.load(Ordering::SeqCst), 1);

        let after = handle
            .dispatch(tool_call(9), TransportMeta::default())
            .await;
        assert!(matches!(after, Err(ConnectionError::Closed { .. })));
    }

    #[tokio::test]
    async fn abandoned_session_terminates_when_handles_drop() {
        let counters = Arc::new(Counters::default());
        let handle = spawn_session(
            Arc::new(Recorder {
                counters: Arc::clone(&counters),
            }),
            (),
            SessionId::from("orphan"),
            ConnectionOptions::default(),
        )
        .await
        .expect("session starts");
        drop(handle);

        for _ in 0..20 {
            if counters.terminations.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(counters.terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_terminates_every_session() {
        let counters = Arc::new(Counters::default());
        let registry = registry(&counters);
        registry.open().await.expect("first session");
        registry.open().await.expect("second session");

        assert_eq!(registry.shutdown().await, 2);

        assert!(registry.is_empty().await);
        assert_eq!(counters.terminations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_skips_sessions_that_already_stopped() {
        let counters = Arc::new(Counters::default());
        let registry = registry(&counters);
        let stopped = registry.open().await.expect("first session");
        registry.open().await.expect("second session");

        stopped
            .terminate(TerminateReason::Closed)
            .await
            .expect("session was running");

        assert_eq!(registry.shutdown().await, 1);
        assert!(registry.is_empty().await);
        assert_eq!(counters.terminations.load(Ordering::SeqCst), 2);
    }
}
