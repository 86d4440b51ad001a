//! Catalog provider plugged into the connection engine
//!
//! Serves a static catalog of resources and prompts, plus a few tools. Each
//! session keeps its own counter and call statistics.

pub mod catalog;
pub mod prompts;
pub mod resources;
pub mod tools;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::mcp::{
    context::RequestContext,
    handler::{Handler, Init, Params, Reply, TerminateReason},
};
use catalog::CatalogOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogState {
    pub catalog: Arc<CatalogOptions>,
    pub counter: i64,
    pub tool_calls: u64,
    pub sampling_enabled: bool,
}

impl CatalogState {
    pub fn new(catalog: CatalogOptions) -> Self {
        Self {
            catalog: Arc::new(catalog),
            counter: 0,
            tool_calls: 0,
            sampling_enabled: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogHandler;

#[async_trait]
impl Handler for CatalogHandler {
    type State = CatalogState;
    type Options = CatalogOptions;

    async fn init(&self, options: CatalogOptions) -> Init<CatalogState> {
        match options.problem() {
            Some(problem) => Init::Stop(format!("invalid catalog: {problem}")),
            None => Init::Ready(CatalogState::new(options)),
        }
    }

    async fn server_capabilities(
        &self,
        _ctx: &RequestContext,
        state: &CatalogState,
    ) -> Reply<CatalogState, Value> {
        let mut capabilities = json!({
            "resources": { "subscribe": false, "listChanged": false },
            "tools": { "listChanged": false },
        });
        if !state.catalog.prompts.is_empty() {
            capabilities["prompts"] = json!({ "listChanged": false });
        }
        Reply::success(capabilities)
    }

    async fn handle_client_capabilities(
        &self,
        ctx: &RequestContext,
        capabilities: &Value,
        state: &CatalogState,
    ) -> Reply<CatalogState, ()> {
        let sampling_enabled = capabilities.get("sampling").is_some();
        debug!(
            session_id = %ctx.session_id(),
            sampling_enabled,
            "client capabilities received"
        );

        if sampling_enabled == state.sampling_enabled {
            return Reply::success(());
        }
        Reply::success(()).with_state(CatalogState {
            sampling_enabled,
            ..state.clone()
        })
    }

    async fn list_resources(
        &self,
        _ctx: &RequestContext,
        _params: &Params,
        state: &CatalogState,
    ) -> Reply<CatalogState, Vec<Value>> {
        match resources::build_resources_list(&state.catalog) {
            Ok(listed) => Reply::success(listed),
            Err(error) => Reply::failure(error),
        }
    }

    async fn get_resource(
        &self,
        _ctx: &RequestContext,
        resource_id: &str,
        _params: &Params,
        state: &CatalogState,
    ) -> Reply<CatalogState, Value> {
        match resources::read_resource(&state.catalog, resource_id) {
            Ok(contents) => Reply::success(contents),
            Err(error) => Reply::failure(error),
        }
    }

    async fn list_prompts(
        &self,
        _ctx: &RequestContext,
        _params: &Params,
        state: &CatalogState,
    ) -> Reply<CatalogState, Vec<Value>> {
        Reply::success(prompts::build_prompts_list(&state.catalog))
    }

    async fn get_prompt(
        &self,
        _ctx: &RequestContext,
        prompt_id: &str,
        params: &Params,
        state: &CatalogState,
    ) -> Reply<CatalogState, Value> {
        match prompts::render_prompt(&state.catalog, prompt_id, params) {
            Ok(rendered) => Reply::success(rendered),
            Err(error) => Reply::failure(error),
        }
    }

    async fn list_tools(
        &self,
        _ctx: &RequestContext,
        _params: &Params,
        _state: &CatalogState,
    ) -> Reply<CatalogState, Vec<Value>> {
        match tools::describe_tools() {
            Ok(listed) => Reply::success(listed),
            Err(error) => Reply::failure(error),
        }
    }

    async fn execute_tool(
        &self,
        ctx: &RequestContext,
        tool_id: &str,
        params: &Params,
        state: &CatalogState,
    ) -> Reply<CatalogState, Value> {
        tools::execute_tool(ctx, tool_id, params, state)
    }

    async fn terminate(
        &self,
        reason: &TerminateReason,
        ctx: &RequestContext,
        state: &CatalogState,
    ) {
        info!(
            session_id = %ctx.session_id(),
            reason = %reason,
            tool_calls = state.tool_calls,
            counter = state.counter,
            "catalog session closed"
        );
    }
}
