//! Interactive tools exposed via Model Context Protocol
//!
//! `echo` and `current_time` are stateless. `increment` reads and advances the
//! per-session counter, so its result depends on every earlier call in the
//! same session.

use chrono::SecondsFormat;
use rust_mcp_sdk::{
    macros,
    schema::{CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::CatalogState;
use crate::mcp::{
    context::RequestContext,
    handler::{Params, Reply},
    rpc::{ErrorObject, METHOD_NOT_FOUND, SERVER_ERROR},
};

#[macros::mcp_tool(name = "echo", description = "Return the given text unchanged")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct EchoTool {
    pub text: String,
}

#[macros::mcp_tool(
    name = "increment",
    description = "Add to the per-session counter and return its new value"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct IncrementTool {
    pub by: Option<i64>,
}

#[macros::mcp_tool(
    name = "current_time",
    description = "Current UTC time as an RFC 3339 timestamp"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct CurrentTimeTool {
    pub precision: Option<String>,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![EchoTool::tool(), IncrementTool::tool(), CurrentTimeTool::tool()]
}

pub fn describe_tools() -> Result<Vec<Value>, ErrorObject> {
    build_tools_list()
        .into_iter()
        .map(|tool| {
            serde_json::to_value(tool)
                .map_err(|err| ErrorObject::new(SERVER_ERROR, format!("tool descriptor: {err}")))
        })
        .collect()
}

/// Runs one tool call. The call counter advances even when the call fails.
pub fn execute_tool(
    ctx: &RequestContext,
    tool_id: &str,
    params: &Params,
    state: &CatalogState,
) -> Reply<CatalogState, Value> {
    let mut next = state.clone();
    next.tool_calls += 1;

    let outcome = match tool_id {
        "echo" => arguments::<EchoTool>(tool_id, params).and_then(|args| {
            tool_result(
                args.text.clone(),
                Map::from_iter([("text".to_string(), json!(args.text))]),
            )
        }),
        "increment" => arguments::<IncrementTool>(tool_id, params).and_then(|args| {
            let by = args.by.unwrap_or(1);
            let counter = state.counter.checked_add(by).ok_or_else(|| {
                ErrorObject::invalid_params(format!("incrementing {} by {by} overflows", state.counter))
            })?;
            next.counter = counter;
            tool_result(
                format!("Counter is now {counter}"),
                Map::from_iter([
                    ("counter".to_string(), json!(counter)),
                    ("previous".to_string(), json!(state.counter)),
                ]),
            )
        }),
        "current_time" => arguments::<CurrentTimeTool>(tool_id, params).and_then(|args| {
            let format = match args.precision.as_deref() {
                None | Some("millis") => SecondsFormat::Millis,
                Some("seconds") => SecondsFormat::Secs,
                Some("micros") => SecondsFormat::Micros,
                Some(other) => {
                    return Err(ErrorObject::invalid_params(format!(
                        "precision must be one of seconds, millis, micros; got {other}"
                    )))
                }
            };
            let now_utc = ctx.received_at().to_rfc3339_opts(format, true);
            tool_result(
                now_utc.clone(),
                Map::from_iter([("now_utc".to_string(), json!(now_utc))]),
            )
        }),
        _ => Err(ErrorObject::new(METHOD_NOT_FOUND, "Method not found").with_data(json!({
            "code": "tool_not_found",
            "message": "unknown tool name",
            "details": {
                "name": tool_id,
            },
        }))),
    };

    match outcome {
        Ok(value) => Reply::success(value).with_state(next),
        Err(error) => Reply::failure(error).with_state(next),
    }
}

fn arguments<T: DeserializeOwned>(tool_id: &str, params: &Params) -> Result<T, ErrorObject> {
    let raw = match params.get("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(arguments) => arguments.clone(),
    };

    serde_json::from_value(raw)
        .map_err(|err| ErrorObject::invalid_params(format!("arguments for {tool_id}: {err}")))
}

fn tool_result(text: String, structured: Map<String, Value>) -> Result<Value, ErrorObject> {
    serde_json::to_value(CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: Some(structured),
    })
    .map_err(|err| ErrorObject::new(SERVER_ERROR, format!("tool result: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CatalogOptions;
    use crate::mcp::{
        context::{SessionId, TransportMeta},
        handler::Outcome,
        rpc::INVALID_PARAMS,
    };

    fn ctx() -> RequestContext {
        RequestContext::new(SessionId::from("tools"), TransportMeta::new("POST", "/mcp"))
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().expect("object params")
    }

    fn state() -> CatalogState {
        CatalogState::new(CatalogOptions::default())
    }

    #[test]
    fn lists_all_tools() {
        let names = build_tools_list()
            .into_iter()
            .map(|tool| tool.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["echo", "increment", "current_time"]);
    }

    #[test]
    fn echo_returns_text() {
        let reply = execute_tool(
            &ctx(),
            "echo",
            &params(json!({"toolId": "echo", "arguments": {"text": "hi"}})),
            &state(),
        );

        let Outcome::Success(value) = reply.outcome else {
            panic!("echo should succeed");
        };
        assert_eq!(value["structuredContent"]["text"], "hi");
        assert_eq!(value["content"][0]["text"], "hi");
    }

    #[test]
    fn increment_advances_counter_in_new_state() {
        let reply = execute_tool(
            &ctx(),
            "increment",
            &params(json!({"toolId": "increment", "arguments": {"by": 5}})),
            &state(),
        );

        let next = reply.state.expect("increment returns a new state");
        assert_eq!(next.counter, 5);
        assert_eq!(next.tool_calls, 1);
        assert!(matches!(reply.outcome, Outcome::Success(_)));
    }

    #[test]
    fn increment_overflow_keeps_counter() {
        let mut current = state();
        current.counter = i64::MAX;

        let reply = execute_tool(
            &ctx(),
            "increment",
            &params(json!({"toolId": "increment"})),
            &current,
        );

        let next = reply.state.expect("failure still counts the call");
        assert_eq!(next.counter, i64::MAX);
        assert_eq!(next.tool_calls, 1);
        assert!(matches!(reply.outcome, Outcome::Failure(ref e) if e.code == INVALID_PARAMS));
    }

    #[test]
    fn null_arguments_mean_no_arguments() {
        let reply = execute_tool(
            &ctx(),
            "increment",
            &params(json!({"toolId": "increment", "arguments": null})),
            &state(),
        );

        assert!(matches!(reply.outcome, Outcome::Success(_)));
        assert_eq!(reply.state.map(|next| next.counter), Some(1));
    }

    #[test]
    fn malformed_arguments_are_invalid_params() {
        let reply = execute_tool(
            &ctx(),
            "echo",
            &params(json!({"toolId": "echo", "arguments": {"text": 3}})),
            &state(),
        );

        assert!(matches!(reply.outcome, Outcome::Failure(ref e) if e.code == INVALID_PARAMS));
    }

    #[test]
    fn unknown_precision_is_rejected() {
        let reply = execute_tool(
            &ctx(),
            "current_time",
            &params(json!({"toolId": "current_time", "arguments": {"precision": "days"}})),
            &state(),
        );

        assert!(matches!(reply.outcome, Outcome::Failure(ref e) if e.code == INVALID_PARAMS));
    }

    #[test]
    fn current_time_uses_request_timestamp() {
        let context = ctx();
        let reply = execute_tool(
            &context,
            "current_time",
            &params(json!({"toolId": "current_time", "arguments": {"precision": "seconds"}})),
            &state(),
        );

        let Outcome::Success(value) = reply.outcome else {
            panic!("current_time should succeed");
        };
        assert_eq!(
            value["structuredContent"]["now_utc"],
            context
                .received_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    #[test]
    fn unknown_tool_reports_tool_not_found() {
        let reply = execute_tool(&ctx(), "nope", &Params::new(), &state());

        let Outcome::Failure(error) = reply.outcome else {
            panic!("unknown tool must fail");
        };
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert_eq!(
            error.data.map(|data| data["code"].clone()),
            Some(json!("tool_not_found"))
        );
    }
}
