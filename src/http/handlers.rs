//! Axum HTTP handlers for the web server
//!
//! Provides the MCP endpoint that feeds request bodies into per-session
//! connections, plus general metadata endpoints.

use std::net::SocketAddr;

use axum::{
    body::to_bytes,
    extract::{connect_info::ConnectInfo, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::AppError;
use crate::mcp::{
    audit::redact_headers,
    context::{SessionId, TransportMeta},
    handler::TerminateReason,
    method::Method,
    rpc::{error_envelope, ErrorObject},
};
use crate::AppState;

pub const SESSION_HEADER: &str = "mcp-session-id";

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub session_header: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
        session_header: "Mcp-Session-Id",
    })
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let transport = transport_meta(&parts);
    debug!(headers = %redact_headers(&transport.headers), "mcp request received");

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::bad_request("invalid_body", "request body could not be read"))?;

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return Ok(
                (StatusCode::OK, Json(error_envelope(None, &ErrorObject::parse_error())))
                    .into_response(),
            )
        }
    };

    if payload.is_array() {
        let error = ErrorObject::invalid_request("batch requests are not supported");
        return Ok((StatusCode::OK, Json(error_envelope(None, &error))).into_response());
    }

    let session = match requested_session(&parts.headers)? {
        Some(session_id) => state
            .registry
            .get(&session_id)
            .await
            .ok_or(AppError::not_found("session_not_found", "unknown session id"))?,
        None if opens_session(&payload) => state.registry.open().await?,
        None => {
            return Err(AppError::bad_request(
                "missing_session_id",
                "Mcp-Session-Id header is required outside of initialize",
            ))
        }
    };

    let dispatch = session.dispatch(payload, transport);
    let outcome = match state.dispatch_timeout {
        Some(limit) => tokio::time::timeout(limit, dispatch)
            .await
            .map_err(|_| AppError::Timeout)?,
        None => dispatch.await,
    }?;

    let mut response = match outcome {
        Some(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(session.session_id().as_str()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }

    Ok(response)
}

pub async fn close_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session_id = requested_session(&headers)?.ok_or(AppError::bad_request(
        "missing_session_id",
        "Mcp-Session-Id header is required",
    ))?;

    if state
        .registry
        .close(&session_id, TerminateReason::Closed)
        .await
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("session_not_found", "unknown session id"))
    }
}

/// Only an `initialize` request may start a new session.
fn opens_session(payload: &Value) -> bool {
    payload.get("method").and_then(Value::as_str) == Some(Method::Initialize.as_str())
}

fn requested_session(headers: &HeaderMap) -> Result<Option<SessionId>, AppError> {
    let Some(value) = headers.get(SESSION_HEADER) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map(str::trim)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(AppError::bad_request(
            "invalid_session_id",
            "Mcp-Session-Id must be a non-empty visible ASCII string",
        ))?;

    Ok(Some(SessionId::from(value)))
}

fn transport_meta(parts: &Parts) -> TransportMeta {
    let mut transport = TransportMeta::new(parts.method.as_str(), parts.uri.path());

    if let Some(ConnectInfo(remote_addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        transport = transport.with_remote_addr(*remote_addr);
    }

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            transport = transport.with_header(name.as_str(), value);
        }
    }

    transport
}
