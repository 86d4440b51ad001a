//! HTTP transport for the connection engine
//!
//! Maps `/mcp` requests onto sessions via the `Mcp-Session-Id` header and exposes
//! the health and discovery endpoints.

pub mod handlers;
