//! Model Context Protocol connection engine
//!
//! Envelope parsing, method routing, the provider-facing `Handler` contract and
//! the per-session `Connection` state machine that ties them together.

pub mod audit;
pub mod connection;
pub mod context;
pub mod handler;
pub mod method;
pub mod rpc;
