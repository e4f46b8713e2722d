//! # courier-server
//!
//! The relay's core: the connection hub, the per-connection read/write
//! discipline, the routing rules, and the bridge to the external broker —
//! plus the axum HTTP/WebSocket surface that feeds it.
//!
//! - `/ws/visitor`, `/ws/agent` — ingress upgrade endpoints
//! - `/health`, `/metrics` — operational surface
//! - Hub: concurrent registry with enqueue-or-evict fan-out
//! - Bridge: chat/read-receipt publishing and the agent-event subscription

#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
