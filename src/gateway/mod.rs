//! HTTP gateway module.
//!
//! The axum server that accepts generation requests and routes them through
//! the failover router, plus the observability endpoints backed by the
//! request log.

pub mod handlers;
mod logs;
mod server;
mod stats;

pub use server::{create_router, run_server, AppState, RequestId};
