//! backstop - LLM provider failover gateway
//!
//! This library provides the core functionality for the backstop gateway:
//! configuration, provider adapters, failover routing, and request logging.

pub mod config;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod router;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
