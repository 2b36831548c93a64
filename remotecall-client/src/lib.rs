//! # remotecall-client
//!
//! Client library for the RC remote command protocol.
//!
//! This crate provides:
//! - A session task that connects, logs in and reconnects on faults
//! - A cloneable [`Client`] handle for queueing packets
//! - Chunked sends gated on the server's content length result
//! - An event stream of connection changes and query results

pub mod chunked;
pub mod client;
pub mod config;
mod dispatcher;
pub mod error;
pub mod event;
pub mod session;

pub use client::Client;
pub use config::{Config, ConfigError};
pub use error::ClientError;
pub use event::SessionEvent;
pub use session::{Session, SessionConfig, SessionState};
