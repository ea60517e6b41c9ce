//! Mediaforge - Streaming media relay
//!
//! This library crate exposes the delivery engine, server and configuration
//! for integration testing.

pub mod config;
pub mod server;
pub mod streaming;
