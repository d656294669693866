//! # Connector Layer
//!
//! External integrations implementing application interfaces:
//! - Completion service (OpenAI chat completions over HTTP, scripted mock)
//! - Session storage (in-memory, process lifetime)
//! - Web API (axum router, controllers, HTML view)

pub mod adapter;
pub mod api;

pub use adapter::*;
