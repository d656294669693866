//! # Domain Layer
//!
//! Conversation models, pipeline configuration, and the error taxonomy.
//! This layer is independent of the web framework and the HTTP client.

mod error;
pub mod models;

pub use error::*;
pub use models::*;
