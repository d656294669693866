mod in_memory_session_repository;
mod mock_completion;
mod openai_client;
pub mod sse;

pub use in_memory_session_repository::*;
pub use mock_completion::*;
pub use openai_client::*;
