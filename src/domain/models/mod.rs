mod chat_history;
mod chat_turn;
mod completion;
mod pipeline_config;
mod prompt;
mod session;

pub use chat_history::*;
pub use chat_turn::*;
pub use completion::*;
pub use pipeline_config::*;
pub use prompt::*;
pub use session::*;
