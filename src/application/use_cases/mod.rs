mod manage_sessions;
mod respond;
mod send_message;

pub use manage_sessions::*;
pub use respond::*;
pub use send_message::*;
