pub mod ask_controller;
pub mod chat_controller;
pub mod message_controller;
pub mod session_controller;

pub use ask_controller::AskController;
pub use chat_controller::ChatController;
pub use message_controller::MessageController;
pub use session_controller::SessionController;
