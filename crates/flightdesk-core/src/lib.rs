pub mod admin;
pub mod bot;
pub mod config;
pub mod context;
pub mod conversation_lock;
pub mod dialog;
pub mod error;
pub mod interruption;
pub mod main_dispatcher;
pub mod prompts;
pub mod recognizer;
pub mod sink;
pub mod stack;
pub mod ticket;
pub mod ticket_buy;
pub mod ticket_fields;
pub mod ticket_list;
pub mod transport;
pub mod waterfall;

pub use bot::*;
pub use config::*;
pub use context::*;
pub use conversation_lock::*;
pub use dialog::*;
pub use error::*;
pub use recognizer::*;
pub use sink::*;
pub use stack::*;
pub use ticket::*;
pub use transport::*;
