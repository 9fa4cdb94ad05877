//! Bot module for handling VK community messages
//!
//! - `message_handler`: Groups long poll batches by sender and runs turns
//! - `user_locks`: Serializes turns of the same user
//! - `dialogue_manager`: The per-user dialogue state machine
//! - `commands`: Keyword families and button choices
//! - `ui_builder`: Creates keyboards and formats messages

pub mod commands;
pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;
pub mod user_locks;

pub use dialogue_manager::DialogueManager;
pub use message_handler::{message_handler, run_long_poll};
pub use user_locks::UserLocks;
