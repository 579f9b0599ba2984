//! Shared pieces of the mailchain workspace: the [`message::Message`] model
//! senders deliver, logging setup and RON configuration loading.

pub mod config;
pub mod logging;
pub mod message;

pub use message::{Address, ComposeError, Message, MessageBuilder};
pub use tracing;
