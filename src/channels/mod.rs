//! Messaging gateway: typed events in, chat operations out.

pub mod channel;
pub mod telegram;

pub use channel::*;
pub use telegram::TelegramChannel;
