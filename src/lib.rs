//! Thesis intake — a Telegram bot that collects conference submissions.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod intake;
