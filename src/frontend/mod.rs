// ABOUTME: Front-end implementations the bot can talk through
// ABOUTME: Terminal (stdin/stdout) always, Telegram behind the `telegram` feature

pub mod terminal;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use terminal::TerminalFrontend;

#[cfg(feature = "telegram")]
pub use telegram::{TelegramFrontend, TelegramMetadata, TelegramResponder};
