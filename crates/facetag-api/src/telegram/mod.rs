//! Telegram Bot API front end.
//!
//! Operators talk to the pipeline through a bot:
//! - `/getface` sends the next unlabeled face, captioned with its FaceID
//! - replying to that photo with a name labels the face
//! - `/find <name>` sends every image containing the named person

pub mod client;
pub mod commands;
pub mod types;

pub use client::{escape_markdown, split_message, TelegramClient, TelegramConfig, TelegramError, TelegramResult};
pub use commands::Command;
pub use types::{Chat, Message, Update};
