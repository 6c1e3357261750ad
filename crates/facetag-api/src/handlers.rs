//! Request handlers.

pub mod health;
pub mod images;
pub mod triggers;
pub mod webhook;

pub use health::*;
pub use images::*;
pub use triggers::*;
pub use webhook::*;
