//! Telegram adapter.
//!
//! Everything that knows about teloxide lives here; the engine only sees
//! [`crate::engine::InboundEvent`]s coming in and a
//! [`crate::engine::Transport`] going out.

mod dispatcher;
mod runtime;
mod transport;
mod webhook;

pub use dispatcher::{ThrottledBot, build_dispatcher};
pub use runtime::run;
pub use transport::{TelegramAdmins, TelegramTransport};
