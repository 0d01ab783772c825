pub mod broadcast;
pub mod commands;
pub mod dispatch;
pub mod format;
pub mod handlers;
pub mod messenger;
pub mod parse;
pub mod session;

pub use broadcast::{fan_out, BroadcastReport, BroadcastSettings};
pub use dispatch::{BotContext, Dispatcher};
pub use messenger::Messenger;
pub use session::{SessionState, SessionStore};
