//! koko terminal channel
//!
//! Framing, WebSocket transport and the session multiplexer that attaches a
//! local terminal to a remote shell.

mod channel;
mod error;
#[cfg(unix)]
mod local;
mod multiplexer;
mod protocol;

#[cfg(unix)]
pub use channel::connect_asset;
pub use channel::{connect_terminal, terminal_url, FrameSink, FrameStream};
pub use error::TerminalError;
#[cfg(unix)]
pub use local::{raw_mode_active, restore_terminal, window_size, RawModeGuard, StdTerminal};
pub use multiplexer::{run_session, LocalTerminal, TerminalIo};
pub use protocol::{ChannelMessage, MessageType, TerminalGeometry};
