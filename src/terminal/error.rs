//! Terminal session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Channel protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed by remote without CLOSE")]
    ChannelClosed,

    #[error("Local terminal input closed")]
    InputClosed,

    #[error("Invalid terminal URL: {0}")]
    InvalidUrl(String),
}
