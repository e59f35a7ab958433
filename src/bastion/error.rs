//! Bastion web API error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BastionError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{context} got HTTP {status} at {path}")]
    HttpStatus {
        context: &'static str,
        status: u16,
        path: String,
    },

    #[error("Bastion protocol error: {0}")]
    Protocol(String),

    #[error("Password encryption failed: {0}")]
    Encryption(String),

    #[error("Expected asset {expected}, but got {actual}")]
    Inconsistent { expected: String, actual: String },

    #[error("Login page requires a captcha but no captcha resolver was supplied")]
    CaptchaRequired,

    #[error("Session is not authenticated (redirected to {0})")]
    NotAuthenticated(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to obtain user input: {0}")]
    Resolver(String),
}

impl BastionError {
    /// Whether the error aborts the flow outright.
    ///
    /// Non-fatal errors can be answered by asking the user again
    /// (a missing captcha answer, an expired session, a resolver that was
    /// interrupted) instead of giving up.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BastionError::CaptchaRequired
                | BastionError::NotAuthenticated(_)
                | BastionError::Resolver(_)
        )
    }
}
