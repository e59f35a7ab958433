//! JumpTerm - terminal client for JumpServer-style bastion hosts
//!
//! Logs into the bastion's web console (CSRF scrape, RSA-encrypted password,
//! captcha, OTP) and attaches the local terminal to a koko terminal channel.

pub mod bastion;
pub mod config;
pub mod terminal;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
///
/// stdout belongs to the remote terminal, so only warnings surface by default.
const DEFAULT_LOG_FILTER: &str = "warn";

/// Initialize logging
///
/// Logs go to stderr, or are appended to `log_file` when one is given so that
/// diagnostics do not land on top of a raw-mode screen.
pub fn init_logging(log_file: Option<&Path>) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
