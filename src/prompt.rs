//! Interactive prompts on the controlling terminal
//!
//! Prompts are written to stderr so stdout stays clean for the session.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use jumpterm_lib::bastion::{BastionError, CaptchaResolver, OtpResolver};

/// Prompt for one line of input, without the trailing newline.
pub fn read_line(label: &str) -> io::Result<String> {
    eprint!("{}: ", label);
    io::stderr().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("no input for {}", label),
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompt until `validate` accepts the (trimmed) answer.
pub fn read_validated<E: std::fmt::Display>(
    label: &str,
    validate: impl Fn(&str) -> Result<(), E>,
) -> io::Result<String> {
    loop {
        let answer = read_line(label)?.trim().to_string();
        match validate(&answer) {
            Ok(()) => return Ok(answer),
            Err(e) => eprintln!("{}", e),
        }
    }
}

/// Prompt for a secret without echo.
pub fn read_password(label: &str) -> io::Result<String> {
    rpassword::prompt_password(format!("{}: ", label))
}

pub fn confirm(label: &str) -> io::Result<bool> {
    let answer = read_line(&format!("{} [y/N]", label))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Numbered choice; returns the index into `items`.
pub fn select(label: &str, items: &[String]) -> io::Result<usize> {
    eprintln!("{}:", label);
    for (i, item) in items.iter().enumerate() {
        eprintln!("  {}) {}", i + 1, item);
    }

    loop {
        let answer = read_line("Number")?;
        match parse_choice(&answer, items.len()) {
            Some(index) => return Ok(index),
            None => eprintln!("enter a number between 1 and {}", items.len()),
        }
    }
}

fn parse_choice(answer: &str, len: usize) -> Option<usize> {
    match answer.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

/// iTerm2 inline-image escape (OSC 1337) for `image`.
///
/// Under tmux/screen (`TERM=screen*`) the sequence is wrapped in a DCS
/// passthrough so it reaches the outer terminal.
fn inline_image_sequence(image: &[u8], term: &str) -> String {
    let (osc, st) = if term.starts_with("screen") {
        ("\x1bPtmux;\x1b\x1b]", "\x07\x1b\\")
    } else {
        ("\x1b]", "\x07")
    };
    format!(
        "{}1337;File=name=captcha.png;size={};height=4;width=auto;inline=1:{}{}",
        osc,
        image.len(),
        STANDARD.encode(image),
        st
    )
}

/// Temporary captcha image, removed on drop.
struct CaptchaFile(PathBuf);

impl CaptchaFile {
    fn write(image: &[u8]) -> io::Result<Self> {
        let path = std::env::temp_dir().join(format!("jumpterm_captcha_{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, image)?;
        Ok(Self(path))
    }
}

impl Drop for CaptchaFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn ask_captcha(image: &[u8]) -> io::Result<String> {
    let iterm = std::env::var("TERM_PROGRAM").is_ok_and(|p| p == "iTerm.app");

    let _file = if iterm {
        let term = std::env::var("TERM").unwrap_or_default();
        eprintln!("Captcha found, please interpret it:");
        eprintln!("{}", inline_image_sequence(image, &term));
        None
    } else {
        let file = CaptchaFile::write(image)?;
        eprintln!(
            "Captcha found, please interpret it: file://{}",
            file.0.display()
        );
        eprintln!("Open another terminal or press Ctrl-Z to inspect the image");
        Some(file)
    };

    Ok(read_line("Captcha")?.trim().to_string())
}

fn resolver_error(what: &str, e: impl std::fmt::Display) -> BastionError {
    BastionError::Resolver(format!("{}: {}", what, e))
}

/// Shows the captcha and reads the answer from the terminal.
pub struct PromptCaptcha;

#[async_trait]
impl CaptchaResolver for PromptCaptcha {
    async fn resolve_captcha(&self, image: &[u8]) -> Result<String, BastionError> {
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || ask_captcha(&image))
            .await
            .map_err(|e| resolver_error("captcha prompt", e))?
            .map_err(|e| resolver_error("captcha prompt", e))
    }
}

/// Reads a one-time password from the terminal.
pub struct PromptOtp;

#[async_trait]
impl OtpResolver for PromptOtp {
    async fn resolve_otp(&self) -> Result<String, BastionError> {
        tokio::task::spawn_blocking(|| read_line("OTP"))
            .await
            .map_err(|e| resolver_error("otp prompt", e))?
            .map_err(|e| resolver_error("otp prompt", e))
    }
}
