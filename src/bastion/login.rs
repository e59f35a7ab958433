//! Web Login State Machine
//!
//! The bastion's login is a chain of Django form pages:
//!
//! ```text
//!  GET /core/auth/login/ ──▶ challenge ──▶ (captcha image + answer)
//!                                              │
//!  POST /core/auth/login/ ◀────────────────────┘
//!        │ redirects to
//!        ├── /                      → Authenticated (session cookie set)
//!        ├── /core/auth/login/otp/  → NeedsOtp (fresh csrf token)
//!        └── anything else          → Failed
//!
//!  POST /core/auth/login/otp/  → same three-way landing
//! ```
//!
//! Deciding what a landing page means and what each form carries is pure
//! (see [`classify_landing`], [`credential_form`], [`otp_form`]); the network
//! half lives on [`BastionSession`]. [`authenticate`] walks the chain once and
//! never retries: a rejected captcha or OTP comes back as an outcome and the
//! caller decides whether to ask the user again.

use async_trait::async_trait;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::crypto::encrypt_password;
use super::error::BastionError;
use super::session::BastionSession;
use super::tokens::{extract_csrf_token, LoginChallenge};

pub const LOGIN_PATH: &str = "/core/auth/login/";
pub const OTP_PATH: &str = "/core/auth/login/otp/";
pub const HOME_PATH: &str = "/";

/// Where a login submission landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The session cookie in the jar is now valid.
    Authenticated,
    /// The server wants a one-time password, to be posted with this token.
    NeedsOtp { csrf_token: String },
    /// Credentials, captcha or OTP were rejected.
    Failed { detail: String },
}

/// Username and an already-resolved password
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Turns a captcha image into the text the user read from it.
#[async_trait]
pub trait CaptchaResolver: Send + Sync {
    async fn resolve_captcha(&self, image: &[u8]) -> Result<String, BastionError>;
}

/// Supplies a one-time password.
#[async_trait]
pub trait OtpResolver: Send + Sync {
    async fn resolve_otp(&self) -> Result<String, BastionError>;
}

/// Optional user-input hooks for [`authenticate`].
#[derive(Default, Clone, Copy)]
pub struct Resolvers<'a> {
    pub captcha: Option<&'a dyn CaptchaResolver>,
    pub otp: Option<&'a dyn OtpResolver>,
}

/// Classify the page a login POST landed on after redirects.
///
/// An OTP landing must carry a new csrf token; its absence means the page
/// shape changed and is a protocol error.
pub fn classify_landing(path: &str, body: &str) -> Result<LoginOutcome, BastionError> {
    match path {
        HOME_PATH => Ok(LoginOutcome::Authenticated),
        OTP_PATH => Ok(LoginOutcome::NeedsOtp {
            csrf_token: extract_csrf_token(body)?,
        }),
        other => Ok(LoginOutcome::Failed {
            detail: format!("login landed on {}", other),
        }),
    }
}

/// Form fields for the credential submission.
///
/// The password is RSA-encrypted when the page published a key. Captcha
/// fields are sent only when the page issued a challenge id, and then the
/// answer is mandatory.
pub fn credential_form(
    challenge: &LoginChallenge,
    credentials: &Credentials,
    captcha_answer: Option<&str>,
) -> Result<Vec<(&'static str, String)>, BastionError> {
    let password = match &challenge.public_key {
        Some(key) => encrypt_password(key, &credentials.password)?,
        None => credentials.password.to_string(),
    };

    let mut form = vec![
        ("csrfmiddlewaretoken", challenge.csrf_token.clone()),
        ("username", credentials.username.clone()),
        ("password", password),
    ];

    if let Some(captcha_id) = &challenge.captcha_id {
        let answer = captcha_answer.ok_or(BastionError::CaptchaRequired)?;
        form.push(("captcha_0", captcha_id.clone()));
        form.push(("captcha_1", answer.to_string()));
    }

    Ok(form)
}

pub fn otp_form(csrf_token: &str, otp_code: &str) -> Vec<(&'static str, String)> {
    vec![
        ("csrfmiddlewaretoken", csrf_token.to_string()),
        ("otp_code", otp_code.trim().to_string()),
    ]
}

/// Run the login chain once.
///
/// Fetches the page, asks the captcha resolver when the page has a captcha,
/// submits credentials, and when an OTP is requested and an OTP resolver is
/// available submits exactly one code. Any other `NeedsOtp` is handed back.
pub async fn authenticate(
    session: &mut BastionSession,
    credentials: &Credentials,
    resolvers: Resolvers<'_>,
) -> Result<LoginOutcome, BastionError> {
    let challenge = session.fetch_login_page().await?;

    let captcha_answer = if challenge.has_captcha() {
        let resolver = resolvers.captcha.ok_or(BastionError::CaptchaRequired)?;
        let image = session.fetch_captcha(&challenge).await?;
        debug!("Captcha image fetched ({} bytes)", image.len());
        Some(resolver.resolve_captcha(&image).await?)
    } else {
        None
    };

    let outcome = session
        .submit_credentials(&challenge, credentials, captcha_answer.as_deref())
        .await?;

    let outcome = match (outcome, resolvers.otp) {
        (LoginOutcome::NeedsOtp { csrf_token }, Some(resolver)) => {
            info!("Bastion requested a one-time password");
            let code = Zeroizing::new(resolver.resolve_otp().await?);
            session.submit_otp(&csrf_token, &code).await?
        }
        (outcome, _) => outcome,
    };

    match &outcome {
        LoginOutcome::Authenticated => info!("Logged in as {}", credentials.username),
        LoginOutcome::NeedsOtp { .. } => info!("Login is waiting for a one-time password"),
        LoginOutcome::Failed { detail } => info!("Login failed: {}", detail),
    }

    Ok(outcome)
}
