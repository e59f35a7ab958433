//! Authenticated HTTP session against the bastion web console
//!
//! One `BastionSession` per process: a cookie jar plus the endpoint URL.
//! Only the login calls take `&mut self`, so the jar has a single writer at a
//! time while lookups can share the session freely.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderValue, REFERER};
use reqwest::{Client, Response, Url};
use tracing::debug;

use super::error::BastionError;
use super::login::{classify_landing, credential_form, otp_form, Credentials, LoginOutcome};
use super::login::{LOGIN_PATH, OTP_PATH};
use super::tokens::LoginChallenge;

/// Validate a user-supplied endpoint.
///
/// Must be an `http`/`https` URL with a host and no path.
pub fn parse_endpoint(input: &str) -> Result<Url, BastionError> {
    let input = input.trim();
    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Err(BastionError::InvalidEndpoint(format!(
            "{}: must be a http url",
            input
        )));
    }

    let url = Url::parse(input)
        .map_err(|e| BastionError::InvalidEndpoint(format!("{}: {}", input, e)))?;

    if url.host_str().is_none() {
        return Err(BastionError::InvalidEndpoint(format!(
            "{}: missing host",
            input
        )));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(BastionError::InvalidEndpoint(format!(
            "{}: must not contain path",
            input
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(BastionError::InvalidEndpoint(format!(
            "{}: must not contain query or fragment",
            input
        )));
    }

    Ok(url)
}

pub struct BastionSession {
    client: Client,
    jar: Arc<Jar>,
    endpoint: Url,
}

impl BastionSession {
    /// Create a session with an empty cookie jar.
    pub fn new(endpoint: &str) -> Result<Self, BastionError> {
        let endpoint = parse_endpoint(endpoint)?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(concat!("jumpterm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            jar,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Absolute URL for a server path such as `/core/auth/login/`.
    pub fn url(&self, path: &str) -> Result<Url, BastionError> {
        self.endpoint
            .join(path)
            .map_err(|e| BastionError::InvalidInput(format!("bad path {}: {}", path, e)))
    }

    /// `Cookie` header value carrying the session cookies, if any are set.
    pub fn cookie_header(&self) -> Option<HeaderValue> {
        self.jar.cookies(&self.endpoint)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// GET the login page and scrape its challenge.
    pub async fn fetch_login_page(&mut self) -> Result<LoginChallenge, BastionError> {
        let response = self.client.get(self.url(LOGIN_PATH)?).send().await?;
        let (path, body) = read_ok(response, "access login page").await?;
        debug!("Fetched login page from {} ({} bytes)", path, body.len());
        LoginChallenge::from_html(&body)
    }

    /// GET the captcha image announced by `challenge`.
    pub async fn fetch_captcha(&self, challenge: &LoginChallenge) -> Result<Bytes, BastionError> {
        let image_path = challenge.captcha_image_path().ok_or_else(|| {
            BastionError::InvalidInput("login page has no captcha".to_string())
        })?;

        let response = self.client.get(self.url(&image_path)?).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(BastionError::HttpStatus {
                context: "fetch captcha",
                status: status.as_u16(),
                path: response.url().path().to_string(),
            });
        }
        Ok(response.bytes().await?)
    }

    /// POST the credential form, following redirects to the landing page.
    pub async fn submit_credentials(
        &mut self,
        challenge: &LoginChallenge,
        credentials: &Credentials,
        captcha_answer: Option<&str>,
    ) -> Result<LoginOutcome, BastionError> {
        let form = credential_form(challenge, credentials, captcha_answer)?;
        self.post_login_form(LOGIN_PATH, &form, "submit login form")
            .await
    }

    /// POST a one-time password with the token scraped from the OTP page.
    pub async fn submit_otp(
        &mut self,
        csrf_token: &str,
        otp_code: &str,
    ) -> Result<LoginOutcome, BastionError> {
        let form = otp_form(csrf_token, otp_code);
        self.post_login_form(OTP_PATH, &form, "submit otp form")
            .await
    }

    async fn post_login_form(
        &mut self,
        path: &str,
        form: &[(&'static str, String)],
        context: &'static str,
    ) -> Result<LoginOutcome, BastionError> {
        let url = self.url(path)?;
        let response = self
            .client
            .post(url.clone())
            .header(REFERER, url.as_str())
            .form(form)
            .send()
            .await?;

        let (landing, body) = read_ok(response, context).await?;
        debug!("{} landed on {}", context, landing);
        classify_landing(&landing, &body)
    }
}

/// Read a 200 response body, returning the final (post-redirect) path with it.
async fn read_ok(response: Response, context: &'static str) -> Result<(String, String), BastionError> {
    let status = response.status();
    let path = response.url().path().to_string();
    let body = response.text().await?;

    if status != reqwest::StatusCode::OK {
        return Err(BastionError::HttpStatus {
            context,
            status: status.as_u16(),
            path,
        });
    }
    Ok((path, body))
}
