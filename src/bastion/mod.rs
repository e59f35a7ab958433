//! Bastion web console client
//!
//! Everything that talks HTTP to the bastion: scraping the login page,
//! encrypting the password, walking the captcha/OTP login chain and resolving
//! hostnames to assets and system users over the REST API.

mod assets;
mod crypto;
mod error;
pub mod login;
mod session;
pub mod tokens;

pub use assets::{Asset, RemoteIdentity};
pub use crypto::encrypt_password;
pub use error::BastionError;
pub use login::{
    authenticate, CaptchaResolver, Credentials, LoginOutcome, OtpResolver, Resolvers,
};
pub use session::{parse_endpoint, BastionSession};
pub use tokens::LoginChallenge;
