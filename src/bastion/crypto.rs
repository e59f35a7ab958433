//! Password encryption for the login form

use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

use super::error::BastionError;

/// Encrypt `password` with RSA PKCS#1 v1.5 and base64 it for the form body.
///
/// Padding is randomized from the OS RNG, so two calls never produce the
/// same ciphertext.
pub fn encrypt_password(key: &RsaPublicKey, password: &str) -> Result<String, BastionError> {
    let mut rng = rand::rngs::OsRng;
    let ciphertext = key
        .encrypt(&mut rng, Pkcs1v15Encrypt, password.as_bytes())
        .map_err(|e| BastionError::Encryption(e.to_string()))?;
    Ok(STANDARD.encode(ciphertext))
}
