use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// RFC 7636 unreserved characters.
pub const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const VERIFIER_LEN: usize = 128;
pub const STATE_LEN: usize = 32;

// Largest multiple of the charset size that fits in a byte; bytes at or above
// it are rejected so every character is equally likely.
const ACCEPT_BELOW: u8 = (256 / CHARSET.len() * CHARSET.len()) as u8;

pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

/// Draw `len` characters uniformly from [`CHARSET`] using the OS random source.
fn random_string(len: usize) -> Result<String, AuthError> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| AuthError::Entropy(e.to_string()))?;
        for &b in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if out.len() == len {
                break;
            }
            out.push(CHARSET[b as usize % CHARSET.len()] as char);
        }
    }
    Ok(out)
}

pub fn generate_verifier() -> Result<String, AuthError> {
    random_string(VERIFIER_LEN)
}

pub fn generate_state() -> Result<String, AuthError> {
    random_string(STATE_LEN)
}

/// S256 challenge: base64url (no padding) of SHA-256 over the verifier bytes.
pub fn challenge_from_verifier(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

pub fn generate_pkce() -> Result<PkcePair, AuthError> {
    let verifier = generate_verifier()?;
    let challenge = challenge_from_verifier(&verifier);
    Ok(PkcePair {
        verifier,
        challenge,
    })
}
