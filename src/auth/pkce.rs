//! Proof Key for Code Exchange (RFC 7636), client side.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::util::random::random_string;

pub const MIN_CODE_VERIFIER_LENGTH: usize = 43;
pub const MAX_CODE_VERIFIER_LENGTH: usize = 128;
pub const DEFAULT_CODE_VERIFIER_ENTROPY: usize = 64;
pub const MIN_CODE_VERIFIER_ENTROPY: usize = 32;
pub const MAX_CODE_VERIFIER_ENTROPY: usize = 96;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    #[error("code verifier is shorter than RFC 7636 allows ({0} < 43)")]
    VerifierTooShort(usize),
    #[error("code verifier is longer than RFC 7636 allows ({0} > 128)")]
    VerifierTooLong(usize),
    #[error("code verifier contains characters outside the unreserved set")]
    InvalidVerifierCharacters,
    #[error("verifier entropy must be between 32 and 96 bytes, got {0}")]
    EntropyOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Transformation {
    #[serde(rename = "plain")]
    Plain,
    #[default]
    S256,
}

impl Transformation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Challenge {
    #[serde(rename = "code_challenge")]
    pub code: String,
    #[serde(rename = "code_challenge_method")]
    #[serde(default)]
    pub method: Transformation,
}

pub fn check_code_verifier(verifier: &str) -> Result<(), PkceError> {
    let len = verifier.chars().count();
    if len < MIN_CODE_VERIFIER_LENGTH {
        return Err(PkceError::VerifierTooShort(len));
    }
    if len > MAX_CODE_VERIFIER_LENGTH {
        return Err(PkceError::VerifierTooLong(len));
    }
    if !verifier.chars().all(is_unreserved) {
        return Err(PkceError::InvalidVerifierCharacters);
    }
    Ok(())
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

pub fn generate_random_code_verifier() -> String {
    random_string(DEFAULT_CODE_VERIFIER_ENTROPY)
}

pub fn generate_random_code_verifier_with_entropy(entropy_bytes: usize) -> Result<String, PkceError> {
    if !(MIN_CODE_VERIFIER_ENTROPY..=MAX_CODE_VERIFIER_ENTROPY).contains(&entropy_bytes) {
        return Err(PkceError::EntropyOutOfRange(entropy_bytes));
    }
    Ok(random_string(entropy_bytes))
}

/// The method [`derive_code_verifier_challenge`] applies.
///
/// SHA-256 is compiled in, so this is always `S256`; `Plain` only appears on requests
/// deserialized from elsewhere.
pub fn code_verifier_challenge_method() -> Transformation {
    Transformation::S256
}

pub fn derive_code_verifier_challenge(verifier: &str) -> Challenge {
    let digest = Sha256::digest(latin1_bytes(verifier));
    Challenge {
        code: URL_SAFE_NO_PAD.encode(digest),
        method: code_verifier_challenge_method(),
    }
}

// ISO-8859-1: one byte per character, unmappable characters become '?'.
fn latin1_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
