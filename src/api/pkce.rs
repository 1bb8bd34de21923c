// PKCE helper for the S256 challenge method (RFC 7636)
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Unreserved URI characters allowed in a verifier.
pub const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;
/// Length used by the login flow.
pub const VERIFIER_LENGTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeVerifier(String);

impl CodeVerifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn challenge(&self) -> CodeChallenge {
        code_challenge_s256(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChallenge(String);

impl CodeChallenge {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Random verifier of `length` characters drawn from the OS CSPRNG.
pub fn generate_code_verifier(length: usize) -> Result<CodeVerifier> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(anyhow!(
            "verifier length {} outside {}..={}",
            length,
            MIN_VERIFIER_LENGTH,
            MAX_VERIFIER_LENGTH
        ));
    }
    let mut rng = OsRng;
    let verifier = (0..length)
        .map(|_| char::from(VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())]))
        .collect();
    Ok(CodeVerifier(verifier))
}

pub fn code_challenge_s256(verifier: &str) -> CodeChallenge {
    let hash = Sha256::digest(verifier.as_bytes());
    CodeChallenge(general_purpose::URL_SAFE_NO_PAD.encode(hash))
}

/// Verifier and challenge of one login attempt.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: CodeVerifier,
    pub challenge: CodeChallenge,
}

impl PkcePair {
    pub fn generate() -> Result<Self> {
        let verifier = generate_code_verifier(VERIFIER_LENGTH)?;
        let challenge = verifier.challenge();
        Ok(Self { verifier, challenge })
    }
}
