use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

static UNRESERVED: OnceLock<Regex> = OnceLock::new();

/// `n` bytes from the OS CSPRNG, base64url encoded without padding
pub fn random_string(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `base64url(SHA256(verifier))`, the S256 code challenge
pub fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// 43 to 128 characters of `[A-Za-z0-9-._~]` (RFC 7636 4.1)
pub fn is_valid_code_challenge_or_verifier(value: &str) -> bool {
    if value.len() < 43 || value.len() > 128 {
        return false;
    }
    UNRESERVED
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9\-._~]{43,128}$").expect("Invalid PKCE pattern"))
        .is_match(value)
}
