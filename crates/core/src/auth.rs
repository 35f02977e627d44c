//! Bearer session tokens.
//!
//! Only the SHA-256 digest of a token is ever persisted; the raw value lives
//! in a [`SecretString`] so it does not leak through `Debug` output.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

const TOKEN_PREFIX: &str = "vmg_";
const TOKEN_LEN: usize = 40;

#[derive(Clone, Debug)]
pub struct SessionToken(SecretString);

impl SessionToken {
    /// Generate a new random token.
    pub fn generate() -> Self {
        use rand::Rng;
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

        let mut rng = rand::thread_rng();
        let body: String = (0..TOKEN_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();
        Self(format!("{TOKEN_PREFIX}{body}").into())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into().into())
    }

    pub fn hash(&self) -> String {
        hash_token(self.0.expose_secret())
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header_value: &str) -> Option<SessionToken> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| SessionToken::from_raw(token))
}

#[cfg(test)]
mod tests {
    use super::{hash_token, parse_bearer, SessionToken};

    #[test]
    fn generated_tokens_are_prefixed_and_unique() {
        let first = SessionToken::generate();
        let second = SessionToken::generate();
        assert!(first.expose().starts_with("vmg_"));
        assert_eq!(first.expose().len(), 44);
        assert_ne!(first.expose(), second.expose());
    }

    #[test]
    fn hash_is_hex_sha256_and_stable() {
        let digest = hash_token("abc");
        assert_eq!(digest, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(SessionToken::from_raw("abc").hash(), digest);
    }

    #[test]
    fn debug_output_hides_token() {
        let token = SessionToken::from_raw("vmg_super_secret");
        assert!(!format!("{token:?}").contains("super_secret"));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(parse_bearer("Bearer vmg_abc").map(|t| t.hash()), Some(hash_token("vmg_abc")));
        assert!(parse_bearer("bearer   vmg_abc ").is_some());
        assert!(parse_bearer("Basic dXNlcjpwYXNz").is_none());
        assert!(parse_bearer("Bearer ").is_none());
        assert!(parse_bearer("vmg_abc").is_none());
    }
}
