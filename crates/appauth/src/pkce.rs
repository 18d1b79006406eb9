//! PKCE (RFC 7636), state and nonce generation
//!
//! Random material comes from the `oauth2` crate's generators. Every
//! authorization attempt gets a fresh verifier, state and nonce.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oauth2::{CsrfToken, PkceCodeChallenge};
use sha2::{Digest, Sha256};

/// Random bytes behind a code verifier; encodes to 86 characters
const VERIFIER_BYTES: u32 = 64;

/// Random bytes behind a state or nonce; encodes to 43 characters
const OPAQUE_TOKEN_BYTES: u32 = 32;

/// The only challenge method this client sends
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// PKCE material for one authorization attempt
#[derive(Clone, PartialEq, Eq)]
pub struct PkceContext {
    /// High-entropy verifier, sent only with the token request
    pub code_verifier: String,
    /// `BASE64URL(SHA256(code_verifier))`
    pub code_challenge: String,
    /// Always `S256`
    pub code_challenge_method: String,
}

impl PkceContext {
    /// Generate a fresh verifier and its S256 challenge
    pub fn generate() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256_len(VERIFIER_BYTES);
        Self {
            code_verifier: verifier.secret().clone(),
            code_challenge: challenge.as_str().to_string(),
            code_challenge_method: CODE_CHALLENGE_METHOD.to_string(),
        }
    }

    /// Rebuild the context for a known verifier
    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        Self {
            code_challenge: challenge_for(&code_verifier),
            code_verifier,
            code_challenge_method: CODE_CHALLENGE_METHOD.to_string(),
        }
    }

    /// Whether the challenge is the S256 transform of the verifier
    pub fn is_consistent(&self) -> bool {
        self.code_challenge_method == CODE_CHALLENGE_METHOD
            && challenge_for(&self.code_verifier) == self.code_challenge
    }
}

impl fmt::Debug for PkceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceContext")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .finish()
    }
}

/// S256 challenge for `verifier`
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Fresh `state` value
pub fn new_state() -> String {
    CsrfToken::new_random_len(OPAQUE_TOKEN_BYTES).secret().clone()
}

/// Fresh OpenID `nonce` value
pub fn new_nonce() -> String {
    CsrfToken::new_random_len(OPAQUE_TOKEN_BYTES).secret().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn is_unreserved(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = PkceContext::generate();
        assert_eq!(pkce.code_verifier.len(), 86);
        assert!(pkce.code_verifier.chars().all(is_unreserved));
        assert_eq!(pkce.code_challenge_method, "S256");
        assert!(pkce.is_consistent());
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let pkce = PkceContext::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(
            pkce.code_challenge,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(pkce.is_consistent());
    }

    #[test]
    fn test_state_and_nonce_are_fresh() {
        let states: HashSet<String> = (0..64).map(|_| new_state()).collect();
        let nonces: HashSet<String> = (0..64).map(|_| new_nonce()).collect();
        assert_eq!(states.len(), 64);
        assert_eq!(nonces.len(), 64);
        assert!(states.iter().all(|s| s.len() == 43 && s.chars().all(is_unreserved)));
    }

    #[test]
    fn test_debug_hides_verifier() {
        let pkce = PkceContext::generate();
        assert!(!format!("{pkce:?}").contains(&pkce.code_verifier));
    }

    proptest! {
        #[test]
        fn prop_generated_pairs_verify(_seed in 0u8..32) {
            let pkce = PkceContext::generate();
            prop_assert!(pkce.code_verifier.len() >= 43 && pkce.code_verifier.len() <= 128);
            prop_assert!(pkce.code_verifier.chars().all(is_unreserved));
            prop_assert_eq!(challenge_for(&pkce.code_verifier), pkce.code_challenge);
        }

        #[test]
        fn prop_challenge_is_unpadded_base64url(verifier in "[A-Za-z0-9._~-]{43,128}") {
            let challenge = challenge_for(&verifier);
            prop_assert_eq!(challenge.len(), 43);
            prop_assert!(!challenge.contains('='));
            prop_assert!(challenge.chars().all(is_unreserved));
        }
    }
}
