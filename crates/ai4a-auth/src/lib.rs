#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-auth** – Request authentication for the AI4All coordinator.
//!
//! This crate defines address derivation (`ai4a` + truncated key hash), the
//! signed-request challenge format, and the [`SignatureScheme`] trait seam.
//! An Ed25519 implementation is bundled for the current network; a
//! post-quantum primitive can be swapped in behind the same trait without
//! touching the coordinator core, which only ever sees
//! `verify(msg, sig, pk) → bool`.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use ai4a_types::{AccountId, ACCOUNT_ID_PREFIX};

/// Domain tag prefixed to every signed challenge.
pub const AUTH_DOMAIN: &str = "AI4ALL:v1";

/// Maximum tolerated distance between a request timestamp and server time.
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Authentication failures. Surfaced per-request; none mutate state.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    /// Timestamp was not valid ISO-8601.
    #[error("malformed timestamp: {0}")]
    BadTimestamp(String),
    /// Timestamp fell outside the ±30 s acceptance window.
    #[error("timestamp outside acceptance window")]
    StaleTimestamp,
    /// The presented public key does not derive the claimed account id.
    #[error("public key does not match account {0}")]
    AddressMismatch(String),
    /// Signature bytes were malformed or did not verify.
    #[error("invalid signature")]
    BadSignature,
    /// Public key bytes were not a valid key for the scheme.
    #[error("invalid public key")]
    BadKey,
    /// No key is registered for the account.
    #[error("unknown account {0}")]
    UnknownAccount(String),
}

/// Crate result helper.
pub type Result<T> = std::result::Result<T, AuthError>;

//─────────────────────────────
//  Address derivation
//─────────────────────────────

/// Derive the account id bound to a public key:
/// `"ai4a" + hex(SHA-256(public_key))[0..40]`.
pub fn account_id_for_key(public_key: &[u8]) -> AccountId {
    let digest = Sha256::digest(public_key);
    let tail = hex::encode(&digest[..20]);
    AccountId::unchecked(format!("{ACCOUNT_ID_PREFIX}{tail}"))
}

/// The byte string a worker signs for request authentication.
pub fn challenge_message(account_id: &AccountId, timestamp: &str) -> String {
    format!("{AUTH_DOMAIN}:{account_id}:{timestamp}")
}

/// Check a request timestamp against server time.
pub fn check_timestamp(timestamp: &str, now: DateTime<Utc>) -> Result<()> {
    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| AuthError::BadTimestamp(timestamp.to_string()))?
        .with_timezone(&Utc);
    let skew = (now - parsed).num_seconds().abs();
    if skew > MAX_CLOCK_SKEW_SECS {
        return Err(AuthError::StaleTimestamp);
    }
    Ok(())
}

//─────────────────────────────
//  Signature scheme seam
//─────────────────────────────

/// Abstract signature primitive: `Sign(msg, sk) → sig`,
/// `Verify(msg, sig, pk) → bool`.
pub trait SignatureScheme: Send + Sync {
    /// Verify `signature` over `message` under `public_key`.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;

    /// Sign `message` with `secret_key`. Lives on the worker/test side;
    /// the coordinator itself only verifies.
    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>>;
}

impl SignatureScheme for std::sync::Arc<dyn SignatureScheme> {
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        (**self).verify(message, signature, public_key)
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>> {
        (**self).sign(message, secret_key)
    }
}

/// Bundled Ed25519 implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};

        let key_bytes: [u8; 32] = match public_key.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let key = match VerifyingKey::from_bytes(&key_bytes) {
            Ok(k) => k,
            Err(_) => return false,
        };
        let sig = match Signature::from_slice(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };
        key.verify(message, &sig).is_ok()
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>> {
        use ed25519_dalek::{Signer, SigningKey};

        let key_bytes: [u8; 32] = secret_key.try_into().map_err(|_| AuthError::BadKey)?;
        let key = SigningKey::from_bytes(&key_bytes);
        Ok(key.sign(message).to_bytes().to_vec())
    }
}

//─────────────────────────────
//  Request verification
//─────────────────────────────

/// Verifies worker-originated requests against registered public keys.
pub struct RequestAuthenticator<S> {
    scheme: S,
}

impl<S: SignatureScheme> RequestAuthenticator<S> {
    /// Build an authenticator over the given signature scheme.
    pub fn new(scheme: S) -> Self {
        Self { scheme }
    }

    /// Full request check: timestamp window, address derivation, signature.
    pub fn verify_request(
        &self,
        account_id: &AccountId,
        timestamp: &str,
        signature_hex: &str,
        public_key: &[u8],
        now: DateTime<Utc>,
    ) -> Result<()> {
        check_timestamp(timestamp, now)?;
        if account_id_for_key(public_key) != *account_id {
            return Err(AuthError::AddressMismatch(account_id.to_string()));
        }
        let signature = hex::decode(signature_hex).map_err(|_| AuthError::BadSignature)?;
        let message = challenge_message(account_id, timestamp);
        if !self.scheme.verify(message.as_bytes(), &signature, public_key) {
            return Err(AuthError::BadSignature);
        }
        Ok(())
    }

    /// Registration check: the presented key must derive the claimed
    /// address. No signature is required because the key itself is the
    /// credential being enrolled.
    pub fn verify_registration(&self, account_id: &AccountId, public_key: &[u8]) -> Result<()> {
        if account_id_for_key(public_key) != *account_id {
            return Err(AuthError::AddressMismatch(account_id.to_string()));
        }
        Ok(())
    }
}

/// Admin-endpoint credential check (`X-Admin-Key`).
pub fn verify_admin_key(provided: Option<&str>, expected: &str) -> bool {
    provided == Some(expected)
}

/// Glob-import helper.
pub mod prelude {
    pub use super::{
        account_id_for_key, challenge_message, AuthError, Ed25519Scheme, RequestAuthenticator,
        SignatureScheme, AUTH_DOMAIN,
    };
}
