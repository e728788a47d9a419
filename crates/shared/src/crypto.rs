//! Cryptographic utilities: hashing, credential encryption and OAuth state signing.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Required key length for the credential vault (AES-256).
pub const VAULT_KEY_LEN: usize = 32;

/// IV length for AES-CBC.
const IV_LEN: usize = 16;

/// Lifetime of an OAuth state token.
pub const OAUTH_STATE_TTL_MS: i64 = 10 * 60 * 1000;

/// Tolerated clock skew for state tokens stamped slightly in the future.
const OAUTH_STATE_SKEW_MS: i64 = 30 * 1000;

/// Error type for cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = keyed_mac(key);
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

/// Verifies an HMAC-SHA256 tag over `parts` in constant time.
///
/// A tag of the wrong length is rejected without comparing contents.
pub fn verify_hmac_sha256(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> bool {
    let mut mac = keyed_mac(key);
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).is_ok()
}

/// Generates a random opaque identifier of `len_bytes` bytes, hex encoded.
pub fn random_hex(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn keyed_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

/// Symmetric vault for OAuth credentials at rest.
///
/// Tokens are AES-256-CBC encrypted with a fresh random IV per call and
/// serialized as `hex(iv):hex(ciphertext)` so decryption is self-describing.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; VAULT_KEY_LEN],
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialVault {
    /// Creates a vault from a hex-encoded 32-byte key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let trimmed = key_hex.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::Configuration(
                "encryption key is not set".to_string(),
            ));
        }
        let bytes = hex::decode(trimmed).map_err(|_| {
            CryptoError::Configuration("encryption key must be hex encoded".to_string())
        })?;
        Self::from_bytes(&bytes)
    }

    /// Creates a vault from raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; VAULT_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::Configuration(format!(
                "encryption key must be exactly {} bytes, got {}",
                VAULT_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Encrypts `plaintext` into an `iv:ciphertext` token.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }

    /// Decrypts a token produced by [`CredentialVault::encrypt`].
    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let (iv_hex, ciphertext_hex) = token
            .split_once(':')
            .ok_or_else(|| CryptoError::Decryption("missing IV separator".to_string()))?;

        let iv: [u8; IV_LEN] = hex::decode(iv_hex)
            .map_err(|_| CryptoError::Decryption("IV is not hex".to_string()))?
            .try_into()
            .map_err(|_| CryptoError::Decryption("IV has wrong length".to_string()))?;
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|_| CryptoError::Decryption("ciphertext is not hex".to_string()))?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::Decryption("bad padding".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".to_string()))
    }

    /// Derives a purpose-bound subkey from the vault key.
    pub fn derive_key(&self, label: &str) -> Vec<u8> {
        hmac_sha256(&self.key, &[label.as_bytes()])
    }
}

/// Issues and validates anti-CSRF state tokens for the OAuth redirect flow.
///
/// Format: `timestamp.nonce.signature`, where the timestamp is Unix
/// milliseconds and the signature is hex HMAC-SHA256 over `timestamp.nonce`.
#[derive(Clone)]
pub struct OAuthStateSigner {
    key: Vec<u8>,
    ttl_ms: i64,
}

impl std::fmt::Debug for OAuthStateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStateSigner")
            .field("ttl_ms", &self.ttl_ms)
            .finish()
    }
}

impl OAuthStateSigner {
    /// Creates a signer keyed from the vault's key material.
    pub fn from_vault(vault: &CredentialVault) -> Self {
        Self::new(vault.derive_key("oauth-state"))
    }

    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            ttl_ms: OAUTH_STATE_TTL_MS,
        }
    }

    pub fn issue(&self) -> String {
        self.issue_at(Utc::now().timestamp_millis())
    }

    /// Issues a state token stamped with `now_ms`.
    pub fn issue_at(&self, now_ms: i64) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let payload = format!("{}.{}", now_ms, hex::encode(nonce));
        let signature = hex::encode(hmac_sha256(&self.key, &[payload.as_bytes()]));
        format!("{}.{}", payload, signature)
    }

    pub fn validate(&self, state: &str) -> bool {
        self.validate_at(state, Utc::now().timestamp_millis())
    }

    /// Validates `state` against the clock value `now_ms`. Never errors.
    pub fn validate_at(&self, state: &str, now_ms: i64) -> bool {
        let parts: Vec<&str> = state.split('.').collect();
        let [timestamp, nonce, signature] = parts.as_slice() else {
            return false;
        };
        if timestamp.is_empty() || nonce.is_empty() || signature.is_empty() {
            return false;
        }

        let Ok(issued_ms) = timestamp.parse::<i64>() else {
            return false;
        };
        let age = now_ms.saturating_sub(issued_ms);
        if age > self.ttl_ms || age < -OAUTH_STATE_SKEW_MS {
            return false;
        }

        let Ok(tag) = hex::decode(signature) else {
            return false;
        };
        let payload = format!("{}.{}", timestamp, nonce);
        verify_hmac_sha256(&self.key, &[payload.as_bytes()], &tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn vault() -> CredentialVault {
        CredentialVault::from_hex(KEY_HEX).unwrap()
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_hmac_verify_rejects_wrong_length() {
        let tag = hmac_sha256(b"key", &[b"a", b"b"]);
        assert!(verify_hmac_sha256(b"key", &[b"ab"], &tag));
        assert!(!verify_hmac_sha256(b"key", &[b"ab"], &tag[..31]));
        assert!(!verify_hmac_sha256(b"other", &[b"ab"], &tag));
    }

    #[test]
    fn test_vault_round_trip() {
        let vault = vault();
        let token = vault.encrypt("EAAAl-access-token");
        assert_eq!(vault.decrypt(&token).unwrap(), "EAAAl-access-token");
    }

    #[test]
    fn test_vault_token_format() {
        let token = vault().encrypt("secret");
        let (iv, ciphertext) = token.split_once(':').unwrap();
        assert_eq!(iv.len(), 32);
        assert_eq!(ciphertext.len() % 32, 0);
        assert!(!token.contains("secret"));
    }

    #[test]
    fn test_vault_fresh_iv_per_call() {
        let vault = vault();
        assert_ne!(vault.encrypt("same"), vault.encrypt("same"));
    }

    #[test]
    fn test_vault_rejects_missing_key() {
        assert!(matches!(
            CredentialVault::from_hex(""),
            Err(CryptoError::Configuration(_))
        ));
    }

    #[test]
    fn test_vault_rejects_wrong_key_length() {
        let result = CredentialVault::from_hex("0011223344");
        match result {
            Err(CryptoError::Configuration(msg)) => assert!(msg.contains("32 bytes")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_vault_rejects_non_hex_key() {
        assert!(CredentialVault::from_hex(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_vault_decrypt_malformed_tokens() {
        let vault = vault();
        assert!(vault.decrypt("no-separator").is_err());
        assert!(vault.decrypt("zz:00").is_err());
        assert!(vault.decrypt("0011:00112233445566778899aabbccddeeff").is_err());

        let other = CredentialVault::from_bytes(&[7u8; 32]).unwrap();
        let token = vault.encrypt("secret");
        match other.decrypt(&token) {
            Ok(plaintext) => assert_ne!(plaintext, "secret"),
            Err(err) => assert!(matches!(err, CryptoError::Decryption(_))),
        }
    }

    #[test]
    fn test_vault_debug_redacts_key() {
        assert!(format!("{:?}", vault()).contains("REDACTED"));
    }

    #[test]
    fn test_state_round_trip() {
        let signer = OAuthStateSigner::from_vault(&vault());
        let state = signer.issue();
        assert_eq!(state.split('.').count(), 3);
        assert!(signer.validate(&state));
    }

    #[test]
    fn test_state_expires_after_ttl() {
        let signer = OAuthStateSigner::from_vault(&vault());
        let now = 1_700_000_000_000;
        let state = signer.issue_at(now - 11 * 60 * 1000);
        assert!(!signer.validate_at(&state, now));

        let fresh = signer.issue_at(now - 9 * 60 * 1000);
        assert!(signer.validate_at(&fresh, now));
    }

    #[test]
    fn test_state_rejects_future_timestamp() {
        let signer = OAuthStateSigner::from_vault(&vault());
        let now = 1_700_000_000_000;
        let state = signer.issue_at(now + 5 * 60 * 1000);
        assert!(!signer.validate_at(&state, now));
    }

    #[test]
    fn test_state_rejects_malformed() {
        let signer = OAuthStateSigner::from_vault(&vault());
        assert!(!signer.validate(""));
        assert!(!signer.validate("a.b"));
        assert!(!signer.validate("a.b.c.d"));
        assert!(!signer.validate("..."));
        assert!(!signer.validate("notanumber.abcd.ef01"));
        assert!(!signer.validate(&format!("{}.abcd.nothex", Utc::now().timestamp_millis())));
    }

    #[test]
    fn test_state_rejects_tampered_signature() {
        let signer = OAuthStateSigner::from_vault(&vault());
        let state = signer.issue();
        let (payload, signature) = state.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = signature.chars().collect();
        chars[0] = if chars[0] == 'a' { 'b' } else { 'a' };
        let tampered = format!("{}.{}", payload, chars.into_iter().collect::<String>());
        assert!(!signer.validate(&tampered));
    }

    #[test]
    fn test_state_from_other_key_rejected() {
        let signer = OAuthStateSigner::from_vault(&vault());
        let other = OAuthStateSigner::new(b"different".to_vec());
        assert!(!signer.validate(&other.issue()));
    }

    #[test]
    fn test_random_hex() {
        let a = random_hex(16);
        let b = random_hex(16);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
