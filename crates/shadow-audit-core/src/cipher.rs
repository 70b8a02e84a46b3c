//! Deterministic, reversible encryption of SQL identifiers
//!
//! Table and column names are encrypted with AES-256-CBC under a fixed
//! all-zero IV, so the same plaintext and key always give the same output.
//! That determinism is what lets every operation recompute a shadow table's
//! name from the original table name instead of storing it.
//!
//! The ciphertext is encoded as unpadded, lower-case RFC 4648 base32. Its
//! alphabet (`a-z`, `2-7`) is already identifier-safe, so no character is
//! ever substituted and [`NameCipher::decrypt_name`] is exact for every
//! identifier [`NameCipher::encrypt_name`] produces. When the encoding starts
//! with a digit the identifier gets the `a_` prefix; base32 never emits `_`,
//! so the prefix is stripped unambiguously on the way back.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use data_encoding::BASE32_NOPAD;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;
const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Prepended when an encoded identifier would otherwise start with a digit.
pub const SAFE_PREFIX: &str = "a_";

/// Longest plaintext whose encrypted identifier still fits PostgreSQL's 63-byte limit.
///
/// 31 bytes pad to 32, which encode to 52 base32 characters (54 with [`SAFE_PREFIX`]).
pub const MAX_NAME_PLAINTEXT_BYTES: usize = 31;

/// Name cipher failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key is empty")]
    EmptyKey,

    #[error("cipher initialization failed: {0}")]
    CipherInit(String),

    #[error("identifier '{0}' is not a valid encrypted name")]
    InvalidEncoding(String),

    #[error("identifier could not be decrypted with the current key")]
    Decrypt,

    #[error("decrypted identifier is not valid UTF-8")]
    InvalidUtf8,
}

/// The secret shared by name encryption and the database's value cipher.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    secret: String,
}

impl EncryptionKey {
    pub fn new(secret: impl Into<String>) -> Result<Self, CipherError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(CipherError::EmptyKey);
        }
        Ok(Self { secret })
    }

    /// The raw secret, as handed to `pgp_sym_encrypt`/`pgp_sym_decrypt`.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    fn derive(&self) -> [u8; 32] {
        Sha256::digest(self.secret.as_bytes()).into()
    }

    /// Short, non-reversible version tag for this key.
    ///
    /// Hashes the derived cipher key again, so the tag reveals nothing usable
    /// against either the secret or the AES key.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.derive());
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Encrypts and decrypts identifiers under one key.
#[derive(Clone)]
pub struct NameCipher {
    key: [u8; 32],
}

impl NameCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self { key: key.derive() }
    }

    /// Encrypt `plaintext` into an identifier matching `[A-Za-z][A-Za-z0-9_]*`.
    pub fn encrypt_name(&self, plaintext: &str) -> Result<String, CipherError> {
        let encryptor = Aes256CbcEnc::new_from_slices(&self.key, &ZERO_IV)
            .map_err(|e| CipherError::CipherInit(e.to_string()))?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(to_identifier(&BASE32_NOPAD.encode(&ciphertext)))
    }

    /// Invert [`encrypt_name`](Self::encrypt_name).
    pub fn decrypt_name(&self, identifier: &str) -> Result<String, CipherError> {
        let body = identifier.strip_prefix(SAFE_PREFIX).unwrap_or(identifier);
        let ciphertext = BASE32_NOPAD
            .decode(body.to_ascii_uppercase().as_bytes())
            .map_err(|_| CipherError::InvalidEncoding(identifier.to_string()))?;

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidEncoding(identifier.to_string()));
        }

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, &ZERO_IV)
            .map_err(|e| CipherError::CipherInit(e.to_string()))?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

/// Lower-case, replace anything outside `[A-Za-z0-9_]` and force an alphabetic first character.
///
/// For base32 input the replacement never fires; it stays so the identifier
/// grammar holds regardless of the encoding.
fn to_identifier(encoded: &str) -> String {
    let sanitized: String = encoded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    match sanitized.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => sanitized,
        _ => format!("{}{}", SAFE_PREFIX, sanitized),
    }
}

/// Encrypt a single name with `key`.
pub fn encrypt_name(plaintext: &str, key: &EncryptionKey) -> Result<String, CipherError> {
    NameCipher::new(key).encrypt_name(plaintext)
}

/// Decrypt a single identifier with `key`.
pub fn decrypt_name(identifier: &str, key: &EncryptionKey) -> Result<String, CipherError> {
    NameCipher::new(key).decrypt_name(identifier)
}

/// True when `s` matches `[A-Za-z][A-Za-z0-9_]*`.
pub fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key() -> EncryptionKey {
        EncryptionKey::new("correct horse battery staple").unwrap()
    }

    #[test]
    fn test_empty_key_fails_closed() {
        assert_eq!(EncryptionKey::new(""), Err(CipherError::EmptyKey));
        assert_eq!(EncryptionKey::new("   "), Err(CipherError::EmptyKey));
    }

    #[test]
    fn test_encrypt_is_deterministic() {
        let a = encrypt_name("orders", &key()).unwrap();
        let b = encrypt_name("orders", &key()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, "orders");
    }

    #[test]
    fn test_different_keys_give_different_names() {
        let other = EncryptionKey::new("another secret").unwrap();
        assert_ne!(
            encrypt_name("orders", &key()).unwrap(),
            encrypt_name("orders", &other).unwrap()
        );
    }

    #[test]
    fn test_output_length_follows_block_count() {
        // one block -> 26 chars, two blocks -> 52 chars (plus an optional prefix)
        let one = encrypt_name("id", &key()).unwrap();
        let two = encrypt_name(&"x".repeat(MAX_NAME_PLAINTEXT_BYTES), &key()).unwrap();
        assert!(one.trim_start_matches(SAFE_PREFIX).len() == 26);
        assert!(two.trim_start_matches(SAFE_PREFIX).len() == 52);
        assert!(two.len() <= 63);
    }

    #[test]
    fn test_decrypt_rejects_foreign_identifiers() {
        let cipher = NameCipher::new(&key());
        assert!(matches!(
            cipher.decrypt_name("orders"),
            Err(CipherError::InvalidEncoding(_))
        ));
        assert!(cipher.decrypt_name("").is_err());
    }

    #[test]
    fn test_decrypt_with_wrong_key_does_not_recover_plaintext() {
        let encrypted = encrypt_name("customer_email", &key()).unwrap();
        let other = EncryptionKey::new("not the key").unwrap();
        let result = decrypt_name(&encrypted, &other);
        assert_ne!(result, Ok("customer_email".to_string()));
    }

    #[test]
    fn test_prefix_applied_to_leading_digit() {
        assert_eq!(to_identifier("2abc"), "a_2abc");
        assert_eq!(to_identifier("ABC"), "abc");
        assert_eq!(to_identifier("a+b/c="), "a_b_c_");
    }

    #[test]
    fn test_fingerprint_is_stable_and_hides_secret() {
        let fp = key().fingerprint();
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, key().fingerprint());
        assert!(!format!("{:?}", key()).contains("horse"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_alphanumeric(s in "[A-Za-z0-9]{1,31}") {
            let cipher = NameCipher::new(&key());
            let encrypted = cipher.encrypt_name(&s).unwrap();
            prop_assert_eq!(cipher.decrypt_name(&encrypted).unwrap(), s);
        }

        #[test]
        fn prop_roundtrip_any_text(s in "\\PC{0,12}") {
            let cipher = NameCipher::new(&key());
            let encrypted = cipher.encrypt_name(&s).unwrap();
            prop_assert_eq!(cipher.decrypt_name(&encrypted).unwrap(), s);
        }

        #[test]
        fn prop_output_is_safe_identifier(s in "\\PC{0,40}") {
            let encrypted = encrypt_name(&s, &key()).unwrap();
            prop_assert!(is_safe_identifier(&encrypted), "{}", encrypted);
        }

        #[test]
        fn prop_distinct_inputs_distinct_outputs(a in "[a-z_]{1,20}", b in "[a-z_]{1,20}") {
            prop_assume!(a != b);
            let cipher = NameCipher::new(&key());
            prop_assert_ne!(cipher.encrypt_name(&a).unwrap(), cipher.encrypt_name(&b).unwrap());
        }
    }
}
