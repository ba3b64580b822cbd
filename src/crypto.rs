//! Sealing of stored dealer database credentials.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, Nonce, XSalsa20Poly1305};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    InvalidKey(String),
    Malformed(String),
    Aead,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherError::InvalidKey(msg) => write!(f, "invalid encryption key: {}", msg),
            CipherError::Malformed(msg) => write!(f, "malformed ciphertext: {}", msg),
            CipherError::Aead => f.write_str("crypto failure"),
        }
    }
}

impl std::error::Error for CipherError {}

impl From<CipherError> for crate::errors::AppError {
    fn from(err: CipherError) -> Self {
        crate::errors::AppError::InternalError(err.to_string())
    }
}

pub trait CredentialCipher: Send + Sync {
    /// Seal `plaintext` into a storable string.
    fn seal(&self, plaintext: &str) -> Result<String, CipherError>;

    fn open(&self, sealed: &str) -> Result<String, CipherError>;
}

/// XSalsa20-Poly1305 secretbox, stored as hex `nonce || ciphertext`.
#[derive(Clone)]
pub struct SecretBoxCipher {
    key: [u8; KEY_LEN],
}

impl SecretBoxCipher {
    /// Accepts `hex:<64 hex chars>`, bare 64 hex chars, or any other
    /// passphrase, which is stretched to a key with SHA-256.
    pub fn from_key_material(value: &str) -> Result<Self, CipherError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CipherError::InvalidKey("key is empty".to_string()));
        }

        let bytes = if let Some(hex_value) = trimmed.strip_prefix("hex:") {
            hex::decode(hex_value).map_err(|e| CipherError::InvalidKey(e.to_string()))?
        } else if is_hex_key(trimmed) {
            hex::decode(trimmed).map_err(|e| CipherError::InvalidKey(e.to_string()))?
        } else {
            tracing::warn!("DB_ENCRYPTION_KEY is not a hex key, deriving one with SHA-256");
            Sha256::digest(trimmed.as_bytes()).to_vec()
        };

        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }
}

fn is_hex_key(value: &str) -> bool {
    value.len() == KEY_LEN * 2 && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl CredentialCipher for SecretBoxCipher {
    fn seal(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Aead)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    fn open(&self, sealed: &str) -> Result<String, CipherError> {
        let bytes = hex::decode(sealed).map_err(|e| CipherError::Malformed(e.to_string()))?;
        if bytes.len() < NONCE_LEN {
            return Err(CipherError::Malformed(format!(
                "{} bytes is shorter than the nonce",
                bytes.len()
            )));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Aead)?;
        String::from_utf8(plaintext).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "hex:000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_seal_then_open() {
        let cipher = SecretBoxCipher::from_key_material(KEY).unwrap();
        let sealed = cipher.seal("s3cret-pass").unwrap();

        assert!(!sealed.contains("s3cret-pass"));
        assert_eq!(cipher.open(&sealed).unwrap(), "s3cret-pass");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let cipher = SecretBoxCipher::from_key_material(KEY).unwrap();
        assert_ne!(cipher.seal("same").unwrap(), cipher.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails_to_open() {
        let sealed = SecretBoxCipher::from_key_material(KEY)
            .unwrap()
            .seal("pw")
            .unwrap();
        let other = SecretBoxCipher::from_key_material("another passphrase").unwrap();
        assert_eq!(other.open(&sealed), Err(CipherError::Aead));
    }

    #[test]
    fn test_short_hex_key_rejected() {
        assert!(matches!(
            SecretBoxCipher::from_key_material("hex:abcd"),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(SecretBoxCipher::from_key_material("   ").is_err());
    }

    #[test]
    fn test_truncated_ciphertext_is_malformed() {
        let cipher = SecretBoxCipher::from_key_material(KEY).unwrap();
        assert!(matches!(cipher.open("abcd"), Err(CipherError::Malformed(_))));
    }
}
