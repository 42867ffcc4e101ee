//! Curve25519 keys in their base64 text form

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw key length in bytes
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key is not valid base64")]
    Encoding,

    #[error("Key must be 32 bytes, got {0}")]
    Length(usize),
}

/// A 32-byte public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let decoded = STANDARD.decode(text.trim()).map_err(|_| KeyError::Encoding)?;
        let bytes: [u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Length(decoded.len()))?;
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_base64())
    }
}

/// A private or preshared key. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Key);

impl SecretKey {
    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        Key::from_base64(text).map(Self)
    }

    pub fn expose(&self) -> &Key {
        &self.0
    }
}

impl FromStr for SecretKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";

    #[test]
    fn test_key_base64_round_trip() {
        let key = Key::from_base64(SAMPLE).unwrap();
        assert_eq!(key.to_base64(), SAMPLE);
    }

    #[test]
    fn test_key_rejects_wrong_length() {
        // "short" encoded
        assert_eq!(Key::from_base64("c2hvcnQ="), Err(KeyError::Length(5)));
    }

    #[test]
    fn test_key_rejects_garbage() {
        assert_eq!(Key::from_base64("not base64!"), Err(KeyError::Encoding));
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let secret = SecretKey::from_base64(SAMPLE).unwrap();
        let printed = format!("{:?}", secret);
        assert!(!printed.contains(SAMPLE));
        assert!(printed.contains("redacted"));
    }
}
