//! AES-256-GCM cipher for the overload side channel
//!
//! The overload policy list travels in the `x-overload` header, encrypted with
//! a key personal to the client:
//! - AES-256-GCM with a random 96-bit nonce per message
//! - Key = SHA-256 of the client IP
//! - Wire format: base64([nonce: 12 bytes][ciphertext][tag: 16 bytes])

use crate::error::{IamError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Encryption key (32 bytes for AES-256)
pub type CipherKey = [u8; 32];

/// Nonce size for AES-GCM (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Symmetric text cipher
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// `None` when the input is not a valid message for this key
    fn decrypt(&self, ciphertext: &str) -> Option<String>;
}

/// AES-256-GCM cipher with a personal key
#[derive(Clone)]
pub struct AesGcmCipher {
    key: CipherKey,
}

impl AesGcmCipher {
    pub fn new(key: CipherKey) -> Self {
        AesGcmCipher { key }
    }

    /// Derive the key from personal material (the client IP)
    pub fn personal(material: &str) -> Self {
        let digest = Sha256::digest(material.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(key)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new((&self.key).into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| IamError::Cipher(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str) -> Option<String> {
        let sealed = STANDARD.decode(ciphertext.trim()).ok()?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return None;
        }

        let cipher = Aes256Gcm::new((&self.key).into());
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let plaintext = cipher.decrypt(nonce, &sealed[NONCE_SIZE..]).ok()?;

        String::from_utf8(plaintext).ok()
    }
}

/// Encodes the overload list for the `x-overload` header and back
#[derive(Clone)]
pub struct OverloadCodec {
    cipher: Arc<dyn Cipher>,
}

impl OverloadCodec {
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        OverloadCodec { cipher }
    }

    /// Codec keyed by the client IP
    pub fn for_client(client_ip: &str) -> Self {
        Self::new(Arc::new(AesGcmCipher::personal(client_ip)))
    }

    pub fn encode(&self, policies: &[String]) -> Result<String> {
        let json = serde_json::to_string(policies)?;
        self.cipher.encrypt(&json)
    }

    /// Decode a header value. Accepts a JSON array, or an object whose values
    /// are taken in order. Non-string entries are dropped.
    pub fn decode(&self, header: &str) -> Option<Vec<String>> {
        let json = self.cipher.decrypt(header)?;
        let values = match serde_json::from_str::<Value>(&json).ok()? {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => return None,
        };

        Some(
            values
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_key_is_deterministic() {
        let a = AesGcmCipher::personal("192.0.2.10");
        let b = AesGcmCipher::personal("192.0.2.10");
        assert_eq!(a.key, b.key);
        assert_ne!(a.key, AesGcmCipher::personal("192.0.2.11").key);
    }

    #[test]
    fn test_encryption_decryption() {
        let cipher = AesGcmCipher::personal("192.0.2.10");
        let sealed = cipher.encrypt("[\"a/b/read\"]").unwrap();

        assert_ne!(sealed, "[\"a/b/read\"]");
        assert_eq!(cipher.decrypt(&sealed).as_deref(), Some("[\"a/b/read\"]"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmCipher::personal("192.0.2.10").encrypt("secret").unwrap();
        assert!(AesGcmCipher::personal("198.51.100.1").decrypt(&sealed).is_none());
    }

    #[test]
    fn test_tampered_data_fails() {
        let cipher = AesGcmCipher::personal("192.0.2.10");
        let mut sealed = STANDARD.decode(cipher.encrypt("secret").unwrap()).unwrap();
        sealed[NONCE_SIZE + 2] ^= 0xFF;
        assert!(cipher.decrypt(&STANDARD.encode(sealed)).is_none());
    }

    #[test]
    fn test_garbage_input() {
        let cipher = AesGcmCipher::personal("192.0.2.10");
        assert!(cipher.decrypt("").is_none());
        assert!(cipher.decrypt("not base64 !!").is_none());
        assert!(cipher.decrypt(&STANDARD.encode([0u8; 8])).is_none());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let cipher = AesGcmCipher::personal("192.0.2.10");
        let first = cipher.encrypt("same").unwrap();
        let second = cipher.encrypt("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_overload_codec() {
        let codec = OverloadCodec::for_client("192.0.2.10");
        let policies = vec!["z/z/z".to_string(), "a/b/read".to_string()];

        let header = codec.encode(&policies).unwrap();
        assert_eq!(codec.decode(&header), Some(policies));
    }

    #[test]
    fn test_overload_codec_object_and_mixed_values() {
        let cipher = Arc::new(AesGcmCipher::personal("192.0.2.10"));
        let codec = OverloadCodec::new(cipher.clone());

        let header = cipher.encrypt(r#"{"0": "a/b/read", "1": 7}"#).unwrap();
        assert_eq!(codec.decode(&header), Some(vec!["a/b/read".to_string()]));

        let header = cipher.encrypt("\"scalar\"").unwrap();
        assert!(codec.decode(&header).is_none());
    }
}
