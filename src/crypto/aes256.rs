//! AES-256-GCM AEAD cipher implementation
//!
//! AES-256-GCM (Galois/Counter Mode) is an industry-standard authenticated encryption
//! algorithm that provides both confidentiality and authenticity. It offers excellent
//! performance on platforms with hardware AES acceleration (AES-NI) and is widely
//! used in TLS, IPsec, and other security protocols.

use super::Block;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use sha2::{Digest, Sha256};

/// AES-256-GCM cipher block
///
/// This implementation uses a 256-bit (32-byte) key and generates a unique
/// 96-bit (12-byte) nonce for each encryption operation. The nonce is prepended
/// to the ciphertext for decryption.
pub struct Aes256Block {
    cipher: Aes256Gcm,
}

impl Aes256Block {
    /// Creates a new AES-256-GCM cipher from a 32-byte key
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key.into());
        Self { cipher }
    }

    /// Creates a new AES-256-GCM cipher from a configuration string
    ///
    /// The key is the SHA-256 digest of the UTF-8 string, giving a full
    /// 32-byte key regardless of the input's length.
    pub fn from_string(s: &str) -> Self {
        let digest = Sha256::digest(s.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(&key)
    }

    /// Generates a random 12-byte nonce
    fn generate_nonce() -> [u8; 12] {
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

impl Block for Aes256Block {
    /// Encrypts data in-place with AES-256-GCM
    ///
    /// The encrypted output format is: [nonce(12 bytes)][ciphertext][tag(16 bytes)]
    /// The authentication tag is automatically appended by the AEAD cipher.
    fn encrypt(&self, data: &mut Vec<u8>) -> crate::Result<()> {
        let nonce_bytes = Self::generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data.as_ref())
            .map_err(|e| format!("AES-256-GCM encryption failed: {}", e))?;

        data.clear();
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);

        Ok(())
    }

    /// Decrypts data in-place with AES-256-GCM
    ///
    /// Expects input format: [nonce(12 bytes)][ciphertext][tag(16 bytes)]
    fn decrypt(&self, data: &mut Vec<u8>) -> crate::Result<()> {
        if data.len() < 28 {
            return Err("data too short for AES-256-GCM decryption".into());
        }

        let nonce = Nonce::from_slice(&data[0..12]);
        let ciphertext = &data[12..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| format!("AES-256-GCM decryption failed: {}", e))?;

        data.clear();
        data.extend_from_slice(&plaintext);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let block = Aes256Block::from_string("test-key");
        let original = b"hello mesh".to_vec();
        let mut data = original.clone();
        block.encrypt(&mut data).unwrap();
        assert_ne!(data, original);
        block.decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn tamper_fails() {
        let block = Aes256Block::from_string("test-key");
        let mut data = b"hello mesh".to_vec();
        block.encrypt(&mut data).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        assert!(block.decrypt(&mut data).is_err());
    }
}
