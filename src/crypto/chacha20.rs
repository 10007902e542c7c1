//! ChaCha20-Poly1305 AEAD cipher implementation
//!
//! ChaCha20-Poly1305 is a modern authenticated encryption algorithm that provides
//! both confidentiality and authenticity. It's faster than AES on platforms without
//! hardware AES acceleration and is used in protocols like TLS 1.3 and WireGuard.

use super::Block;
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use sha2::{Digest, Sha256};

/// ChaCha20-Poly1305 cipher block
///
/// This implementation uses a 256-bit (32-byte) key and generates a unique
/// 96-bit (12-byte) nonce for each encryption operation. The nonce is prepended
/// to the ciphertext for decryption.
pub struct ChaCha20Poly1305Block {
    cipher: ChaCha20Poly1305,
}

impl ChaCha20Poly1305Block {
    /// Creates a new ChaCha20-Poly1305 cipher from a 32-byte key
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new(key.into());
        Self { cipher }
    }

    /// Creates a new ChaCha20-Poly1305 cipher from a configuration string
    ///
    /// The key is the SHA-256 digest of the UTF-8 string.
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

impl Block for ChaCha20Poly1305Block {
    /// Encrypts data in-place with ChaCha20-Poly1305
    ///
    /// The encrypted output format is: [nonce(12 bytes)][ciphertext][tag(16 bytes)]
    fn encrypt(&self, data: &mut Vec<u8>) -> crate::Result<()> {
        let nonce_bytes = Self::generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data.as_ref())
            .map_err(|e| format!("ChaCha20-Poly1305 encryption failed: {}", e))?;

        data.clear();
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);

        Ok(())
    }

    /// Decrypts data in-place with ChaCha20-Poly1305
    ///
    /// Expects input format: [nonce(12 bytes)][ciphertext][tag(16 bytes)]
    fn decrypt(&self, data: &mut Vec<u8>) -> crate::Result<()> {
        if data.len() < 28 {
            return Err("data too short for ChaCha20-Poly1305 decryption".into());
        }

        let nonce = Nonce::from_slice(&data[0..12]);
        let ciphertext = &data[12..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| format!("ChaCha20-Poly1305 decryption failed: {}", e))?;

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
        let cipher = ChaCha20Poly1305Block::from_string("my_secret_password");
        let original = b"Secret message".to_vec();
        let mut data = original.clone();

        cipher.encrypt(&mut data).unwrap();
        assert_ne!(data, original);
        assert!(data.len() > original.len());

        cipher.decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn authentication_failure() {
        let cipher = ChaCha20Poly1305Block::from_string("correct_key");
        let mut data = b"Test data".to_vec();
        cipher.encrypt(&mut data).unwrap();
        data[15] ^= 0xFF;
        assert!(cipher.decrypt(&mut data).is_err());
    }

    #[test]
    fn nonce_uniqueness() {
        let cipher = ChaCha20Poly1305Block::from_string("test_key");
        let original = b"Same plaintext".to_vec();

        let mut data1 = original.clone();
        let mut data2 = original.clone();

        cipher.encrypt(&mut data1).unwrap();
        cipher.encrypt(&mut data2).unwrap();

        assert_ne!(data1, data2);
    }
}
