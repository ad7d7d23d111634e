//! Secretbox (XSalsa20-Poly1305) authenticated encryption for RTP payloads.
//!
//! The wire protocol pins a single mode (`xsalsa20_poly1305`, see
//! [`crate::payload::ENCRYPTION_MODE`]); the nonce is always the RTP header
//! zero-padded to 24 bytes ([`crate::rtp::make_nonce`]), never a counter or
//! random suffix.

use crate::error::VoiceError;
use crate::rtp::NONCE_SIZE;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Nonce, XSalsa20Poly1305};

/// Size of the shared secret key, in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the Poly1305 authentication tag appended to ciphertext.
pub const TAG_SIZE: usize = 16;

/// A secretbox encryptor/decryptor bound to one session's shared key.
#[derive(Clone)]
pub struct SecretBox {
    cipher: XSalsa20Poly1305,
}

impl SecretBox {
    /// Construct a secretbox from the 32-byte shared key delivered in the
    /// session-description payload.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: XSalsa20Poly1305::new(key.into()),
        }
    }

    /// Encrypt `plaintext` under `nonce`, returning ciphertext with a
    /// 16-byte MAC appended.
    pub fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, VoiceError> {
        self.cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| VoiceError::CodecFailure("secretbox encryption failed".to_string()))
    }

    /// Decrypt `ciphertext` under `nonce`.
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, VoiceError> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VoiceError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::{build_header, make_nonce};

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = [7u8; KEY_SIZE];
        let secretbox = SecretBox::new(&key);
        let header = build_header(1, 960, 12345);
        let nonce = make_nonce(&header);

        let plaintext = b"opus packet bytes";
        let ciphertext = secretbox.encrypt(&nonce, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = secretbox.decrypt(&nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = [7u8; KEY_SIZE];
        let secretbox = SecretBox::new(&key);
        let header = build_header(1, 960, 12345);
        let nonce = make_nonce(&header);

        let mut ciphertext = secretbox.encrypt(&nonce, b"hello").unwrap();
        *ciphertext.last_mut().unwrap() ^= 0xFF;

        let err = secretbox.decrypt(&nonce, &ciphertext).unwrap_err();
        assert!(matches!(err, VoiceError::AuthenticationFailed));
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let key = [9u8; KEY_SIZE];
        let secretbox = SecretBox::new(&key);
        let header = build_header(1, 960, 12345);
        let nonce = make_nonce(&header);
        let other_nonce = make_nonce(&build_header(2, 960, 12345));

        let ciphertext = secretbox.encrypt(&nonce, b"hello").unwrap();
        let err = secretbox.decrypt(&other_nonce, &ciphertext).unwrap_err();
        assert!(matches!(err, VoiceError::AuthenticationFailed));
    }
}
