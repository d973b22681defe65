//! At-rest encryption for chat messages.
//!
//! The hub holds one process-wide [`ChatCipher`]. Every sealed message gets a
//! fresh random nonce which is stored in front of the ciphertext, so a record
//! is self-contained: `nonce (24) || XChaCha20-Poly1305 ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{KDF_CONTEXT_CHAT_KEY, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Symmetric cipher used for chat messages at rest.
#[derive(Clone)]
pub struct ChatCipher {
    key: SymmetricKey,
}

impl ChatCipher {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    /// Fresh random key, valid for this process only.
    pub fn ephemeral() -> Self {
        Self::new(generate_symmetric_key())
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|_| CryptoError::InvalidKeyLength)?;
        let key: SymmetricKey = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self::new(key))
    }

    // BLAKE3 KDF with domain separation
    pub fn from_passphrase(passphrase: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_CHAT_KEY);
        hasher.update(passphrase);
        let hash = hasher.finalize();
        Self::new(*hash.as_bytes())
    }

    /// Returns nonce || ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce_bytes = generate_nonce();
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new((&self.key).into());

        cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Decrypt a sealed chat body back into text.
    pub fn open_text(&self, sealed: &[u8]) -> Result<String, CryptoError> {
        let bytes = self.open(sealed)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for ChatCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChatCipher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_text() {
        let cipher = ChatCipher::ephemeral();
        let sealed = cipher.seal("see you at noon".as_bytes()).unwrap();

        assert_ne!(&sealed[NONCE_SIZE..], b"see you at noon");
        assert_eq!(cipher.open_text(&sealed).unwrap(), "see you at noon");
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let cipher = ChatCipher::ephemeral();
        let a = cipher.seal(b"hi").unwrap();
        let b = cipher.seal(b"hi").unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        // nonce (24) + ciphertext (2 + 16 tag)
        assert_eq!(a.len(), NONCE_SIZE + 2 + 16);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = ChatCipher::ephemeral().seal(b"secret").unwrap();
        assert!(ChatCipher::ephemeral().open(&sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = ChatCipher::ephemeral();
        let mut sealed = cipher.seal(b"important").unwrap();
        let len = sealed.len();
        sealed[len - 1] ^= 0xFF;

        assert!(cipher.open(&sealed).is_err());
    }

    #[test]
    fn test_short_input_fails() {
        assert!(ChatCipher::ephemeral().open(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_passphrase_key_is_deterministic() {
        let a = ChatCipher::from_passphrase(b"correct horse");
        let b = ChatCipher::from_passphrase(b"correct horse");

        let sealed = a.seal(b"hello").unwrap();
        assert_eq!(b.open(&sealed).unwrap(), b"hello");
        assert!(ChatCipher::from_passphrase(b"other").open(&sealed).is_err());
    }

    #[test]
    fn test_from_hex() {
        let cipher = ChatCipher::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(cipher.key, [0xab; 32]);

        assert!(ChatCipher::from_hex("abcd").is_err());
        assert!(ChatCipher::from_hex(&"zz".repeat(32)).is_err());
    }
}
