//! AEAD ciphers: AES-GCM and ChaCha20-Poly1305.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aead::consts::U12;
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use pssl_types::CryptoError;

pub const AEAD_TAG_LEN: usize = 16;
pub const AEAD_NONCE_LEN: usize = 12;

/// Supported AEAD algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlg {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlg {
    pub const fn key_len(self) -> usize {
        match self {
            AeadAlg::Aes128Gcm => 16,
            AeadAlg::Aes256Gcm | AeadAlg::ChaCha20Poly1305 => 32,
        }
    }
}

/// A keyed AEAD instance.
#[derive(Clone)]
pub enum AeadCipher {
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
    ChaCha20Poly1305(ChaCha20Poly1305),
}

impl AeadCipher {
    pub fn new(alg: AeadAlg, key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != alg.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: alg.key_len(),
                got: key.len(),
            });
        }
        let bad_key = |_| CryptoError::InvalidKey;
        Ok(match alg {
            AeadAlg::Aes128Gcm => AeadCipher::Aes128Gcm(Aes128Gcm::new_from_slice(key).map_err(bad_key)?),
            AeadAlg::Aes256Gcm => AeadCipher::Aes256Gcm(Aes256Gcm::new_from_slice(key).map_err(bad_key)?),
            AeadAlg::ChaCha20Poly1305 => {
                AeadCipher::ChaCha20Poly1305(ChaCha20Poly1305::new_from_slice(key).map_err(bad_key)?)
            }
        })
    }

    /// Encrypt, returning ciphertext followed by the 16-byte tag.
    pub fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != AEAD_NONCE_LEN {
            return Err(CryptoError::InvalidIvLength);
        }
        let nonce = Nonce::<U12>::from_slice(nonce);
        let payload = Payload { msg: plaintext, aad };
        match self {
            AeadCipher::Aes128Gcm(c) => c.encrypt(nonce, payload),
            AeadCipher::Aes256Gcm(c) => c.encrypt(nonce, payload),
            AeadCipher::ChaCha20Poly1305(c) => c.encrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::InvalidArg)
    }

    /// Authenticate and decrypt `ciphertext || tag`.
    pub fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != AEAD_NONCE_LEN {
            return Err(CryptoError::InvalidIvLength);
        }
        if ciphertext.len() < AEAD_TAG_LEN {
            return Err(CryptoError::AeadTagVerifyFail);
        }
        let nonce = Nonce::<U12>::from_slice(nonce);
        let payload = Payload { msg: ciphertext, aad };
        match self {
            AeadCipher::Aes128Gcm(c) => c.decrypt(nonce, payload),
            AeadCipher::Aes256Gcm(c) => c.decrypt(nonce, payload),
            AeadCipher::ChaCha20Poly1305(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::AeadTagVerifyFail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_gcm_empty_plaintext_vector() {
        // GCM test case 1: zero key, zero IV, empty plaintext.
        let c = AeadCipher::new(AeadAlg::Aes128Gcm, &[0u8; 16]).unwrap();
        let out = c.seal(&[0u8; 12], &[], &[]).unwrap();
        assert_eq!(out, hex("58e2fccefa7e3061367f1d57a4e7455a"));
    }

    #[test]
    fn test_chacha_rfc8439_vector() {
        let key = hex("808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f");
        let nonce = hex("070000004041424344454647");
        let aad = hex("50515253c0c1c2c3c4c5c6c7");
        let pt = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";
        let c = AeadCipher::new(AeadAlg::ChaCha20Poly1305, &key).unwrap();
        let out = c.seal(&nonce, &aad, pt).unwrap();
        assert_eq!(&out[out.len() - 16..], hex("1ae10b594f09e26a7e902ecbd0600691").as_slice());
        assert_eq!(c.open(&nonce, &aad, &out).unwrap(), pt.to_vec());
    }

    #[test]
    fn test_tamper_fails_open() {
        let c = AeadCipher::new(AeadAlg::Aes256Gcm, &[7u8; 32]).unwrap();
        let mut ct = c.seal(&[1u8; 12], b"hdr", b"payload").unwrap();
        ct[0] ^= 1;
        assert_eq!(c.open(&[1u8; 12], b"hdr", &ct), Err(CryptoError::AeadTagVerifyFail));
        assert!(c.open(&[1u8; 12], b"hdr", &ct[..10]).is_err());
        assert!(AeadCipher::new(AeadAlg::Aes128Gcm, &[0u8; 32]).is_err());
    }
}
