//! AES in CBC mode, built on the `aes` block cipher.
//!
//! Padding is the record layer's business; these functions only accept
//! whole blocks.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256, Block};
use pssl_types::CryptoError;

pub const AES_BLOCK_SIZE: usize = 16;

/// An expanded AES key.
#[derive(Clone)]
pub enum AesCbc {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesCbc {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        match key.len() {
            16 => Aes128::new_from_slice(key).map(AesCbc::Aes128),
            32 => Aes256::new_from_slice(key).map(AesCbc::Aes256),
            got => {
                return Err(CryptoError::InvalidKeyLength {
                    expected: 16,
                    got,
                })
            }
        }
        .map_err(|_| CryptoError::InvalidKey)
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            AesCbc::Aes128(c) => c.encrypt_block(block),
            AesCbc::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            AesCbc::Aes128(c) => c.decrypt_block(block),
            AesCbc::Aes256(c) => c.decrypt_block(block),
        }
    }

    /// Encrypt `data` in place. Returns the last ciphertext block, which
    /// chains into the next record for TLS 1.0.
    pub fn encrypt(&self, iv: &[u8], data: &mut [u8]) -> Result<[u8; AES_BLOCK_SIZE], CryptoError> {
        let mut chain = check(iv, data)?;
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            for (b, c) in chunk.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            let block = Block::from_mut_slice(chunk);
            self.encrypt_block(block);
            chain.copy_from_slice(block.as_slice());
        }
        Ok(chain)
    }

    /// Decrypt `data` in place. Returns the last ciphertext block.
    pub fn decrypt(&self, iv: &[u8], data: &mut [u8]) -> Result<[u8; AES_BLOCK_SIZE], CryptoError> {
        let mut chain = check(iv, data)?;
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let mut saved = [0u8; AES_BLOCK_SIZE];
            saved.copy_from_slice(chunk);
            self.decrypt_block(Block::from_mut_slice(chunk));
            for (b, c) in chunk.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            chain = saved;
        }
        Ok(chain)
    }
}

fn check(iv: &[u8], data: &[u8]) -> Result<[u8; AES_BLOCK_SIZE], CryptoError> {
    let iv: [u8; AES_BLOCK_SIZE] = iv.try_into().map_err(|_| CryptoError::InvalidIvLength)?;
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidArg);
    }
    Ok(iv)
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

    // NIST SP 800-38A F.2.1 / F.2.5, first two blocks.
    #[test]
    fn test_sp800_38a_vectors() {
        let iv = hex("000102030405060708090a0b0c0d0e0f");
        let pt = hex("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");

        let k128 = AesCbc::new(&hex("2b7e151628aed2a6abf7158809cf4f3c")).unwrap();
        let mut buf = pt.clone();
        let last = k128.encrypt(&iv, &mut buf).unwrap();
        assert_eq!(
            buf,
            hex("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2")
        );
        assert_eq!(&last[..], &buf[16..]);
        k128.decrypt(&iv, &mut buf).unwrap();
        assert_eq!(buf, pt);

        let k256 = AesCbc::new(&hex(
            "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4",
        ))
        .unwrap();
        let mut buf = pt.clone();
        k256.encrypt(&iv, &mut buf).unwrap();
        assert_eq!(
            buf,
            hex("f58c4c04d6e5f1ba779eabfb5f7bfbd69cfc4e967edb808d679f777bc6702c7d")
        );
    }

    #[test]
    fn test_rejects_partial_block_and_bad_key() {
        let k = AesCbc::new(&[0u8; 16]).unwrap();
        assert!(k.encrypt(&[0u8; 16], &mut [0u8; 15]).is_err());
        assert!(k.encrypt(&[0u8; 8], &mut [0u8; 16]).is_err());
        assert!(AesCbc::new(&[0u8; 24]).is_err());
    }
}
