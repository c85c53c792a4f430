//! HMAC over the supported digests.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use pssl_types::{CryptoError, HashAlgId};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

fn mac_parts<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidArg)?;
    for p in parts {
        mac.update(p);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// HMAC of the concatenation of `parts`.
pub fn hmac(alg: HashAlgId, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    match alg {
        HashAlgId::Md5 => mac_parts::<Hmac<Md5>>(key, parts),
        HashAlgId::Sha1 => mac_parts::<Hmac<Sha1>>(key, parts),
        HashAlgId::Sha256 => mac_parts::<Hmac<Sha256>>(key, parts),
        HashAlgId::Sha384 => mac_parts::<Hmac<Sha384>>(key, parts),
        HashAlgId::Sha512 => mac_parts::<Hmac<Sha512>>(key, parts),
        HashAlgId::Md5Sha1 => Err(CryptoError::NotSupported),
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
    fn test_rfc4231_case2() {
        let mac = hmac(HashAlgId::Sha256, b"Jefe", &[b"what do ya want ", b"for nothing?"]).unwrap();
        assert_eq!(
            mac,
            hex("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }

    #[test]
    fn test_long_key_and_md5sha1() {
        let key = [0xaa; 200];
        assert_eq!(hmac(HashAlgId::Sha512, &key, &[b"x"]).unwrap().len(), 64);
        assert_eq!(
            hmac(HashAlgId::Md5Sha1, &key, &[b"x"]),
            Err(CryptoError::NotSupported)
        );
    }
}
