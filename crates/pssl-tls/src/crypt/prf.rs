//! TLS PRF (RFC 2246 §5, RFC 5246 §5).
//!
//! ```text
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) ||
//!                        HMAC_hash(secret, A(2) + seed) || ...
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))
//! ```
//!
//! TLS 1.0 and 1.1 split the secret in two (overlapping by one byte when
//! its length is odd) and XOR `P_MD5` over the first half with `P_SHA1`
//! over the second. TLS 1.2 uses a single `P_hash` over the suite hash.

use crate::ProtocolVersion;
use pssl_crypto::hmac::hmac;
use pssl_types::{HashAlgId, TlsError};
use zeroize::Zeroizing;

fn p_hash(
    alg: HashAlgId,
    secret: &[u8],
    seed: &[u8],
    out: &mut [u8],
    xor: bool,
) -> Result<(), TlsError> {
    let mut a = Zeroizing::new(hmac(alg, secret, &[seed])?);
    let mut pos = 0;
    while pos < out.len() {
        let block = Zeroizing::new(hmac(alg, secret, &[&a, seed])?);
        let n = block.len().min(out.len() - pos);
        for (o, b) in out[pos..pos + n].iter_mut().zip(block.iter()) {
            *o = if xor { *o ^ b } else { *b };
        }
        pos += n;
        a = Zeroizing::new(hmac(alg, secret, &[&a])?);
    }
    Ok(())
}

/// `PRF(secret, label, seed)` truncated to `len` bytes.
///
/// `hash` is the suite PRF hash and only matters from TLS 1.2 on.
pub fn prf(
    version: ProtocolVersion,
    hash: HashAlgId,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label.as_bytes());
    label_seed.extend_from_slice(seed);

    let mut out = Zeroizing::new(vec![0u8; len]);
    if version >= ProtocolVersion::Tls12 {
        p_hash(hash, secret, &label_seed, &mut out, false)?;
    } else {
        let half = secret.len().div_ceil(2);
        p_hash(HashAlgId::Md5, &secret[..half], &label_seed, &mut out, false)?;
        p_hash(
            HashAlgId::Sha1,
            &secret[secret.len() - half..],
            &label_seed,
            &mut out,
            true,
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::hex;

    #[test]
    fn test_prf_sha256_known_vector() {
        let out = prf(
            ProtocolVersion::Tls12,
            HashAlgId::Sha256,
            &hex("9bbe436ba940f017b17652849a71db35"),
            "test label",
            &hex("a0ba9f936cda311827a6f796ffd5198c"),
            100,
        )
        .unwrap();
        assert_eq!(
            *out,
            hex("e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a\
                 6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab\
                 4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff701\
                 87347b66")
        );
    }

    #[test]
    fn test_prf_sha384_known_vector() {
        let out = prf(
            ProtocolVersion::Tls12,
            HashAlgId::Sha384,
            &hex("b80b733d6ceefcdc71566ea48e5567df"),
            "test label",
            &hex("cd665cf6a8447dd6ff8b27555edb7465"),
            148,
        )
        .unwrap();
        assert_eq!(&out[..32], &hex("7b0c18e9ced410ed1804f2cfa34a336a1c14dffb4900bb5fd7942107e81c83cd")[..]);
        assert_eq!(&out[140..], &hex("5e0990703d73e56f")[..]);
    }

    #[test]
    fn test_prf_md5_sha1_split_secret() {
        let secret: Vec<u8> = (0..48).collect();
        let seed: Vec<u8> = (0..64).collect();
        let out = prf(ProtocolVersion::Tls10, HashAlgId::Sha256, &secret, "master secret", &seed, 48).unwrap();
        assert_eq!(
            *out,
            hex("539391828d1d131678646180c5bda5c9a2eb62382c8cfb9440545cae85c8c205\
                 b93e0d22161e06be1189235aefca7570")
        );

        // Odd-length secrets share their middle byte between the halves.
        let secret: Vec<u8> = (0..47).collect();
        let seed: Vec<u8> = (0..10).collect();
        let out = prf(ProtocolVersion::Tls11, HashAlgId::Sha256, &secret, "key expansion", &seed, 40).unwrap();
        assert_eq!(
            *out,
            hex("0d8fb798a709224d25c8f22095695b62ccc2d053ebc4911bc99b7fda36bd87fe8a4277ebe046d3ab")
        );
    }
}
