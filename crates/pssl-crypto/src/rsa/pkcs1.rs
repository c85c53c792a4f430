//! PKCS#1 v2.2 encodings (RFC 8017): RSAES-PKCS1-v1_5, EMSA-PKCS1-v1_5,
//! EMSA-PSS and MGF1.

use crate::hash::HashCtx;
use crate::rand::{random_nonzero, random_vec};
use pssl_types::{CryptoError, HashAlgId};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq, ConstantTimeLess};

/// Largest PSS salt accepted in either direction.
pub const PSS_MAX_SALT: usize = 128;

/// Minimum PKCS#1 v1.5 padding string length.
const MIN_PS_LEN: usize = 8;

const DIGEST_INFO_MD5: &[u8] = &[
    0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05, 0x05, 0x00,
    0x04, 0x10,
];
const DIGEST_INFO_SHA1: &[u8] = &[
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];
const DIGEST_INFO_SHA256: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];
const DIGEST_INFO_SHA384: &[u8] = &[
    0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02, 0x05,
    0x00, 0x04, 0x30,
];
const DIGEST_INFO_SHA512: &[u8] = &[
    0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03, 0x05,
    0x00, 0x04, 0x40,
];

/// DER DigestInfo prefix for `alg`. The TLS 1.0/1.1 MD5+SHA1 hash is
/// signed bare, so its prefix is empty.
pub fn digest_info_prefix(alg: HashAlgId) -> &'static [u8] {
    match alg {
        HashAlgId::Md5 => DIGEST_INFO_MD5,
        HashAlgId::Sha1 => DIGEST_INFO_SHA1,
        HashAlgId::Sha256 => DIGEST_INFO_SHA256,
        HashAlgId::Sha384 => DIGEST_INFO_SHA384,
        HashAlgId::Sha512 => DIGEST_INFO_SHA512,
        HashAlgId::Md5Sha1 => &[],
    }
}

/// EMSA-PKCS1-v1_5: `00 01 FF.. 00 DigestInfo(hash)`, `k` bytes long.
pub fn emsa_pkcs1_encode(alg: HashAlgId, hash: &[u8], k: usize) -> Result<Vec<u8>, CryptoError> {
    if hash.len() != alg.output_len() {
        return Err(CryptoError::InvalidArg);
    }
    let prefix = digest_info_prefix(alg);
    let t_len = prefix.len() + hash.len();
    if k < t_len + 3 + MIN_PS_LEN {
        return Err(CryptoError::RsaInvalidPadding);
    }
    let mut em = Vec::with_capacity(k);
    em.extend_from_slice(&[0x00, 0x01]);
    em.resize(k - t_len - 1, 0xFF);
    em.push(0x00);
    em.extend_from_slice(prefix);
    em.extend_from_slice(hash);
    Ok(em)
}

/// Check an EMSA-PKCS1-v1_5 block by re-encoding and comparing.
pub fn emsa_pkcs1_verify(alg: HashAlgId, hash: &[u8], em: &[u8]) -> Result<(), CryptoError> {
    let expected = emsa_pkcs1_encode(alg, hash, em.len())?;
    if bool::from(expected.ct_eq(em)) {
        Ok(())
    } else {
        Err(CryptoError::RsaVerifyFail)
    }
}

/// MGF1 mask of `len` bytes.
pub fn mgf1(alg: HashAlgId, seed: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + alg.output_len());
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut ctx = HashCtx::new(alg);
        ctx.update(seed);
        ctx.update(&counter.to_be_bytes());
        out.extend_from_slice(&ctx.finish());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn pss_hash(alg: HashAlgId, mhash: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut ctx = HashCtx::new(alg);
    ctx.update(&[0u8; 8]);
    ctx.update(mhash);
    ctx.update(salt);
    ctx.finish()
}

/// EMSA-PSS encoding with an explicit salt.
pub fn emsa_pss_encode_with_salt(
    alg: HashAlgId,
    mhash: &[u8],
    em_bits: usize,
    salt: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let h_len = alg.output_len();
    if mhash.len() != h_len || alg == HashAlgId::Md5Sha1 {
        return Err(CryptoError::InvalidArg);
    }
    if salt.len() > PSS_MAX_SALT {
        return Err(CryptoError::RsaPssSaltTooLong(salt.len()));
    }
    let em_len = em_bits.div_ceil(8);
    if em_len < h_len + salt.len() + 2 {
        return Err(CryptoError::RsaInvalidPadding);
    }
    let h = pss_hash(alg, mhash, salt);
    let db_len = em_len - h_len - 1;
    let mut db = vec![0u8; db_len - salt.len() - 1];
    db.push(0x01);
    db.extend_from_slice(salt);
    for (d, m) in db.iter_mut().zip(mgf1(alg, &h, db_len)) {
        *d ^= m;
    }
    db[0] &= 0xFF >> (8 * em_len - em_bits);

    let mut em = db;
    em.extend_from_slice(&h);
    em.push(0xbc);
    Ok(em)
}

/// EMSA-PSS encoding with a fresh random salt of `salt_len` bytes.
pub fn emsa_pss_encode(
    alg: HashAlgId,
    mhash: &[u8],
    em_bits: usize,
    salt_len: usize,
) -> Result<Vec<u8>, CryptoError> {
    if salt_len > PSS_MAX_SALT {
        return Err(CryptoError::RsaPssSaltTooLong(salt_len));
    }
    let salt = random_vec(salt_len)?;
    emsa_pss_encode_with_salt(alg, mhash, em_bits, &salt)
}

/// EMSA-PSS verification.
///
/// `em` may be the full modulus-width block; any bytes beyond
/// `ceil(em_bits / 8)` on the left must be zero. With `salt_len == None`
/// the salt length is recovered from the position of the `01` separator.
pub fn emsa_pss_verify(
    alg: HashAlgId,
    mhash: &[u8],
    em: &[u8],
    em_bits: usize,
    salt_len: Option<usize>,
) -> Result<(), CryptoError> {
    let h_len = alg.output_len();
    if mhash.len() != h_len || alg == HashAlgId::Md5Sha1 {
        return Err(CryptoError::InvalidArg);
    }
    let em_len = em_bits.div_ceil(8);
    if em.len() < em_len || em[..em.len() - em_len].iter().any(|&b| b != 0) {
        return Err(CryptoError::RsaVerifyFail);
    }
    let em = &em[em.len() - em_len..];
    if em_len < h_len + 2 || em[em_len - 1] != 0xbc {
        return Err(CryptoError::RsaVerifyFail);
    }
    let db_len = em_len - h_len - 1;
    let (masked_db, h) = (&em[..db_len], &em[db_len..em_len - 1]);
    let top_mask = 0xFFu8 >> (8 * em_len - em_bits);
    if masked_db[0] & !top_mask != 0 {
        return Err(CryptoError::RsaVerifyFail);
    }
    let mut db: Vec<u8> = masked_db
        .iter()
        .zip(mgf1(alg, h, db_len))
        .map(|(a, b)| a ^ b)
        .collect();
    db[0] &= top_mask;

    let sep = db
        .iter()
        .position(|&b| b != 0)
        .ok_or(CryptoError::RsaVerifyFail)?;
    if db[sep] != 0x01 {
        return Err(CryptoError::RsaVerifyFail);
    }
    let salt = &db[sep + 1..];
    if salt.len() > PSS_MAX_SALT {
        return Err(CryptoError::RsaPssSaltTooLong(salt.len()));
    }
    if salt_len.is_some_and(|want| want != salt.len()) {
        return Err(CryptoError::RsaVerifyFail);
    }
    if bool::from(pss_hash(alg, mhash, salt).ct_eq(h)) {
        Ok(())
    } else {
        Err(CryptoError::RsaVerifyFail)
    }
}

/// RSAES-PKCS1-v1_5 encoding: `00 02 PS 00 msg` with non-zero random PS.
pub fn rsaes_pkcs1_encode(msg: &[u8], k: usize) -> Result<Vec<u8>, CryptoError> {
    if msg.len() + 3 + MIN_PS_LEN > k {
        return Err(CryptoError::InputOverflow);
    }
    let mut em = Vec::with_capacity(k);
    em.extend_from_slice(&[0x00, 0x02]);
    em.extend_from_slice(&random_nonzero(k - msg.len() - 3)?);
    em.push(0x00);
    em.extend_from_slice(msg);
    Ok(em)
}

/// Constant-shape RSAES-PKCS1-v1_5 check.
///
/// Always scans the whole block and always returns the trailing
/// `secret_len` bytes; the returned choice is set only if the block has a
/// valid `00 02` header, at least eight non-zero padding bytes, and a zero
/// separator immediately before those trailing bytes.
pub fn rsaes_pkcs1_check(em: &[u8], secret_len: usize) -> Result<(Vec<u8>, Choice), CryptoError> {
    let k = em.len();
    if k < secret_len + 3 + MIN_PS_LEN {
        return Err(CryptoError::InvalidArg);
    }
    let mut valid = em[0].ct_eq(&0x00) & em[1].ct_eq(&0x02);
    let mut found = Choice::from(0);
    let mut sep: u64 = 0;
    for (i, b) in em.iter().enumerate().skip(2) {
        let is_zero = b.ct_eq(&0);
        sep.conditional_assign(&(i as u64), is_zero & !found);
        found |= is_zero;
    }
    valid &= found;
    valid &= !sep.ct_lt(&((2 + MIN_PS_LEN) as u64));
    valid &= sep.ct_eq(&((k - secret_len - 1) as u64));
    Ok((em[k - secret_len..].to_vec(), valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;

    #[test]
    fn test_emsa_pkcs1_layout() {
        let hash = digest(HashAlgId::Sha256, b"abc");
        let em = emsa_pkcs1_encode(HashAlgId::Sha256, &hash, 128).unwrap();
        assert_eq!(em.len(), 128);
        assert_eq!(&em[..2], &[0x00, 0x01]);
        assert!(em[2..128 - 52].iter().all(|&b| b == 0xFF));
        assert_eq!(em[128 - 52], 0x00);
        assert_eq!(&em[128 - 51..128 - 32], DIGEST_INFO_SHA256);
        emsa_pkcs1_verify(HashAlgId::Sha256, &hash, &em).unwrap();

        let mut bad = em.clone();
        bad[5] = 0xFE;
        assert_eq!(
            emsa_pkcs1_verify(HashAlgId::Sha256, &hash, &bad),
            Err(CryptoError::RsaVerifyFail)
        );
    }

    #[test]
    fn test_md5sha1_has_no_digest_info() {
        let hash = digest(HashAlgId::Md5Sha1, b"x");
        let em = emsa_pkcs1_encode(HashAlgId::Md5Sha1, &hash, 64).unwrap();
        assert_eq!(&em[64 - 36..], hash.as_slice());
        assert_eq!(em[64 - 37], 0x00);
    }

    #[test]
    fn test_pss_encode_then_verify_and_every_byte_flip_fails() {
        let mhash = digest(HashAlgId::Sha256, b"message");
        let em = emsa_pss_encode(HashAlgId::Sha256, &mhash, 1023, 32).unwrap();
        assert_eq!(em.len(), 128);
        emsa_pss_verify(HashAlgId::Sha256, &mhash, &em, 1023, Some(32)).unwrap();
        emsa_pss_verify(HashAlgId::Sha256, &mhash, &em, 1023, None).unwrap();
        for i in 0..em.len() {
            let mut bad = em.clone();
            bad[i] ^= 0x01;
            assert!(
                emsa_pss_verify(HashAlgId::Sha256, &mhash, &bad, 1023, None).is_err(),
                "flip at {i} verified"
            );
        }
    }

    #[test]
    fn test_pss_full_width_block_with_leading_zero() {
        // 1024-bit modulus whose em_bits is a multiple of 8.
        let mhash = digest(HashAlgId::Sha384, b"m");
        let em = emsa_pss_encode(HashAlgId::Sha384, &mhash, 1024, 48).unwrap();
        assert_eq!(em.len(), 128);
        let mut wide = vec![0u8];
        wide.extend_from_slice(&em);
        emsa_pss_verify(HashAlgId::Sha384, &mhash, &wide, 1024, Some(48)).unwrap();
        wide[0] = 1;
        assert!(emsa_pss_verify(HashAlgId::Sha384, &mhash, &wide, 1024, Some(48)).is_err());
    }

    #[test]
    fn test_pss_salt_cap() {
        let mhash = digest(HashAlgId::Sha256, b"m");
        assert_eq!(
            emsa_pss_encode(HashAlgId::Sha256, &mhash, 4095, 129),
            Err(CryptoError::RsaPssSaltTooLong(129))
        );
        let em = emsa_pss_encode_with_salt(HashAlgId::Sha256, &mhash, 4095, &[9u8; 128]).unwrap();
        emsa_pss_verify(HashAlgId::Sha256, &mhash, &em, 4095, None).unwrap();
    }

    #[test]
    fn test_mgf1_prefix_property() {
        let long = mgf1(HashAlgId::Sha1, b"seed", 50);
        let short = mgf1(HashAlgId::Sha1, b"seed", 7);
        assert_eq!(&long[..7], short.as_slice());
    }

    #[test]
    fn test_rsaes_check_accepts_valid_block() {
        let secret = [0x03u8; 48];
        let em = rsaes_pkcs1_encode(&secret, 128).unwrap();
        let (out, ok) = rsaes_pkcs1_check(&em, 48).unwrap();
        assert!(bool::from(ok));
        assert_eq!(out, secret);
    }

    #[test]
    fn test_rsaes_check_flags_each_defect() {
        let secret = [0x03u8; 48];
        let good = rsaes_pkcs1_encode(&secret, 128).unwrap();

        let mut bad_type = good.clone();
        bad_type[1] = 0x01;
        let mut short_ps = good.clone();
        short_ps[5] = 0x00;
        let mut no_sep = good.clone();
        no_sep[128 - 49] = 0x01;
        let mut wrong_len = good.clone();
        wrong_len[128 - 49] = 0x07;
        wrong_len[128 - 60] = 0x00;

        for em in [bad_type, short_ps, no_sep, wrong_len] {
            let (out, ok) = rsaes_pkcs1_check(&em, 48).unwrap();
            assert!(!bool::from(ok));
            assert_eq!(out.len(), 48);
        }
    }
}
