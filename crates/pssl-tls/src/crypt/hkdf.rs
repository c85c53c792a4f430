//! HKDF (RFC 5869) and the TLS 1.3 label helpers (RFC 8446 §7.1).

use pssl_crypto::hash::digest;
use pssl_crypto::hmac::hmac;
use pssl_types::{HashAlgId, TlsError};
use zeroize::Zeroizing;

/// `HKDF-Extract(salt, IKM)`. An empty salt means a string of zeros.
pub fn hkdf_extract(hash: HashAlgId, salt: &[u8], ikm: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    let zeros;
    let salt = if salt.is_empty() {
        zeros = vec![0u8; hash.output_len()];
        &zeros[..]
    } else {
        salt
    };
    Ok(Zeroizing::new(hmac(hash, salt, &[ikm])?))
}

/// `HKDF-Expand(PRK, info, L)`.
pub fn hkdf_expand(
    hash: HashAlgId,
    prk: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    if len > 255 * hash.output_len() {
        return Err(TlsError::InvalidState("hkdf output too long"));
    }
    let mut out = Zeroizing::new(Vec::with_capacity(len));
    let mut t = Zeroizing::new(Vec::new());
    let mut counter = 1u8;
    while out.len() < len {
        t = Zeroizing::new(hmac(hash, prk, &[&t, info, &[counter]])?);
        let n = t.len().min(len - out.len());
        out.extend_from_slice(&t[..n]);
        counter = counter.wrapping_add(1);
    }
    Ok(out)
}

/// `HKDF-Expand-Label(Secret, Label, Context, Length)`.
///
/// ```text
/// struct {
///     uint16 length = Length;
///     opaque label<7..255> = "tls13 " + Label;
///     opaque context<0..255> = Context;
/// } HkdfLabel;
/// ```
pub fn hkdf_expand_label(
    hash: HashAlgId,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    let full_len = 6 + label.len();
    if full_len > 255 || context.len() > 255 || len > u16::MAX as usize {
        return Err(TlsError::InvalidState("hkdf label too long"));
    }
    let mut info = Vec::with_capacity(4 + full_len + context.len());
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push(full_len as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);
    hkdf_expand(hash, secret, &info, len)
}

/// `Derive-Secret(Secret, Label, Messages)` with the transcript already hashed.
pub fn derive_secret(
    hash: HashAlgId,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    hkdf_expand_label(hash, secret, label, transcript_hash, hash.output_len())
}

/// `Hash("")`, the context of the "derived" steps.
pub fn empty_hash(hash: HashAlgId) -> Vec<u8> {
    digest(hash, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::hex;

    #[test]
    fn test_rfc5869_case1() {
        let ikm = [0x0b; 22];
        let salt = hex("000102030405060708090a0b0c");
        let info = hex("f0f1f2f3f4f5f6f7f8f9");
        let prk = hkdf_extract(HashAlgId::Sha256, &salt, &ikm).unwrap();
        assert_eq!(
            *prk,
            hex("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5")
        );
        let okm = hkdf_expand(HashAlgId::Sha256, &prk, &info, 42).unwrap();
        assert_eq!(
            *okm,
            hex("3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865")
        );
    }

    #[test]
    fn test_rfc8448_early_and_derived() {
        let early = hkdf_extract(HashAlgId::Sha256, &[], &[0u8; 32]).unwrap();
        assert_eq!(
            *early,
            hex("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
        let derived =
            derive_secret(HashAlgId::Sha256, &early, b"derived", &empty_hash(HashAlgId::Sha256)).unwrap();
        assert_eq!(
            *derived,
            hex("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
        );
    }

    #[test]
    fn test_expand_rejects_oversized_output() {
        assert!(hkdf_expand(HashAlgId::Sha256, &[1; 32], b"", 255 * 32 + 1).is_err());
        assert!(hkdf_expand_label(HashAlgId::Sha256, &[1; 32], &[b'a'; 250], b"", 16).is_err());
    }
}
