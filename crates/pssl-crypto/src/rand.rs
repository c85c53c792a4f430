//! OS randomness.

use pssl_types::CryptoError;

/// Fill `buf` from the OS random source.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandFail)
}

/// A fresh random array.
pub fn random_array<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    fill_random(&mut out)?;
    Ok(out)
}

/// A fresh random vector.
pub fn random_vec(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut out = vec![0u8; len];
    fill_random(&mut out)?;
    Ok(out)
}

/// Random bytes that are all non-zero (PKCS#1 type 2 padding).
pub fn random_nonzero(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut out = random_vec(len)?;
    let mut spare = [0u8; 32];
    for b in out.iter_mut() {
        while *b == 0 {
            fill_random(&mut spare[..1])?;
            *b = spare[0];
        }
    }
    Ok(out)
}
