//! Random big numbers from the OS source.

use crate::bignum::BigNum;
use pssl_types::CryptoError;

impl BigNum {
    /// Uniform random value in `[1, upper)` by rejection sampling.
    pub fn random_range(upper: &BigNum) -> Result<BigNum, CryptoError> {
        if upper.bit_len() < 2 {
            return Err(CryptoError::InvalidArg);
        }
        let bits = upper.bit_len();
        let mut buf = vec![0u8; bits.div_ceil(8)];
        let excess = buf.len() * 8 - bits;
        loop {
            getrandom::getrandom(&mut buf).map_err(|_| CryptoError::RandFail)?;
            buf[0] &= 0xFF >> excess;
            let candidate = BigNum::from_bytes_be(&buf);
            if !candidate.is_zero() && candidate < *upper {
                zeroize::Zeroize::zeroize(&mut buf[..]);
                return Ok(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_range_bounds() {
        let upper = BigNum::from_u64(5);
        for _ in 0..200 {
            let v = BigNum::random_range(&upper).unwrap();
            assert!(!v.is_zero() && v < upper);
        }
        assert!(BigNum::random_range(&BigNum::one()).is_err());
    }
}
