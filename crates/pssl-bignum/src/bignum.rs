//! Unsigned big number type.

use pssl_types::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Limb type for big number representation.
pub type Limb = u64;
/// Double-width type for multiplication intermediates.
pub type DoubleLimb = u128;
/// Bits per limb.
pub const LIMB_BITS: usize = 64;

/// A heap-allocated unsigned big number that is zeroized on drop.
///
/// Limbs are little-endian and normalized: the most significant limb is
/// never zero, and zero has no limbs at all.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct BigNum {
    limbs: Vec<Limb>,
}

impl BigNum {
    pub fn zero() -> Self {
        Self { limbs: Vec::new() }
    }

    pub fn one() -> Self {
        Self::from_u64(1)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_limbs(vec![value])
    }

    /// Create a BigNum from little-endian limbs.
    pub fn from_limbs(limbs: Vec<Limb>) -> Self {
        let mut bn = Self { limbs };
        bn.normalize();
        bn
    }

    /// Create a BigNum from big-endian bytes.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        let mut limbs = vec![0u64; bytes.len().div_ceil(8)];
        for (i, &byte) in bytes.iter().rev().enumerate() {
            limbs[i / 8] |= (byte as u64) << ((i % 8) * 8);
        }
        Self::from_limbs(limbs)
    }

    /// Parse a big-endian hex string (no prefix).
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let digits = hex.as_bytes();
        let mut limbs = vec![0u64; digits.len().div_ceil(16)];
        for (i, &c) in digits.iter().rev().enumerate() {
            let v = (c as char).to_digit(16).ok_or(CryptoError::InvalidArg)? as u64;
            limbs[i / 16] |= v << ((i % 16) * 4);
        }
        Ok(Self::from_limbs(limbs))
    }

    /// Minimal big-endian encoding. Zero encodes as an empty vector.
    pub fn to_bytes_be(&self) -> Vec<u8> {
        let len = self.bit_len().div_ceil(8);
        let mut out = vec![0u8; len];
        self.write_be(&mut out);
        out
    }

    /// Big-endian encoding left-padded with zeros to exactly `len` bytes.
    pub fn to_bytes_be_padded(&self, len: usize) -> Result<Vec<u8>, CryptoError> {
        let need = self.bit_len().div_ceil(8);
        if need > len {
            return Err(CryptoError::BufferTooSmall { need, got: len });
        }
        let mut out = vec![0u8; len];
        self.write_be(&mut out);
        Ok(out)
    }

    fn write_be(&self, out: &mut [u8]) {
        let n = out.len();
        for i in 0..n.min(self.limbs.len() * 8) {
            out[n - 1 - i] = (self.limbs[i / 8] >> ((i % 8) * 8)) as u8;
        }
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        match self.limbs.last() {
            Some(top) => self.limbs.len() * LIMB_BITS - top.leading_zeros() as usize,
            None => 0,
        }
    }

    pub fn num_limbs(&self) -> usize {
        self.limbs.len()
    }

    pub fn limbs(&self) -> &[Limb] {
        &self.limbs
    }

    /// Limb `i`, or zero beyond the top.
    pub fn limb(&self, i: usize) -> Limb {
        self.limbs.get(i).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    pub fn is_one(&self) -> bool {
        self.limbs == [1]
    }

    pub fn is_odd(&self) -> bool {
        self.limb(0) & 1 == 1
    }

    /// Bit at position `idx` (0 is the least significant).
    pub fn get_bit(&self, idx: usize) -> bool {
        (self.limb(idx / LIMB_BITS) >> (idx % LIMB_BITS)) & 1 == 1
    }

    pub fn set_bit(&mut self, idx: usize) {
        let li = idx / LIMB_BITS;
        if li >= self.limbs.len() {
            self.limbs.resize(li + 1, 0);
        }
        self.limbs[li] |= 1 << (idx % LIMB_BITS);
    }

    pub(crate) fn limbs_mut(&mut self) -> &mut Vec<Limb> {
        &mut self.limbs
    }

    pub(crate) fn normalize(&mut self) {
        while self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
    }
}

impl std::fmt::Debug for BigNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BigNum(0x")?;
        if self.is_zero() {
            f.write_str("0")?;
        }
        for b in self.to_bytes_be() {
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

impl PartialEq for BigNum {
    fn eq(&self, other: &Self) -> bool {
        self.limbs == other.limbs
    }
}

impl Eq for BigNum {}

impl PartialOrd for BigNum {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigNum {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.limbs
            .len()
            .cmp(&other.limbs.len())
            .then_with(|| self.limbs.iter().rev().cmp(other.limbs.iter().rev()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_has_no_bits() {
        let z = BigNum::zero();
        assert!(z.is_zero());
        assert_eq!(z.bit_len(), 0);
        assert!(z.to_bytes_be().is_empty());
        assert_eq!(z.to_bytes_be_padded(2).unwrap(), vec![0, 0]);
        assert_eq!(BigNum::from_bytes_be(&[0, 0, 0]), z);
    }

    #[test]
    fn test_bytes_and_hex_agree() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        let a = BigNum::from_bytes_be(&bytes);
        let b = BigNum::from_hex("010203040506070809").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_bytes_be(), bytes);
        assert_eq!(a.bit_len(), 65);
        assert!(BigNum::from_hex("12xz").is_err());
    }

    #[test]
    fn test_padded_too_small() {
        let a = BigNum::from_u64(0x1_0000);
        assert_eq!(
            a.to_bytes_be_padded(2),
            Err(CryptoError::BufferTooSmall { need: 3, got: 2 })
        );
    }

    #[test]
    fn test_ordering() {
        let small = BigNum::from_u64(u64::MAX);
        let big = BigNum::from_limbs(vec![0, 1]);
        assert!(small < big);
        assert!(BigNum::from_limbs(vec![5, 1]) > BigNum::from_limbs(vec![4, 1]));
        assert_eq!(BigNum::from_limbs(vec![7, 0, 0]), BigNum::from_u64(7));
    }

    #[test]
    fn test_bits() {
        let mut a = BigNum::zero();
        a.set_bit(130);
        assert_eq!(a.bit_len(), 131);
        assert!(a.get_bit(130));
        assert!(!a.get_bit(129));
        assert!(!a.is_odd());
    }
}
