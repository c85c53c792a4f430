//! Basic arithmetic for BigNum.

use crate::bignum::{BigNum, DoubleLimb, Limb, LIMB_BITS};
use pssl_types::CryptoError;
use std::cmp::Ordering;

/// `acc -= b` in place; `acc` must be at least `b`.
pub(crate) fn sub_assign(acc: &mut [Limb], b: &[Limb]) {
    let mut borrow = 0u64;
    for (i, a) in acc.iter_mut().enumerate() {
        let bv = b.get(i).copied().unwrap_or(0);
        let (d1, o1) = a.overflowing_sub(bv);
        let (d2, o2) = d1.overflowing_sub(borrow);
        *a = d2;
        borrow = (o1 | o2) as u64;
    }
}

/// `acc += b` in place, returning the carry out of the top limb.
pub(crate) fn add_assign(acc: &mut [Limb], b: &[Limb]) -> Limb {
    let mut carry = 0u64;
    for (i, a) in acc.iter_mut().enumerate() {
        let bv = b.get(i).copied().unwrap_or(0);
        let sum = *a as DoubleLimb + bv as DoubleLimb + carry as DoubleLimb;
        *a = sum as Limb;
        carry = (sum >> LIMB_BITS) as Limb;
    }
    carry
}

/// Schoolbook product of two limb slices.
pub(crate) fn mul_limbs(a: &[Limb], b: &[Limb]) -> Vec<Limb> {
    let mut out = vec![0u64; a.len() + b.len()];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        let mut carry = 0u64;
        for (j, &bj) in b.iter().enumerate() {
            let t = ai as DoubleLimb * bj as DoubleLimb
                + out[i + j] as DoubleLimb
                + carry as DoubleLimb;
            out[i + j] = t as Limb;
            carry = (t >> LIMB_BITS) as Limb;
        }
        out[i + b.len()] = carry;
    }
    out
}

impl BigNum {
    pub fn add(&self, other: &BigNum) -> BigNum {
        let mut limbs = vec![0u64; self.num_limbs().max(other.num_limbs()) + 1];
        limbs[..self.num_limbs()].copy_from_slice(self.limbs());
        add_assign(&mut limbs, other.limbs());
        BigNum::from_limbs(limbs)
    }

    /// `self - other`, or `None` if the result would be negative.
    pub fn checked_sub(&self, other: &BigNum) -> Option<BigNum> {
        if *self < *other {
            return None;
        }
        let mut limbs = self.limbs().to_vec();
        sub_assign(&mut limbs, other.limbs());
        Some(BigNum::from_limbs(limbs))
    }

    pub fn mul(&self, other: &BigNum) -> BigNum {
        if self.is_zero() || other.is_zero() {
            return BigNum::zero();
        }
        BigNum::from_limbs(mul_limbs(self.limbs(), other.limbs()))
    }

    pub fn sqr(&self) -> BigNum {
        self.mul(self)
    }

    /// Shift left by `bits`.
    pub fn shl(&self, bits: usize) -> BigNum {
        if self.is_zero() {
            return BigNum::zero();
        }
        let (limb_shift, bit_shift) = (bits / LIMB_BITS, bits % LIMB_BITS);
        let mut limbs = vec![0u64; self.num_limbs() + limb_shift + 1];
        for (i, &l) in self.limbs().iter().enumerate() {
            limbs[i + limb_shift] |= l << bit_shift;
            if bit_shift != 0 {
                limbs[i + limb_shift + 1] |= l >> (LIMB_BITS - bit_shift);
            }
        }
        BigNum::from_limbs(limbs)
    }

    /// Shift right by `bits`.
    pub fn shr(&self, bits: usize) -> BigNum {
        let (limb_shift, bit_shift) = (bits / LIMB_BITS, bits % LIMB_BITS);
        if limb_shift >= self.num_limbs() {
            return BigNum::zero();
        }
        let src = &self.limbs()[limb_shift..];
        let mut limbs = vec![0u64; src.len()];
        for i in 0..src.len() {
            limbs[i] = src[i] >> bit_shift;
            if bit_shift != 0 {
                if let Some(&hi) = src.get(i + 1) {
                    limbs[i] |= hi << (LIMB_BITS - bit_shift);
                }
            }
        }
        BigNum::from_limbs(limbs)
    }

    /// Division with remainder: returns (quotient, remainder).
    ///
    /// Binary shift-subtract; used only for one-off reductions such as
    /// Montgomery setup, never on the per-step hot path.
    pub fn div_rem(&self, divisor: &BigNum) -> Result<(BigNum, BigNum), CryptoError> {
        if divisor.is_zero() {
            return Err(CryptoError::BnDivisionByZero);
        }
        if *self < *divisor {
            return Ok((BigNum::zero(), self.clone()));
        }
        let shift = self.bit_len() - divisor.bit_len();
        let width = self.num_limbs() + 1;
        let mut rem = self.limbs().to_vec();
        rem.resize(width, 0);
        let mut d = divisor.shl(shift).limbs().to_vec();
        d.resize(width, 0);
        let mut quotient = BigNum::zero();

        for i in (0..=shift).rev() {
            if cmp_limbs(&rem, &d) != Ordering::Less {
                sub_assign(&mut rem, &d);
                quotient.set_bit(i);
            }
            shr1_assign(&mut d);
        }
        quotient.normalize();
        Ok((quotient, BigNum::from_limbs(rem)))
    }

    /// `self mod modulus`.
    pub fn mod_reduce(&self, modulus: &BigNum) -> Result<BigNum, CryptoError> {
        self.div_rem(modulus).map(|(_, r)| r)
    }
}

fn shr1_assign(a: &mut [Limb]) {
    let mut carry = 0u64;
    for l in a.iter_mut().rev() {
        let next = *l << (LIMB_BITS - 1);
        *l = (*l >> 1) | carry;
        carry = next;
    }
}

/// Compare equal-width limb slices.
pub(crate) fn cmp_limbs(a: &[Limb], b: &[Limb]) -> Ordering {
    for i in (0..a.len().max(b.len())).rev() {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        if av != bv {
            return av.cmp(&bv);
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bn(hex: &str) -> BigNum {
        BigNum::from_hex(hex).unwrap()
    }

    #[test]
    fn test_add_carries_into_new_limb() {
        let a = BigNum::from_u64(u64::MAX);
        let c = a.add(&BigNum::one());
        assert_eq!(c, BigNum::from_limbs(vec![0, 1]));
    }

    #[test]
    fn test_checked_sub() {
        let a = BigNum::from_limbs(vec![0, 1]);
        assert_eq!(a.checked_sub(&BigNum::one()), Some(BigNum::from_u64(u64::MAX)));
        assert_eq!(BigNum::one().checked_sub(&a), None);
        assert!(a.checked_sub(&a).unwrap().is_zero());
    }

    #[test]
    fn test_mul_and_shift() {
        let a = BigNum::from_u64(12345);
        assert_eq!(a.mul(&BigNum::from_u64(67890)), BigNum::from_u64(12345 * 67890));
        let big = a.shl(200);
        assert_eq!(big.shr(200), a);
        assert_eq!(big.shr(190), a.shl(10));
        assert!(a.shr(64).is_zero());
    }

    #[test]
    fn test_div_rem_large() {
        let a = bn("77506bf2efc6f877186d76b07e881ed162ae2eb1547f15052434b9b5df9e7769b10f4205b4907a70c31012f037b64ce4228c38fb2918f135d25f557203301850c5a38fd547923a736994e3bf911a61dbe22e44158bae97ba94d0eda82f8f6d05584ef8aa38922766581e27a1c08a6a63ec24ede6a46b4cb2424a23d596");
        let d = bn("7cfc7a2ea20b2f14c942e05319acb5c74273f98e2774cbd87ad5c90a9587403e430ec66a78795e761d1");
        let (q, r) = a.div_rem(&d).unwrap();
        assert_eq!(q, bn("f461dcdb9d0b361eef8c94d1590af6bd3f23f69f6e987b3cd819765e238fb17756020be11d7756c4d1af253873ea6f31e2b4c18453a53a9ee83bb1d4a713adf3903b7a659c1c8230f0a537c60a9300402ca1c7a"));
        assert_eq!(r, bn("6f41eb9767480d25bb88813e7e0fd3ee2fab2de39cc6345ce79d0b7f7ece9f98e459af838a4ba425bfc"));
        assert_eq!(q.mul(&d).add(&r), a);
    }

    #[test]
    fn test_div_small_cases() {
        let (q, r) = BigNum::from_u64(100).div_rem(&BigNum::from_u64(7)).unwrap();
        assert_eq!((q, r), (BigNum::from_u64(14), BigNum::from_u64(2)));
        let (q, r) = BigNum::from_u64(3).div_rem(&BigNum::from_u64(7)).unwrap();
        assert!(q.is_zero());
        assert_eq!(r, BigNum::from_u64(3));
        assert_eq!(
            BigNum::one().div_rem(&BigNum::zero()).unwrap_err(),
            CryptoError::BnDivisionByZero
        );
    }
}
