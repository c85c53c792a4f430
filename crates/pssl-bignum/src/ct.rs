//! Constant-time helpers for big numbers.

use crate::bignum::BigNum;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

impl BigNum {
    /// Constant-time equality over the limb width of the longer operand.
    pub fn ct_eq(&self, other: &BigNum) -> Choice {
        let width = self.num_limbs().max(other.num_limbs());
        let mut acc = Choice::from(1);
        for i in 0..width {
            acc &= self.limb(i).ct_eq(&other.limb(i));
        }
        acc
    }

    /// Swap `a` and `b` when `choice` is set, touching every limb either way.
    pub fn ct_swap(a: &mut BigNum, b: &mut BigNum, choice: Choice) {
        let width = a.num_limbs().max(b.num_limbs());
        a.limbs_mut().resize(width, 0);
        b.limbs_mut().resize(width, 0);
        for i in 0..width {
            u64::conditional_swap(&mut a.limbs_mut()[i], &mut b.limbs_mut()[i], choice);
        }
        a.normalize();
        b.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq() {
        let a = BigNum::from_limbs(vec![1, 2]);
        assert!(bool::from(a.ct_eq(&BigNum::from_limbs(vec![1, 2]))));
        assert!(!bool::from(a.ct_eq(&BigNum::from_u64(1))));
    }

    #[test]
    fn test_ct_swap() {
        let mut a = BigNum::from_u64(7);
        let mut b = BigNum::from_limbs(vec![1, 9]);
        BigNum::ct_swap(&mut a, &mut b, Choice::from(0));
        assert_eq!(a, BigNum::from_u64(7));
        BigNum::ct_swap(&mut a, &mut b, Choice::from(1));
        assert_eq!(a, BigNum::from_limbs(vec![1, 9]));
        assert_eq!(b, BigNum::from_u64(7));
    }
}
