//! Montgomery multiplication context.

use crate::bignum::{BigNum, DoubleLimb, Limb, LIMB_BITS};
use crate::modexp::ModExp;
use crate::ops::{add_assign, cmp_limbs, mul_limbs, sub_assign};
use pssl_types::CryptoError;
use std::cmp::Ordering;

/// Montgomery arithmetic modulo an odd `N`, with `R = 2^(64 * limbs(N))`.
///
/// Values passed to `mul`, `sqr`, `add` and `sub` must already be reduced
/// (less than `N`); results are reduced as well.
#[derive(Clone, Debug)]
pub struct MontgomeryCtx {
    modulus: BigNum,
    m_size: usize,
    /// -N^-1 mod 2^64
    n_prime: Limb,
    r_squared: BigNum,
    r_mod_n: BigNum,
}

impl MontgomeryCtx {
    pub fn new(modulus: &BigNum) -> Result<Self, CryptoError> {
        if modulus.is_zero() {
            return Err(CryptoError::BnDivisionByZero);
        }
        if !modulus.is_odd() {
            return Err(CryptoError::BnEvenModulus);
        }
        let m_size = modulus.num_limbs();
        let r_mod_n = BigNum::one().shl(m_size * LIMB_BITS).mod_reduce(modulus)?;
        let r_squared = BigNum::one()
            .shl(2 * m_size * LIMB_BITS)
            .mod_reduce(modulus)?;
        Ok(Self {
            modulus: modulus.clone(),
            m_size,
            n_prime: compute_n_prime(modulus.limb(0)),
            r_squared,
            r_mod_n,
        })
    }

    pub fn modulus(&self) -> &BigNum {
        &self.modulus
    }

    /// Montgomery form of one (`R mod N`).
    pub fn one(&self) -> BigNum {
        self.r_mod_n.clone()
    }

    /// Convert into Montgomery form: `aR mod N`.
    pub fn to_mont(&self, a: &BigNum) -> Result<BigNum, CryptoError> {
        let reduced;
        let a = if *a >= self.modulus {
            reduced = a.mod_reduce(&self.modulus)?;
            &reduced
        } else {
            a
        };
        Ok(self.mul(a, &self.r_squared))
    }

    /// Convert out of Montgomery form: `a R^-1 mod N`.
    pub fn from_mont(&self, a: &BigNum) -> BigNum {
        self.redc(a.limbs().to_vec())
    }

    /// `a b R^-1 mod N`.
    pub fn mul(&self, a: &BigNum, b: &BigNum) -> BigNum {
        if a.is_zero() || b.is_zero() {
            return BigNum::zero();
        }
        self.redc(mul_limbs(a.limbs(), b.limbs()))
    }

    pub fn sqr(&self, a: &BigNum) -> BigNum {
        self.mul(a, a)
    }

    /// `a + b mod N`.
    pub fn add(&self, a: &BigNum, b: &BigNum) -> BigNum {
        let mut sum = vec![0u64; self.m_size + 1];
        sum[..a.num_limbs()].copy_from_slice(a.limbs());
        add_assign(&mut sum, b.limbs());
        if cmp_limbs(&sum, self.modulus.limbs()) != Ordering::Less {
            sub_assign(&mut sum, self.modulus.limbs());
        }
        BigNum::from_limbs(sum)
    }

    /// `a - b mod N`.
    pub fn sub(&self, a: &BigNum, b: &BigNum) -> BigNum {
        let mut diff = vec![0u64; self.m_size + 1];
        diff[..a.num_limbs()].copy_from_slice(a.limbs());
        if *a < *b {
            add_assign(&mut diff, self.modulus.limbs());
        }
        sub_assign(&mut diff, b.limbs());
        BigNum::from_limbs(diff)
    }

    /// `-a mod N`.
    pub fn neg(&self, a: &BigNum) -> BigNum {
        self.sub(&BigNum::zero(), a)
    }

    /// Run a full exponentiation `base^exp mod N` (plain domain in and out).
    pub fn exp(&self, base: &BigNum, exp: &BigNum) -> Result<BigNum, CryptoError> {
        let mut op = ModExp::new(self.clone(), base, exp)?;
        loop {
            if let Some(result) = op.step(usize::MAX) {
                return Ok(result);
            }
        }
    }

    /// Inverse modulo a prime `N` by Fermat's little theorem (plain domain).
    pub fn inv_prime(&self, a: &BigNum) -> Result<BigNum, CryptoError> {
        if a.mod_reduce(&self.modulus)?.is_zero() {
            return Err(CryptoError::BnNoInverse);
        }
        let two = BigNum::from_u64(2);
        let p_minus_2 = self
            .modulus
            .checked_sub(&two)
            .ok_or(CryptoError::BnNoInverse)?;
        self.exp(a, &p_minus_2)
    }

    /// Montgomery REDC of `t` (`t < N R`).
    fn redc(&self, mut t: Vec<Limb>) -> BigNum {
        let m = self.m_size;
        let n = self.modulus.limbs();
        t.resize(2 * m + 1, 0);
        for i in 0..m {
            let q = t[i].wrapping_mul(self.n_prime);
            let mut carry = 0u64;
            for j in 0..m {
                let v = q as DoubleLimb * n[j] as DoubleLimb
                    + t[i + j] as DoubleLimb
                    + carry as DoubleLimb;
                t[i + j] = v as Limb;
                carry = (v >> LIMB_BITS) as Limb;
            }
            let mut k = i + m;
            while carry != 0 && k < t.len() {
                let v = t[k] as DoubleLimb + carry as DoubleLimb;
                t[k] = v as Limb;
                carry = (v >> LIMB_BITS) as Limb;
                k += 1;
            }
        }
        let mut out = t.split_off(m);
        if cmp_limbs(&out, n) != Ordering::Less {
            sub_assign(&mut out, n);
        }
        BigNum::from_limbs(out)
    }
}

/// N' with `n0 * N' = -1 mod 2^64`, by Newton iteration.
fn compute_n_prime(n0: u64) -> u64 {
    let mut x: u64 = 1;
    for _ in 0..6 {
        x = x.wrapping_mul(2u64.wrapping_sub(n0.wrapping_mul(x)));
    }
    x.wrapping_neg()
}
