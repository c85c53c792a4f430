//! Resumable fixed-window modular exponentiation.
//!
//! [`ModExp::step`] processes a bounded number of exponent windows per call
//! so a caller can spread a 2048-bit private-key operation across many
//! short ticks.

use crate::bignum::BigNum;
use crate::montgomery::MontgomeryCtx;
use pssl_types::CryptoError;

/// Exponent bits consumed per window.
pub const WINDOW_BITS: usize = 4;

/// An in-progress `base^exp mod N`.
#[derive(Clone, Debug)]
pub struct ModExp {
    ctx: MontgomeryCtx,
    /// base^i in Montgomery form for i in 0..2^WINDOW_BITS
    table: Vec<BigNum>,
    exp: BigNum,
    /// Exponent bits still to process, counted from the top.
    bits_left: usize,
    acc: BigNum,
}

impl ModExp {
    pub fn new(ctx: MontgomeryCtx, base: &BigNum, exp: &BigNum) -> Result<Self, CryptoError> {
        let base_m = ctx.to_mont(base)?;
        let mut table = Vec::with_capacity(1 << WINDOW_BITS);
        table.push(ctx.one());
        table.push(base_m.clone());
        for i in 2..(1 << WINDOW_BITS) {
            let next = ctx.mul(&table[i - 1], &base_m);
            table.push(next);
        }
        Ok(Self {
            acc: ctx.one(),
            bits_left: exp.bit_len(),
            exp: exp.clone(),
            table,
            ctx,
        })
    }

    /// Windows remaining before the result is available.
    pub fn windows_left(&self) -> usize {
        self.bits_left.div_ceil(WINDOW_BITS)
    }

    /// Process up to `max_windows` windows. Returns the result once every
    /// exponent bit has been consumed.
    pub fn step(&mut self, max_windows: usize) -> Option<BigNum> {
        let mut done = 0;
        while self.bits_left > 0 && done < max_windows {
            // Align windows to the bottom of the exponent so the first
            // window absorbs the remainder bits.
            let width = match self.bits_left % WINDOW_BITS {
                0 => WINDOW_BITS,
                r => r,
            };
            self.bits_left -= width;
            for _ in 0..width {
                self.acc = self.ctx.sqr(&self.acc);
            }
            let mut window = 0usize;
            for b in (0..width).rev() {
                window = (window << 1) | self.exp.get_bit(self.bits_left + b) as usize;
            }
            if window != 0 {
                self.acc = self.ctx.mul(&self.acc, &self.table[window]);
            }
            done += 1;
        }
        (self.bits_left == 0).then(|| self.ctx.from_mont(&self.acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bn(hex: &str) -> BigNum {
        BigNum::from_hex(hex).unwrap()
    }

    fn vector() -> (MontgomeryCtx, BigNum, BigNum, BigNum) {
        let n = bn("11336f675cc81e74ef5e8e25d940ed904759531985d5d9dc9f81818e811892f902bd23f0824128b2f330c5c7fd0a6a3a4506513270e269e0d37f2a74de452e6b439");
        let b = bn("fd630f29d0da9953f48f1a09f76b5a170b33839263059f28c105d1fb17c2390c192cfd3ac94af0f21ddb66cad4a268d116ece1738f7d93d9c172411e20b8f6b0d549b6f03675a1600a35a");
        let e = bn("221dbc496cb8e81973e0becd7b03898d190f9ebdacc0cb1e29c658cda1495e60af593bd04cf");
        let r = bn("52f9365105c894cf6e9bf7a16df671e7993379b4c903c1ba2306e035536733a8406d3709a3293dd67022dfa99e55c31cad9c33637e013a58ce75a8b25cce43fa3f");
        (MontgomeryCtx::new(&n).unwrap(), b, e, r)
    }

    #[test]
    fn test_single_call_matches_reference() {
        let (ctx, b, e, r) = vector();
        assert_eq!(ctx.exp(&b, &e).unwrap(), r);
    }

    #[test]
    fn test_one_window_per_step() {
        let (ctx, b, e, r) = vector();
        let mut op = ModExp::new(ctx, &b, &e).unwrap();
        let windows = op.windows_left();
        assert_eq!(windows, e.bit_len().div_ceil(WINDOW_BITS));
        let mut calls = 0;
        let result = loop {
            calls += 1;
            if let Some(v) = op.step(1) {
                break v;
            }
        };
        assert_eq!(calls, windows);
        assert_eq!(result, r);
    }

    #[test]
    fn test_zero_exponent() {
        let ctx = MontgomeryCtx::new(&BigNum::from_u64(97)).unwrap();
        let mut op = ModExp::new(ctx, &BigNum::from_u64(5), &BigNum::zero()).unwrap();
        assert_eq!(op.step(1), Some(BigNum::one()));
    }
}
