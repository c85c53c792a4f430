//! X25519 and X448 (RFC 7748) as a resumable x-only ladder.

use pssl_bignum::{BigNum, MontgomeryCtx};
use pssl_types::{CryptoError, EccCurveId};
use subtle::Choice;

const P25519: &str = "7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFED";
const P448: &str = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";

/// Ladder parameters: scalar bits, (A - 2) / 4 and the base point u.
fn params(id: EccCurveId) -> Result<(&'static str, usize, u64, u64), CryptoError> {
    match id {
        EccCurveId::X25519 => Ok((P25519, 255, 121665, 9)),
        EccCurveId::X448 => Ok((P448, 448, 39081, 5)),
        _ => Err(CryptoError::NotSupported),
    }
}

/// Clamp a little-endian private scalar.
pub(crate) fn clamp(id: EccCurveId, k: &mut [u8]) {
    match id {
        EccCurveId::X25519 => {
            k[0] &= 248;
            k[31] &= 127;
            k[31] |= 64;
        }
        EccCurveId::X448 => {
            k[0] &= 252;
            k[55] |= 128;
        }
        _ => {}
    }
}

fn from_le(bytes: &[u8]) -> BigNum {
    let mut be = bytes.to_vec();
    be.reverse();
    BigNum::from_bytes_be(&be)
}

fn to_le(n: &BigNum, len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut out = n.to_bytes_be_padded(len)?;
    out.reverse();
    Ok(out)
}

/// The base point u-coordinate, little-endian.
pub(crate) fn base_point(id: EccCurveId) -> Result<Vec<u8>, CryptoError> {
    let (_, _, _, u) = params(id)?;
    to_le(&BigNum::from_u64(u), id.field_len())
}

/// Resumable `k · u` on a Montgomery curve.
pub(crate) struct Ladder {
    id: EccCurveId,
    f: MontgomeryCtx,
    k: BigNum,
    a24: BigNum,
    x1: BigNum,
    x2: BigNum,
    z2: BigNum,
    x3: BigNum,
    z3: BigNum,
    swap: bool,
    bits_left: usize,
}

impl Ladder {
    /// `scalar` is clamped here; `u` is little-endian, top bit masked for X25519.
    pub fn new(id: EccCurveId, scalar: &[u8], u: &[u8]) -> Result<Self, CryptoError> {
        let (p_hex, bits, a24, _) = params(id)?;
        let len = id.field_len();
        if scalar.len() != len {
            return Err(CryptoError::EccInvalidPrivateKey);
        }
        if u.len() != len {
            return Err(CryptoError::EccInvalidPublicKey);
        }
        let mut k = scalar.to_vec();
        clamp(id, &mut k);
        let mut u = u.to_vec();
        if id == EccCurveId::X25519 {
            u[31] &= 0x7F;
        }
        let f = MontgomeryCtx::new(&BigNum::from_hex(p_hex)?)?;
        let x1 = f.to_mont(&from_le(&u))?;
        Ok(Self {
            id,
            k: from_le(&k),
            a24: f.to_mont(&BigNum::from_u64(a24))?,
            x2: f.one(),
            z2: BigNum::zero(),
            x3: x1.clone(),
            z3: f.one(),
            x1,
            f,
            swap: false,
            bits_left: bits,
        })
    }

    /// Process up to `max_bits` bits; returns the little-endian u-coordinate.
    pub fn step(&mut self, max_bits: usize) -> Option<Result<Vec<u8>, CryptoError>> {
        let f = &self.f;
        let mut budget = max_bits;
        while self.bits_left > 0 && budget > 0 {
            self.bits_left -= 1;
            budget -= 1;
            let bit = self.k.get_bit(self.bits_left);
            let choice = Choice::from((self.swap ^ bit) as u8);
            BigNum::ct_swap(&mut self.x2, &mut self.x3, choice);
            BigNum::ct_swap(&mut self.z2, &mut self.z3, choice);
            self.swap = bit;

            let a = f.add(&self.x2, &self.z2);
            let aa = f.sqr(&a);
            let b = f.sub(&self.x2, &self.z2);
            let bb = f.sqr(&b);
            let e = f.sub(&aa, &bb);
            let c = f.add(&self.x3, &self.z3);
            let d = f.sub(&self.x3, &self.z3);
            let da = f.mul(&d, &a);
            let cb = f.mul(&c, &b);
            self.x3 = f.sqr(&f.add(&da, &cb));
            self.z3 = f.mul(&self.x1, &f.sqr(&f.sub(&da, &cb)));
            self.x2 = f.mul(&aa, &bb);
            self.z2 = f.mul(&e, &f.add(&aa, &f.mul(&self.a24, &e)));
        }
        if self.bits_left > 0 {
            return None;
        }
        let choice = Choice::from(self.swap as u8);
        BigNum::ct_swap(&mut self.x2, &mut self.x3, choice);
        BigNum::ct_swap(&mut self.z2, &mut self.z3, choice);
        Some(self.finish())
    }

    fn finish(&self) -> Result<Vec<u8>, CryptoError> {
        let f = &self.f;
        // z2 = 0 yields the all-zero output, rejected by the caller.
        if self.z2.is_zero() {
            return to_le(&BigNum::zero(), self.id.field_len());
        }
        let z_inv = f.to_mont(&f.inv_prime(&f.from_mont(&self.z2))?)?;
        to_le(&f.from_mont(&f.mul(&self.x2, &z_inv)), self.id.field_len())
    }
}
