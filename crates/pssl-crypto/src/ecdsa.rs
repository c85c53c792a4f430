//! ECDSA over P-256 and P-384 (FIPS 186-4), as resumable operations.
//!
//! Signatures are exchanged as raw `(r, s)` integers; DER wrapping happens
//! in the certificate layer.

use crate::ecc::{JacobianPoint, PointMul, WeierstrassCurve};
use crate::step::{Progress, StepOp, ECC_BITS_PER_POLL};
use pssl_bignum::BigNum;
use pssl_types::{CryptoError, EccCurveId};
use zeroize::Zeroizing;

/// Raw ECDSA signature values, big-endian without leading zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

/// An ECDSA verification key.
#[derive(Clone, Debug)]
pub struct EcdsaPublicKey {
    curve: WeierstrassCurve,
    point: JacobianPoint,
    encoded: Vec<u8>,
}

impl EcdsaPublicKey {
    /// Decode an uncompressed SEC1 point.
    pub fn from_uncompressed(curve: EccCurveId, data: &[u8]) -> Result<Self, CryptoError> {
        let curve = WeierstrassCurve::new(curve)?;
        let point = curve.decode_point(data)?;
        Ok(Self {
            curve,
            point,
            encoded: data.to_vec(),
        })
    }

    pub fn curve_id(&self) -> EccCurveId {
        self.curve.id
    }

    /// Uncompressed SEC1 encoding.
    pub fn to_uncompressed(&self) -> &[u8] {
        &self.encoded
    }

    pub fn begin_verify(&self, hash: &[u8], sig: &EcdsaSignature) -> Result<EcdsaVerify, CryptoError> {
        let c = &self.curve;
        let n = c.order();
        let r = BigNum::from_bytes_be(&sig.r);
        let s = BigNum::from_bytes_be(&sig.s);
        if r.is_zero() || s.is_zero() || r >= *n || s >= *n {
            return Err(CryptoError::EcdsaVerifyFail);
        }
        let e = truncate_hash(hash, n)?;
        let w = c.scalar.inv_prime(&s)?;
        let u1 = c.scalar_mul(&e, &w)?;
        let u2 = c.scalar_mul(&r, &w)?;
        Ok(EcdsaVerify {
            mul: PointMul::dual(&c.field, &u1, c.generator(), &u2, self.point.clone()),
            curve: c.clone(),
            r,
        })
    }
}

/// An ECDSA signing key.
#[derive(Clone)]
pub struct EcdsaPrivateKey {
    curve: WeierstrassCurve,
    d: BigNum,
    public: EcdsaPublicKey,
}

impl std::fmt::Debug for EcdsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaPrivateKey")
            .field("curve", &self.curve.id)
            .finish_non_exhaustive()
    }
}

impl EcdsaPrivateKey {
    /// Load a private scalar and derive its public point.
    pub fn from_scalar(curve: EccCurveId, d: &[u8]) -> Result<Self, CryptoError> {
        let curve = WeierstrassCurve::new(curve)?;
        let d = BigNum::from_bytes_be(d);
        if d.is_zero() || d >= *curve.order() {
            return Err(CryptoError::EccInvalidPrivateKey);
        }
        let bits = curve.order().bit_len();
        let q = PointMul::single(&curve.field, &d, curve.generator(), bits).run();
        let encoded = curve.encode_point(&q)?;
        Ok(Self {
            public: EcdsaPublicKey {
                curve: curve.clone(),
                point: q,
                encoded,
            },
            curve,
            d,
        })
    }

    /// Generate a fresh key.
    pub fn generate(curve: EccCurveId) -> Result<Self, CryptoError> {
        let order = WeierstrassCurve::new(curve)?.order().clone();
        let d = Zeroizing::new(BigNum::random_range(&order)?.to_bytes_be());
        Self::from_scalar(curve, &d)
    }

    pub fn public_key(&self) -> &EcdsaPublicKey {
        &self.public
    }

    pub fn curve_id(&self) -> EccCurveId {
        self.curve.id
    }

    /// Private scalar, big-endian and padded to the field length.
    pub fn scalar_bytes(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        Ok(Zeroizing::new(self.d.to_bytes_be_padded(self.curve.field_len())?))
    }

    pub fn begin_sign(&self, hash: &[u8]) -> Result<EcdsaSign, CryptoError> {
        let e = truncate_hash(hash, self.curve.order())?;
        let mut op = EcdsaSign {
            curve: self.curve.clone(),
            d: self.d.clone(),
            e,
            k: BigNum::zero(),
            mul: None,
        };
        op.restart()?;
        Ok(op)
    }
}

/// Leftmost `bits(n)` bits of the hash, reduced mod n.
fn truncate_hash(hash: &[u8], n: &BigNum) -> Result<BigNum, CryptoError> {
    let n_bits = n.bit_len();
    let e = BigNum::from_bytes_be(hash);
    let e = if hash.len() * 8 > n_bits {
        e.shr(hash.len() * 8 - n_bits)
    } else {
        e
    };
    e.mod_reduce(n)
}

/// A signature in progress. A fresh nonce is drawn whenever r or s is zero.
pub struct EcdsaSign {
    curve: WeierstrassCurve,
    d: BigNum,
    e: BigNum,
    k: BigNum,
    mul: Option<PointMul>,
}

impl EcdsaSign {
    fn restart(&mut self) -> Result<(), CryptoError> {
        let n = self.curve.order();
        self.k = BigNum::random_range(n)?;
        self.mul = Some(PointMul::single(
            &self.curve.field,
            &self.k,
            self.curve.generator(),
            n.bit_len(),
        ));
        Ok(())
    }
}

impl StepOp for EcdsaSign {
    type Output = EcdsaSignature;

    fn poll(&mut self) -> Result<Progress<EcdsaSignature>, CryptoError> {
        let mul = self.mul.as_mut().ok_or(CryptoError::InvalidArg)?;
        let Some(kg) = mul.step(ECC_BITS_PER_POLL) else {
            return Ok(Progress::Pending);
        };
        self.mul = None;
        let c = &self.curve;
        let n = c.order();
        let (x, _) = kg.to_affine(&c.field)?;
        let r = x.mod_reduce(n)?;
        // s = k^-1 (e + d r) mod n
        let dr = c.scalar_mul(&self.d, &r)?;
        let sum = c.scalar.add(&self.e, &dr);
        let s = c.scalar_mul(&c.scalar.inv_prime(&self.k)?, &sum)?;
        if r.is_zero() || s.is_zero() {
            self.restart()?;
            return Ok(Progress::Pending);
        }
        Ok(Progress::Done(EcdsaSignature {
            r: r.to_bytes_be(),
            s: s.to_bytes_be(),
        }))
    }
}

/// A verification in progress.
pub struct EcdsaVerify {
    curve: WeierstrassCurve,
    mul: PointMul,
    r: BigNum,
}

impl StepOp for EcdsaVerify {
    type Output = ();

    fn poll(&mut self) -> Result<Progress<()>, CryptoError> {
        let Some(p) = self.mul.step(ECC_BITS_PER_POLL) else {
            return Ok(Progress::Pending);
        };
        if p.is_infinity() {
            return Err(CryptoError::EcdsaVerifyFail);
        }
        let (x, _) = p.to_affine(&self.curve.field)?;
        if x.mod_reduce(self.curve.order())? != self.r {
            log::debug!("ecdsa signature mismatch on {:?}", self.curve.id);
            return Err(CryptoError::EcdsaVerifyFail);
        }
        Ok(Progress::Done(()))
    }
}
