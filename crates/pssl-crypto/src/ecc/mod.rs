//! Elliptic curve groups used by ECDSA and ECDH.
//!
//! Short Weierstrass curves (P-256, P-384) use Jacobian coordinates held in
//! the Montgomery domain of the field prime; see [`point`]. The Montgomery
//! curves (X25519, X448) use an x-only ladder; see [`montgomery`].

pub(crate) mod montgomery;
pub(crate) mod point;

use pssl_bignum::{BigNum, MontgomeryCtx};
use pssl_types::{CryptoError, EccCurveId};

pub(crate) use point::{JacobianPoint, PointMul};

/// Domain parameters of a short Weierstrass curve `y² = x³ - 3x + b`.
#[derive(Clone, Debug)]
pub(crate) struct WeierstrassCurve {
    pub id: EccCurveId,
    /// Field arithmetic modulo p.
    pub field: MontgomeryCtx,
    /// Scalar arithmetic modulo the group order n.
    pub scalar: MontgomeryCtx,
    /// b in Montgomery form.
    pub b: BigNum,
    /// Generator in Montgomery form.
    pub gx: BigNum,
    pub gy: BigNum,
}

struct CurveHex {
    p: &'static str,
    b: &'static str,
    gx: &'static str,
    gy: &'static str,
    n: &'static str,
}

const P256: CurveHex = CurveHex {
    p: "FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFF",
    b: "5AC635D8AA3A93E7B3EBBD55769886BC651D06B0CC53B0F63BCE3C3E27D2604B",
    gx: "6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296",
    gy: "4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5",
    n: "FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551",
};

const P384: CurveHex = CurveHex {
    p: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFFFF0000000000000000FFFFFFFF",
    b: "B3312FA7E23EE7E4988E056BE3F82D19181D9C6EFE8141120314088F5013875AC656398D8A2ED19D2A85C8EDD3EC2AEF",
    gx: "AA87CA22BE8B05378EB1C71EF320AD746E1D3B628BA79B9859F741E082542A385502F25DBF55296C3A545E3872760AB7",
    gy: "3617DE4A96262C6F5D9E98BF9292DC29F8F41DBD289A147CE9DA3113B5F0B8C00A60B1CE1D7E819D7A431D7C90EA0E5F",
    n: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFC7634D81F4372DDF581A0DB248B0A77AECEC196ACCC52973",
};

impl WeierstrassCurve {
    pub fn new(id: EccCurveId) -> Result<Self, CryptoError> {
        let hex = match id {
            EccCurveId::NistP256 => &P256,
            EccCurveId::NistP384 => &P384,
            _ => return Err(CryptoError::NotSupported),
        };
        let field = MontgomeryCtx::new(&BigNum::from_hex(hex.p)?)?;
        let scalar = MontgomeryCtx::new(&BigNum::from_hex(hex.n)?)?;
        Ok(Self {
            id,
            b: field.to_mont(&BigNum::from_hex(hex.b)?)?,
            gx: field.to_mont(&BigNum::from_hex(hex.gx)?)?,
            gy: field.to_mont(&BigNum::from_hex(hex.gy)?)?,
            field,
            scalar,
        })
    }

    pub fn field_len(&self) -> usize {
        self.id.field_len()
    }

    pub fn order(&self) -> &BigNum {
        self.scalar.modulus()
    }

    pub fn generator(&self) -> JacobianPoint {
        JacobianPoint::from_mont_affine(self.gx.clone(), self.gy.clone(), &self.field)
    }

    /// Decode an uncompressed SEC1 point and check that it is on the curve.
    pub fn decode_point(&self, data: &[u8]) -> Result<JacobianPoint, CryptoError> {
        let len = self.field_len();
        if data.len() != 1 + 2 * len || data[0] != 0x04 {
            return Err(CryptoError::EccInvalidPublicKey);
        }
        let x = BigNum::from_bytes_be(&data[1..1 + len]);
        let y = BigNum::from_bytes_be(&data[1 + len..]);
        let p = self.field.modulus();
        if x >= *p || y >= *p {
            return Err(CryptoError::EccInvalidPublicKey);
        }
        let x = self.field.to_mont(&x)?;
        let y = self.field.to_mont(&y)?;
        // y² = x³ - 3x + b
        let f = &self.field;
        let lhs = f.sqr(&y);
        let x3 = f.mul(&f.sqr(&x), &x);
        let three_x = f.add(&f.add(&x, &x), &x);
        let rhs = f.add(&f.sub(&x3, &three_x), &self.b);
        if lhs != rhs {
            return Err(CryptoError::EccPointNotOnCurve);
        }
        Ok(JacobianPoint::from_mont_affine(x, y, f))
    }

    /// Encode a point as uncompressed SEC1 bytes.
    pub fn encode_point(&self, pt: &JacobianPoint) -> Result<Vec<u8>, CryptoError> {
        let (x, y) = pt.to_affine(&self.field)?;
        let len = self.field_len();
        let mut out = Vec::with_capacity(1 + 2 * len);
        out.push(0x04);
        out.extend_from_slice(&x.to_bytes_be_padded(len)?);
        out.extend_from_slice(&y.to_bytes_be_padded(len)?);
        Ok(out)
    }

    /// `a * b mod n` for plain-domain scalars.
    pub fn scalar_mul(&self, a: &BigNum, b: &BigNum) -> Result<BigNum, CryptoError> {
        let b = b.mod_reduce(self.order())?;
        Ok(self.scalar.mul(&self.scalar.to_mont(a)?, &b))
    }
}
