//! Jacobian point arithmetic for `a = -3` Weierstrass curves.
//!
//! Coordinates (X, Y, Z) represent the affine point (X/Z², Y/Z³) and are
//! kept in the Montgomery domain of the field. Z = 0 is the point at
//! infinity.

use pssl_bignum::{BigNum, MontgomeryCtx};
use pssl_types::CryptoError;
use subtle::Choice;

#[derive(Clone, Debug)]
pub(crate) struct JacobianPoint {
    pub x: BigNum,
    pub y: BigNum,
    pub z: BigNum,
}

impl JacobianPoint {
    pub fn infinity() -> Self {
        Self {
            x: BigNum::zero(),
            y: BigNum::zero(),
            z: BigNum::zero(),
        }
    }

    /// Point from Montgomery-domain affine coordinates (Z = 1).
    pub fn from_mont_affine(x: BigNum, y: BigNum, f: &MontgomeryCtx) -> Self {
        Self { x, y, z: f.one() }
    }

    pub fn is_infinity(&self) -> bool {
        self.z.is_zero()
    }

    /// Plain-domain affine coordinates.
    pub fn to_affine(&self, f: &MontgomeryCtx) -> Result<(BigNum, BigNum), CryptoError> {
        if self.is_infinity() {
            return Err(CryptoError::EccPointAtInfinity);
        }
        let z_inv = f.to_mont(&f.inv_prime(&f.from_mont(&self.z))?)?;
        let z_inv2 = f.sqr(&z_inv);
        let z_inv3 = f.mul(&z_inv2, &z_inv);
        Ok((
            f.from_mont(&f.mul(&self.x, &z_inv2)),
            f.from_mont(&f.mul(&self.y, &z_inv3)),
        ))
    }

    fn ct_swap(a: &mut Self, b: &mut Self, choice: Choice) {
        BigNum::ct_swap(&mut a.x, &mut b.x, choice);
        BigNum::ct_swap(&mut a.y, &mut b.y, choice);
        BigNum::ct_swap(&mut a.z, &mut b.z, choice);
    }
}

/// R = 2A.
pub(crate) fn point_double(a: &JacobianPoint, f: &MontgomeryCtx) -> JacobianPoint {
    if a.is_infinity() || a.y.is_zero() {
        return JacobianPoint::infinity();
    }
    // S = 4·X·Y²
    let y_sq = f.sqr(&a.y);
    let s = f.mul(&a.x, &y_sq);
    let s = f.add(&s, &s);
    let s = f.add(&s, &s);
    // M = 3·(X + Z²)·(X - Z²)
    let z_sq = f.sqr(&a.z);
    let m = f.mul(&f.add(&a.x, &z_sq), &f.sub(&a.x, &z_sq));
    let m = f.add(&f.add(&m, &m), &m);
    // X3 = M² - 2·S
    let x3 = f.sub(&f.sub(&f.sqr(&m), &s), &s);
    // Y3 = M·(S - X3) - 8·Y⁴
    let y4 = f.sqr(&y_sq);
    let y4_2 = f.add(&y4, &y4);
    let y4_4 = f.add(&y4_2, &y4_2);
    let y4_8 = f.add(&y4_4, &y4_4);
    let y3 = f.sub(&f.mul(&m, &f.sub(&s, &x3)), &y4_8);
    // Z3 = 2·Y·Z
    let yz = f.mul(&a.y, &a.z);
    JacobianPoint {
        x: x3,
        y: y3,
        z: f.add(&yz, &yz),
    }
}

/// R = A + B.
pub(crate) fn point_add(a: &JacobianPoint, b: &JacobianPoint, f: &MontgomeryCtx) -> JacobianPoint {
    if a.is_infinity() {
        return b.clone();
    }
    if b.is_infinity() {
        return a.clone();
    }
    let z1_sq = f.sqr(&a.z);
    let z2_sq = f.sqr(&b.z);
    let u1 = f.mul(&a.x, &z2_sq);
    let u2 = f.mul(&b.x, &z1_sq);
    let s1 = f.mul(&a.y, &f.mul(&z2_sq, &b.z));
    let s2 = f.mul(&b.y, &f.mul(&z1_sq, &a.z));
    let h = f.sub(&u2, &u1);
    let r = f.sub(&s2, &s1);
    if h.is_zero() {
        if r.is_zero() {
            return point_double(a, f);
        }
        return JacobianPoint::infinity();
    }
    let h_sq = f.sqr(&h);
    let h_cu = f.mul(&h_sq, &h);
    let u1_h_sq = f.mul(&u1, &h_sq);
    // X3 = R² - H³ - 2·U1·H²
    let x3 = f.sub(&f.sub(&f.sub(&f.sqr(&r), &h_cu), &u1_h_sq), &u1_h_sq);
    // Y3 = R·(U1·H² - X3) - S1·H³
    let y3 = f.sub(&f.mul(&r, &f.sub(&u1_h_sq, &x3)), &f.mul(&s1, &h_cu));
    // Z3 = H·Z1·Z2
    let z3 = f.mul(&f.mul(&h, &a.z), &b.z);
    JacobianPoint { x: x3, y: y3, z: z3 }
}

/// Resumable scalar multiplication, MSB first.
///
/// A single product `k·P` runs a fixed number of iterations and selects the
/// sum without branching on key bits. The two-term form `k1·P + k2·Q`
/// (Shamir's trick) works on public values only and is used for
/// verification.
pub(crate) struct PointMul {
    field: MontgomeryCtx,
    k1: BigNum,
    p1: JacobianPoint,
    second: Option<(BigNum, JacobianPoint, JacobianPoint)>,
    acc: JacobianPoint,
    bits_left: usize,
}

impl PointMul {
    /// `k·p`, iterating over `bits` scalar bits.
    pub fn single(field: &MontgomeryCtx, k: &BigNum, p: JacobianPoint, bits: usize) -> Self {
        Self {
            field: field.clone(),
            k1: k.clone(),
            p1: p,
            second: None,
            acc: JacobianPoint::infinity(),
            bits_left: bits.max(k.bit_len()),
        }
    }

    /// `k1·p1 + k2·p2`.
    pub fn dual(
        field: &MontgomeryCtx,
        k1: &BigNum,
        p1: JacobianPoint,
        k2: &BigNum,
        p2: JacobianPoint,
    ) -> Self {
        let sum = point_add(&p1, &p2, field);
        Self {
            field: field.clone(),
            bits_left: k1.bit_len().max(k2.bit_len()),
            k1: k1.clone(),
            p1,
            second: Some((k2.clone(), p2, sum)),
            acc: JacobianPoint::infinity(),
        }
    }

    /// Process up to `max_bits` scalar bits; returns the product when done.
    pub fn step(&mut self, max_bits: usize) -> Option<JacobianPoint> {
        let f = &self.field;
        let mut budget = max_bits;
        while self.bits_left > 0 && budget > 0 {
            self.bits_left -= 1;
            budget -= 1;
            let i = self.bits_left;
            self.acc = point_double(&self.acc, f);
            let b1 = self.k1.get_bit(i);
            match &self.second {
                None => {
                    let mut sum = point_add(&self.acc, &self.p1, f);
                    JacobianPoint::ct_swap(&mut self.acc, &mut sum, Choice::from(b1 as u8));
                }
                Some((k2, p2, both)) => {
                    let addend = match (b1, k2.get_bit(i)) {
                        (true, true) => Some(both),
                        (true, false) => Some(&self.p1),
                        (false, true) => Some(p2),
                        (false, false) => None,
                    };
                    if let Some(q) = addend {
                        self.acc = point_add(&self.acc, q, f);
                    }
                }
            }
        }
        if self.bits_left == 0 {
            Some(std::mem::replace(&mut self.acc, JacobianPoint::infinity()))
        } else {
            None
        }
    }

    pub fn run(mut self) -> JacobianPoint {
        loop {
            if let Some(p) = self.step(usize::MAX) {
                return p;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecc::WeierstrassCurve;
    use pssl_types::EccCurveId;

    fn p256() -> WeierstrassCurve {
        WeierstrassCurve::new(EccCurveId::NistP256).unwrap()
    }

    #[test]
    fn test_generator_round_trips_through_affine() {
        let c = p256();
        let (x, _) = c.generator().to_affine(&c.field).unwrap();
        assert_eq!(
            x,
            BigNum::from_hex("6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296")
                .unwrap()
        );
        assert!(JacobianPoint::infinity().to_affine(&c.field).is_err());
    }

    #[test]
    fn test_double_matches_add() {
        let c = p256();
        let g = c.generator();
        let d = point_double(&g, &c.field);
        let a = point_add(&g, &g, &c.field);
        assert_eq!(c.encode_point(&d).unwrap(), c.encode_point(&a).unwrap());
    }

    #[test]
    fn test_add_inverse_is_infinity() {
        let c = p256();
        let g = c.generator();
        let neg = JacobianPoint {
            y: c.field.neg(&g.y),
            ..g.clone()
        };
        assert!(point_add(&g, &neg, &c.field).is_infinity());
    }

    #[test]
    fn test_scalar_mul_small_multiples() {
        let c = p256();
        let g = c.generator();
        let three_g = point_add(&point_double(&g, &c.field), &g, &c.field);
        let mul = PointMul::single(&c.field, &BigNum::from_u64(3), g.clone(), 256).run();
        assert_eq!(c.encode_point(&mul).unwrap(), c.encode_point(&three_g).unwrap());

        // 2G = 2·G expected x from SEC test data
        let two = PointMul::single(&c.field, &BigNum::from_u64(2), g, 256).run();
        let (x, _) = two.to_affine(&c.field).unwrap();
        assert_eq!(
            x,
            BigNum::from_hex("7CF27B188D034F7E8A52380304B51AC3C08969E277F21B35A60B48FC47669978")
                .unwrap()
        );
    }

    #[test]
    fn test_scalar_mul_by_order_is_infinity() {
        let c = p256();
        let n = c.order().clone();
        let r = PointMul::single(&c.field, &n, c.generator(), 256).run();
        assert!(r.is_infinity());
    }

    #[test]
    fn test_dual_matches_separate_products_and_steps() {
        let c = p256();
        let g = c.generator();
        let q = point_double(&g, &c.field);
        let k1 = BigNum::from_hex("1234567890ABCDEF1234567890ABCDEF").unwrap();
        let k2 = BigNum::from_hex("FEDCBA0987654321").unwrap();

        let mut dual = PointMul::dual(&c.field, &k1, g.clone(), &k2, q.clone());
        let mut polls = 0;
        let combined = loop {
            polls += 1;
            if let Some(p) = dual.step(16) {
                break p;
            }
        };
        assert!(polls > 1);

        let a = PointMul::single(&c.field, &k1, g, 256).run();
        let b = PointMul::single(&c.field, &k2, q, 256).run();
        let sum = point_add(&a, &b, &c.field);
        assert_eq!(c.encode_point(&combined).unwrap(), c.encode_point(&sum).unwrap());
    }
}
