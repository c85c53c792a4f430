//! Ephemeral ECDH over P-256, P-384, X25519 and X448.
//!
//! Key generation and agreement are both resumable. Public values use the
//! TLS wire encodings: uncompressed SEC1 points for the NIST curves and
//! raw little-endian u-coordinates for the Montgomery curves.

use crate::ecc::montgomery::{self, Ladder};
use crate::ecc::{PointMul, WeierstrassCurve};
use crate::rand::random_vec;
use crate::step::{Progress, StepOp, ECC_BITS_PER_POLL};
use pssl_bignum::BigNum;
use pssl_types::{CryptoError, EccCurveId};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

enum Mul {
    Weierstrass {
        curve: WeierstrassCurve,
        mul: PointMul,
        x_only: bool,
    },
    Montgomery(Ladder),
}

impl Mul {
    fn step(&mut self) -> Option<Result<Vec<u8>, CryptoError>> {
        match self {
            Mul::Weierstrass { curve, mul, x_only } => {
                let p = mul.step(ECC_BITS_PER_POLL)?;
                Some(if *x_only {
                    p.to_affine(&curve.field)
                        .and_then(|(x, _)| x.to_bytes_be_padded(curve.field_len()))
                } else {
                    curve.encode_point(&p)
                })
            }
            Mul::Montgomery(ladder) => ladder.step(ECC_BITS_PER_POLL),
        }
    }
}

/// An ephemeral key pair.
pub struct EcdhKeyPair {
    curve: EccCurveId,
    private: Zeroizing<Vec<u8>>,
    public: Vec<u8>,
}

impl std::fmt::Debug for EcdhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyPair")
            .field("curve", &self.curve)
            .field("public", &self.public.len())
            .finish_non_exhaustive()
    }
}

impl EcdhKeyPair {
    /// Start generating a random key pair.
    pub fn begin_generate(curve: EccCurveId) -> Result<EcdhKeygen, CryptoError> {
        let (private, mul) = if curve.is_weierstrass() {
            let c = WeierstrassCurve::new(curve)?;
            let d = BigNum::random_range(c.order())?;
            let mul = PointMul::single(&c.field, &d, c.generator(), c.order().bit_len());
            let private = Zeroizing::new(d.to_bytes_be_padded(c.field_len())?);
            (
                private,
                Mul::Weierstrass {
                    curve: c,
                    mul,
                    x_only: false,
                },
            )
        } else {
            let mut k = Zeroizing::new(random_vec(curve.field_len())?);
            montgomery::clamp(curve, &mut k);
            let ladder = Ladder::new(curve, &k, &montgomery::base_point(curve)?)?;
            (k, Mul::Montgomery(ladder))
        };
        Ok(EcdhKeygen {
            curve,
            private: Some(private),
            mul,
        })
    }

    pub fn curve_id(&self) -> EccCurveId {
        self.curve
    }

    /// Wire encoding of the public value.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Start computing the shared secret with a peer's public value.
    pub fn begin_agree(&self, peer: &[u8]) -> Result<EcdhAgree, CryptoError> {
        let mul = if self.curve.is_weierstrass() {
            let c = WeierstrassCurve::new(self.curve)?;
            let q = c.decode_point(peer)?;
            let d = BigNum::from_bytes_be(&self.private);
            let mul = PointMul::single(&c.field, &d, q, c.order().bit_len());
            Mul::Weierstrass {
                curve: c,
                mul,
                x_only: true,
            }
        } else {
            Mul::Montgomery(Ladder::new(self.curve, &self.private, peer)?)
        };
        Ok(EcdhAgree { mul })
    }
}

/// Key generation in progress.
pub struct EcdhKeygen {
    curve: EccCurveId,
    private: Option<Zeroizing<Vec<u8>>>,
    mul: Mul,
}

impl StepOp for EcdhKeygen {
    type Output = EcdhKeyPair;

    fn poll(&mut self) -> Result<Progress<EcdhKeyPair>, CryptoError> {
        let Some(public) = self.mul.step() else {
            return Ok(Progress::Pending);
        };
        let private = self.private.take().ok_or(CryptoError::InvalidArg)?;
        Ok(Progress::Done(EcdhKeyPair {
            curve: self.curve,
            private,
            public: public?,
        }))
    }
}

/// Shared-secret computation in progress.
pub struct EcdhAgree {
    mul: Mul,
}

impl StepOp for EcdhAgree {
    type Output = Zeroizing<Vec<u8>>;

    fn poll(&mut self) -> Result<Progress<Self::Output>, CryptoError> {
        let Some(secret) = self.mul.step() else {
            return Ok(Progress::Pending);
        };
        let secret = Zeroizing::new(secret.map_err(|e| match e {
            CryptoError::EccPointAtInfinity => CryptoError::EccInvalidPublicKey,
            other => other,
        })?);
        let zero = vec![0u8; secret.len()];
        if bool::from(secret.ct_eq(&zero)) {
            return Err(CryptoError::EccInvalidPublicKey);
        }
        Ok(Progress::Done(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agree_both(curve: EccCurveId) {
        let a = EcdhKeyPair::begin_generate(curve).unwrap().run().unwrap();
        let b = EcdhKeyPair::begin_generate(curve).unwrap().run().unwrap();
        let s1 = a.begin_agree(b.public_key()).unwrap().run().unwrap();
        let s2 = b.begin_agree(a.public_key()).unwrap().run().unwrap();
        assert_eq!(*s1, *s2);
        assert_eq!(s1.len(), curve.field_len());
    }

    #[test]
    fn test_agreement_all_curves() {
        for curve in [
            EccCurveId::NistP256,
            EccCurveId::NistP384,
            EccCurveId::X25519,
            EccCurveId::X448,
        ] {
            agree_both(curve);
        }
    }

    #[test]
    fn test_public_encodings() {
        let p = EcdhKeyPair::begin_generate(EccCurveId::NistP256).unwrap().run().unwrap();
        assert_eq!(p.public_key().len(), 65);
        assert_eq!(p.public_key()[0], 4);
        let x = EcdhKeyPair::begin_generate(EccCurveId::X448).unwrap().run().unwrap();
        assert_eq!(x.public_key().len(), 56);
    }

    #[test]
    fn test_rejects_bad_peer_values() {
        let p = EcdhKeyPair::begin_generate(EccCurveId::NistP256).unwrap().run().unwrap();
        assert!(p.begin_agree(&[4u8; 65]).is_err());
        let x = EcdhKeyPair::begin_generate(EccCurveId::X25519).unwrap().run().unwrap();
        assert_eq!(
            x.begin_agree(&[0u8; 32]).unwrap().run().err(),
            Some(CryptoError::EccInvalidPublicKey)
        );
        assert!(x.begin_agree(&[9u8; 31]).is_err());
    }
}
