//! RSA keys and resumable RSA operations.
//!
//! Private-key operations use the CRT and advance a bounded number of
//! exponent windows per poll; see [`RsaOp`].

pub mod pkcs1;

use crate::step::{Progress, StepOp, RSA_WINDOWS_PER_POLL};
use pssl_bignum::{BigNum, ModExp, MontgomeryCtx};
use pssl_types::{CryptoError, HashAlgId};

/// Smallest modulus accepted, in bits.
pub const RSA_MIN_BITS: usize = 1024;
/// Largest modulus accepted, in bits.
pub const RSA_MAX_BITS: usize = 8192;

/// Signature padding and hash selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    /// EMSA-PKCS1-v1_5 (`Md5Sha1` signs the bare TLS 1.0/1.1 hash).
    Pkcs1(HashAlgId),
    /// EMSA-PSS with MGF1 over the same hash. `salt_len` of `None` on
    /// verify recovers the salt length from the block.
    Pss {
        hash: HashAlgId,
        salt_len: Option<usize>,
    },
}

impl RsaPadding {
    pub fn hash(self) -> HashAlgId {
        match self {
            RsaPadding::Pkcs1(h) => h,
            RsaPadding::Pss { hash, .. } => hash,
        }
    }
}

/// An RSA public key.
#[derive(Clone, Debug)]
pub struct RsaPublicKey {
    n: BigNum,
    e: BigNum,
    mont: MontgomeryCtx,
}

impl RsaPublicKey {
    /// Build a key from big-endian modulus and exponent.
    pub fn new(n: &[u8], e: &[u8]) -> Result<Self, CryptoError> {
        let n = BigNum::from_bytes_be(n);
        let e = BigNum::from_bytes_be(e);
        if !(RSA_MIN_BITS..=RSA_MAX_BITS).contains(&n.bit_len()) {
            return Err(CryptoError::RsaInvalidKeyBits);
        }
        if e.bit_len() < 2 || !e.is_odd() || e >= n {
            return Err(CryptoError::InvalidKey);
        }
        let mont = MontgomeryCtx::new(&n)?;
        Ok(Self { n, e, mont })
    }

    pub fn bits(&self) -> usize {
        self.n.bit_len()
    }

    /// Modulus length in bytes.
    pub fn size(&self) -> usize {
        self.bits().div_ceil(8)
    }

    pub fn modulus(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    pub fn exponent(&self) -> Vec<u8> {
        self.e.to_bytes_be()
    }

    /// Raw `input^e mod n`.
    pub fn begin_public(&self, input: &[u8]) -> Result<RsaOp, CryptoError> {
        let x = self.check_input(input)?;
        Ok(RsaOp {
            stage: Stage::Single(ModExp::new(self.mont.clone(), &x, &self.e)?),
            out_len: self.size(),
        })
    }

    /// Encrypt `msg` with RSAES-PKCS1-v1_5.
    pub fn begin_encrypt(&self, msg: &[u8]) -> Result<RsaOp, CryptoError> {
        let em = pkcs1::rsaes_pkcs1_encode(msg, self.size())?;
        self.begin_public(&em)
    }

    /// Verify `sig` over the pre-computed `hash`.
    pub fn begin_verify(
        &self,
        padding: RsaPadding,
        hash: &[u8],
        sig: &[u8],
    ) -> Result<RsaVerify, CryptoError> {
        if sig.len() != self.size() {
            return Err(CryptoError::RsaVerifyFail);
        }
        Ok(RsaVerify {
            op: self.begin_public(sig).map_err(|_| CryptoError::RsaVerifyFail)?,
            padding,
            hash: hash.to_vec(),
            em_bits: self.bits() - 1,
        })
    }

    fn check_input(&self, input: &[u8]) -> Result<BigNum, CryptoError> {
        if input.len() > self.size() {
            return Err(CryptoError::InputOverflow);
        }
        let x = BigNum::from_bytes_be(input);
        if x >= self.n {
            return Err(CryptoError::InputOverflow);
        }
        Ok(x)
    }
}

/// An RSA private key with CRT parameters.
#[derive(Clone)]
pub struct RsaPrivateKey {
    public: RsaPublicKey,
    p: BigNum,
    q: BigNum,
    dp: BigNum,
    dq: BigNum,
    qinv: BigNum,
    p_mont: MontgomeryCtx,
    q_mont: MontgomeryCtx,
}

impl std::fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("bits", &self.public.bits())
            .finish_non_exhaustive()
    }
}

/// Big-endian private-key components as found in a PKCS#1 `RSAPrivateKey`.
pub struct RsaPrivateComponents<'a> {
    pub n: &'a [u8],
    pub e: &'a [u8],
    pub d: &'a [u8],
    pub p: &'a [u8],
    pub q: &'a [u8],
    pub dp: &'a [u8],
    pub dq: &'a [u8],
    pub qinv: &'a [u8],
}

impl RsaPrivateKey {
    pub fn from_components(c: &RsaPrivateComponents<'_>) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::new(c.n, c.e)?;
        let p = BigNum::from_bytes_be(c.p);
        let q = BigNum::from_bytes_be(c.q);
        if p.mul(&q) != public.n || BigNum::from_bytes_be(c.d).is_zero() {
            return Err(CryptoError::RsaNoKeyInfo);
        }
        Ok(Self {
            p_mont: MontgomeryCtx::new(&p)?,
            q_mont: MontgomeryCtx::new(&q)?,
            dp: BigNum::from_bytes_be(c.dp),
            dq: BigNum::from_bytes_be(c.dq),
            qinv: BigNum::from_bytes_be(c.qinv),
            public,
            p,
            q,
        })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Raw `input^d mod n` via the CRT.
    pub fn begin_private(&self, input: &[u8]) -> Result<RsaOp, CryptoError> {
        let x = self.public.check_input(input)?;
        let xp = x.mod_reduce(&self.p)?;
        let xq = x.mod_reduce(&self.q)?;
        Ok(RsaOp {
            stage: Stage::Crt(Box::new(CrtState {
                mp: ModExp::new(self.p_mont.clone(), &xp, &self.dp)?,
                mq: ModExp::new(self.q_mont.clone(), &xq, &self.dq)?,
                m1: None,
                q: self.q.clone(),
                qinv: self.qinv.clone(),
                p_mont: self.p_mont.clone(),
            })),
            out_len: self.public.size(),
        })
    }

    /// Sign a pre-computed `hash`. PSS signing uses a salt as long as the hash.
    pub fn begin_sign(&self, padding: RsaPadding, hash: &[u8]) -> Result<RsaOp, CryptoError> {
        let em = match padding {
            RsaPadding::Pkcs1(alg) => pkcs1::emsa_pkcs1_encode(alg, hash, self.public.size())?,
            RsaPadding::Pss { hash: alg, salt_len } => {
                let mut em = pkcs1::emsa_pss_encode(
                    alg,
                    hash,
                    self.public.bits() - 1,
                    salt_len.unwrap_or(alg.output_len()),
                )?;
                // em_bits = bits - 1 can drop a whole byte.
                while em.len() < self.public.size() {
                    em.insert(0, 0);
                }
                em
            }
        };
        self.begin_private(&em)
    }
}

struct CrtState {
    mp: ModExp,
    mq: ModExp,
    m1: Option<BigNum>,
    q: BigNum,
    qinv: BigNum,
    p_mont: MontgomeryCtx,
}

enum Stage {
    Single(ModExp),
    Crt(Box<CrtState>),
    Finished,
}

/// A raw RSA exponentiation in progress; yields a modulus-width block.
pub struct RsaOp {
    stage: Stage,
    out_len: usize,
}

impl StepOp for RsaOp {
    type Output = Vec<u8>;

    fn poll(&mut self) -> Result<Progress<Vec<u8>>, CryptoError> {
        let result = match &mut self.stage {
            Stage::Finished => return Err(CryptoError::InvalidArg),
            Stage::Single(op) => match op.step(RSA_WINDOWS_PER_POLL) {
                Some(v) => v,
                None => return Ok(Progress::Pending),
            },
            Stage::Crt(crt) => {
                if crt.m1.is_none() {
                    crt.m1 = crt.mp.step(RSA_WINDOWS_PER_POLL);
                    return Ok(Progress::Pending);
                }
                let Some(m2) = crt.mq.step(RSA_WINDOWS_PER_POLL) else {
                    return Ok(Progress::Pending);
                };
                let m1 = crt.m1.take().ok_or(CryptoError::InvalidArg)?;
                // h = qinv (m1 - m2) mod p; m = m2 + h q
                let pm = &crt.p_mont;
                let m2p = m2.mod_reduce(pm.modulus())?;
                let diff = pm.sub(&m1, &m2p);
                let h = pm.mul(&pm.to_mont(&crt.qinv)?, &diff);
                m2.add(&h.mul(&crt.q))
            }
        };
        self.stage = Stage::Finished;
        Ok(Progress::Done(result.to_bytes_be_padded(self.out_len)?))
    }
}

/// A signature verification in progress.
pub struct RsaVerify {
    op: RsaOp,
    padding: RsaPadding,
    hash: Vec<u8>,
    em_bits: usize,
}

impl StepOp for RsaVerify {
    type Output = ();

    fn poll(&mut self) -> Result<Progress<()>, CryptoError> {
        let em = match self.op.poll()? {
            Progress::Pending => return Ok(Progress::Pending),
            Progress::Done(em) => em,
        };
        match self.padding {
            RsaPadding::Pkcs1(alg) => pkcs1::emsa_pkcs1_verify(alg, &self.hash, &em)?,
            RsaPadding::Pss { hash, salt_len } => {
                pkcs1::emsa_pss_verify(hash, &self.hash, &em, self.em_bits, salt_len)?
            }
        }
        Ok(Progress::Done(()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hash::digest;

    pub(crate) fn hex(s: &str) -> Vec<u8> {
        let s = if s.len() % 2 == 1 { format!("0{s}") } else { s.to_string() };
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    pub(crate) fn test_key() -> RsaPrivateKey {
        let n = hex("a85aa65067dd48e801f73965484a77938f697ae963e93a9bd4a24437e9f03a1f871121ddad888aee78669c59edc8eddf0ecc990a8575fdec5b3f3a2577260f641e468c270584e3c85fd1123576d1807df9f0db5cba931339ad8c74ec99a62cd95f637ce892b6062713976ce11a5f896ae2d4984420e8b5269421dc17ad74701f");
        let e = hex("10001");
        let d = hex("439ca44e8668086fa4da74e28835dff01318799461dbb8fdfc576eae45f58462450c4c5d8ae3db680a52ab5832770f91159075a614135ef71d6e371bf4ce043fb9e97b14e4c0d0e0ae87d8c82f535b4c1940c2db03d5fc5f22f2ca32b079f05da952677c4dcb2a2dae37c4e773fbc66313f5e155d1ff903ce9fa51019773e69");
        let p = hex("e0443ea8226016d4025e0dee71969461f6e8fdfa86c4558c9918ceda949e7f0cc64f9f9f165dd5efb2c6ea2ba6c8c2d00b0250fd1b24d88cc42c4d870a120773");
        let q = hex("c02d0ced8973063593adc567c72e0ed19469ca209eb5fead3dfc0096f93c457532fcfade35c64abde9165ae079011f028b0317b2d63f679b44eade20d18d11a5");
        let dp = hex("38f03ab4375e0c0db1b82d734f757aa0d0ae60e53d58159c47b66bb6452b64785ad51662aeac0e47f82cd68154abfe0211f979947952c6841ebe5cc49f42ea8f");
        let dq = hex("1d971235850374024de1e4d26ce5d79c4798de6995667a775c62f0084f0a0bbbd70502efb221fd222ec0a56f88d2365f22de7008b65a7eee76771f8ab8195b8d");
        let qinv = hex("4f8c80643cb1354364db0cd63c39efa5920d04d4e202c6df39670e10da676bdd826ff7d2459f96eac2429a22b40d5facc794cc3ce0ae46a256430b778915541e");
        RsaPrivateKey::from_components(&RsaPrivateComponents {
            n: &n,
            e: &e,
            d: &d,
            p: &p,
            q: &q,
            dp: &dp,
            dq: &dq,
            qinv: &qinv,
        })
        .unwrap()
    }

    const SIG_PKCS1_SHA256: &str = "320186ba4d08072266d294245b37d4a0e881897b291cc84c182e939b1113b0e4daa30476a7e0c0921e1e75f32bb1840c19b0b3b033cc95589b6786943ddc34a0347bdb79ceac23cd5ad8871e52ca4dcdf1044ed652b9494018688c994a0b9379c80c812afa1aaca6f37a27f4d9619e8840851703aa4141325346ea8095d3880c";
    const SIG_PSS_SHA256: &str = "3eb1e80b39c02162aad6987f231f70b2b8bda658d9e42287c8dc06a6b5c50dcb6ab8fe71aef9547562228a7fbe701d08f37f306246a267c327072fe75356af01c2200b35c62eabf885b400c2f9a80ca5b584e64e7bd231ba1b33b13da253c6f5ee0db027f00f0dee139da53b75bc8a643bb07be7bfd0f6eb4b8fd208a099706a";

    #[test]
    fn test_pkcs1_sign_is_deterministic_and_matches_reference() {
        let key = test_key();
        let hash = digest(HashAlgId::Sha256, b"abc");
        let sig = key
            .begin_sign(RsaPadding::Pkcs1(HashAlgId::Sha256), &hash)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(sig, hex(SIG_PKCS1_SHA256));
    }

    #[test]
    fn test_verify_reference_signatures() {
        let key = test_key();
        let hash = digest(HashAlgId::Sha256, b"abc");
        key.public_key()
            .begin_verify(RsaPadding::Pkcs1(HashAlgId::Sha256), &hash, &hex(SIG_PKCS1_SHA256))
            .unwrap()
            .run()
            .unwrap();
        let pss = RsaPadding::Pss {
            hash: HashAlgId::Sha256,
            salt_len: Some(32),
        };
        key.public_key()
            .begin_verify(pss, &hash, &hex(SIG_PSS_SHA256))
            .unwrap()
            .run()
            .unwrap();

        let other = digest(HashAlgId::Sha256, b"abd");
        let res = key
            .public_key()
            .begin_verify(pss, &other, &hex(SIG_PSS_SHA256))
            .unwrap()
            .run();
        assert_eq!(res, Err(CryptoError::RsaVerifyFail));
    }

    #[test]
    fn test_pss_sign_then_verify() {
        let key = test_key();
        let hash = digest(HashAlgId::Sha384, b"pss");
        let pad = RsaPadding::Pss {
            hash: HashAlgId::Sha384,
            salt_len: None,
        };
        let sig = key.begin_sign(pad, &hash).unwrap().run().unwrap();
        assert_eq!(sig.len(), 128);
        key.public_key()
            .begin_verify(pad, &hash, &sig)
            .unwrap()
            .run()
            .unwrap();
    }

    #[test]
    fn test_private_op_takes_several_polls() {
        let key = test_key();
        let hash = digest(HashAlgId::Sha1, b"x");
        let mut op = key.begin_sign(RsaPadding::Pkcs1(HashAlgId::Sha1), &hash).unwrap();
        let mut polls = 1;
        while op.poll().unwrap().is_pending() {
            polls += 1;
        }
        assert!(polls >= 3, "finished in {polls} polls");
        assert_eq!(op.poll(), Err(CryptoError::InvalidArg));
    }

    #[test]
    fn test_encrypt_decrypt_premaster() {
        let key = test_key();
        let secret = [0x42u8; 48];
        let ct = key.public_key().begin_encrypt(&secret).unwrap().run().unwrap();
        let em = key.begin_private(&ct).unwrap().run().unwrap();
        let (out, ok) = pkcs1::rsaes_pkcs1_check(&em, 48).unwrap();
        assert!(bool::from(ok));
        assert_eq!(out, secret);
    }

    #[test]
    fn test_rejects_out_of_range_input_and_small_keys() {
        let key = test_key();
        let too_big = vec![0xFF; 128];
        assert_eq!(key.begin_private(&too_big).err(), Some(CryptoError::InputOverflow));
        assert_eq!(
            RsaPublicKey::new(&[0xC3; 64], &[1, 0, 1]).err(),
            Some(CryptoError::RsaInvalidKeyBits)
        );
    }
}
