//! Stand-alone PKCS#1 v1.5 signatures, polled in bounded steps.
//!
//! For embedders that sign or check data with the same keys a connection
//! uses, without stalling their own loop on the RSA exponentiation.

use pssl_crypto::hash::digest;
use pssl_crypto::{Progress, StepOp};
use pssl_pki::x509::{begin_sign, begin_verify, SignOp, VerifyOp};
use pssl_pki::{PrivateKey, PublicKey, SignatureAlgorithm};
use pssl_types::{HashAlgId, PkeyAlgId, TlsError};

/// A PKCS#1 v1.5 signature being generated.
pub struct Pkcs1Signer {
    op: SignOp,
}

impl Pkcs1Signer {
    /// Hash `data` with `hash` and start signing it with an RSA key given
    /// as PEM or DER.
    pub fn new(key: &[u8], hash: HashAlgId, data: &[u8]) -> Result<Self, TlsError> {
        let key = PrivateKey::from_pem_or_der(key)?;
        if key.alg() != PkeyAlgId::Rsa {
            return Err(TlsError::Config("PKCS#1 signing needs an RSA key".into()));
        }
        let op = begin_sign(&key, &SignatureAlgorithm::rsa_pkcs1(hash), &digest(hash, data))?;
        Ok(Self { op })
    }

    /// Advance by one step; `Done` carries the signature.
    pub fn poll(&mut self) -> Result<Progress<Vec<u8>>, TlsError> {
        Ok(self.op.poll()?)
    }
}

/// A PKCS#1 v1.5 signature being checked.
pub struct Pkcs1Verifier {
    op: VerifyOp,
}

impl Pkcs1Verifier {
    pub fn new(key: &PublicKey, hash: HashAlgId, data: &[u8], signature: &[u8]) -> Result<Self, TlsError> {
        if key.alg() != PkeyAlgId::Rsa {
            return Err(TlsError::Config("PKCS#1 verification needs an RSA key".into()));
        }
        let op = begin_verify(key, &SignatureAlgorithm::rsa_pkcs1(hash), &digest(hash, data), signature)?;
        Ok(Self { op })
    }

    /// Advance by one step. A bad signature is an error.
    pub fn poll(&mut self) -> Result<Progress<()>, TlsError> {
        Ok(self.op.poll()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pssl_pki::Certificate;

    const RSA_KEY: &str = include_str!("../tests/data/rsa_server.key");
    const RSA_CERT: &str = include_str!("../tests/data/rsa_server.pem");
    const EC_KEY: &str = include_str!("../tests/data/ec_server.key");

    fn finish<T>(mut poll: impl FnMut() -> Result<Progress<T>, TlsError>) -> (Result<T, TlsError>, usize) {
        let mut polls = 0;
        loop {
            polls += 1;
            match poll() {
                Ok(Progress::Pending) => continue,
                Ok(Progress::Done(v)) => return (Ok(v), polls),
                Err(e) => return (Err(e), polls),
            }
        }
    }

    #[test]
    fn test_sign_then_verify_in_steps() {
        let mut signer = Pkcs1Signer::new(RSA_KEY.as_bytes(), HashAlgId::Sha256, b"payload").unwrap();
        let (sig, polls) = finish(|| signer.poll());
        let sig = sig.unwrap();
        assert_eq!(sig.len(), 256);
        assert!(polls > 1);

        let key = Certificate::parse_all(RSA_CERT.as_bytes()).unwrap().remove(0).public_key;
        let mut verifier = Pkcs1Verifier::new(&key, HashAlgId::Sha256, b"payload", &sig).unwrap();
        assert!(finish(|| verifier.poll()).0.is_ok());

        let mut other = Pkcs1Verifier::new(&key, HashAlgId::Sha256, b"tampered", &sig).unwrap();
        assert!(finish(|| other.poll()).0.is_err());

        let mut flipped = sig.clone();
        flipped[100] ^= 1;
        let mut bad = Pkcs1Verifier::new(&key, HashAlgId::Sha256, b"payload", &flipped).unwrap();
        assert!(finish(|| bad.poll()).0.is_err());
    }

    #[test]
    fn test_non_rsa_keys_are_refused() {
        assert!(matches!(
            Pkcs1Signer::new(EC_KEY.as_bytes(), HashAlgId::Sha256, b"x"),
            Err(TlsError::Config(_))
        ));
        let ec = PrivateKey::from_pem_or_der(EC_KEY.as_bytes()).unwrap().public_key();
        assert!(Pkcs1Verifier::new(&ec, HashAlgId::Sha256, b"x", &[0; 64]).is_err());
    }
}
