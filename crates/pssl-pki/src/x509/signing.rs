//! Resumable signature creation and verification for certificate keys.

use super::{PublicKey, SignatureAlgorithm};
use crate::pkcs8::PrivateKey;
use pssl_crypto::ecdsa::{EcdsaSign, EcdsaSignature, EcdsaVerify};
use pssl_crypto::rsa::{RsaOp, RsaPadding, RsaVerify};
use pssl_crypto::{Progress, StepOp};
use pssl_types::{CryptoError, PkeyAlgId, PkiError};
use pssl_utils::asn1::{strip_leading_zeros, Decoder, Encoder};

/// DER `Ecdsa-Sig-Value ::= SEQUENCE { r INTEGER, s INTEGER }`.
pub fn encode_ecdsa_der(sig: &EcdsaSignature) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_sequence_with(|seq| {
        seq.write_integer(&sig.r);
        seq.write_integer(&sig.s);
    });
    enc.finish()
}

/// Strict decode of a DER ECDSA signature.
pub fn decode_ecdsa_der(der: &[u8]) -> Result<EcdsaSignature, PkiError> {
    let mut outer = Decoder::new(der);
    let mut seq = outer.read_sequence()?;
    let r = seq.read_integer()?;
    let s = seq.read_integer()?;
    if !seq.is_empty() || !outer.is_empty() {
        return Err(PkiError::Asn1Error("ecdsa signature trailing data".into()));
    }
    Ok(EcdsaSignature {
        r: strip_leading_zeros(r).to_vec(),
        s: strip_leading_zeros(s).to_vec(),
    })
}

fn rsa_padding(alg: &SignatureAlgorithm) -> RsaPadding {
    match alg.pss {
        Some(p) => RsaPadding::Pss {
            hash: p.hash,
            salt_len: Some(p.salt_len),
        },
        None => RsaPadding::Pkcs1(alg.hash),
    }
}

/// A signature check in progress.
pub enum VerifyOp {
    Rsa(RsaVerify),
    Ecdsa(EcdsaVerify),
}

impl StepOp for VerifyOp {
    type Output = ();

    fn poll(&mut self) -> Result<Progress<()>, CryptoError> {
        match self {
            VerifyOp::Rsa(op) => op.poll(),
            VerifyOp::Ecdsa(op) => op.poll(),
        }
    }
}

/// Start verifying `sig` over a pre-computed `hash`.
///
/// The key type must match the algorithm: RSA keys accept PKCS#1 and PSS
/// signatures, EC keys accept ECDSA with a DER-encoded value.
pub fn begin_verify(
    key: &PublicKey,
    alg: &SignatureAlgorithm,
    hash: &[u8],
    sig: &[u8],
) -> Result<VerifyOp, PkiError> {
    match (key, alg.key) {
        (PublicKey::Rsa { .. }, PkeyAlgId::Rsa | PkeyAlgId::RsaPss) => Ok(VerifyOp::Rsa(
            key.rsa_key()?.begin_verify(rsa_padding(alg), hash, sig)?,
        )),
        (PublicKey::Ec { .. }, PkeyAlgId::Ecdsa) => {
            let sig = decode_ecdsa_der(sig).map_err(|_| PkiError::BadSignature)?;
            Ok(VerifyOp::Ecdsa(key.ecdsa_key()?.begin_verify(hash, &sig)?))
        }
        _ => Err(PkiError::UnsupportedAlgorithm(format!(
            "{:?} signature with {:?} key",
            alg.key,
            key.alg()
        ))),
    }
}

/// A signature in progress; yields PKCS#1/PSS bytes or a DER ECDSA value.
pub enum SignOp {
    Rsa(RsaOp),
    Ecdsa(EcdsaSign),
}

impl StepOp for SignOp {
    type Output = Vec<u8>;

    fn poll(&mut self) -> Result<Progress<Vec<u8>>, CryptoError> {
        match self {
            SignOp::Rsa(op) => op.poll(),
            SignOp::Ecdsa(op) => Ok(op.poll()?.map(|sig| encode_ecdsa_der(&sig))),
        }
    }
}

/// Start signing a pre-computed `hash`.
pub fn begin_sign(
    key: &PrivateKey,
    alg: &SignatureAlgorithm,
    hash: &[u8],
) -> Result<SignOp, PkiError> {
    match (key, alg.key) {
        (PrivateKey::Rsa(k), PkeyAlgId::Rsa | PkeyAlgId::RsaPss) => {
            Ok(SignOp::Rsa(k.begin_sign(rsa_padding(alg), hash)?))
        }
        (PrivateKey::Ecdsa(k), PkeyAlgId::Ecdsa) => Ok(SignOp::Ecdsa(k.begin_sign(hash)?)),
        _ => Err(PkiError::UnsupportedAlgorithm(format!(
            "{:?} signature with {:?} key",
            alg.key,
            key.alg()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::Certificate;
    use pssl_crypto::hash::digest;
    use pssl_types::HashAlgId;

    const CA: &str = include_str!("../../tests/data/ca.pem");
    const RSA_SERVER: &str = include_str!("../../tests/data/rsa_server.pem");
    const PSS_SERVER: &str = include_str!("../../tests/data/pss_server.pem");
    const EC_SERVER: &str = include_str!("../../tests/data/ec_server.pem");
    const EC_KEY: &str = include_str!("../../tests/data/ec_server.key");

    fn cert(pem: &str) -> Certificate {
        Certificate::parse_all(pem.as_bytes()).unwrap().remove(0)
    }

    #[test]
    fn test_issued_certificates_verify_against_ca() {
        let ca = cert(CA);
        for pem in [CA, RSA_SERVER, PSS_SERVER, EC_SERVER] {
            cert(pem)
                .begin_verify_signature(&ca.public_key)
                .unwrap()
                .run()
                .unwrap();
        }
    }

    #[test]
    fn test_wrong_issuer_key_fails() {
        let leaf = cert(RSA_SERVER);
        let other = cert(RSA_SERVER).public_key;
        let res = leaf.begin_verify_signature(&other).unwrap().run();
        assert_eq!(res, Err(CryptoError::RsaVerifyFail));
        let ec = cert(EC_SERVER).public_key;
        assert!(leaf.begin_verify_signature(&ec).is_err());
    }

    #[test]
    fn test_ecdsa_sign_verify_with_der_value() {
        let key = PrivateKey::from_pem_or_der(EC_KEY.as_bytes()).unwrap();
        let alg = SignatureAlgorithm::ecdsa(HashAlgId::Sha256);
        let hash = digest(HashAlgId::Sha256, b"server key exchange");
        let sig = begin_sign(&key, &alg, &hash).unwrap().run().unwrap();
        assert_eq!(sig[0], 0x30);
        let leaf = cert(EC_SERVER);
        begin_verify(&leaf.public_key, &alg, &hash, &sig)
            .unwrap()
            .run()
            .unwrap();
    }

    #[test]
    fn test_ecdsa_der_codec_is_strict() {
        let sig = EcdsaSignature {
            r: vec![0x80, 0x01],
            s: vec![0x01],
        };
        let der = encode_ecdsa_der(&sig);
        assert_eq!(der, [0x30, 0x07, 0x02, 0x03, 0x00, 0x80, 0x01, 0x02, 0x01, 0x01]);
        assert_eq!(decode_ecdsa_der(&der).unwrap(), sig);
        let mut extra = der.clone();
        extra.push(0);
        assert!(decode_ecdsa_der(&extra).is_err());
        assert!(decode_ecdsa_der(&der[..5]).is_err());
    }
}
