//! Handshake signatures: scheme selection and the signed content of
//! ServerKeyExchange and CertificateVerify (RFC 5246 §7.4.3, RFC 8446 §4.4.3).

use crate::alert::{protocol, AlertDescription};
use crate::suite::SignatureScheme;
use crate::ProtocolVersion;
use pssl_crypto::hash::digest;
use pssl_pki::x509::{begin_sign, begin_verify, SignOp, VerifyOp};
use pssl_pki::{PrivateKey, PublicKey, SignatureAlgorithm};
use pssl_types::{EccCurveId, HashAlgId, PkeyAlgId, TlsError};

const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";
const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// Schemes assumed when a TLS 1.2 peer sends no signature_algorithms.
const TLS12_DEFAULTS: [SignatureScheme; 2] = [SignatureScheme::RSA_PKCS1_SHA1, SignatureScheme::ECDSA_SHA1];

/// Whether a key of this type and curve can produce `scheme` at `version`.
fn key_matches(
    scheme: SignatureScheme,
    key_alg: PkeyAlgId,
    curve: Option<EccCurveId>,
    version: ProtocolVersion,
) -> bool {
    if scheme.key_alg() != key_alg || !scheme.usable_at(version) {
        return false;
    }
    match key_alg {
        PkeyAlgId::Ecdsa if version == ProtocolVersion::Tls13 => scheme.curve() == curve,
        _ => true,
    }
}

/// Pick the scheme for signing with `key` out of the peer's list.
///
/// Returns `None` below TLS 1.2, where the algorithm is fixed by the key
/// type. Our own preference order wins; `rsa_pss_pss_*` is never chosen
/// because configured RSA keys are rsaEncryption keys.
pub fn select_scheme(
    key: &PrivateKey,
    peer: &[SignatureScheme],
    version: ProtocolVersion,
) -> Result<Option<SignatureScheme>, TlsError> {
    if version < ProtocolVersion::Tls12 {
        return Ok(None);
    }
    let public = key.public_key();
    let curve = public.curve();
    let peer = if peer.is_empty() && version == ProtocolVersion::Tls12 {
        &TLS12_DEFAULTS[..]
    } else {
        peer
    };
    SignatureScheme::PREFERENCE
        .iter()
        .copied()
        .filter(|s| !matches!(s.0, 0x0809..=0x080b))
        .find(|s| peer.contains(s) && key_matches(*s, key.alg(), curve, version))
        .map(Some)
        .ok_or_else(|| protocol(AlertDescription::HandshakeFailure, "no common signature scheme"))
}

/// Check a scheme chosen by the peer against what we offered and the key
/// in its certificate.
pub fn check_peer_scheme(
    scheme: SignatureScheme,
    key: &PublicKey,
    offered: &[SignatureScheme],
    version: ProtocolVersion,
) -> Result<(), TlsError> {
    if !offered.contains(&scheme) || !scheme.is_known() {
        return Err(protocol(AlertDescription::IllegalParameter, "signature scheme not offered"));
    }
    if !key_matches(scheme, key.alg(), key.curve(), version) {
        return Err(protocol(
            AlertDescription::IllegalParameter,
            format!("{} does not match certificate key", scheme.name()),
        ));
    }
    Ok(())
}

/// The signature algorithm and digest for `content`.
///
/// Below TLS 1.2 RSA signs the bare MD5+SHA-1 concatenation and ECDSA
/// signs SHA-1.
pub fn algorithm_for(scheme: Option<SignatureScheme>, key_alg: PkeyAlgId) -> SignatureAlgorithm {
    match (scheme, key_alg) {
        (Some(s), _) => s.signature_algorithm(),
        (None, PkeyAlgId::Ecdsa) => SignatureAlgorithm::ecdsa(HashAlgId::Sha1),
        (None, _) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Md5Sha1),
    }
}

/// Bytes signed in a TLS 1.3 CertificateVerify.
pub fn tls13_signed_content(transcript_hash: &[u8], server: bool) -> Vec<u8> {
    let context = if server { SERVER_CONTEXT } else { CLIENT_CONTEXT };
    let mut content = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    content.extend_from_slice(&[0x20; 64]);
    content.extend_from_slice(context);
    content.push(0);
    content.extend_from_slice(transcript_hash);
    content
}

/// Bytes signed in a ServerKeyExchange.
pub fn ske_signed_content(client_random: &[u8; 32], server_random: &[u8; 32], params: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(64 + params.len());
    content.extend_from_slice(client_random);
    content.extend_from_slice(server_random);
    content.extend_from_slice(params);
    content
}

/// Start signing `content`.
pub fn begin_sign_content(
    key: &PrivateKey,
    scheme: Option<SignatureScheme>,
    content: &[u8],
) -> Result<SignOp, TlsError> {
    let alg = algorithm_for(scheme, key.alg());
    Ok(begin_sign(key, &alg, &digest(alg.hash, content))?)
}

/// Start signing a digest the caller already holds, for legacy
/// CertificateVerify where the content is the running transcript.
pub fn begin_sign_digest(
    key: &PrivateKey,
    scheme: Option<SignatureScheme>,
    hash: &[u8],
) -> Result<SignOp, TlsError> {
    let alg = algorithm_for(scheme, key.alg());
    Ok(begin_sign(key, &alg, hash)?)
}

/// Start checking `signature` over `content`. A malformed signature is a
/// `decrypt_error`.
pub fn begin_verify_content(
    key: &PublicKey,
    scheme: Option<SignatureScheme>,
    content: &[u8],
    signature: &[u8],
) -> Result<VerifyOp, TlsError> {
    let alg = algorithm_for(scheme, key.alg());
    begin_verify_digest(key, scheme, &digest(alg.hash, content), signature)
}

pub fn begin_verify_digest(
    key: &PublicKey,
    scheme: Option<SignatureScheme>,
    hash: &[u8],
    signature: &[u8],
) -> Result<VerifyOp, TlsError> {
    let alg = algorithm_for(scheme, key.alg());
    begin_verify(key, &alg, hash, signature)
        .map_err(|e| protocol(AlertDescription::DecryptError, format!("signature rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pssl_crypto::step::StepOp;

    const RSA_KEY: &str = include_str!("../../tests/data/rsa_server.key");
    const EC_KEY: &str = include_str!("../../tests/data/ec_server.key");
    const EC384_KEY: &str = include_str!("../../tests/data/ec384_server.key");

    fn key(pem: &str) -> PrivateKey {
        PrivateKey::from_pem_or_der(pem.as_bytes()).unwrap()
    }

    #[test]
    fn test_select_prefers_pss_for_rsa_keys() {
        let rsa = key(RSA_KEY);
        let peer = [SignatureScheme::RSA_PKCS1_SHA256, SignatureScheme::RSA_PSS_RSAE_SHA256];
        assert_eq!(
            select_scheme(&rsa, &peer, ProtocolVersion::Tls12).unwrap(),
            Some(SignatureScheme::RSA_PSS_RSAE_SHA256)
        );
        let pkcs1_only = [SignatureScheme::RSA_PKCS1_SHA256];
        assert_eq!(
            select_scheme(&rsa, &pkcs1_only, ProtocolVersion::Tls12).unwrap(),
            Some(SignatureScheme::RSA_PKCS1_SHA256)
        );
        assert!(select_scheme(&rsa, &pkcs1_only, ProtocolVersion::Tls13).is_err());
        assert_eq!(select_scheme(&rsa, &[], ProtocolVersion::Tls11).unwrap(), None);
        assert_eq!(
            select_scheme(&rsa, &[], ProtocolVersion::Tls12).unwrap(),
            Some(SignatureScheme::RSA_PKCS1_SHA1)
        );
    }

    #[test]
    fn test_tls13_binds_ecdsa_curve() {
        let p384 = key(EC384_KEY);
        let peer = [SignatureScheme::ECDSA_SECP256R1_SHA256, SignatureScheme::ECDSA_SECP384R1_SHA384];
        assert_eq!(
            select_scheme(&p384, &peer, ProtocolVersion::Tls13).unwrap(),
            Some(SignatureScheme::ECDSA_SECP384R1_SHA384)
        );
        let only_256 = [SignatureScheme::ECDSA_SECP256R1_SHA256];
        assert!(select_scheme(&p384, &only_256, ProtocolVersion::Tls13).is_err());
        // TLS 1.2 does not tie the hash to the curve.
        assert_eq!(
            select_scheme(&p384, &only_256, ProtocolVersion::Tls12).unwrap(),
            Some(SignatureScheme::ECDSA_SECP256R1_SHA256)
        );
    }

    #[test]
    fn test_check_peer_scheme() {
        let ec = key(EC_KEY).public_key();
        let offered = SignatureScheme::PREFERENCE;
        assert!(check_peer_scheme(SignatureScheme::ECDSA_SECP256R1_SHA256, &ec, &offered, ProtocolVersion::Tls13).is_ok());
        assert!(check_peer_scheme(SignatureScheme::RSA_PSS_RSAE_SHA256, &ec, &offered, ProtocolVersion::Tls13).is_err());
        assert!(check_peer_scheme(
            SignatureScheme::ECDSA_SECP256R1_SHA256,
            &ec,
            &[SignatureScheme::ECDSA_SECP384R1_SHA384],
            ProtocolVersion::Tls12
        )
        .is_err());
    }

    #[test]
    fn test_sign_and_verify_each_family() {
        let content = tls13_signed_content(&[7u8; 32], true);
        assert_eq!(&content[..64], &[0x20; 64][..]);
        assert_eq!(content[64 + SERVER_CONTEXT.len()], 0);

        for (pem, scheme) in [
            (RSA_KEY, Some(SignatureScheme::RSA_PSS_RSAE_SHA256)),
            (RSA_KEY, Some(SignatureScheme::RSA_PKCS1_SHA384)),
            (RSA_KEY, None),
            (EC_KEY, Some(SignatureScheme::ECDSA_SECP256R1_SHA256)),
            (EC_KEY, None),
        ] {
            let k = key(pem);
            let sig = begin_sign_content(&k, scheme, &content).unwrap().run().unwrap();
            begin_verify_content(&k.public_key(), scheme, &content, &sig)
                .unwrap()
                .run()
                .unwrap();
            let mut other = content.clone();
            other[70] ^= 1;
            assert!(begin_verify_content(&k.public_key(), scheme, &other, &sig)
                .and_then(|op| op.run().map_err(TlsError::from))
                .is_err());
        }
    }

    #[test]
    fn test_ske_content_layout() {
        let c = ske_signed_content(&[1; 32], &[2; 32], &[3, 0, 23]);
        assert_eq!(c.len(), 67);
        assert_eq!((c[0], c[32], c[64]), (1, 2, 3));
    }
}
