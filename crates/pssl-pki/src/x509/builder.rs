//! X.509 v3 certificate serialization.

use pssl_crypto::hash::digest;
use pssl_crypto::StepOp;
use pssl_types::{HashAlgId, PkeyAlgId, PkiError};
use pssl_utils::asn1::{tags, Encoder};
use pssl_utils::oid::OidId;

use super::{signing, CertIdent, PssParams, PublicKey, SignatureAlgorithm};
use crate::pkcs8::{curve_oid, PrivateKey};

/// Builds and signs a v3 certificate.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    serial: Vec<u8>,
    issuer: CertIdent,
    subject: CertIdent,
    not_before: i64,
    not_after: i64,
    public_key: Option<PublicKey>,
    is_ca: bool,
    path_len: Option<u32>,
    dns_names: Vec<String>,
    signature_algorithm: Option<SignatureAlgorithm>,
}

fn encode_name(enc: &mut Encoder, ident: &CertIdent) {
    let attrs = [
        (OidId::CountryName, &ident.country),
        (OidId::StateName, &ident.state),
        (OidId::LocalityName, &ident.city),
        (OidId::OrganizationName, &ident.org),
        (OidId::OrganizationalUnitName, &ident.unit),
        (OidId::CommonName, &ident.common_name),
    ];
    enc.write_sequence_with(|rdns| {
        for (oid, value) in attrs.iter().filter(|(_, v)| !v.is_empty()) {
            rdns.write_nested(tags::SET, |set| {
                set.write_sequence_with(|atav| {
                    atav.write_oid(oid.der());
                    // RFC 5280: countryName is a PrintableString.
                    if *oid == OidId::CountryName {
                        atav.write_printable_string(value);
                    } else {
                        atav.write_utf8_string(value);
                    }
                });
            });
        }
    });
}

fn hash_oid(hash: HashAlgId) -> Result<OidId, PkiError> {
    match hash {
        HashAlgId::Sha1 => Ok(OidId::Sha1),
        HashAlgId::Sha256 => Ok(OidId::Sha256),
        HashAlgId::Sha384 => Ok(OidId::Sha384),
        HashAlgId::Sha512 => Ok(OidId::Sha512),
        other => Err(PkiError::UnsupportedAlgorithm(other.name().into())),
    }
}

fn encode_hash_alg(enc: &mut Encoder, oid: OidId) {
    enc.write_sequence_with(|alg| {
        alg.write_oid(oid.der());
        alg.write_null();
    });
}

fn encode_pss_params(enc: &mut Encoder, p: &PssParams) -> Result<(), PkiError> {
    let hash = hash_oid(p.hash)?;
    let mgf_hash = hash_oid(p.mgf_hash)?;
    let mut params = Encoder::new();
    let mut h = Encoder::new();
    encode_hash_alg(&mut h, hash);
    params.write_context_specific(0, true, &h.finish());
    let mut mgf = Encoder::new();
    mgf.write_sequence_with(|m| {
        m.write_oid(OidId::Mgf1.der());
        encode_hash_alg(m, mgf_hash);
    });
    params.write_context_specific(1, true, &mgf.finish());
    let mut salt = Encoder::new();
    salt.write_u32(p.salt_len as u32);
    params.write_context_specific(2, true, &salt.finish());
    enc.write_sequence(&params.finish());
    Ok(())
}

/// AlgorithmIdentifier for a signature: NULL parameters for PKCS#1,
/// none for ECDSA, the full parameter sequence for PSS.
fn encode_signature_algorithm(alg: &SignatureAlgorithm) -> Result<Vec<u8>, PkiError> {
    let oid = match (alg.key, alg.hash) {
        (PkeyAlgId::Rsa, HashAlgId::Md5) => OidId::Md5WithRsa,
        (PkeyAlgId::Rsa, HashAlgId::Sha1) => OidId::Sha1WithRsa,
        (PkeyAlgId::Rsa, HashAlgId::Sha256) => OidId::Sha256WithRsa,
        (PkeyAlgId::Rsa, HashAlgId::Sha384) => OidId::Sha384WithRsa,
        (PkeyAlgId::Rsa, HashAlgId::Sha512) => OidId::Sha512WithRsa,
        (PkeyAlgId::Ecdsa, HashAlgId::Sha1) => OidId::EcdsaWithSha1,
        (PkeyAlgId::Ecdsa, HashAlgId::Sha256) => OidId::EcdsaWithSha256,
        (PkeyAlgId::Ecdsa, HashAlgId::Sha384) => OidId::EcdsaWithSha384,
        (PkeyAlgId::Ecdsa, HashAlgId::Sha512) => OidId::EcdsaWithSha512,
        (PkeyAlgId::RsaPss, _) => OidId::RsaPss,
        (key, hash) => {
            return Err(PkiError::UnsupportedAlgorithm(format!(
                "{key:?} with {}",
                hash.name()
            )))
        }
    };
    let mut inner = Encoder::new();
    inner.write_oid(oid.der());
    match alg.key {
        PkeyAlgId::Rsa => {
            inner.write_null();
        }
        PkeyAlgId::RsaPss => {
            let params = alg.pss.unwrap_or(PssParams {
                hash: alg.hash,
                mgf_hash: alg.hash,
                salt_len: alg.hash.output_len(),
            });
            encode_pss_params(&mut inner, &params)?;
        }
        PkeyAlgId::Ecdsa => {}
    }
    let mut out = Encoder::new();
    out.write_sequence(&inner.finish());
    Ok(out.finish())
}

fn encode_public_key(enc: &mut Encoder, key: &PublicKey) -> Result<(), PkiError> {
    let mut alg = Encoder::new();
    let mut bits = Encoder::new();
    match key {
        PublicKey::Rsa { modulus, exponent } => {
            alg.write_oid(OidId::RsaEncryption.der());
            alg.write_null();
            bits.write_sequence_with(|seq| {
                seq.write_integer(modulus);
                seq.write_integer(exponent);
            });
        }
        PublicKey::Ec { curve, point } => {
            alg.write_oid(OidId::EcPublicKey.der());
            alg.write_oid(curve_oid(*curve)?.der());
            bits.write_raw(point);
        }
    }
    let (alg, bits) = (alg.finish(), bits.finish());
    enc.write_sequence_with(|spki| {
        spki.write_sequence(&alg);
        spki.write_bit_string(0, &bits);
    });
    Ok(())
}

fn encode_extension(enc: &mut Encoder, oid: OidId, critical: bool, value: &[u8]) {
    enc.write_sequence_with(|ext| {
        ext.write_oid(oid.der());
        if critical {
            ext.write_boolean(true);
        }
        ext.write_octet_string(value);
    });
}

impl CertificateBuilder {
    pub fn new() -> Self {
        Self {
            serial: vec![1],
            issuer: CertIdent::default(),
            subject: CertIdent::default(),
            not_before: 0,
            not_after: 0,
            public_key: None,
            is_ca: false,
            path_len: None,
            dns_names: Vec::new(),
            signature_algorithm: None,
        }
    }

    /// Big-endian serial number.
    pub fn serial(mut self, serial: &[u8]) -> Self {
        self.serial = serial.to_vec();
        self
    }

    pub fn issuer(mut self, ident: CertIdent) -> Self {
        self.issuer = ident;
        self
    }

    pub fn subject(mut self, ident: CertIdent) -> Self {
        self.subject = ident;
        self
    }

    /// Validity window in UNIX seconds.
    pub fn validity(mut self, not_before: i64, not_after: i64) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn public_key(mut self, key: PublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    /// Mark the certificate as a CA (critical basicConstraints).
    pub fn is_ca(mut self, is_ca: bool, path_len: Option<u32>) -> Self {
        self.is_ca = is_ca;
        self.path_len = path_len;
        self
    }

    pub fn dns_name(mut self, name: &str) -> Self {
        self.dns_names.push(name.to_string());
        self
    }

    /// Defaults to SHA-256 with the signing key's scheme.
    pub fn signature_algorithm(mut self, alg: SignatureAlgorithm) -> Self {
        self.signature_algorithm = Some(alg);
        self
    }

    fn encode_tbs(&self, alg_id: &[u8]) -> Result<Vec<u8>, PkiError> {
        let public_key = self
            .public_key
            .as_ref()
            .ok_or(PkiError::InvalidKey("subject public key not set"))?;
        let mut spki = Encoder::new();
        encode_public_key(&mut spki, public_key)?;
        let spki = spki.finish();

        let mut bc = Encoder::new();
        bc.write_sequence_with(|seq| {
            if self.is_ca {
                seq.write_boolean(true);
            }
            if let Some(n) = self.path_len {
                seq.write_u32(n);
            }
        });
        let mut exts = Encoder::new();
        exts.write_sequence_with(|list| {
            encode_extension(list, OidId::BasicConstraints, true, &bc.finish());
            if !self.dns_names.is_empty() {
                let mut san = Encoder::new();
                san.write_sequence_with(|names| {
                    for name in &self.dns_names {
                        names.write_context_specific(2, false, name.as_bytes());
                    }
                });
                encode_extension(list, OidId::SubjectAltName, false, &san.finish());
            }
        });
        let exts = exts.finish();

        let mut tbs = Encoder::new();
        tbs.write_sequence_with(|t| {
            let mut version = Encoder::new();
            version.write_u32(2);
            t.write_context_specific(0, true, &version.finish());
            t.write_integer(&self.serial);
            t.write_raw(alg_id);
            encode_name(t, &self.issuer);
            t.write_sequence_with(|v| {
                v.write_time(self.not_before);
                v.write_time(self.not_after);
            });
            encode_name(t, &self.subject);
            t.write_raw(&spki);
            t.write_context_specific(3, true, &exts);
        });
        Ok(tbs.finish())
    }

    /// Serialize and sign with the issuer's key, returning DER.
    pub fn sign(&self, issuer_key: &PrivateKey) -> Result<Vec<u8>, PkiError> {
        let alg = self.signature_algorithm.unwrap_or(match issuer_key {
            PrivateKey::Rsa(_) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha256),
            PrivateKey::Ecdsa(_) => SignatureAlgorithm::ecdsa(HashAlgId::Sha256),
        });
        let alg_id = encode_signature_algorithm(&alg)?;
        let tbs = self.encode_tbs(&alg_id)?;
        let hash = digest(alg.hash, &tbs);
        let signature = signing::begin_sign(issuer_key, &alg, &hash)?.run()?;
        log::debug!(
            "signed certificate for \"{}\" ({} bytes)",
            self.subject,
            tbs.len()
        );

        let mut out = Encoder::new();
        out.write_sequence_with(|cert| {
            cert.write_raw(&tbs);
            cert.write_raw(&alg_id);
            cert.write_bit_string(0, &signature);
        });
        Ok(out.finish())
    }
}

impl Default for CertificateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::{matches_host, Certificate};
    use pssl_types::EccCurveId;

    const RSA_KEY: &str = include_str!("../../tests/data/rsa_server.key");
    const EC_KEY: &str = include_str!("../../tests/data/ec_server.key");
    const EC384_KEY: &str = include_str!("../../tests/data/ec384_server.key");

    fn key(pem: &str) -> PrivateKey {
        PrivateKey::from_pem_or_der(pem.as_bytes()).unwrap()
    }

    fn ca_ident() -> CertIdent {
        CertIdent {
            country: "US".into(),
            org: "builder test".into(),
            common_name: "builder CA".into(),
            ..CertIdent::default()
        }
    }

    #[test]
    fn test_built_certificate_parses_and_verifies() {
        let issuer = key(EC_KEY);
        let leaf = key(EC384_KEY);
        let der = CertificateBuilder::new()
            .serial(&[0x42, 0x01])
            .issuer(ca_ident())
            .subject(CertIdent::with_common_name("leaf.example.org"))
            .validity(1_700_000_000, 4_000_000_000)
            .public_key(leaf.public_key())
            .dns_name("leaf.example.org")
            .dns_name("*.leaf.example.org")
            .sign(&issuer)
            .unwrap();
        let cert = Certificate::from_der(&der).unwrap();
        assert_eq!(cert.version, 3);
        assert_eq!(cert.serial, vec![0x42, 0x01]);
        assert_eq!(cert.issuer, ca_ident());
        assert_eq!(cert.subject.common_name, "leaf.example.org");
        assert_eq!(cert.not_before, 1_700_000_000);
        assert_eq!(cert.not_after, 4_000_000_000);
        assert_eq!(cert.public_key.curve(), Some(EccCurveId::NistP384));
        assert!(!cert.is_ca);
        assert!(cert.basic_constraints_critical);
        assert!(matches_host(&cert, "a.leaf.example.org"));
        assert!(!matches_host(&cert, "a.b.leaf.example.org"));
        cert.begin_verify_signature(&issuer.public_key())
            .unwrap()
            .run()
            .unwrap();
    }

    #[test]
    fn test_common_name_fallback_without_san() {
        let issuer = key(EC_KEY);
        let der = CertificateBuilder::new()
            .issuer(ca_ident())
            .subject(CertIdent::with_common_name("cn-only.example.net"))
            .validity(0, 4_000_000_000)
            .public_key(issuer.public_key())
            .sign(&issuer)
            .unwrap();
        let cert = Certificate::from_der(&der).unwrap();
        assert!(cert.subject_alt_name().is_none());
        assert!(matches_host(&cert, "CN-ONLY.example.net"));
        assert!(!matches_host(&cert, "example.net"));
    }

    #[test]
    fn test_rsa_pss_ca_certificate() {
        let issuer = key(RSA_KEY);
        let der = CertificateBuilder::new()
            .issuer(ca_ident())
            .subject(ca_ident())
            .validity(0, 4_000_000_000)
            .public_key(issuer.public_key())
            .is_ca(true, Some(1))
            .signature_algorithm(SignatureAlgorithm::rsa_pss(HashAlgId::Sha384))
            .sign(&issuer)
            .unwrap();
        let cert = Certificate::from_der(&der).unwrap();
        assert!(cert.is_ca);
        assert_eq!(cert.path_len, Some(1));
        assert!(cert.is_self_issued());
        let pss = cert.signature_algorithm.pss.unwrap();
        assert_eq!(pss.hash, HashAlgId::Sha384);
        assert_eq!(pss.salt_len, 48);
        cert.begin_verify_signature(&cert.public_key)
            .unwrap()
            .run()
            .unwrap();
    }

    #[test]
    fn test_missing_public_key_is_rejected() {
        let issuer = key(EC_KEY);
        assert!(CertificateBuilder::new().sign(&issuer).is_err());
    }

    #[test]
    fn test_mismatched_algorithm_is_rejected() {
        let issuer = key(EC_KEY);
        let result = CertificateBuilder::new()
            .public_key(issuer.public_key())
            .signature_algorithm(SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha256))
            .sign(&issuer);
        assert!(matches!(result, Err(PkiError::UnsupportedAlgorithm(_))));
    }
}
