//! DER certificate decoding.
//!
//! Every structural failure carries its own negative code so a rejected
//! certificate can be traced to the field that broke it.

use super::{CertIdent, Certificate, PssParams, PublicKey, SignatureAlgorithm};
use pssl_crypto::hash::digest;
use pssl_crypto::rsa::pkcs1::PSS_MAX_SALT;
use pssl_types::{CryptoError, EccCurveId, HashAlgId, PkeyAlgId, PkiError};
use pssl_utils::asn1::{parse_header, strip_leading_zeros, tags, Decoder, TagClass};
use pssl_utils::oid::{Oid, OidId};
use std::ops::Range;

fn invalid(code: i32, reason: &'static str) -> PkiError {
    PkiError::InvalidCert { code, reason }
}

fn at(code: i32, reason: &'static str) -> impl FnOnce(CryptoError) -> PkiError {
    move |_| invalid(code, reason)
}

fn unsupported(oid: &[u8]) -> PkiError {
    let name = Oid::from_der_value(oid)
        .map(|o| o.to_string())
        .unwrap_or_else(|_| "malformed oid".into());
    PkiError::UnsupportedAlgorithm(name)
}

/// Byte range of `part` within `base`; `part` must be a sub-slice.
fn range_in(base: &[u8], part: &[u8]) -> Range<usize> {
    let start = part.as_ptr() as usize - base.as_ptr() as usize;
    start..start + part.len()
}

pub(super) fn parse(data: &[u8]) -> Result<Certificate, PkiError> {
    let (cert, rest) = parse_header(data).map_err(at(-2, "certificate header"))?;
    if cert.tag.to_byte() != Some(tags::SEQUENCE) {
        return Err(invalid(-3, "certificate is not a sequence"));
    }
    if !rest.is_empty() {
        return Err(invalid(-4, "trailing data after certificate"));
    }
    let mut outer = Decoder::new(cert.value);
    let (mut tbs, tbs_raw) = outer
        .read_sequence_raw()
        .map_err(at(-5, "tbsCertificate"))?;

    let version = match tbs
        .try_read_context_specific(0, true)
        .map_err(at(-6, "version tag"))?
    {
        Some(tlv) => {
            let v = Decoder::new(tlv.value)
                .read_small_integer()
                .map_err(at(-7, "version"))?;
            if v > 2 {
                return Err(invalid(-8, "unknown version"));
            }
            v as u8 + 1
        }
        None => 1,
    };
    let serial = tbs.read_integer().map_err(at(-9, "serial number"))?.to_vec();
    let inner_alg = parse_signature_algorithm(&mut tbs, -10)?;
    let issuer = parse_name(&mut tbs, -20)?;

    let mut validity = tbs.read_sequence().map_err(at(-30, "validity"))?;
    let not_before = validity.read_time().map_err(at(-31, "notBefore"))?;
    let not_after = validity.read_time().map_err(at(-32, "notAfter"))?;
    if !validity.is_empty() {
        return Err(invalid(-33, "validity trailing data"));
    }

    let subject = parse_name(&mut tbs, -40)?;
    let public_key = parse_public_key(&mut tbs)?;

    for uid in [1, 2] {
        tbs.try_read_context_specific(uid, false)
            .map_err(at(-60, "unique identifier"))?;
    }

    let mut ext = Extensions::default();
    if let Some(tlv) = tbs
        .try_read_context_specific(3, true)
        .map_err(at(-69, "extensions tag"))?
    {
        if version != 3 {
            return Err(invalid(-68, "extensions before v3"));
        }
        ext = parse_extensions(data, tlv.value)?;
    }
    if !tbs.is_empty() {
        return Err(invalid(-79, "tbsCertificate trailing data"));
    }

    let signature_algorithm = parse_signature_algorithm(&mut outer, -80)?;
    if signature_algorithm != inner_alg {
        return Err(invalid(-86, "signature algorithm mismatch"));
    }
    let (unused, sig) = outer.read_bit_string().map_err(at(-87, "signature"))?;
    if unused != 0 {
        return Err(invalid(-88, "signature has unused bits"));
    }
    if !outer.is_empty() {
        return Err(invalid(-89, "certificate trailing data"));
    }

    Ok(Certificate {
        raw: data.to_vec(),
        version,
        serial,
        issuer,
        subject,
        not_before,
        not_after,
        tbs_hash: digest(signature_algorithm.hash, tbs_raw),
        signature_algorithm,
        public_key,
        is_ca: ext.is_ca,
        path_len: ext.path_len,
        basic_constraints_critical: ext.basic_constraints_critical,
        signature: sig.to_vec(),
        tbs: range_in(data, tbs_raw),
        san: ext.san,
    })
}

fn parse_name(dec: &mut Decoder<'_>, base: i32) -> Result<CertIdent, PkiError> {
    let mut ident = CertIdent::default();
    let mut name = dec.read_sequence().map_err(at(base, "name"))?;
    while !name.is_empty() {
        let mut rdn = name
            .read_set()
            .map_err(at(base - 1, "relative distinguished name"))?;
        while !rdn.is_empty() {
            let mut atv = rdn.read_sequence().map_err(at(base - 2, "name attribute"))?;
            let oid = atv.read_oid().map_err(at(base - 3, "name attribute type"))?;
            let field = match OidId::from_der(oid) {
                Some(OidId::CountryName) => Some(&mut ident.country),
                Some(OidId::StateName) => Some(&mut ident.state),
                Some(OidId::LocalityName) => Some(&mut ident.city),
                Some(OidId::OrganizationName) => Some(&mut ident.org),
                Some(OidId::OrganizationalUnitName) => Some(&mut ident.unit),
                Some(OidId::CommonName) => Some(&mut ident.common_name),
                _ => None,
            };
            match field {
                Some(f) => {
                    *f = atv
                        .read_string()
                        .map_err(at(base - 4, "name attribute value"))?
                }
                None => atv.skip().map_err(at(base - 5, "name attribute value"))?,
            }
        }
    }
    Ok(ident)
}

fn hash_from_oid(oid: &[u8]) -> Option<HashAlgId> {
    match OidId::from_der(oid)? {
        OidId::Md5 => Some(HashAlgId::Md5),
        OidId::Sha1 => Some(HashAlgId::Sha1),
        OidId::Sha256 => Some(HashAlgId::Sha256),
        OidId::Sha384 => Some(HashAlgId::Sha384),
        OidId::Sha512 => Some(HashAlgId::Sha512),
        _ => None,
    }
}

/// AlgorithmIdentifier naming a hash, with optional NULL parameters.
fn parse_hash_alg(dec: &mut Decoder<'_>, code: i32) -> Result<HashAlgId, PkiError> {
    let mut alg = dec.read_sequence().map_err(at(code, "hash algorithm"))?;
    let oid = alg.read_oid().map_err(at(code, "hash algorithm"))?;
    let hash = hash_from_oid(oid).ok_or_else(|| unsupported(oid))?;
    if !alg.is_empty() {
        alg.read_null().map_err(at(code, "hash algorithm parameters"))?;
    }
    Ok(hash)
}

fn parse_signature_algorithm(
    dec: &mut Decoder<'_>,
    base: i32,
) -> Result<SignatureAlgorithm, PkiError> {
    let mut alg = dec.read_sequence().map_err(at(base, "signature algorithm"))?;
    let oid = alg
        .read_oid()
        .map_err(at(base - 1, "signature algorithm oid"))?;
    let sig = match OidId::from_der(oid) {
        Some(OidId::Md5WithRsa) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Md5),
        Some(OidId::Sha1WithRsa) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha1),
        Some(OidId::Sha256WithRsa) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha256),
        Some(OidId::Sha384WithRsa) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha384),
        Some(OidId::Sha512WithRsa) => SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha512),
        Some(OidId::EcdsaWithSha1) => SignatureAlgorithm::ecdsa(HashAlgId::Sha1),
        Some(OidId::EcdsaWithSha256) => SignatureAlgorithm::ecdsa(HashAlgId::Sha256),
        Some(OidId::EcdsaWithSha384) => SignatureAlgorithm::ecdsa(HashAlgId::Sha384),
        Some(OidId::EcdsaWithSha512) => SignatureAlgorithm::ecdsa(HashAlgId::Sha512),
        Some(OidId::RsaPss) => {
            let params = alg
                .read_sequence()
                .map_err(at(base - 2, "pss parameters"))?;
            parse_pss_params(params, base - 3)?
        }
        _ => return Err(unsupported(oid)),
    };
    if !alg.is_empty() {
        alg.read_null()
            .map_err(at(base - 4, "signature algorithm parameters"))?;
    }
    Ok(sig)
}

/// RSASSA-PSS-params (RFC 4055), with the RFC defaults for absent fields.
fn parse_pss_params<'a>(mut p: Decoder<'a>, code: i32) -> Result<SignatureAlgorithm, PkiError> {
    let mut params = PssParams {
        hash: HashAlgId::Sha1,
        mgf_hash: HashAlgId::Sha1,
        salt_len: 20,
    };
    let ctx = |p: &mut Decoder<'a>, n| {
        p.try_read_context_specific(n, true)
            .map_err(at(code, "pss parameters"))
    };
    if let Some(t) = ctx(&mut p, 0)? {
        params.hash = parse_hash_alg(&mut Decoder::new(t.value), code)?;
    }
    if let Some(t) = ctx(&mut p, 1)? {
        let mut mgf = Decoder::new(t.value)
            .read_sequence()
            .map_err(at(code, "pss mask generation"))?;
        let oid = mgf.read_oid().map_err(at(code, "pss mask generation"))?;
        if OidId::from_der(oid) != Some(OidId::Mgf1) {
            return Err(unsupported(oid));
        }
        params.mgf_hash = parse_hash_alg(&mut mgf, code)?;
    }
    if let Some(t) = ctx(&mut p, 2)? {
        params.salt_len = Decoder::new(t.value)
            .read_small_integer()
            .map_err(at(code, "pss salt length"))? as usize;
    }
    if let Some(t) = ctx(&mut p, 3)? {
        let trailer = Decoder::new(t.value)
            .read_small_integer()
            .map_err(at(code, "pss trailer"))?;
        if trailer != 1 {
            return Err(invalid(code - 1, "pss trailer field"));
        }
    }
    if !p.is_empty() {
        return Err(invalid(code - 2, "pss parameters trailing data"));
    }
    if params.salt_len > PSS_MAX_SALT {
        return Err(invalid(code - 3, "pss salt too long"));
    }
    if params.mgf_hash != params.hash {
        return Err(PkiError::UnsupportedAlgorithm(
            "rsassa-pss with differing mgf1 hash".into(),
        ));
    }
    Ok(SignatureAlgorithm {
        key: PkeyAlgId::RsaPss,
        hash: params.hash,
        pss: Some(params),
    })
}

fn parse_public_key(dec: &mut Decoder<'_>) -> Result<PublicKey, PkiError> {
    let mut spki = dec.read_sequence().map_err(at(-50, "subjectPublicKeyInfo"))?;
    let mut alg = spki.read_sequence().map_err(at(-51, "key algorithm"))?;
    let oid = alg.read_oid().map_err(at(-52, "key algorithm oid"))?;
    let (unused, bits) = spki.read_bit_string().map_err(at(-53, "public key"))?;
    if unused != 0 {
        return Err(invalid(-54, "public key has unused bits"));
    }
    match OidId::from_der(oid) {
        Some(OidId::RsaEncryption | OidId::RsaPss) => {
            let mut key = Decoder::new(bits)
                .read_sequence()
                .map_err(at(-55, "rsa public key"))?;
            let n = key.read_integer().map_err(at(-56, "rsa modulus"))?;
            let e = key.read_integer().map_err(at(-57, "rsa exponent"))?;
            Ok(PublicKey::Rsa {
                modulus: strip_leading_zeros(n).to_vec(),
                exponent: strip_leading_zeros(e).to_vec(),
            })
        }
        Some(OidId::EcPublicKey) => {
            let curve_oid = alg.read_oid().map_err(at(-58, "ec curve"))?;
            let curve = match OidId::from_der(curve_oid) {
                Some(OidId::Secp256r1) => EccCurveId::NistP256,
                Some(OidId::Secp384r1) => EccCurveId::NistP384,
                _ => return Err(unsupported(curve_oid)),
            };
            if bits.len() != 1 + 2 * curve.field_len() || bits[0] != 0x04 {
                return Err(invalid(-59, "ec point encoding"));
            }
            Ok(PublicKey::Ec {
                curve,
                point: bits.to_vec(),
            })
        }
        _ => Err(unsupported(oid)),
    }
}

#[derive(Default)]
struct Extensions {
    is_ca: bool,
    path_len: Option<u32>,
    basic_constraints_critical: bool,
    san: Option<Range<usize>>,
}

fn parse_extensions(data: &[u8], value: &[u8]) -> Result<Extensions, PkiError> {
    let mut out = Extensions::default();
    let mut seq = Decoder::new(value)
        .read_sequence()
        .map_err(at(-70, "extensions"))?;
    while !seq.is_empty() {
        let mut ext = seq.read_sequence().map_err(at(-71, "extension"))?;
        let oid = ext.read_oid().map_err(at(-72, "extension oid"))?;
        let critical = match ext.peek_tag() {
            Ok(t) if t.to_byte() == Some(tags::BOOLEAN) => {
                Some(ext.read_boolean().map_err(at(-73, "extension critical flag"))?)
            }
            _ => None,
        };
        let v = ext
            .read_octet_string()
            .map_err(at(-74, "extension value"))?;
        if !ext.is_empty() {
            return Err(invalid(-75, "extension trailing data"));
        }
        match OidId::from_der(oid) {
            Some(OidId::BasicConstraints) => {
                out.basic_constraints_critical = critical.unwrap_or(true);
                let mut bc = Decoder::new(v)
                    .read_sequence()
                    .map_err(at(-76, "basicConstraints"))?;
                if matches!(bc.peek_tag(), Ok(t) if t.to_byte() == Some(tags::BOOLEAN)) {
                    out.is_ca = bc.read_boolean().map_err(at(-77, "basicConstraints cA"))?;
                }
                if !bc.is_empty() {
                    out.path_len = Some(
                        bc.read_small_integer()
                            .map_err(at(-78, "basicConstraints pathLen"))?,
                    );
                }
            }
            Some(OidId::SubjectAltName) => out.san = Some(range_in(data, v)),
            _ => {}
        }
    }
    Ok(out)
}

/// Values of the context-tagged GeneralName entries numbered `tag`.
pub(super) fn general_names(san: &[u8], tag: u32) -> Vec<Vec<u8>> {
    let Ok(mut seq) = Decoder::new(san).read_sequence() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    while let Ok(tlv) = seq.read_tlv() {
        if tlv.tag.class == TagClass::ContextSpecific && tlv.tag.number == tag {
            out.push(tlv.value.to_vec());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_CERT: &str = include_str!("../../tests/data/rsa_server.pem");
    const EC_CERT: &str = include_str!("../../tests/data/ec_server.pem");
    const PSS_CERT: &str = include_str!("../../tests/data/pss_server.pem");
    const CA_CERT: &str = include_str!("../../tests/data/ca.pem");

    fn one(pem: &str) -> Certificate {
        Certificate::parse_all(pem.as_bytes()).unwrap().remove(0)
    }

    #[test]
    fn test_parse_rsa_server_certificate() {
        let cert = one(RSA_CERT);
        assert_eq!(cert.version, 3);
        assert_eq!(cert.subject.common_name, "example.com");
        assert_eq!(cert.subject.org, "protossl test");
        assert_eq!(cert.issuer.common_name, "protossl test CA");
        assert_eq!(cert.issuer.country, "US");
        assert_eq!(cert.public_key.alg(), PkeyAlgId::Rsa);
        assert_eq!(cert.public_key.bits(), 2048);
        assert_eq!(
            cert.signature_algorithm,
            SignatureAlgorithm::rsa_pkcs1(HashAlgId::Sha256)
        );
        assert!(!cert.is_ca);
        assert!(cert.not_before < cert.not_after);
        assert_eq!(cert.dns_names(), vec!["example.com", "www.example.com"]);
        assert_eq!(cert.tbs_hash, digest(HashAlgId::Sha256, cert.tbs_bytes()));
    }

    #[test]
    fn test_parse_ca_and_ec_certificates() {
        let ca = one(CA_CERT);
        assert!(ca.is_ca);
        assert!(ca.basic_constraints_critical);
        assert!(ca.is_self_issued());

        let ec = one(EC_CERT);
        assert_eq!(ec.public_key.curve(), Some(EccCurveId::NistP256));
        assert_eq!(ec.signature_algorithm.key, PkeyAlgId::Rsa);
        assert_eq!(ec.issuer, ca.subject);
    }

    #[test]
    fn test_parse_pss_parameters() {
        let cert = one(PSS_CERT);
        let pss = cert.signature_algorithm.pss.unwrap();
        assert_eq!(cert.signature_algorithm.key, PkeyAlgId::RsaPss);
        assert_eq!(pss.hash, HashAlgId::Sha256);
        assert_eq!(pss.mgf_hash, HashAlgId::Sha256);
        assert_eq!(pss.salt_len, 32);
    }

    #[test]
    fn test_bundle_yields_every_certificate() {
        let bundle = format!("{RSA_CERT}\n{CA_CERT}");
        assert_eq!(Certificate::parse_all(bundle.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn test_truncated_certificates_fail_cleanly() {
        let der = one(RSA_CERT).raw;
        for cut in [1, 4, 10, 100, der.len() / 2, der.len() - 1] {
            assert!(Certificate::from_der(&der[..cut]).is_err(), "cut at {cut}");
        }
        let mut trailing = der.clone();
        trailing.push(0);
        assert_eq!(
            Certificate::from_der(&trailing).err(),
            Some(invalid(-4, "trailing data after certificate"))
        );
    }

    #[test]
    fn test_corrupted_field_reports_its_code() {
        let mut der = one(RSA_CERT).raw;
        // Outer header (4) + tbs header (4) + version [0] (5): serial tag.
        assert_eq!(der[13], tags::INTEGER);
        der[13] = tags::OCTET_STRING;
        match Certificate::from_der(&der) {
            Err(PkiError::InvalidCert { code, .. }) => assert_eq!(code, -9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_basic_constraints_without_critical_flag_counts_as_critical() {
        let mut bc = Vec::new();
        // SEQUENCE { SEQUENCE { OID basicConstraints, OCTET STRING { SEQUENCE { TRUE } } } }
        let inner = [0x30, 0x03, 0x01, 0x01, 0xFF];
        let mut ext = vec![0x06, 0x03, 0x55, 0x1d, 0x13, 0x04, inner.len() as u8];
        ext.extend_from_slice(&inner);
        bc.push(0x30);
        bc.push(ext.len() as u8 + 2);
        bc.push(0x30);
        bc.push(ext.len() as u8);
        bc.extend_from_slice(&ext);
        let parsed = parse_extensions(&bc, &bc).unwrap();
        assert!(parsed.is_ca);
        assert!(parsed.basic_constraints_critical);
        assert_eq!(parsed.path_len, None);
    }
}
