//! Private key loading: PKCS#8 PrivateKeyInfo (RFC 5958), PKCS#1
//! RSAPrivateKey (RFC 8017) and SEC1 ECPrivateKey (RFC 5915).

use crate::x509::PublicKey;
use pssl_crypto::ecdsa::EcdsaPrivateKey;
use pssl_crypto::rsa::{RsaPrivateComponents, RsaPrivateKey};
use pssl_types::{EccCurveId, PkeyAlgId, PkiError};
use pssl_utils::asn1::{strip_leading_zeros, Decoder};
use pssl_utils::oid::OidId;

/// A signing key for one of the supported certificate key types.
#[derive(Debug, Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ecdsa(EcdsaPrivateKey),
}

impl PrivateKey {
    /// Load a key from PEM, bare base64 or DER.
    ///
    /// The PEM label selects the format. Unlabelled input is tried as
    /// PKCS#8, then PKCS#1, then SEC1.
    pub fn from_pem_or_der(input: &[u8]) -> Result<Self, PkiError> {
        let blocks = pssl_utils::pem::decode_any(input)?;
        for block in &blocks {
            match block.label.as_str() {
                "PRIVATE KEY" => return Self::from_pkcs8_der(&block.data),
                "RSA PRIVATE KEY" => return Self::from_pkcs1_der(&block.data),
                "EC PRIVATE KEY" => return Self::from_sec1_der(&block.data, None),
                "" => {
                    return Self::from_pkcs8_der(&block.data)
                        .or_else(|_| Self::from_pkcs1_der(&block.data))
                        .or_else(|_| Self::from_sec1_der(&block.data, None));
                }
                // EC PARAMETERS and similar blocks travel alongside keys.
                _ => continue,
            }
        }
        Err(PkiError::InvalidKey("no private key block"))
    }

    /// Parse a PKCS#8 PrivateKeyInfo.
    ///
    /// ```text
    /// PrivateKeyInfo ::= SEQUENCE {
    ///     version                   INTEGER,
    ///     privateKeyAlgorithm       AlgorithmIdentifier,
    ///     privateKey                OCTET STRING
    /// }
    /// ```
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, PkiError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer.read_sequence()?;
        if seq.read_small_integer()? > 1 {
            return Err(PkiError::InvalidKey("unsupported PKCS#8 version"));
        }
        let mut alg = seq.read_sequence()?;
        let oid = alg.read_oid()?;
        let private_key = seq.read_octet_string()?;
        match OidId::from_der(oid) {
            Some(OidId::RsaEncryption) => Self::from_pkcs1_der(private_key),
            Some(OidId::EcPublicKey) => {
                let curve = curve_from_oid(alg.read_oid()?)?;
                Self::from_sec1_der(private_key, Some(curve))
            }
            _ => Err(PkiError::UnsupportedAlgorithm(
                pssl_utils::oid::Oid::from_der_value(oid)
                    .map(|o| dotted(o.arcs()))
                    .unwrap_or_default(),
            )),
        }
    }

    /// Parse a PKCS#1 RSAPrivateKey.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, PkiError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer.read_sequence()?;
        if seq.read_small_integer()? != 0 {
            return Err(PkiError::InvalidKey("multi-prime RSA key"));
        }
        let mut fields = [&[][..]; 8];
        for field in fields.iter_mut() {
            *field = strip_leading_zeros(seq.read_integer()?);
        }
        let [n, e, d, p, q, dp, dq, qinv] = fields;
        let key = RsaPrivateKey::from_components(&RsaPrivateComponents {
            n,
            e,
            d,
            p,
            q,
            dp,
            dq,
            qinv,
        })?;
        Ok(PrivateKey::Rsa(key))
    }

    /// Parse a SEC1 ECPrivateKey.
    ///
    /// `curve` comes from the enclosing PKCS#8 algorithm parameters; a bare
    /// SEC1 key must name its curve in the `[0]` field.
    pub fn from_sec1_der(der: &[u8], curve: Option<EccCurveId>) -> Result<Self, PkiError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer.read_sequence()?;
        if seq.read_small_integer()? != 1 {
            return Err(PkiError::InvalidKey("unsupported ECPrivateKey version"));
        }
        let scalar = seq.read_octet_string()?;
        let named = match seq.try_read_context_specific(0, true)? {
            Some(params) => Some(curve_from_oid(Decoder::new(params.value).read_oid()?)?),
            None => None,
        };
        let curve = match (curve, named) {
            (Some(a), Some(b)) if a != b => {
                return Err(PkiError::InvalidKey("conflicting EC curve parameters"))
            }
            (Some(c), _) | (None, Some(c)) => c,
            (None, None) => return Err(PkiError::InvalidKey("EC key without curve")),
        };
        if scalar.len() != curve.field_len() {
            log::debug!(
                "EC private scalar is {} bytes, expected {}",
                scalar.len(),
                curve.field_len()
            );
        }
        Ok(PrivateKey::Ecdsa(EcdsaPrivateKey::from_scalar(curve, scalar)?))
    }

    pub fn alg(&self) -> PkeyAlgId {
        match self {
            PrivateKey::Rsa(_) => PkeyAlgId::Rsa,
            PrivateKey::Ecdsa(_) => PkeyAlgId::Ecdsa,
        }
    }

    /// The matching public key, in certificate form.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(k) => PublicKey::Rsa {
                modulus: k.public_key().modulus(),
                exponent: k.public_key().exponent(),
            },
            PrivateKey::Ecdsa(k) => PublicKey::Ec {
                curve: k.curve_id(),
                point: k.public_key().to_uncompressed().to_vec(),
            },
        }
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        self.public_key().bits()
    }
}

pub(crate) fn curve_from_oid(oid: &[u8]) -> Result<EccCurveId, PkiError> {
    match OidId::from_der(oid) {
        Some(OidId::Secp256r1) => Ok(EccCurveId::NistP256),
        Some(OidId::Secp384r1) => Ok(EccCurveId::NistP384),
        _ => Err(PkiError::UnsupportedAlgorithm("EC curve".into())),
    }
}

pub(crate) fn curve_oid(curve: EccCurveId) -> Result<OidId, PkiError> {
    match curve {
        EccCurveId::NistP256 => Ok(OidId::Secp256r1),
        EccCurveId::NistP384 => Ok(OidId::Secp384r1),
        other => Err(PkiError::UnsupportedAlgorithm(format!("{other:?}"))),
    }
}

fn dotted(arcs: &[u64]) -> String {
    arcs.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::Certificate;

    const RSA_KEY: &str = include_str!("../../tests/data/rsa_server.key");
    const RSA_CERT: &str = include_str!("../../tests/data/rsa_server.pem");
    const EC_KEY: &str = include_str!("../../tests/data/ec_server.key");
    const EC_CERT: &str = include_str!("../../tests/data/ec_server.pem");
    const EC384_KEY: &str = include_str!("../../tests/data/ec384_server.key");
    const EC_CLIENT_KEY: &str = include_str!("../../tests/data/ec_client.key");

    fn first_cert(pem: &str) -> Certificate {
        Certificate::parse_all(pem.as_bytes()).unwrap().remove(0)
    }

    #[test]
    fn test_pkcs1_rsa_key_matches_certificate() {
        let key = PrivateKey::from_pem_or_der(RSA_KEY.as_bytes()).unwrap();
        assert_eq!(key.alg(), PkeyAlgId::Rsa);
        assert_eq!(key.bits(), 2048);
        assert_eq!(key.public_key(), first_cert(RSA_CERT).public_key);
    }

    #[test]
    fn test_sec1_ec_key_matches_certificate() {
        let key = PrivateKey::from_pem_or_der(EC_KEY.as_bytes()).unwrap();
        assert_eq!(key.alg(), PkeyAlgId::Ecdsa);
        assert_eq!(key.public_key(), first_cert(EC_CERT).public_key);
    }

    #[test]
    fn test_pkcs8_ec_keys() {
        let key = PrivateKey::from_pem_or_der(EC384_KEY.as_bytes()).unwrap();
        assert_eq!(key.public_key().curve(), Some(EccCurveId::NistP384));
        let key = PrivateKey::from_pem_or_der(EC_CLIENT_KEY.as_bytes()).unwrap();
        assert_eq!(key.public_key().curve(), Some(EccCurveId::NistP256));
        assert_eq!(key.bits(), 256);
    }

    #[test]
    fn test_unlabelled_der_is_detected() {
        let blocks = pssl_utils::pem::parse(EC384_KEY).unwrap();
        let key = PrivateKey::from_pem_or_der(&blocks[0].data).unwrap();
        assert_eq!(key.public_key().curve(), Some(EccCurveId::NistP384));
        let blocks = pssl_utils::pem::parse(RSA_KEY).unwrap();
        assert!(matches!(
            PrivateKey::from_pem_or_der(&blocks[0].data).unwrap(),
            PrivateKey::Rsa(_)
        ));
    }

    #[test]
    fn test_rejects_garbage_and_certificates() {
        assert!(PrivateKey::from_pem_or_der(b"\x30\x03\x02\x01\x05").is_err());
        assert!(PrivateKey::from_pem_or_der(RSA_CERT.as_bytes()).is_err());
        assert!(PrivateKey::from_sec1_der(&[0x30, 0x00], None).is_err());
    }
}
