//! X.509 certificates: parsing, building, signature checks and host matching.

mod builder;
mod certificate;
mod hostname;
mod signing;

pub use builder::CertificateBuilder;
pub use hostname::matches_host;
pub use signing::{begin_sign, begin_verify, decode_ecdsa_der, encode_ecdsa_der, SignOp, VerifyOp};

use pssl_crypto::ecdsa::EcdsaPublicKey;
use pssl_crypto::hash::digest;
use pssl_crypto::rsa::RsaPublicKey;
use pssl_types::{EccCurveId, HashAlgId, PkeyAlgId, PkiError};
use std::ops::Range;

/// The identity fields of a certificate name that the engine tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CertIdent {
    pub country: String,
    pub state: String,
    pub city: String,
    pub org: String,
    pub unit: String,
    pub common_name: String,
}

impl CertIdent {
    /// Identity with only a common name.
    pub fn with_common_name(cn: &str) -> Self {
        Self {
            common_name: cn.to_string(),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for CertIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [
            ("C", &self.country),
            ("ST", &self.state),
            ("L", &self.city),
            ("O", &self.org),
            ("OU", &self.unit),
            ("CN", &self.common_name),
        ];
        let mut first = true;
        for (k, v) in parts.iter().filter(|(_, v)| !v.is_empty()) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// A subject public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Big-endian modulus and exponent without leading zeros.
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    /// Uncompressed SEC1 point.
    Ec { curve: EccCurveId, point: Vec<u8> },
}

impl PublicKey {
    pub fn alg(&self) -> PkeyAlgId {
        match self {
            PublicKey::Rsa { .. } => PkeyAlgId::Rsa,
            PublicKey::Ec { .. } => PkeyAlgId::Ecdsa,
        }
    }

    /// Key size in bits (modulus size or curve field size).
    pub fn bits(&self) -> usize {
        match self {
            PublicKey::Rsa { modulus, .. } => {
                let lead = modulus.first().map_or(0, |b| 8 - b.leading_zeros() as usize);
                modulus.len().saturating_sub(1) * 8 + lead
            }
            PublicKey::Ec { curve, .. } => curve.field_len() * 8,
        }
    }

    pub fn curve(&self) -> Option<EccCurveId> {
        match self {
            PublicKey::Ec { curve, .. } => Some(*curve),
            PublicKey::Rsa { .. } => None,
        }
    }

    pub fn rsa_key(&self) -> Result<RsaPublicKey, PkiError> {
        match self {
            PublicKey::Rsa { modulus, exponent } => Ok(RsaPublicKey::new(modulus, exponent)?),
            PublicKey::Ec { .. } => Err(PkiError::InvalidKey("not an RSA key")),
        }
    }

    pub fn ecdsa_key(&self) -> Result<EcdsaPublicKey, PkiError> {
        match self {
            PublicKey::Ec { curve, point } => Ok(EcdsaPublicKey::from_uncompressed(*curve, point)?),
            PublicKey::Rsa { .. } => Err(PkiError::InvalidKey("not an EC key")),
        }
    }
}

/// RSASSA-PSS parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PssParams {
    pub hash: HashAlgId,
    pub mgf_hash: HashAlgId,
    pub salt_len: usize,
}

/// A certificate signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureAlgorithm {
    /// `Rsa` (PKCS#1 v1.5), `RsaPss` or `Ecdsa`.
    pub key: PkeyAlgId,
    pub hash: HashAlgId,
    pub pss: Option<PssParams>,
}

impl SignatureAlgorithm {
    pub const fn rsa_pkcs1(hash: HashAlgId) -> Self {
        Self {
            key: PkeyAlgId::Rsa,
            hash,
            pss: None,
        }
    }

    /// PSS with MGF1 over the same hash and a salt as long as the digest.
    pub const fn rsa_pss(hash: HashAlgId) -> Self {
        Self {
            key: PkeyAlgId::RsaPss,
            hash,
            pss: Some(PssParams {
                hash,
                mgf_hash: hash,
                salt_len: hash.output_len(),
            }),
        }
    }

    pub const fn ecdsa(hash: HashAlgId) -> Self {
        Self {
            key: PkeyAlgId::Ecdsa,
            hash,
            pss: None,
        }
    }
}

/// A parsed X.509 certificate. Read-only once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The complete DER encoding.
    pub raw: Vec<u8>,
    /// 1, 2 or 3.
    pub version: u8,
    pub serial: Vec<u8>,
    pub issuer: CertIdent,
    pub subject: CertIdent,
    /// Validity window in UNIX seconds.
    pub not_before: i64,
    pub not_after: i64,
    pub signature_algorithm: SignatureAlgorithm,
    pub public_key: PublicKey,
    /// basicConstraints cA.
    pub is_ca: bool,
    pub path_len: Option<u32>,
    /// basicConstraints criticality; an absent flag counts as critical.
    pub basic_constraints_critical: bool,
    pub signature: Vec<u8>,
    /// Digest of the TBSCertificate under the signature hash.
    pub tbs_hash: Vec<u8>,
    tbs: Range<usize>,
    san: Option<Range<usize>>,
}

impl Certificate {
    /// Parse a DER certificate.
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        certificate::parse(data)
    }

    /// Parse every certificate in a PEM bundle, bare base64 or DER blob.
    pub fn parse_all(input: &[u8]) -> Result<Vec<Self>, PkiError> {
        let blocks = pssl_utils::pem::decode_any(input)?;
        let certs = blocks
            .iter()
            .filter(|b| b.label == "CERTIFICATE" || b.label.is_empty())
            .map(|b| Self::from_der(&b.data))
            .collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(PkiError::InvalidCert {
                code: -1,
                reason: "no certificate found",
            });
        }
        Ok(certs)
    }

    /// The signed TBSCertificate bytes.
    pub fn tbs_bytes(&self) -> &[u8] {
        &self.raw[self.tbs.clone()]
    }

    /// Raw subjectAltName extension value, if present.
    pub fn subject_alt_name(&self) -> Option<&[u8]> {
        self.san.clone().map(|r| &self.raw[r])
    }

    /// dNSName entries of the subjectAltName extension.
    pub fn dns_names(&self) -> Vec<String> {
        self.subject_alt_name()
            .map(|san| certificate::general_names(san, 2))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| String::from_utf8(v).ok())
            .collect()
    }

    /// iPAddress entries of the subjectAltName extension.
    pub fn ip_addresses(&self) -> Vec<Vec<u8>> {
        self.subject_alt_name()
            .map(|san| certificate::general_names(san, 7))
            .unwrap_or_default()
    }

    /// SHA-256 over the DER encoding.
    pub fn fingerprint(&self) -> Vec<u8> {
        digest(HashAlgId::Sha256, &self.raw)
    }

    pub fn is_self_issued(&self) -> bool {
        self.issuer == self.subject
    }

    /// Whether `now` (UNIX seconds) falls inside the validity window.
    pub fn valid_at(&self, now: i64) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Start checking this certificate's signature with the issuer's key.
    pub fn begin_verify_signature(&self, issuer_key: &PublicKey) -> Result<VerifyOp, PkiError> {
        begin_verify(
            issuer_key,
            &self.signature_algorithm,
            &self.tbs_hash,
            &self.signature,
        )
    }
}
