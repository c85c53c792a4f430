//! Static cipher suite, curve and signature scheme tables.

use crate::ProtocolVersion;
use pssl_crypto::aead::AeadAlg;
use pssl_pki::SignatureAlgorithm;
use pssl_types::{EccCurveId, HashAlgId, PkeyAlgId};

/// How the pre-master (or shared) secret is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchange {
    /// Client encrypts the pre-master secret to the server's RSA key.
    Rsa,
    EcdheRsa,
    EcdheEcdsa,
    /// TLS 1.3: key exchange and authentication are negotiated separately.
    Tls13,
}

impl KeyExchange {
    /// Certificate key type the server must hold.
    pub fn cert_key(self) -> Option<PkeyAlgId> {
        match self {
            KeyExchange::Rsa | KeyExchange::EcdheRsa => Some(PkeyAlgId::Rsa),
            KeyExchange::EcdheEcdsa => Some(PkeyAlgId::Ecdsa),
            KeyExchange::Tls13 => None,
        }
    }

    pub fn is_ecdhe(self) -> bool {
        matches!(self, KeyExchange::EcdheRsa | KeyExchange::EcdheEcdsa)
    }
}

/// Record protection family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipher {
    /// AES-CBC with HMAC over `CipherSuite::mac`.
    AesCbc { key_len: usize },
    Aead(AeadAlg),
}

/// One entry of the cipher suite table.
#[derive(Debug, PartialEq, Eq)]
pub struct CipherSuite {
    /// Bit in the enabled-cipher mask.
    pub bit: u32,
    pub id: u16,
    pub name: &'static str,
    pub kx: KeyExchange,
    pub bulk: BulkCipher,
    /// HMAC hash for CBC suites; the suite hash otherwise.
    pub mac: HashAlgId,
    /// PRF/HKDF and transcript hash (TLS 1.2 and 1.3).
    pub hash: HashAlgId,
    pub min_version: ProtocolVersion,
}

const fn cbc(
    bit: u32,
    id: u16,
    name: &'static str,
    kx: KeyExchange,
    key_len: usize,
    mac: HashAlgId,
    min_version: ProtocolVersion,
) -> CipherSuite {
    CipherSuite {
        bit,
        id,
        name,
        kx,
        bulk: BulkCipher::AesCbc { key_len },
        mac,
        hash: match mac {
            HashAlgId::Sha384 => HashAlgId::Sha384,
            _ => HashAlgId::Sha256,
        },
        min_version,
    }
}

const fn aead(
    bit: u32,
    id: u16,
    name: &'static str,
    kx: KeyExchange,
    alg: AeadAlg,
    hash: HashAlgId,
    min_version: ProtocolVersion,
) -> CipherSuite {
    CipherSuite {
        bit,
        id,
        name,
        kx,
        bulk: BulkCipher::Aead(alg),
        mac: hash,
        hash,
        min_version,
    }
}

use AeadAlg::{Aes128Gcm, Aes256Gcm, ChaCha20Poly1305};
use HashAlgId::{Sha1, Sha256, Sha384};
use KeyExchange::{EcdheEcdsa, EcdheRsa, Rsa, Tls13};
use ProtocolVersion::{Tls10, Tls12};

/// All suites, in the engine's preference order (bit order).
pub static CIPHER_SUITES: [CipherSuite; 23] = [
    cbc(0, 0x002F, "TLS_RSA_WITH_AES_128_CBC_SHA", Rsa, 16, Sha1, Tls10),
    cbc(1, 0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA", Rsa, 32, Sha1, Tls10),
    cbc(2, 0xC013, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", EcdheRsa, 16, Sha1, Tls10),
    cbc(3, 0xC014, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", EcdheRsa, 32, Sha1, Tls10),
    cbc(4, 0xC009, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", EcdheEcdsa, 16, Sha1, Tls10),
    cbc(5, 0xC00A, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", EcdheEcdsa, 32, Sha1, Tls10),
    cbc(6, 0x003C, "TLS_RSA_WITH_AES_128_CBC_SHA256", Rsa, 16, Sha256, Tls12),
    cbc(7, 0x003D, "TLS_RSA_WITH_AES_256_CBC_SHA256", Rsa, 32, Sha256, Tls12),
    aead(8, 0x009C, "TLS_RSA_WITH_AES_128_GCM_SHA256", Rsa, Aes128Gcm, Sha256, Tls12),
    aead(9, 0x009D, "TLS_RSA_WITH_AES_256_GCM_SHA384", Rsa, Aes256Gcm, Sha384, Tls12),
    cbc(10, 0xC027, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", EcdheRsa, 16, Sha256, Tls12),
    cbc(11, 0xC028, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384", EcdheRsa, 32, Sha384, Tls12),
    aead(12, 0xC02F, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", EcdheRsa, Aes128Gcm, Sha256, Tls12),
    aead(13, 0xC030, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", EcdheRsa, Aes256Gcm, Sha384, Tls12),
    aead(14, 0xCCA8, "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", EcdheRsa, ChaCha20Poly1305, Sha256, Tls12),
    cbc(15, 0xC023, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256", EcdheEcdsa, 16, Sha256, Tls12),
    cbc(16, 0xC024, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384", EcdheEcdsa, 32, Sha384, Tls12),
    aead(17, 0xC02B, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", EcdheEcdsa, Aes128Gcm, Sha256, Tls12),
    aead(18, 0xC02C, "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", EcdheEcdsa, Aes256Gcm, Sha384, Tls12),
    aead(19, 0xCCA9, "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", EcdheEcdsa, ChaCha20Poly1305, Sha256, Tls12),
    aead(20, 0x1301, "TLS_AES_128_GCM_SHA256", Tls13, Aes128Gcm, Sha256, ProtocolVersion::Tls13),
    aead(21, 0x1302, "TLS_AES_256_GCM_SHA384", Tls13, Aes256Gcm, Sha384, ProtocolVersion::Tls13),
    aead(22, 0x1303, "TLS_CHACHA20_POLY1305_SHA256", Tls13, ChaCha20Poly1305, Sha256, ProtocolVersion::Tls13),
];

/// Mask with every cipher suite enabled.
pub const ALL_CIPHERS: u32 = (1 << 23) - 1;

impl CipherSuite {
    pub fn by_id(id: u16) -> Option<&'static CipherSuite> {
        CIPHER_SUITES.iter().find(|s| s.id == id)
    }

    pub fn by_name(name: &str) -> Option<&'static CipherSuite> {
        CIPHER_SUITES.iter().find(|s| s.name == name)
    }

    pub const fn mask(&self) -> u32 {
        1 << self.bit
    }

    /// Whether the suite may be negotiated at `version`.
    pub fn usable_at(&self, version: ProtocolVersion) -> bool {
        match self.kx {
            KeyExchange::Tls13 => version == ProtocolVersion::Tls13,
            _ => version <= ProtocolVersion::Tls12 && version >= self.min_version,
        }
    }

    /// Suites enabled in `mask` that some version in `[min, max]` can use.
    pub fn enabled(
        mask: u32,
        min: ProtocolVersion,
        max: ProtocolVersion,
    ) -> impl Iterator<Item = &'static CipherSuite> {
        CIPHER_SUITES.iter().filter(move |s| {
            mask & s.mask() != 0
                && [ProtocolVersion::Tls10, ProtocolVersion::Tls11, ProtocolVersion::Tls12, ProtocolVersion::Tls13]
                    .iter()
                    .any(|v| *v >= min && *v <= max && s.usable_at(*v))
        })
    }

    pub fn is_aead(&self) -> bool {
        matches!(self.bulk, BulkCipher::Aead(_))
    }

    pub fn key_len(&self) -> usize {
        match self.bulk {
            BulkCipher::AesCbc { key_len } => key_len,
            BulkCipher::Aead(alg) => alg.key_len(),
        }
    }

    /// MAC key length (zero for AEAD suites).
    pub fn mac_key_len(&self) -> usize {
        match self.bulk {
            BulkCipher::AesCbc { .. } => self.mac.output_len(),
            BulkCipher::Aead(_) => 0,
        }
    }

    /// Implicit IV bytes taken from the key block.
    pub fn fixed_iv_len(&self, version: ProtocolVersion) -> usize {
        match self.bulk {
            BulkCipher::AesCbc { .. } => 16,
            BulkCipher::Aead(AeadAlg::ChaCha20Poly1305) => 12,
            BulkCipher::Aead(_) if version == ProtocolVersion::Tls13 => 12,
            BulkCipher::Aead(_) => 4,
        }
    }
}

/// A supported key-exchange group.
#[derive(Debug, PartialEq, Eq)]
pub struct NamedCurve {
    pub bit: u32,
    pub id: u16,
    pub name: &'static str,
    pub curve: EccCurveId,
}

pub static CURVES: [NamedCurve; 4] = [
    NamedCurve {
        bit: 0,
        id: 0x0017,
        name: "secp256r1",
        curve: EccCurveId::NistP256,
    },
    NamedCurve {
        bit: 1,
        id: 0x0018,
        name: "secp384r1",
        curve: EccCurveId::NistP384,
    },
    NamedCurve {
        bit: 2,
        id: 0x001D,
        name: "x25519",
        curve: EccCurveId::X25519,
    },
    NamedCurve {
        bit: 3,
        id: 0x001E,
        name: "x448",
        curve: EccCurveId::X448,
    },
];

pub const ALL_CURVES: u32 = 0xF;

impl NamedCurve {
    pub fn by_id(id: u16) -> Option<&'static NamedCurve> {
        CURVES.iter().find(|c| c.id == id)
    }

    pub fn by_curve(curve: EccCurveId) -> Option<&'static NamedCurve> {
        CURVES.iter().find(|c| c.curve == curve)
    }

    pub const fn mask(&self) -> u32 {
        1 << self.bit
    }

    pub fn enabled(mask: u32) -> impl Iterator<Item = &'static NamedCurve> {
        CURVES.iter().filter(move |c| mask & c.mask() != 0)
    }
}

/// A TLS 1.2/1.3 signature scheme code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureScheme(pub u16);

impl SignatureScheme {
    pub const RSA_PKCS1_SHA1: Self = Self(0x0201);
    pub const ECDSA_SHA1: Self = Self(0x0203);
    pub const RSA_PKCS1_SHA256: Self = Self(0x0401);
    pub const ECDSA_SECP256R1_SHA256: Self = Self(0x0403);
    pub const RSA_PKCS1_SHA384: Self = Self(0x0501);
    pub const ECDSA_SECP384R1_SHA384: Self = Self(0x0503);
    pub const RSA_PKCS1_SHA512: Self = Self(0x0601);
    pub const RSA_PSS_RSAE_SHA256: Self = Self(0x0804);
    pub const RSA_PSS_RSAE_SHA384: Self = Self(0x0805);
    pub const RSA_PSS_RSAE_SHA512: Self = Self(0x0806);
    pub const RSA_PSS_PSS_SHA256: Self = Self(0x0809);
    pub const RSA_PSS_PSS_SHA384: Self = Self(0x080a);
    pub const RSA_PSS_PSS_SHA512: Self = Self(0x080b);

    /// Schemes we offer and accept, most preferred first.
    pub const PREFERENCE: [Self; 13] = [
        Self::ECDSA_SECP256R1_SHA256,
        Self::ECDSA_SECP384R1_SHA384,
        Self::RSA_PSS_RSAE_SHA256,
        Self::RSA_PSS_RSAE_SHA384,
        Self::RSA_PSS_RSAE_SHA512,
        Self::RSA_PKCS1_SHA256,
        Self::RSA_PKCS1_SHA384,
        Self::RSA_PKCS1_SHA512,
        Self::RSA_PSS_PSS_SHA256,
        Self::RSA_PSS_PSS_SHA384,
        Self::RSA_PSS_PSS_SHA512,
        Self::RSA_PKCS1_SHA1,
        Self::ECDSA_SHA1,
    ];

    pub fn is_known(self) -> bool {
        Self::PREFERENCE.contains(&self)
    }

    pub fn hash(self) -> HashAlgId {
        match self.0 >> 8 {
            0x02 => HashAlgId::Sha1,
            0x05 => HashAlgId::Sha384,
            0x06 => HashAlgId::Sha512,
            0x08 => match self.0 & 0xff {
                0x05 | 0x0a => HashAlgId::Sha384,
                0x06 | 0x0b => HashAlgId::Sha512,
                _ => HashAlgId::Sha256,
            },
            _ => HashAlgId::Sha256,
        }
    }

    pub fn is_pss(self) -> bool {
        self.0 >> 8 == 0x08
    }

    pub fn is_pkcs1(self) -> bool {
        self.0 & 0xff == 0x01 && self.0 >> 8 != 0x08
    }

    /// Key type that can produce this scheme.
    pub fn key_alg(self) -> PkeyAlgId {
        if self.0 & 0xff == 0x03 && !self.is_pss() {
            PkeyAlgId::Ecdsa
        } else {
            PkeyAlgId::Rsa
        }
    }

    /// The curve TLS 1.3 binds to an ECDSA scheme.
    pub fn curve(self) -> Option<EccCurveId> {
        match self {
            Self::ECDSA_SECP256R1_SHA256 => Some(EccCurveId::NistP256),
            Self::ECDSA_SECP384R1_SHA384 => Some(EccCurveId::NistP384),
            _ => None,
        }
    }

    /// Whether the scheme may be used at `version`.
    pub fn usable_at(self, version: ProtocolVersion) -> bool {
        match version {
            ProtocolVersion::Tls13 => {
                !self.is_pkcs1() && self.hash() != HashAlgId::Sha1 && self != Self::ECDSA_SHA1
            }
            _ => true,
        }
    }

    /// Certificate-level algorithm for the signature engine.
    pub fn signature_algorithm(self) -> SignatureAlgorithm {
        match (self.key_alg(), self.is_pss()) {
            (PkeyAlgId::Ecdsa, _) => SignatureAlgorithm::ecdsa(self.hash()),
            (_, true) => SignatureAlgorithm::rsa_pss(self.hash()),
            _ => SignatureAlgorithm::rsa_pkcs1(self.hash()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RSA_PKCS1_SHA1 => "rsa_pkcs1_sha1",
            Self::ECDSA_SHA1 => "ecdsa_sha1",
            Self::RSA_PKCS1_SHA256 => "rsa_pkcs1_sha256",
            Self::ECDSA_SECP256R1_SHA256 => "ecdsa_secp256r1_sha256",
            Self::RSA_PKCS1_SHA384 => "rsa_pkcs1_sha384",
            Self::ECDSA_SECP384R1_SHA384 => "ecdsa_secp384r1_sha384",
            Self::RSA_PKCS1_SHA512 => "rsa_pkcs1_sha512",
            Self::RSA_PSS_RSAE_SHA256 => "rsa_pss_rsae_sha256",
            Self::RSA_PSS_RSAE_SHA384 => "rsa_pss_rsae_sha384",
            Self::RSA_PSS_RSAE_SHA512 => "rsa_pss_rsae_sha512",
            Self::RSA_PSS_PSS_SHA256 => "rsa_pss_pss_sha256",
            Self::RSA_PSS_PSS_SHA384 => "rsa_pss_pss_sha384",
            Self::RSA_PSS_PSS_SHA512 => "rsa_pss_pss_sha512",
            _ => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_table_is_consistent() {
        for (i, s) in CIPHER_SUITES.iter().enumerate() {
            assert_eq!(s.bit as usize, i);
            assert_eq!(CipherSuite::by_id(s.id), Some(s));
            assert_eq!(CipherSuite::by_name(s.name), Some(s));
        }
        assert_eq!(ALL_CIPHERS.count_ones() as usize, CIPHER_SUITES.len());
    }

    #[test]
    fn test_version_windows() {
        let rsa_sha = CipherSuite::by_id(0x002F).unwrap();
        assert!(rsa_sha.usable_at(ProtocolVersion::Tls10));
        assert!(rsa_sha.usable_at(ProtocolVersion::Tls12));
        assert!(!rsa_sha.usable_at(ProtocolVersion::Tls13));
        let gcm = CipherSuite::by_id(0xC02F).unwrap();
        assert!(!gcm.usable_at(ProtocolVersion::Tls11));
        let tls13 = CipherSuite::by_id(0x1301).unwrap();
        assert!(tls13.usable_at(ProtocolVersion::Tls13));
        assert!(!tls13.usable_at(ProtocolVersion::Tls12));
        let only_old: Vec<_> =
            CipherSuite::enabled(ALL_CIPHERS, ProtocolVersion::Tls10, ProtocolVersion::Tls11).collect();
        assert_eq!(only_old.len(), 6);
    }

    #[test]
    fn test_suite_parameters() {
        let s = CipherSuite::by_id(0xC028).unwrap();
        assert_eq!((s.key_len(), s.mac_key_len(), s.hash), (32, 48, HashAlgId::Sha384));
        let s = CipherSuite::by_id(0x0035).unwrap();
        assert_eq!((s.mac, s.hash), (HashAlgId::Sha1, HashAlgId::Sha256));
        let s = CipherSuite::by_id(0xCCA8).unwrap();
        assert_eq!(s.fixed_iv_len(ProtocolVersion::Tls12), 12);
        let s = CipherSuite::by_id(0x009C).unwrap();
        assert_eq!(s.fixed_iv_len(ProtocolVersion::Tls12), 4);
    }

    #[test]
    fn test_signature_scheme_properties() {
        use SignatureScheme as S;
        assert_eq!(S::RSA_PSS_RSAE_SHA384.hash(), HashAlgId::Sha384);
        assert_eq!(S::RSA_PSS_PSS_SHA512.hash(), HashAlgId::Sha512);
        assert!(S::RSA_PKCS1_SHA256.is_pkcs1());
        assert!(!S::RSA_PSS_RSAE_SHA256.is_pkcs1());
        assert_eq!(S::ECDSA_SECP384R1_SHA384.key_alg(), PkeyAlgId::Ecdsa);
        assert_eq!(S::ECDSA_SHA1.key_alg(), PkeyAlgId::Ecdsa);
        assert_eq!(S::RSA_PSS_RSAE_SHA256.key_alg(), PkeyAlgId::Rsa);
        assert!(!S::RSA_PKCS1_SHA256.usable_at(ProtocolVersion::Tls13));
        assert!(S::RSA_PSS_RSAE_SHA256.usable_at(ProtocolVersion::Tls13));
        assert!(!S::ECDSA_SHA1.usable_at(ProtocolVersion::Tls13));
        assert_eq!(S::ECDSA_SECP256R1_SHA256.curve(), Some(EccCurveId::NistP256));
    }

    #[test]
    fn test_curve_table() {
        assert_eq!(NamedCurve::by_id(0x001D).unwrap().curve, EccCurveId::X25519);
        assert_eq!(NamedCurve::enabled(0b0101).count(), 2);
        assert_eq!(NamedCurve::by_curve(EccCurveId::X448).unwrap().bit, 3);
    }
}
