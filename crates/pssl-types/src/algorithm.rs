/// Hash algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgId {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    /// Concatenation of MD5 and SHA-1 digests (36 bytes), used for
    /// TLS 1.0/1.1 RSA signatures.
    Md5Sha1,
}

impl HashAlgId {
    /// Digest output length in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            HashAlgId::Md5 => 16,
            HashAlgId::Sha1 => 20,
            HashAlgId::Sha256 => 32,
            HashAlgId::Sha384 => 48,
            HashAlgId::Sha512 => 64,
            HashAlgId::Md5Sha1 => 36,
        }
    }

    /// Internal block size in bytes (the HMAC key block size).
    pub const fn block_len(self) -> usize {
        match self {
            HashAlgId::Sha384 | HashAlgId::Sha512 => 128,
            _ => 64,
        }
    }

    /// Short display name.
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgId::Md5 => "MD5",
            HashAlgId::Sha1 => "SHA1",
            HashAlgId::Sha256 => "SHA256",
            HashAlgId::Sha384 => "SHA384",
            HashAlgId::Sha512 => "SHA512",
            HashAlgId::Md5Sha1 => "MD5-SHA1",
        }
    }
}

/// Elliptic curve identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccCurveId {
    /// NIST P-256 (secp256r1).
    NistP256,
    /// NIST P-384 (secp384r1).
    NistP384,
    /// Curve25519 in Montgomery form (X25519 key agreement).
    X25519,
    /// Curve448 in Montgomery form (X448 key agreement).
    X448,
}

impl EccCurveId {
    /// Field element size in bytes.
    pub const fn field_len(self) -> usize {
        match self {
            EccCurveId::NistP256 => 32,
            EccCurveId::NistP384 => 48,
            EccCurveId::X25519 => 32,
            EccCurveId::X448 => 56,
        }
    }

    /// Whether this curve is a short Weierstrass curve usable for ECDSA.
    pub const fn is_weierstrass(self) -> bool {
        matches!(self, EccCurveId::NistP256 | EccCurveId::NistP384)
    }
}

/// Public key algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkeyAlgId {
    Rsa,
    RsaPss,
    Ecdsa,
}
