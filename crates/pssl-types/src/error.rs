/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    // General errors
    #[error("null or empty input")]
    NullInput,
    #[error("invalid argument")]
    InvalidArg,
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid key")]
    InvalidKey,

    // Buffer errors
    #[error("buffer length not enough: need {need}, got {got}")]
    BufferTooSmall { need: usize, got: usize },
    #[error("input data too long")]
    InputOverflow,

    // BigNum errors
    #[error("big number: division by zero")]
    BnDivisionByZero,
    #[error("big number: no modular inverse")]
    BnNoInverse,
    #[error("big number: modulus must be odd")]
    BnEvenModulus,

    // RSA errors
    #[error("rsa: invalid key bits")]
    RsaInvalidKeyBits,
    #[error("rsa: verification failed")]
    RsaVerifyFail,
    #[error("rsa: invalid padding")]
    RsaInvalidPadding,
    #[error("rsa: missing key info")]
    RsaNoKeyInfo,
    #[error("rsa: pss salt length {0} exceeds limit")]
    RsaPssSaltTooLong(usize),

    // ECC errors
    #[error("ecc: point at infinity")]
    EccPointAtInfinity,
    #[error("ecc: point not on curve")]
    EccPointNotOnCurve,
    #[error("ecc: invalid private key")]
    EccInvalidPrivateKey,
    #[error("ecc: invalid public key")]
    EccInvalidPublicKey,
    #[error("ecdsa: verification failed")]
    EcdsaVerifyFail,

    // Symmetric cipher errors
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid iv length")]
    InvalidIvLength,
    #[error("aead: tag verification failed")]
    AeadTagVerifyFail,

    // Randomness
    #[error("random source failure")]
    RandFail,

    // Encoding/Decoding errors
    #[error("decode: asn1 buffer failed")]
    DecodeAsn1Fail,
    #[error("decode: unknown oid")]
    DecodeUnknownOid,
    #[error("decode: base64 failed")]
    DecodeBase64Fail,
    #[error("decode: pem delimiters unbalanced")]
    DecodePemFail,
}

/// PKI certificate and key errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkiError {
    /// Structural certificate failure; the code identifies the parse site.
    #[error("invalid certificate (code {code}): {reason}")]
    InvalidCert { code: i32, reason: &'static str },
    #[error("invalid private key: {0}")]
    InvalidKey(&'static str),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("signature verification failed")]
    BadSignature,
    #[error("asn1 parse error: {0}")]
    Asn1Error(String),
    #[error("crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Why a peer certificate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertFailure {
    /// The certificate could not be parsed or its signature did not verify.
    Invalid,
    /// The certificate was not issued to the requested host.
    Host,
    /// No trusted CA anchors the chain.
    NoTrust,
    /// The peer did not provide a certificate.
    Missing,
    /// The certificate is outside its validity window.
    BadDate,
    /// The CA fetch request failed.
    Request,
}

/// TLS protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// A protocol violation; `alert` is the description code to send.
    #[error("protocol violation (alert {alert}): {reason}")]
    Protocol { alert: u8, reason: String },
    #[error("alert received: {0}")]
    AlertReceived(String),
    #[error("record layer error: {0}")]
    RecordError(String),
    #[error("peer version below configured minimum")]
    VersionTooLow,
    #[error("peer version above configured maximum")]
    VersionTooHigh,
    #[error("no shared cipher suite")]
    NoSharedCipherSuite,
    #[error("no shared elliptic curve")]
    NoSharedCurve,
    #[error("certificate rejected ({cause:?}): subject \"{subject}\" issuer \"{issuer}\"")]
    CertRejected {
        cause: CertFailure,
        subject: String,
        issuer: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    CryptoError(#[from] CryptoError),
    #[error("pki error: {0}")]
    PkiError(#[from] PkiError),
}
