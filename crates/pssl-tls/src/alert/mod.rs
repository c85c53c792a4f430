//! TLS alert protocol.

use crate::ProtocolVersion;
use pssl_types::{CertFailure, CryptoError, TlsError};

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AlertLevel::Warning),
            2 => Ok(AlertLevel::Fatal),
            _ => Err(v),
        }
    }
}

macro_rules! descriptions {
    ($( $name:ident = $code:literal, $text:literal; )+) => {
        /// Alert description codes (RFC 5246 §7.2, RFC 8446 §6).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum AlertDescription {
            $( $name = $code, )+
        }

        impl AlertDescription {
            pub fn from_u8(v: u8) -> Result<Self, u8> {
                match v {
                    $( $code => Ok(AlertDescription::$name), )+
                    _ => Err(v),
                }
            }

            /// RFC name of the alert.
            pub const fn name(self) -> &'static str {
                match self {
                    $( AlertDescription::$name => $text, )+
                }
            }
        }
    };
}

descriptions! {
    CloseNotify = 0, "close_notify";
    UnexpectedMessage = 10, "unexpected_message";
    BadRecordMac = 20, "bad_record_mac";
    RecordOverflow = 22, "record_overflow";
    HandshakeFailure = 40, "handshake_failure";
    BadCertificate = 42, "bad_certificate";
    UnsupportedCertificate = 43, "unsupported_certificate";
    CertificateRevoked = 44, "certificate_revoked";
    CertificateExpired = 45, "certificate_expired";
    CertificateUnknown = 46, "certificate_unknown";
    IllegalParameter = 47, "illegal_parameter";
    UnknownCa = 48, "unknown_ca";
    AccessDenied = 49, "access_denied";
    DecodeError = 50, "decode_error";
    DecryptError = 51, "decrypt_error";
    ProtocolVersion = 70, "protocol_version";
    InsufficientSecurity = 71, "insufficient_security";
    InternalError = 80, "internal_error";
    InappropriateFallback = 86, "inappropriate_fallback";
    UserCanceled = 90, "user_canceled";
    NoRenegotiation = 100, "no_renegotiation";
    MissingExtension = 109, "missing_extension";
    UnsupportedExtension = 110, "unsupported_extension";
    UnrecognizedName = 112, "unrecognized_name";
    CertificateRequired = 116, "certificate_required";
    NoApplicationProtocol = 120, "no_application_protocol";
}

/// A TLS alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub const fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub const fn warning(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Warning,
            description,
        }
    }

    pub fn encode(self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }

    /// Decode a two-byte alert body. Unknown description codes decode as
    /// `UnexpectedMessage`; an invalid level is a decode error.
    pub fn decode(body: &[u8]) -> Result<Self, TlsError> {
        let [level, desc] = body else {
            return Err(protocol(AlertDescription::DecodeError, "alert length"));
        };
        let level = AlertLevel::from_u8(*level)
            .map_err(|_| protocol(AlertDescription::DecodeError, "alert level"))?;
        let description = AlertDescription::from_u8(*desc).unwrap_or(AlertDescription::UnexpectedMessage);
        Ok(Self { level, description })
    }
}

/// A protocol violation that sends `alert` to the peer.
pub fn protocol(alert: AlertDescription, reason: impl Into<String>) -> TlsError {
    TlsError::Protocol {
        alert: alert as u8,
        reason: reason.into(),
    }
}

/// The alert to send for a certificate failure.
pub fn cert_failure_alert(cause: CertFailure, version: Option<ProtocolVersion>) -> AlertDescription {
    match cause {
        CertFailure::Invalid => AlertDescription::BadCertificate,
        CertFailure::NoTrust | CertFailure::Request => AlertDescription::UnknownCa,
        CertFailure::BadDate => AlertDescription::CertificateExpired,
        CertFailure::Host => AlertDescription::CertificateUnknown,
        CertFailure::Missing if version == Some(ProtocolVersion::Tls13) => {
            AlertDescription::CertificateRequired
        }
        CertFailure::Missing => AlertDescription::HandshakeFailure,
    }
}

/// The alert to send for a local failure, or `None` when the peer should
/// not be told (transport errors, closed connections, received alerts).
pub fn alert_for(err: &TlsError, version: Option<ProtocolVersion>) -> Option<AlertDescription> {
    let desc = match err {
        TlsError::Protocol { alert, .. } => {
            AlertDescription::from_u8(*alert).unwrap_or(AlertDescription::InternalError)
        }
        TlsError::VersionTooLow | TlsError::VersionTooHigh => AlertDescription::ProtocolVersion,
        TlsError::NoSharedCipherSuite | TlsError::NoSharedCurve => AlertDescription::HandshakeFailure,
        TlsError::CertRejected { cause, .. } => cert_failure_alert(*cause, version),
        TlsError::PkiError(_) => AlertDescription::BadCertificate,
        TlsError::RecordError(_) => AlertDescription::DecodeError,
        TlsError::CryptoError(CryptoError::RsaVerifyFail | CryptoError::EcdsaVerifyFail) => {
            AlertDescription::DecryptError
        }
        TlsError::CryptoError(CryptoError::AeadTagVerifyFail) => AlertDescription::BadRecordMac,
        TlsError::CryptoError(_) | TlsError::Config(_) | TlsError::InvalidState(_) => {
            AlertDescription::InternalError
        }
        TlsError::AlertReceived(_) | TlsError::ConnectionClosed | TlsError::IoError(_) => {
            return None
        }
    };
    Some(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_round_trip_and_names() {
        for code in 0..=255u8 {
            if let Ok(d) = AlertDescription::from_u8(code) {
                assert_eq!(d as u8, code);
            }
        }
        assert_eq!(AlertDescription::BadRecordMac.name(), "bad_record_mac");
        assert_eq!(AlertDescription::from_u8(21), Err(21));
    }

    #[test]
    fn test_decode_alert_body() {
        let alert = Alert::decode(&[2, 10]).unwrap();
        assert_eq!(alert, Alert::fatal(AlertDescription::UnexpectedMessage));
        assert_eq!(Alert::warning(AlertDescription::CloseNotify).encode(), [1, 0]);
        assert!(Alert::decode(&[2]).is_err());
        assert!(Alert::decode(&[3, 0]).is_err());
    }

    #[test]
    fn test_certificate_failure_mapping() {
        let rejected = |cause| TlsError::CertRejected {
            cause,
            subject: String::new(),
            issuer: String::new(),
        };
        let v12 = Some(ProtocolVersion::Tls12);
        let v13 = Some(ProtocolVersion::Tls13);
        assert_eq!(alert_for(&rejected(CertFailure::Invalid), v12), Some(AlertDescription::BadCertificate));
        assert_eq!(alert_for(&rejected(CertFailure::NoTrust), v12), Some(AlertDescription::UnknownCa));
        assert_eq!(alert_for(&rejected(CertFailure::BadDate), v12), Some(AlertDescription::CertificateExpired));
        assert_eq!(alert_for(&rejected(CertFailure::Host), v12), Some(AlertDescription::CertificateUnknown));
        assert_eq!(alert_for(&rejected(CertFailure::Missing), v12), Some(AlertDescription::HandshakeFailure));
        assert_eq!(alert_for(&rejected(CertFailure::Missing), v13), Some(AlertDescription::CertificateRequired));
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(alert_for(&TlsError::VersionTooLow, None), Some(AlertDescription::ProtocolVersion));
        assert_eq!(alert_for(&TlsError::NoSharedCurve, None), Some(AlertDescription::HandshakeFailure));
        assert_eq!(
            alert_for(&TlsError::CryptoError(CryptoError::RsaVerifyFail), None),
            Some(AlertDescription::DecryptError)
        );
        assert_eq!(alert_for(&TlsError::ConnectionClosed, None), None);
        assert_eq!(
            alert_for(&protocol(AlertDescription::UnexpectedMessage, "x"), None),
            Some(AlertDescription::UnexpectedMessage)
        );
    }
}
