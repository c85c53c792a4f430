//! Connection configuration with builder pattern.

use std::fmt;
use std::sync::Arc;

use crate::store::CaFetcher;
use crate::suite::{CipherSuite, ALL_CIPHERS, ALL_CURVES};
use crate::ProtocolVersion;
use pssl_pki::{Certificate, PrivateKey};
use pssl_types::TlsError;

/// Whether a server asks for, and insists on, a client certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientCertPolicy {
    #[default]
    None,
    Optional,
    Required,
}

/// Settings shared by the connections created from it.
#[derive(Clone)]
pub struct SslConfig {
    pub min_version: ProtocolVersion,
    pub max_version: ProtocolVersion,
    /// Enabled cipher suites as a bitmask over the suite table.
    pub ciphers: u32,
    /// Enabled curves as a bitmask over the curve table.
    pub curves: u32,
    /// ALPN protocols in preference order.
    pub alpn: Vec<String>,
    pub client_cert: ClientCertPolicy,
    pub session_resumption: bool,
    /// Name sent in SNI and checked against the server certificate.
    pub server_name: Option<String>,
    /// Port half of the session history key.
    pub server_port: u16,
    /// Our certificate chain, leaf first.
    pub cert_chain: Vec<Certificate>,
    pub private_key: Option<PrivateKey>,
    pub ca_fetcher: Option<Arc<dyn CaFetcher>>,
    /// Record trace verbosity, 0-3.
    pub verbosity: u8,
    /// Validate the peer chain. Clients without it accept any server.
    pub verify_peer: bool,
}

impl fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslConfig")
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("ciphers", &format_args!("{:#x}", self.ciphers))
            .field("curves", &format_args!("{:#x}", self.curves))
            .field("alpn", &self.alpn)
            .field("client_cert", &self.client_cert)
            .field("server_name", &self.server_name)
            .field("cert_chain", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

impl SslConfig {
    pub fn builder() -> SslConfigBuilder {
        SslConfigBuilder::default()
    }
}

/// Builder for [`SslConfig`]. Certificates and keys are parsed in
/// [`SslConfigBuilder::build`].
pub struct SslConfigBuilder {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    ciphers: u32,
    curves: u32,
    alpn: Vec<String>,
    client_cert: ClientCertPolicy,
    session_resumption: bool,
    server_name: Option<String>,
    server_port: u16,
    cert_chain: Vec<u8>,
    private_key: Option<Vec<u8>>,
    ca_fetcher: Option<Arc<dyn CaFetcher>>,
    verbosity: u8,
    verify_peer: bool,
    unknown_suites: Vec<u16>,
}

impl Default for SslConfigBuilder {
    fn default() -> Self {
        Self {
            min_version: ProtocolVersion::Tls12,
            max_version: ProtocolVersion::Tls13,
            ciphers: ALL_CIPHERS,
            curves: ALL_CURVES,
            alpn: Vec::new(),
            client_cert: ClientCertPolicy::None,
            session_resumption: true,
            server_name: None,
            server_port: 443,
            cert_chain: Vec::new(),
            private_key: None,
            ca_fetcher: None,
            verbosity: 0,
            verify_peer: true,
            unknown_suites: Vec::new(),
        }
    }
}

impl fmt::Debug for SslConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslConfigBuilder")
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .finish_non_exhaustive()
    }
}

impl SslConfigBuilder {
    pub fn min_version(mut self, version: ProtocolVersion) -> Self {
        self.min_version = version;
        self
    }

    pub fn max_version(mut self, version: ProtocolVersion) -> Self {
        self.max_version = version;
        self
    }

    /// Enable exactly the suites in `mask` (bit n = table entry n).
    pub fn cipher_mask(mut self, mask: u32) -> Self {
        self.ciphers = mask;
        self
    }

    /// Enable exactly the listed suites by IANA id.
    pub fn cipher_suites(mut self, ids: &[u16]) -> Self {
        self.ciphers = 0;
        for id in ids {
            match CipherSuite::by_id(*id) {
                Some(s) => self.ciphers |= s.mask(),
                None => self.unknown_suites.push(*id),
            }
        }
        self
    }

    pub fn curve_mask(mut self, mask: u32) -> Self {
        self.curves = mask;
        self
    }

    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn client_cert(mut self, policy: ClientCertPolicy) -> Self {
        self.client_cert = policy;
        self
    }

    pub fn session_resumption(mut self, enabled: bool) -> Self {
        self.session_resumption = enabled;
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    pub fn server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Our certificate chain as PEM (leaf first) or a single DER blob.
    pub fn certificate_chain(mut self, pem_or_der: &[u8]) -> Self {
        self.cert_chain = pem_or_der.to_vec();
        self
    }

    /// Our private key as PEM, base64 or DER (PKCS#1, PKCS#8 or SEC1).
    pub fn private_key(mut self, pem_or_der: &[u8]) -> Self {
        self.private_key = Some(pem_or_der.to_vec());
        self
    }

    pub fn ca_fetcher(mut self, fetcher: Arc<dyn CaFetcher>) -> Self {
        self.ca_fetcher = Some(fetcher);
        self
    }

    pub fn verbosity(mut self, level: u8) -> Self {
        self.verbosity = level.min(3);
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Parse the certificate material and check the settings fit together.
    pub fn build(self) -> Result<SslConfig, TlsError> {
        if let Some(id) = self.unknown_suites.first() {
            return Err(TlsError::Config(format!("unknown cipher suite {id:#06x}")));
        }
        if self.min_version > self.max_version {
            return Err(TlsError::Config("min_version above max_version".into()));
        }
        if CipherSuite::enabled(self.ciphers, self.min_version, self.max_version).next().is_none() {
            return Err(TlsError::Config("no cipher suite usable in the version range".into()));
        }
        if self.curves & ALL_CURVES == 0 {
            return Err(TlsError::Config("no curve enabled".into()));
        }
        let cert_chain = if self.cert_chain.is_empty() {
            Vec::new()
        } else {
            Certificate::parse_all(&self.cert_chain)?
        };
        let private_key = self
            .private_key
            .as_deref()
            .map(PrivateKey::from_pem_or_der)
            .transpose()?;
        match (cert_chain.first(), &private_key) {
            (Some(leaf), Some(key)) if leaf.public_key != key.public_key() => {
                return Err(TlsError::Config("private key does not match certificate".into()));
            }
            (Some(_), None) => return Err(TlsError::Config("certificate without private key".into())),
            (None, Some(_)) => return Err(TlsError::Config("private key without certificate".into())),
            _ => {}
        }
        if self.alpn.iter().any(|p| p.is_empty() || p.len() > 255) {
            return Err(TlsError::Config("ALPN protocol names must be 1-255 bytes".into()));
        }
        Ok(SslConfig {
            min_version: self.min_version,
            max_version: self.max_version,
            ciphers: self.ciphers & ALL_CIPHERS,
            curves: self.curves & ALL_CURVES,
            alpn: self.alpn,
            client_cert: self.client_cert,
            session_resumption: self.session_resumption,
            server_name: self.server_name,
            server_port: self.server_port,
            cert_chain,
            private_key,
            ca_fetcher: self.ca_fetcher,
            verbosity: self.verbosity,
            verify_peer: self.verify_peer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_CERT: &str = include_str!("../../tests/data/rsa_server.pem");
    const RSA_KEY: &str = include_str!("../../tests/data/rsa_server.key");
    const EC_KEY: &str = include_str!("../../tests/data/ec_server.key");

    #[test]
    fn test_config_builder_defaults() {
        let config = SslConfig::builder().build().unwrap();
        assert_eq!(config.min_version, ProtocolVersion::Tls12);
        assert_eq!(config.max_version, ProtocolVersion::Tls13);
        assert_eq!(config.ciphers, ALL_CIPHERS);
        assert!(config.verify_peer);
        assert!(config.session_resumption);
        assert_eq!(config.client_cert, ClientCertPolicy::None);
        assert!(config.cert_chain.is_empty());
    }

    #[test]
    fn test_config_with_certificate_and_key() {
        let config = SslConfig::builder()
            .certificate_chain(RSA_CERT.as_bytes())
            .private_key(RSA_KEY.as_bytes())
            .build()
            .unwrap();
        assert_eq!(config.cert_chain.len(), 1);
        assert!(config.private_key.is_some());

        let mismatched = SslConfig::builder()
            .certificate_chain(RSA_CERT.as_bytes())
            .private_key(EC_KEY.as_bytes())
            .build();
        assert!(matches!(mismatched, Err(TlsError::Config(_))));
        let keyless = SslConfig::builder().certificate_chain(RSA_CERT.as_bytes()).build();
        assert!(keyless.is_err());
    }

    #[test]
    fn test_cipher_selection_is_validated() {
        let config = SslConfig::builder()
            .cipher_suites(&[0x003C])
            .max_version(ProtocolVersion::Tls12)
            .build()
            .unwrap();
        assert_eq!(config.ciphers, 1 << 6);
        assert!(SslConfig::builder().cipher_suites(&[0x1234]).build().is_err());
        // Only TLS 1.3 suites, but TLS 1.3 disabled.
        let none = SslConfig::builder()
            .cipher_suites(&[0x1301])
            .max_version(ProtocolVersion::Tls12)
            .build();
        assert!(none.is_err());
        let inverted = SslConfig::builder()
            .min_version(ProtocolVersion::Tls13)
            .max_version(ProtocolVersion::Tls12)
            .build();
        assert!(inverted.is_err());
    }

    #[test]
    fn test_alpn_and_verbosity_bounds() {
        let config = SslConfig::builder().alpn(&["h2", "http/1.1"]).verbosity(9).build().unwrap();
        assert_eq!(config.alpn, vec!["h2".to_string(), "http/1.1".to_string()]);
        assert_eq!(config.verbosity, 3);
        assert!(SslConfig::builder().alpn(&[""]).build().is_err());
    }
}
