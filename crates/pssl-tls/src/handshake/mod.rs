//! Handshake protocol: message codecs, ordering tables and the client and
//! server state machines.

pub mod client;
pub mod codec;
pub mod extensions;
pub mod ops;
pub mod server;
pub mod signing;
pub mod transitions;

use std::sync::Arc;

use crate::alert::Alert;
use crate::config::{ClientCertPolicy, SslConfig};
use crate::context::SslContext;
use crate::crypt::key_schedule::{next_traffic_secret, traffic_keys};
use crate::crypt::key_schedule12::KeyBlock;
use crate::crypt::transcript::Transcript;
use crate::record::protection::RecordCipher;
use crate::record::{ContentType, RecordLayer};
use crate::suite::{BulkCipher, CipherSuite, NamedCurve, SignatureScheme};
use crate::ProtocolVersion;
use codec::{decode_key_update, encode_key_update, HandshakeMessage};
use log::debug;
use ops::{AsyncOp, OpOutput};
use pssl_pki::Certificate;
use pssl_types::{HashAlgId, TlsError};
use zeroize::Zeroizing;

/// Negotiation knobs of one connection, seeded from its [`SslConfig`] and
/// adjusted by controls before the handshake starts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub min_version: ProtocolVersion,
    pub max_version: ProtocolVersion,
    pub ciphers: u32,
    pub curves: u32,
    pub alpn: Vec<String>,
    pub client_cert: ClientCertPolicy,
    pub resumption: bool,
    pub host: Option<String>,
    pub port: u16,
}

impl Settings {
    pub fn from_config(config: &SslConfig) -> Self {
        Self {
            min_version: config.min_version,
            max_version: config.max_version,
            ciphers: config.ciphers,
            curves: config.curves,
            alpn: config.alpn.clone(),
            client_cert: config.client_cert,
            resumption: config.session_resumption,
            host: config.server_name.clone(),
            port: config.server_port,
        }
    }
}

/// What the handshake agreed on.
#[derive(Debug, Clone, Default)]
pub struct Negotiated {
    pub version: Option<ProtocolVersion>,
    pub suite: Option<&'static CipherSuite>,
    pub curve: Option<&'static NamedCurve>,
    /// Scheme of the server's handshake signature.
    pub scheme: Option<SignatureScheme>,
    pub alpn: Option<String>,
    pub resumed: bool,
    /// Certificates the peer presented, leaf first.
    pub peer_chain: Vec<Certificate>,
    /// SNI host name received by a server.
    pub server_name: Option<String>,
}

/// Everything a handshake step may touch outside its own state.
pub(crate) struct Io<'a> {
    pub settings: &'a Settings,
    pub config: &'a SslConfig,
    pub context: &'a Arc<SslContext>,
    pub record: &'a mut RecordLayer,
    pub outbound: &'a mut Vec<u8>,
}

impl Io<'_> {
    /// Send a handshake message and add it to the transcript.
    pub fn send(&mut self, transcript: &mut Transcript, msg: &[u8]) -> Result<(), TlsError> {
        transcript.update(msg);
        self.send_unrecorded(msg)
    }

    /// Send a post-handshake message, which is not part of the transcript.
    pub fn send_unrecorded(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        let record = self.record.seal(ContentType::Handshake, msg)?;
        self.outbound.extend_from_slice(&record);
        Ok(())
    }

    pub fn send_ccs(&mut self) -> Result<(), TlsError> {
        let record = self.record.seal(ContentType::ChangeCipherSpec, &[1])?;
        self.outbound.extend_from_slice(&record);
        Ok(())
    }

    pub fn send_alert(&mut self, alert: Alert) -> Result<(), TlsError> {
        debug!("sending {:?} alert {}", alert.level, alert.description.name());
        let record = self.record.seal(ContentType::Alert, &alert.encode())?;
        self.outbound.extend_from_slice(&record);
        Ok(())
    }
}

/// What the connection should do after a handshake step.
pub(crate) enum Next {
    Continue,
    /// Poll this operation on the following ticks and hand back its output.
    Run(AsyncOp),
}

/// One side of the handshake, fed messages and async-op results by the
/// connection's update loop.
pub(crate) trait Handshaker: Send {
    /// Send the opening flight, if this side has one.
    fn start(&mut self, io: &mut Io<'_>) -> Result<Next, TlsError>;
    fn on_message(&mut self, msg: HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError>;
    fn on_op(&mut self, output: OpOutput, io: &mut Io<'_>) -> Result<Next, TlsError>;
    /// A TLS 1.0-1.2 change_cipher_spec arrived.
    fn on_ccs(&mut self, io: &mut Io<'_>) -> Result<(), TlsError>;
    fn is_complete(&self) -> bool;
    fn negotiated(&self) -> &Negotiated;
    /// Rotate our TLS 1.3 sending keys, optionally asking the peer to do
    /// the same.
    fn key_update(&mut self, request_peer: bool, io: &mut Io<'_>) -> Result<(), TlsError>;
    /// Drop whatever resumption state this handshake issued or used.
    fn forget_session(&self, _context: &SslContext) {}
}

pub(crate) fn is_cbc(suite: &CipherSuite) -> bool {
    matches!(suite.bulk, BulkCipher::AesCbc { .. })
}

/// Hash of the running transcript for a TLS 1.0-1.2 Finished.
pub(crate) fn legacy_transcript_hash(
    version: ProtocolVersion,
    suite: &CipherSuite,
    transcript: &Transcript,
) -> Vec<u8> {
    if version >= ProtocolVersion::Tls12 {
        transcript.hash(suite.hash)
    } else {
        transcript.hash(HashAlgId::Md5Sha1)
    }
}

/// Record protection for one direction of a TLS 1.0-1.2 connection.
pub(crate) fn legacy_cipher(
    version: ProtocolVersion,
    suite: &CipherSuite,
    keys: &KeyBlock,
    client_direction: bool,
) -> Result<RecordCipher, TlsError> {
    if client_direction {
        RecordCipher::new(version, suite, &keys.client_key, &keys.client_mac, &keys.client_iv)
    } else {
        RecordCipher::new(version, suite, &keys.server_key, &keys.server_mac, &keys.server_iv)
    }
}

/// Record protection keyed from a TLS 1.3 traffic secret.
pub(crate) fn tls13_cipher(suite: &CipherSuite, secret: &[u8]) -> Result<RecordCipher, TlsError> {
    let keys = traffic_keys(suite.hash, secret, suite.key_len())?;
    RecordCipher::new(ProtocolVersion::Tls13, suite, &keys.key, &[], &keys.iv)
}

/// TLS 1.3 application traffic secrets, rotated by KeyUpdate.
pub(crate) struct AppSecrets {
    suite: &'static CipherSuite,
    ours: Zeroizing<Vec<u8>>,
    theirs: Zeroizing<Vec<u8>>,
}

impl AppSecrets {
    pub fn new(suite: &'static CipherSuite, ours: Zeroizing<Vec<u8>>, theirs: Zeroizing<Vec<u8>>) -> Self {
        Self { suite, ours, theirs }
    }

    pub fn install_write(&self, record: &mut RecordLayer) -> Result<(), TlsError> {
        record.set_write_cipher(tls13_cipher(self.suite, &self.ours)?, ProtocolVersion::Tls13, false);
        Ok(())
    }

    pub fn install_read(&self, record: &mut RecordLayer) -> Result<(), TlsError> {
        record.set_read_cipher(tls13_cipher(self.suite, &self.theirs)?);
        Ok(())
    }

    /// Send a KeyUpdate under the current keys, then switch to the next
    /// generation.
    pub fn update_write(&mut self, request_peer: bool, io: &mut Io<'_>) -> Result<(), TlsError> {
        io.send_unrecorded(&encode_key_update(request_peer))?;
        self.ours = next_traffic_secret(self.suite.hash, &self.ours)?;
        self.install_write(io.record)
    }

    /// Handle a KeyUpdate from the peer.
    pub fn on_key_update(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<(), TlsError> {
        let requested = decode_key_update(msg.body())?;
        self.theirs = next_traffic_secret(self.suite.hash, &self.theirs)?;
        self.install_read(io.record)?;
        debug!("peer rotated its traffic keys");
        if requested {
            self.update_write(false, io)?;
        }
        Ok(())
    }
}

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EncryptedExtensions = 8,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
    KeyUpdate = 24,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use HandshakeType::*;
        Some(match v {
            0 => HelloRequest,
            1 => ClientHello,
            2 => ServerHello,
            4 => NewSessionTicket,
            8 => EncryptedExtensions,
            11 => Certificate,
            12 => ServerKeyExchange,
            13 => CertificateRequest,
            14 => ServerHelloDone,
            15 => CertificateVerify,
            16 => ClientKeyExchange,
            20 => Finished,
            24 => KeyUpdate,
            _ => return None,
        })
    }
}

/// Parse a received certificate list. A malformed entry is a
/// `bad_certificate`.
pub(crate) fn parse_chain(chain: &[Vec<u8>]) -> Result<Vec<Certificate>, TlsError> {
    chain
        .iter()
        .map(|der| Certificate::from_der(der).map_err(TlsError::from))
        .collect()
}

/// Compare Finished or binder values in constant time.
pub(crate) fn check_verify_data(expected: &[u8], received: &[u8], what: &str) -> Result<(), TlsError> {
    use subtle::ConstantTimeEq;
    if expected.len() != received.len() || !bool::from(expected.ct_eq(received)) {
        return Err(crate::alert::protocol(
            crate::alert::AlertDescription::DecryptError,
            format!("{what} mismatch"),
        ));
    }
    Ok(())
}
