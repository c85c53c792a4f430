//! Client handshake: hello construction, the TLS 1.3 and TLS 1.0-1.2
//! flows, session-id and ticket resumption.

use super::codec::{
    decode_encrypted_extensions, decode_finished, encode_client_key_exchange, wrap, CertificateMsg,
    CertificateRequest, CertificateVerify, ClientHello, HandshakeMessage, NewSessionTicket, ServerHello,
    ServerKeyExchange, DOWNGRADE_TLS11, DOWNGRADE_TLS12,
};
use super::extensions::{self as ext, Extension, ExtensionType, PskIdentity};
use super::ops::{AsyncOp, OpOutput};
use super::transitions::{self, At};
use super::{
    check_verify_data, is_cbc, legacy_cipher, legacy_transcript_hash, parse_chain, signing, tls13_cipher,
    AppSecrets, HandshakeType, Handshaker, Io, Negotiated, Next, Settings,
};
use crate::alert::{protocol, Alert, AlertDescription};
use crate::config::SslConfig;
use crate::crypt::key_schedule::{compute_binder, finished_verify_data, ticket_psk, KeySchedule};
use crate::crypt::key_schedule12::{key_block, master_secret, verify_data, KeyBlock, VERIFY_DATA_LEN};
use crate::crypt::transcript::Transcript;
use crate::store::{ChainCheck, HistoryKey, SessionPayload};
use crate::suite::{CipherSuite, KeyExchange, NamedCurve, SignatureScheme};
use crate::{ProtocolVersion, Role};
use log::debug;
use pssl_crypto::ecdh::EcdhKeyPair;
use pssl_crypto::rand::{fill_random, random_array};
use pssl_pki::{PrivateKey, PublicKey};
use pssl_types::{CertFailure, TlsError};
use zeroize::Zeroizing;

/// Longest ticket lifetime honoured (RFC 8446 §4.6.1).
const MAX_TICKET_LIFETIME: u32 = 7 * 24 * 3600;

/// The next message expected from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    ServerHello,
    EncryptedExtensions,
    /// TLS 1.3 after EncryptedExtensions: CertificateRequest or Certificate.
    CertificateOrRequest,
    Certificate,
    CertificateVerify,
    Finished,
    ServerCertificate,
    /// TLS 1.0-1.2 after Certificate: ServerKeyExchange, CertificateRequest
    /// or ServerHelloDone.
    ServerKeyExchange,
    HelloDone,
    ChangeCipherSpec,
    ServerFinished,
    Complete,
}

/// What the result of the operation in flight feeds.
enum Pending {
    HelloShare,
    HandshakeAgree,
    PeerChain,
    ServerSignature,
    ClientShare,
    LegacyAgree { public: Vec<u8> },
    RsaPremaster(Zeroizing<Vec<u8>>),
    ClientSignature,
}

pub struct ClientHandshake {
    state: State,
    last: At,
    pending: Option<Pending>,
    transcript: Transcript,
    random: [u8; 32],
    server_random: [u8; 32],
    hello_version: u16,
    session_id: Vec<u8>,
    offered_suites: Vec<u16>,
    offered_schemes: Vec<SignatureScheme>,
    share: Option<EcdhKeyPair>,
    cookie: Option<Vec<u8>>,
    retry_suite: Option<&'static CipherSuite>,
    cached: Option<SessionPayload>,
    psk: Option<(Zeroizing<Vec<u8>>, &'static CipherSuite)>,
    negotiated: Negotiated,
    peer_key: Option<PublicKey>,
    server_share: Option<(&'static NamedCurve, Vec<u8>)>,
    cert_request: Option<CertificateRequest>,
    /// We answer the CertificateRequest with a certificate and a signature.
    client_signs: bool,
    signing_scheme: Option<SignatureScheme>,
    master: Zeroizing<Vec<u8>>,
    key_block: Option<KeyBlock>,
    schedule: Option<KeySchedule>,
    client_hs: Zeroizing<Vec<u8>>,
    server_hs: Zeroizing<Vec<u8>>,
    app: Option<AppSecrets>,
    resumption_master: Zeroizing<Vec<u8>>,
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

fn history_key(settings: &Settings) -> Option<HistoryKey> {
    settings.host.as_ref().map(|host| HistoryKey::Peer {
        host: host.clone(),
        port: settings.port,
    })
}

/// Our key and signature scheme for answering a CertificateRequest, if we
/// hold a certificate the server can accept.
fn client_auth<'c>(
    config: &'c SslConfig,
    peer_schemes: &[SignatureScheme],
    version: ProtocolVersion,
) -> Option<(&'c PrivateKey, Option<SignatureScheme>)> {
    let key = config.private_key.as_ref()?;
    if config.cert_chain.is_empty() {
        return None;
    }
    signing::select_scheme(key, peer_schemes, version).ok().map(|s| (key, s))
}

fn own_chain(config: &SslConfig) -> Vec<Vec<u8>> {
    config.cert_chain.iter().map(|c| c.raw.clone()).collect()
}

impl ClientHandshake {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            last: At::Start,
            pending: None,
            transcript: Transcript::new(),
            random: [0; 32],
            server_random: [0; 32],
            hello_version: 0,
            session_id: Vec::new(),
            offered_suites: Vec::new(),
            offered_schemes: Vec::new(),
            share: None,
            cookie: None,
            retry_suite: None,
            cached: None,
            psk: None,
            negotiated: Negotiated::default(),
            peer_key: None,
            server_share: None,
            cert_request: None,
            client_signs: false,
            signing_scheme: None,
            master: Zeroizing::new(Vec::new()),
            key_block: None,
            schedule: None,
            client_hs: Zeroizing::new(Vec::new()),
            server_hs: Zeroizing::new(Vec::new()),
            app: None,
            resumption_master: Zeroizing::new(Vec::new()),
        }
    }

    fn suite(&self) -> Result<&'static CipherSuite, TlsError> {
        self.negotiated.suite.ok_or(TlsError::InvalidState("no cipher suite negotiated"))
    }

    fn version(&self) -> Result<ProtocolVersion, TlsError> {
        self.negotiated.version.ok_or(TlsError::InvalidState("no version negotiated"))
    }

    fn send_hello(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let s = io.settings;
        self.offered_suites = CipherSuite::enabled(s.ciphers, s.min_version, s.max_version)
            .map(|c| c.id)
            .collect();
        if self.offered_suites.is_empty() {
            return Err(TlsError::NoSharedCipherSuite);
        }
        self.offered_schemes = SignatureScheme::PREFERENCE.to_vec();
        self.hello_version = s.max_version.min(ProtocolVersion::Tls12).wire();

        if self.retry_suite.is_none() {
            if let Some(SessionPayload::Classic {
                session_id,
                suite,
                version,
                ..
            }) = &self.cached
            {
                if self.offered_suites.contains(suite) && *version >= s.min_version && *version <= s.max_version {
                    self.session_id = session_id.clone();
                }
            }
        }

        let groups: Vec<u16> = NamedCurve::enabled(s.curves).map(|c| c.id).collect();
        let mut extensions: Vec<Extension> = Vec::new();
        if let Some(host) = &s.host {
            if host.parse::<std::net::IpAddr>().is_err() {
                extensions.push(ext::server_name(host));
            }
        }
        extensions.push(ext::supported_groups(&groups));
        extensions.push(ext::ec_point_formats());
        if s.max_version >= ProtocolVersion::Tls12 {
            extensions.push(ext::signature_algorithms(&self.offered_schemes));
        }
        if !s.alpn.is_empty() {
            extensions.push(ext::alpn(&s.alpn));
        }
        extensions.push(ext::renegotiation_info());
        if s.max_version == ProtocolVersion::Tls13 {
            let share = self.share.as_ref().ok_or(TlsError::InvalidState("key share missing"))?;
            let group = NamedCurve::by_curve(share.curve_id()).ok_or(TlsError::InvalidState("unknown share curve"))?;
            extensions.push(ext::supported_versions_client(s.min_version, s.max_version));
            extensions.push(ext::key_share_client(&[(group.id, share.public_key().to_vec())]));
            if let Some(cookie) = &self.cookie {
                extensions.push(ext::cookie(cookie));
            }
            extensions.push(ext::psk_key_exchange_modes());
        }

        let mut hello = ClientHello {
            legacy_version: self.hello_version,
            random: self.random,
            session_id: self.session_id.clone(),
            cipher_suites: self.offered_suites.clone(),
            compression: vec![0],
            extensions,
        };
        self.psk = None;
        if s.max_version == ProtocolVersion::Tls13 {
            self.offer_ticket(&mut hello, io)?;
        }
        let msg = hello.encode();
        io.send(&mut self.transcript, &msg)?;
        debug!(
            "ClientHello: {} suites, session id {} bytes, psk {}",
            self.offered_suites.len(),
            self.session_id.len(),
            self.psk.is_some()
        );
        self.state = State::ServerHello;
        Ok(())
    }

    /// Append a `pre_shared_key` offer for a cached ticket, with its binder.
    fn offer_ticket(&mut self, hello: &mut ClientHello, io: &Io<'_>) -> Result<(), TlsError> {
        let Some(SessionPayload::Ticket {
            ticket,
            psk,
            suite,
            age_add,
            received_ms,
        }) = &self.cached
        else {
            return Ok(());
        };
        let Some(psk_suite) = CipherSuite::by_id(*suite).filter(|c| self.offered_suites.contains(&c.id)) else {
            return Ok(());
        };
        if self.retry_suite.is_some_and(|r| r.hash != psk_suite.hash) {
            return Ok(());
        }
        let age = io.context.now_ms().saturating_sub(*received_ms) as u32;
        let identity = PskIdentity {
            identity: ticket.clone(),
            obfuscated_age: age.wrapping_add(*age_add),
        };
        let binder_len = psk_suite.hash.output_len();
        hello
            .extensions
            .push(ext::pre_shared_key_client(&[identity.clone()], &[vec![0; binder_len]]));
        let encoded = hello.encode();
        let truncated = &encoded[..encoded.len() - ext::binders_len(&[binder_len])];
        let binder = compute_binder(
            psk_suite.hash,
            psk,
            &self.transcript.hash_with(psk_suite.hash, truncated),
        )?;
        hello.extensions.pop();
        hello.extensions.push(ext::pre_shared_key_client(&[identity], &[binder]));
        self.psk = Some((psk.clone(), psk_suite));
        Ok(())
    }

    fn check_alpn(&mut self, extensions: &[Extension], settings: &Settings) -> Result<(), TlsError> {
        let Some(data) = ext::find(extensions, ExtensionType::ALPN) else {
            return Ok(());
        };
        let mut protocols = ext::parse_alpn(data)?;
        match protocols.pop() {
            Some(p) if protocols.is_empty() && settings.alpn.contains(&p) => {
                debug!("ALPN: server selected {p}");
                self.negotiated.alpn = Some(p);
                Ok(())
            }
            _ => Err(protocol(AlertDescription::IllegalParameter, "ALPN protocol not offered")),
        }
    }

    fn on_server_hello(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let sh = ServerHello::decode(msg.body())?;
        let s = io.settings;
        let version = match ext::find(&sh.extensions, ExtensionType::SUPPORTED_VERSIONS) {
            Some(_) if s.max_version < ProtocolVersion::Tls13 => {
                return Err(protocol(
                    AlertDescription::UnsupportedExtension,
                    "supported_versions in a legacy ServerHello",
                ))
            }
            Some(data) => match ProtocolVersion::from_wire(ext::parse_u16(data, "supported_versions")?) {
                Some(ProtocolVersion::Tls13) => ProtocolVersion::Tls13,
                _ => {
                    return Err(protocol(
                        AlertDescription::IllegalParameter,
                        "supported_versions must select TLS 1.3",
                    ))
                }
            },
            None => match ProtocolVersion::from_wire(sh.legacy_version) {
                Some(v) if v <= ProtocolVersion::Tls12 => v,
                _ if sh.legacy_version < ProtocolVersion::Tls10.wire() => return Err(TlsError::VersionTooLow),
                _ => return Err(protocol(AlertDescription::IllegalParameter, "server version")),
            },
        };
        if version < s.min_version {
            return Err(TlsError::VersionTooLow);
        }
        if version > s.max_version {
            return Err(TlsError::VersionTooHigh);
        }
        let tail = &sh.random[24..];
        let downgraded = (version < ProtocolVersion::Tls13
            && s.max_version == ProtocolVersion::Tls13
            && (tail == DOWNGRADE_TLS12 || tail == DOWNGRADE_TLS11))
            || (version < ProtocolVersion::Tls12 && s.max_version >= ProtocolVersion::Tls12 && tail == DOWNGRADE_TLS11);
        if downgraded {
            return Err(protocol(AlertDescription::IllegalParameter, "downgrade sentinel in ServerHello"));
        }
        let suite = CipherSuite::by_id(sh.cipher_suite)
            .filter(|c| self.offered_suites.contains(&c.id) && c.usable_at(version))
            .ok_or_else(|| protocol(AlertDescription::IllegalParameter, "cipher suite not offered"))?;

        if sh.is_retry_request() {
            return self.on_retry_request(sh, version, suite, msg, io);
        }
        if self.retry_suite.is_some_and(|r| r.id != suite.id) {
            return Err(protocol(
                AlertDescription::IllegalParameter,
                "cipher suite changed after HelloRetryRequest",
            ));
        }
        self.negotiated.version = Some(version);
        self.negotiated.suite = Some(suite);
        self.server_random = sh.random;
        io.record.set_version(version);
        debug!("ServerHello: {} {}", version.name(), suite.name);

        if version == ProtocolVersion::Tls13 {
            self.on_server_hello13(sh, suite, msg)
        } else {
            self.on_server_hello12(sh, version, suite, msg, io)
        }
    }

    fn on_retry_request(
        &mut self,
        sh: ServerHello,
        version: ProtocolVersion,
        suite: &'static CipherSuite,
        msg: &HandshakeMessage,
        io: &mut Io<'_>,
    ) -> Result<Next, TlsError> {
        if self.retry_suite.is_some() {
            return Err(protocol(AlertDescription::UnexpectedMessage, "second HelloRetryRequest"));
        }
        if version != ProtocolVersion::Tls13 || sh.session_id != self.session_id {
            return Err(protocol(AlertDescription::IllegalParameter, "malformed HelloRetryRequest"));
        }
        let group = ext::find(&sh.extensions, ExtensionType::KEY_SHARE)
            .map(|d| ext::parse_u16(d, "key_share"))
            .transpose()?;
        let cookie = ext::find(&sh.extensions, ExtensionType::COOKIE)
            .map(ext::parse_cookie)
            .transpose()?;
        if group.is_none() && cookie.is_none() {
            return Err(protocol(
                AlertDescription::IllegalParameter,
                "HelloRetryRequest would not change the ClientHello",
            ));
        }
        let current = self.share.as_ref().map(|k| k.curve_id());
        debug!("HelloRetryRequest: group {group:?}, cookie {}", cookie.is_some());
        self.transcript.restart_with_message_hash(suite.hash);
        self.transcript.update(&msg.raw);
        self.retry_suite = Some(suite);
        self.negotiated.version = Some(ProtocolVersion::Tls13);
        self.cookie = cookie;
        match group {
            Some(id) => {
                let curve = NamedCurve::by_id(id)
                    .filter(|c| c.mask() & io.settings.curves != 0 && Some(c.curve) != current)
                    .ok_or_else(|| protocol(AlertDescription::IllegalParameter, "HelloRetryRequest group"))?;
                self.share = None;
                self.pending = Some(Pending::HelloShare);
                Ok(Next::Run(AsyncOp::Keygen(EcdhKeyPair::begin_generate(curve.curve)?)))
            }
            None => {
                self.send_hello(io)?;
                Ok(Next::Continue)
            }
        }
    }

    fn on_server_hello13(
        &mut self,
        sh: ServerHello,
        suite: &'static CipherSuite,
        msg: &HandshakeMessage,
    ) -> Result<Next, TlsError> {
        if sh.session_id != self.session_id {
            return Err(protocol(AlertDescription::IllegalParameter, "session id not echoed"));
        }
        let data = ext::find(&sh.extensions, ExtensionType::KEY_SHARE)
            .ok_or_else(|| protocol(AlertDescription::MissingExtension, "ServerHello without key_share"))?;
        let (group, public) = ext::parse_key_share_server(data)?;
        let share = self.share.take().ok_or(TlsError::InvalidState("key share missing"))?;
        let curve = NamedCurve::by_curve(share.curve_id())
            .filter(|c| c.id == group)
            .ok_or_else(|| protocol(AlertDescription::IllegalParameter, "key_share group not offered"))?;
        self.negotiated.curve = Some(curve);
        match ext::find(&sh.extensions, ExtensionType::PRE_SHARED_KEY) {
            Some(data) => {
                let index = ext::parse_u16(data, "pre_shared_key")?;
                match &self.psk {
                    Some((_, psk_suite)) if index == 0 && psk_suite.hash == suite.hash => {
                        self.negotiated.resumed = true;
                    }
                    _ => return Err(protocol(AlertDescription::IllegalParameter, "pre_shared_key not offered")),
                }
            }
            None => self.psk = None,
        }
        self.transcript.update(&msg.raw);
        self.state = State::EncryptedExtensions;
        self.pending = Some(Pending::HandshakeAgree);
        let op = share
            .begin_agree(&public)
            .map_err(|_| protocol(AlertDescription::IllegalParameter, "server key share"))?;
        Ok(Next::Run(AsyncOp::Agree(op)))
    }

    fn install_handshake_keys(&mut self, shared: &[u8], io: &mut Io<'_>) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let mut schedule = KeySchedule::new(suite.hash);
        schedule.derive_early_secret(self.psk.as_ref().map(|(p, _)| p.as_slice()))?;
        schedule.derive_handshake_secret(shared)?;
        let (client, server) = schedule.handshake_traffic_secrets(&self.transcript.hash(suite.hash))?;
        io.record.set_read_cipher(tls13_cipher(suite, &server)?);
        io.record
            .set_write_cipher(tls13_cipher(suite, &client)?, ProtocolVersion::Tls13, false);
        self.client_hs = client;
        self.server_hs = server;
        self.schedule = Some(schedule);
        Ok(())
    }

    fn on_encrypted_extensions(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let extensions = decode_encrypted_extensions(msg.body())?;
        self.check_alpn(&extensions, io.settings)?;
        self.transcript.update(&msg.raw);
        self.state = if self.negotiated.resumed {
            State::Finished
        } else {
            State::CertificateOrRequest
        };
        Ok(Next::Continue)
    }

    fn on_certificate_request(&mut self, msg: &HandshakeMessage) -> Result<Next, TlsError> {
        let version = self.version()?;
        let request = CertificateRequest::decode(msg.body(), version)?;
        if !request.context.is_empty() {
            return Err(protocol(AlertDescription::IllegalParameter, "CertificateRequest context"));
        }
        self.transcript.update(&msg.raw);
        self.cert_request = Some(request);
        self.state = if version == ProtocolVersion::Tls13 {
            State::Certificate
        } else {
            State::HelloDone
        };
        Ok(Next::Continue)
    }

    fn on_certificate(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let tls13 = version == ProtocolVersion::Tls13;
        let cert = CertificateMsg::decode(msg.body(), tls13)?;
        if tls13 && !cert.context.is_empty() {
            return Err(protocol(AlertDescription::IllegalParameter, "Certificate context"));
        }
        let chain = parse_chain(&cert.chain)?;
        let leaf_key = chain
            .first()
            .map(|c| c.public_key.clone())
            .ok_or(TlsError::CertRejected {
                cause: CertFailure::Missing,
                subject: String::new(),
                issuer: String::new(),
            })?;
        if suite.kx.cert_key().is_some_and(|alg| alg != leaf_key.alg()) {
            return Err(protocol(
                AlertDescription::UnsupportedCertificate,
                "certificate key does not fit the cipher suite",
            ));
        }
        debug!("server certificate: {} ({} in chain)", chain[0].subject, chain.len());
        self.peer_key = Some(leaf_key);
        self.negotiated.peer_chain = chain.clone();
        self.transcript.update(&msg.raw);
        self.state = if tls13 {
            State::CertificateVerify
        } else {
            State::ServerKeyExchange
        };
        if !io.config.verify_peer {
            return Ok(Next::Continue);
        }
        self.pending = Some(Pending::PeerChain);
        let check = ChainCheck::new(
            io.context.clone(),
            chain,
            io.settings.host.clone(),
            io.settings.port,
            io.config.ca_fetcher.clone(),
        );
        Ok(Next::Run(AsyncOp::Chain(Box::new(check))))
    }

    fn on_certificate_verify(&mut self, msg: &HandshakeMessage) -> Result<Next, TlsError> {
        let suite = self.suite()?;
        let cv = CertificateVerify::decode(msg.body(), true)?;
        let key = self.peer_key.as_ref().ok_or(TlsError::InvalidState("no server key"))?;
        let scheme = cv.scheme.ok_or(TlsError::InvalidState("CertificateVerify without scheme"))?;
        signing::check_peer_scheme(scheme, key, &self.offered_schemes, ProtocolVersion::Tls13)?;
        let content = signing::tls13_signed_content(&self.transcript.hash(suite.hash), true);
        let op = signing::begin_verify_content(key, Some(scheme), &content, &cv.signature)?;
        self.transcript.update(&msg.raw);
        self.negotiated.scheme = Some(scheme);
        self.state = State::Finished;
        self.pending = Some(Pending::ServerSignature);
        Ok(Next::Run(AsyncOp::Verify(op)))
    }

    fn on_finished13(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let suite = self.suite()?;
        let received = decode_finished(msg.body(), suite.hash.output_len())?;
        let expected = finished_verify_data(suite.hash, &self.server_hs, &self.transcript.hash(suite.hash))?;
        check_verify_data(&expected, received, "server Finished")?;
        self.transcript.update(&msg.raw);
        let schedule = self.schedule.as_mut().ok_or(TlsError::InvalidState("no key schedule"))?;
        schedule.derive_master_secret()?;
        let (client, server) = schedule.application_traffic_secrets(&self.transcript.hash(suite.hash))?;
        let app = AppSecrets::new(suite, client, server);
        app.install_read(io.record)?;
        self.app = Some(app);

        if let Some(request) = self.cert_request.take() {
            let config = io.config;
            let auth = client_auth(config, &request.schemes, ProtocolVersion::Tls13);
            let chain = if auth.is_some() { own_chain(config) } else { Vec::new() };
            let cert = CertificateMsg {
                context: request.context,
                chain,
            };
            io.send(&mut self.transcript, &cert.encode(true))?;
            if let Some((key, scheme)) = auth {
                let content = signing::tls13_signed_content(&self.transcript.hash(suite.hash), false);
                let op = signing::begin_sign_content(key, scheme, &content)?;
                self.signing_scheme = scheme;
                self.pending = Some(Pending::ClientSignature);
                return Ok(Next::Run(AsyncOp::Sign(op)));
            }
        }
        self.finish13(io)?;
        Ok(Next::Continue)
    }

    fn finish13(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let verify = finished_verify_data(suite.hash, &self.client_hs, &self.transcript.hash(suite.hash))?;
        io.send(&mut self.transcript, &wrap(HandshakeType::Finished, &verify))?;
        let app = self.app.as_ref().ok_or(TlsError::InvalidState("no traffic secrets"))?;
        app.install_write(io.record)?;
        let schedule = self.schedule.as_ref().ok_or(TlsError::InvalidState("no key schedule"))?;
        self.resumption_master = schedule.resumption_master_secret(&self.transcript.hash(suite.hash))?;
        self.complete(io)
    }

    fn on_ticket(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let ticket = NewSessionTicket::decode(msg.body())?;
        let suite = self.suite()?;
        if ticket.lifetime == 0 || !io.settings.resumption {
            return Ok(Next::Continue);
        }
        let Some(key) = history_key(io.settings) else {
            return Ok(Next::Continue);
        };
        let psk = ticket_psk(suite.hash, &self.resumption_master, &ticket.nonce)?;
        let payload = SessionPayload::Ticket {
            ticket: ticket.ticket,
            psk,
            suite: suite.id,
            age_add: ticket.age_add,
            received_ms: io.context.now_ms(),
        };
        io.context
            .store_session(key, payload, u64::from(ticket.lifetime.min(MAX_TICKET_LIFETIME)));
        Ok(Next::Continue)
    }

    fn on_server_hello12(
        &mut self,
        sh: ServerHello,
        version: ProtocolVersion,
        suite: &'static CipherSuite,
        msg: &HandshakeMessage,
        io: &mut Io<'_>,
    ) -> Result<Next, TlsError> {
        if let Some(data) = ext::find(&sh.extensions, ExtensionType::RENEGOTIATION_INFO) {
            ext::parse_renegotiation_info(data)?;
        }
        self.check_alpn(&sh.extensions, io.settings)?;
        self.share = None;
        self.transcript.update(&msg.raw);
        let resumed = match &self.cached {
            Some(SessionPayload::Classic {
                session_id,
                master_secret,
                suite: cached_suite,
                version: cached_version,
            }) if !sh.session_id.is_empty() && *session_id == sh.session_id => {
                if *cached_suite != suite.id || *cached_version != version {
                    return Err(protocol(
                        AlertDescription::IllegalParameter,
                        "resumed session with different parameters",
                    ));
                }
                Some(master_secret.clone())
            }
            _ => None,
        };
        self.session_id = sh.session_id;
        match resumed {
            Some(master) => {
                debug!("resuming session by id");
                self.key_block = Some(key_block(version, suite, &master, &self.random, &self.server_random)?);
                self.master = master;
                self.negotiated.resumed = true;
                self.state = State::ChangeCipherSpec;
            }
            None => self.state = State::ServerCertificate,
        }
        Ok(Next::Continue)
    }

    fn on_server_key_exchange(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        if !suite.kx.is_ecdhe() {
            return Err(protocol(
                AlertDescription::UnexpectedMessage,
                "ServerKeyExchange with RSA key exchange",
            ));
        }
        let ske = ServerKeyExchange::decode(msg.body(), version >= ProtocolVersion::Tls12)?;
        let curve = NamedCurve::by_id(ske.curve)
            .filter(|c| c.mask() & io.settings.curves != 0)
            .ok_or_else(|| protocol(AlertDescription::IllegalParameter, "curve not offered"))?;
        let key = self.peer_key.as_ref().ok_or(TlsError::InvalidState("no server key"))?;
        if let Some(scheme) = ske.scheme {
            signing::check_peer_scheme(scheme, key, &self.offered_schemes, version)?;
        }
        let params = ServerKeyExchange::params(ske.curve, &ske.public);
        let content = signing::ske_signed_content(&self.random, &self.server_random, &params);
        let op = signing::begin_verify_content(key, ske.scheme, &content, &ske.signature)?;
        self.transcript.update(&msg.raw);
        self.negotiated.curve = Some(curve);
        self.negotiated.scheme = ske.scheme;
        self.server_share = Some((curve, ske.public));
        self.state = State::HelloDone;
        self.pending = Some(Pending::ServerSignature);
        Ok(Next::Run(AsyncOp::Verify(op)))
    }

    fn on_server_hello_done(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        if !msg.body().is_empty() {
            return Err(protocol(AlertDescription::DecodeError, "malformed ServerHelloDone"));
        }
        if suite.kx.is_ecdhe() && self.server_share.is_none() {
            return Err(protocol(
                AlertDescription::UnexpectedMessage,
                "ServerHelloDone without ServerKeyExchange",
            ));
        }
        self.transcript.update(&msg.raw);

        if let Some(request) = &self.cert_request {
            let config = io.config;
            let auth = client_auth(config, &request.schemes, version);
            let chain = if auth.is_some() { own_chain(config) } else { Vec::new() };
            let cert = CertificateMsg {
                context: Vec::new(),
                chain,
            };
            io.send(&mut self.transcript, &cert.encode(false))?;
            self.client_signs = auth.is_some();
            self.signing_scheme = auth.and_then(|(_, scheme)| scheme);
        }

        match suite.kx {
            KeyExchange::Rsa => {
                let mut premaster = Zeroizing::new(vec![0u8; 48]);
                premaster[..2].copy_from_slice(&self.hello_version.to_be_bytes());
                fill_random(&mut premaster[2..])?;
                let key = self
                    .peer_key
                    .as_ref()
                    .ok_or(TlsError::InvalidState("no server key"))?
                    .rsa_key()?;
                let op = key.begin_encrypt(&premaster)?;
                self.pending = Some(Pending::RsaPremaster(premaster));
                Ok(Next::Run(AsyncOp::Rsa(op)))
            }
            _ => {
                let (curve, _) = self
                    .server_share
                    .as_ref()
                    .ok_or(TlsError::InvalidState("no server share"))?;
                self.pending = Some(Pending::ClientShare);
                Ok(Next::Run(AsyncOp::Keygen(EcdhKeyPair::begin_generate(curve.curve)?)))
            }
        }
    }

    /// Derive the master secret, then sign for client authentication or
    /// go straight to Finished.
    fn after_key_exchange(&mut self, premaster: &[u8], io: &mut Io<'_>) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        self.master = master_secret(version, suite, premaster, &self.random, &self.server_random)?;
        self.key_block = Some(key_block(version, suite, &self.master, &self.random, &self.server_random)?);
        if self.client_signs {
            let key = io
                .config
                .private_key
                .as_ref()
                .ok_or(TlsError::InvalidState("no private key"))?;
            let alg = signing::algorithm_for(self.signing_scheme, key.alg());
            let op = signing::begin_sign_digest(key, self.signing_scheme, &self.transcript.hash(alg.hash))?;
            self.pending = Some(Pending::ClientSignature);
            return Ok(Next::Run(AsyncOp::Sign(op)));
        }
        self.send_finished12(io)?;
        Ok(Next::Continue)
    }

    fn send_finished12(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let keys = self.key_block.as_ref().ok_or(TlsError::InvalidState("no key block"))?;
        io.send_ccs()?;
        io.record
            .set_write_cipher(legacy_cipher(version, suite, keys, true)?, version, is_cbc(suite));
        let hash = legacy_transcript_hash(version, suite, &self.transcript);
        let verify = verify_data(version, suite, &self.master, true, &hash)?;
        io.send(&mut self.transcript, &wrap(HandshakeType::Finished, &verify))?;
        if self.negotiated.resumed {
            self.complete(io)
        } else {
            self.state = State::ChangeCipherSpec;
            Ok(())
        }
    }

    fn on_server_finished(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let received = decode_finished(msg.body(), VERIFY_DATA_LEN)?;
        let hash = legacy_transcript_hash(version, suite, &self.transcript);
        let expected = verify_data(version, suite, &self.master, false, &hash)?;
        check_verify_data(&expected, received, "server Finished")?;
        self.transcript.update(&msg.raw);
        if self.negotiated.resumed {
            self.send_finished12(io)?;
        } else {
            self.complete(io)?;
        }
        Ok(Next::Continue)
    }

    fn complete(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        self.state = State::Complete;
        let fresh_session = version < ProtocolVersion::Tls13 && !self.negotiated.resumed && !self.session_id.is_empty();
        if fresh_session && io.settings.resumption {
            if let Some(key) = history_key(io.settings) {
                io.context.store_classic(
                    key,
                    SessionPayload::Classic {
                        session_id: self.session_id.clone(),
                        master_secret: self.master.clone(),
                        suite: suite.id,
                        version,
                    },
                );
            }
        }
        Ok(())
    }
}

impl Handshaker for ClientHandshake {
    fn start(&mut self, io: &mut Io<'_>) -> Result<Next, TlsError> {
        self.random = random_array::<32>()?;
        if io.settings.resumption {
            if let Some(key) = history_key(io.settings) {
                self.cached = io.context.lookup_session(&key);
            }
        }
        if io.settings.max_version == ProtocolVersion::Tls13 {
            let curve = NamedCurve::enabled(io.settings.curves)
                .next()
                .ok_or(TlsError::NoSharedCurve)?;
            self.pending = Some(Pending::HelloShare);
            return Ok(Next::Run(AsyncOp::Keygen(EcdhKeyPair::begin_generate(curve.curve)?)));
        }
        self.send_hello(io)?;
        Ok(Next::Continue)
    }

    fn on_message(&mut self, msg: HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        use HandshakeType as T;
        let tls13 = self.negotiated.version == Some(ProtocolVersion::Tls13);
        if msg.typ == T::HelloRequest && !tls13 {
            if self.state == State::Complete {
                io.send_alert(Alert::warning(AlertDescription::NoRenegotiation))?;
            }
            return Ok(Next::Continue);
        }
        transitions::check(Role::Client, tls13, self.last, msg.typ)?;
        self.last = At::After(msg.typ);
        match (self.state, msg.typ) {
            (State::ServerHello, T::ServerHello) => self.on_server_hello(&msg, io),
            (State::EncryptedExtensions, T::EncryptedExtensions) => self.on_encrypted_extensions(&msg, io),
            (State::CertificateOrRequest, T::CertificateRequest) => self.on_certificate_request(&msg),
            (State::CertificateOrRequest | State::Certificate, T::Certificate) => self.on_certificate(&msg, io),
            (State::CertificateVerify, T::CertificateVerify) => self.on_certificate_verify(&msg),
            (State::Finished, T::Finished) => self.on_finished13(&msg, io),
            (State::Complete, T::NewSessionTicket) if tls13 => self.on_ticket(&msg, io),
            (State::Complete, T::KeyUpdate) if tls13 => {
                let app = self.app.as_mut().ok_or(TlsError::InvalidState("no traffic secrets"))?;
                app.on_key_update(&msg, io)?;
                Ok(Next::Continue)
            }
            (State::ServerCertificate, T::Certificate) => self.on_certificate(&msg, io),
            (State::ServerKeyExchange, T::ServerKeyExchange) => self.on_server_key_exchange(&msg, io),
            (State::ServerKeyExchange | State::HelloDone, T::CertificateRequest) => self.on_certificate_request(&msg),
            (State::ServerKeyExchange | State::HelloDone, T::ServerHelloDone) => self.on_server_hello_done(&msg, io),
            (State::ServerFinished, T::Finished) => self.on_server_finished(&msg, io),
            (state, typ) => Err(protocol(
                AlertDescription::UnexpectedMessage,
                format!("{typ:?} while waiting in {state:?}"),
            )),
        }
    }

    fn on_op(&mut self, output: OpOutput, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let pending = self
            .pending
            .take()
            .ok_or(TlsError::InvalidState("no operation pending"))?;
        match (pending, output) {
            (Pending::HelloShare, OpOutput::KeyPair(pair)) => {
                self.share = Some(pair);
                self.send_hello(io)?;
                Ok(Next::Continue)
            }
            (Pending::HandshakeAgree, OpOutput::Shared(secret)) => {
                self.install_handshake_keys(&secret, io)?;
                Ok(Next::Continue)
            }
            (Pending::PeerChain, OpOutput::ChainValid) | (Pending::ServerSignature, OpOutput::Verified) => {
                Ok(Next::Continue)
            }
            (Pending::ClientShare, OpOutput::KeyPair(pair)) => {
                let (_, public) = self
                    .server_share
                    .as_ref()
                    .ok_or(TlsError::InvalidState("no server share"))?;
                let op = pair
                    .begin_agree(public)
                    .map_err(|_| protocol(AlertDescription::IllegalParameter, "server key share"))?;
                self.pending = Some(Pending::LegacyAgree {
                    public: pair.public_key().to_vec(),
                });
                Ok(Next::Run(AsyncOp::Agree(op)))
            }
            (Pending::LegacyAgree { public }, OpOutput::Shared(secret)) => {
                let kx = self.suite()?.kx;
                io.send(&mut self.transcript, &encode_client_key_exchange(kx, &public))?;
                self.after_key_exchange(&secret, io)
            }
            (Pending::RsaPremaster(premaster), OpOutput::Rsa(encrypted)) => {
                io.send(
                    &mut self.transcript,
                    &encode_client_key_exchange(KeyExchange::Rsa, &encrypted),
                )?;
                self.after_key_exchange(&premaster, io)
            }
            (Pending::ClientSignature, OpOutput::Signature(signature)) => {
                let cv = CertificateVerify {
                    scheme: self.signing_scheme,
                    signature,
                };
                io.send(&mut self.transcript, &cv.encode())?;
                if self.negotiated.version == Some(ProtocolVersion::Tls13) {
                    self.finish13(io)?;
                } else {
                    self.send_finished12(io)?;
                }
                Ok(Next::Continue)
            }
            _ => Err(TlsError::InvalidState("operation result does not match its request")),
        }
    }

    fn on_ccs(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        if self.state != State::ChangeCipherSpec {
            return Err(protocol(AlertDescription::UnexpectedMessage, "unexpected change_cipher_spec"));
        }
        let version = self.version()?;
        let suite = self.suite()?;
        let keys = self.key_block.as_ref().ok_or(TlsError::InvalidState("no key block"))?;
        io.record.set_read_cipher(legacy_cipher(version, suite, keys, false)?);
        self.state = State::ServerFinished;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    fn key_update(&mut self, request_peer: bool, io: &mut Io<'_>) -> Result<(), TlsError> {
        if self.state != State::Complete {
            return Err(TlsError::InvalidState("key update before the handshake completed"));
        }
        self.app
            .as_mut()
            .ok_or(TlsError::InvalidState("key update needs TLS 1.3"))?
            .update_write(request_peer, io)
    }
}
