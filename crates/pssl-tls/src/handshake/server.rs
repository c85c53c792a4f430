//! Server handshake: version and suite selection, HelloRetryRequest, the
//! TLS 1.3 and TLS 1.0-1.2 flows, tickets and session-id resumption.

use super::codec::{
    decode_client_key_exchange, decode_finished, encode_encrypted_extensions, wrap, CertificateMsg,
    CertificateRequest, CertificateVerify, ClientHello, HandshakeMessage, NewSessionTicket, ServerHello,
    ServerKeyExchange, DOWNGRADE_TLS11, DOWNGRADE_TLS12, HRR_RANDOM,
};
use super::extensions::{self as ext, Extension, ExtensionType, PskIdentity, PSK_DHE_KE};
use super::ops::{AsyncOp, OpOutput};
use super::transitions::{self, At};
use super::{
    check_verify_data, is_cbc, legacy_cipher, legacy_transcript_hash, parse_chain, signing, tls13_cipher,
    AppSecrets, HandshakeType, Handshaker, Io, Negotiated, Next,
};
use crate::alert::{protocol, Alert, AlertDescription};
use crate::config::{ClientCertPolicy, SslConfig};
use crate::context::SslContext;
use crate::crypt::key_schedule::{compute_binder, finished_verify_data, ticket_psk, KeySchedule};
use crate::crypt::key_schedule12::{key_block, master_secret, verify_data, KeyBlock, MASTER_SECRET_LEN, VERIFY_DATA_LEN};
use crate::crypt::transcript::Transcript;
use crate::store::{ChainCheck, HistoryKey, SessionPayload, TICKET_LIFETIME_SECS};
use crate::suite::{CipherSuite, KeyExchange, NamedCurve, SignatureScheme};
use crate::{ProtocolVersion, Role};
use log::debug;
use pssl_crypto::aead::{AeadAlg, AeadCipher, AEAD_NONCE_LEN};
use pssl_crypto::ecdh::EcdhKeyPair;
use pssl_crypto::rand::{fill_random, random_array, random_vec};
use pssl_crypto::rsa::pkcs1::rsaes_pkcs1_check;
use pssl_pki::{PrivateKey, PublicKey};
use pssl_types::{CertFailure, TlsError};
use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

/// The next message expected from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ClientHello,
    Certificate13,
    CertificateVerify13,
    Finished13,
    Certificate12,
    ClientKeyExchange,
    CertificateVerify12,
    ChangeCipherSpec,
    Finished12,
    Complete,
}

enum Pending {
    HelloShare,
    HandshakeAgree { public: Vec<u8> },
    ServerSignature { scheme: Option<SignatureScheme> },
    SkeShare,
    SkeSignature { scheme: Option<SignatureScheme> },
    PeerChain,
    ClientSignature,
    RsaDecrypt { fallback: Zeroizing<Vec<u8>> },
    LegacyAgree,
}

/// Decrypted contents of a session ticket.
#[derive(Debug)]
struct TicketContents {
    suite: u16,
    created: i64,
    lifetime: u32,
    psk: Zeroizing<Vec<u8>>,
}

/// Seal a ticket: `nonce || AES-256-GCM(suite, created, lifetime, age_add, psk)`.
fn seal_ticket(
    key: &[u8; 32],
    suite: u16,
    created: i64,
    lifetime: u32,
    age_add: u32,
    psk: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let mut plain = Zeroizing::new(Vec::with_capacity(18 + psk.len()));
    plain.extend_from_slice(&suite.to_be_bytes());
    plain.extend_from_slice(&created.to_be_bytes());
    plain.extend_from_slice(&lifetime.to_be_bytes());
    plain.extend_from_slice(&age_add.to_be_bytes());
    plain.extend_from_slice(psk);
    let nonce = random_array::<AEAD_NONCE_LEN>()?;
    let sealed = AeadCipher::new(AeadAlg::Aes256Gcm, key)?.seal(&nonce, &[], &plain)?;
    let mut ticket = nonce.to_vec();
    ticket.extend_from_slice(&sealed);
    Ok(ticket)
}

/// Open a ticket we issued. Anything that fails to decrypt is not ours.
fn open_ticket(key: &[u8; 32], ticket: &[u8]) -> Option<TicketContents> {
    if ticket.len() < AEAD_NONCE_LEN {
        return None;
    }
    let (nonce, sealed) = ticket.split_at(AEAD_NONCE_LEN);
    let plain = Zeroizing::new(AeadCipher::new(AeadAlg::Aes256Gcm, key).ok()?.open(nonce, &[], sealed).ok()?);
    if plain.len() < 18 {
        return None;
    }
    Some(TicketContents {
        suite: u16::from_be_bytes([plain[0], plain[1]]),
        created: i64::from_be_bytes(plain[2..10].try_into().ok()?),
        lifetime: u32::from_be_bytes(plain[10..14].try_into().ok()?),
        psk: Zeroizing::new(plain[18..].to_vec()),
    })
}

fn own_chain(config: &SslConfig) -> Vec<Vec<u8>> {
    config.cert_chain.iter().map(|c| c.raw.clone()).collect()
}

fn server_key(config: &SslConfig) -> Result<&PrivateKey, TlsError> {
    match (&config.private_key, config.cert_chain.is_empty()) {
        (Some(key), false) => Ok(key),
        _ => Err(TlsError::Config("a server needs a certificate and private key".into())),
    }
}

/// Versions a ClientHello offers, from `supported_versions` or else from
/// its legacy version field.
fn offered_versions(hello: &ClientHello) -> Result<Vec<ProtocolVersion>, TlsError> {
    match ext::find(&hello.extensions, ExtensionType::SUPPORTED_VERSIONS) {
        Some(data) => Ok(ext::parse_supported_versions_client(data)?
            .into_iter()
            .filter_map(ProtocolVersion::from_wire)
            .collect()),
        None => Ok([ProtocolVersion::Tls10, ProtocolVersion::Tls11, ProtocolVersion::Tls12]
            .into_iter()
            .filter(|v| v.wire() <= hello.legacy_version)
            .collect()),
    }
}

/// What the ClientHello asked for, parsed once.
struct HelloOffer {
    groups: Option<Vec<u16>>,
    schemes: Vec<SignatureScheme>,
    alpn: Option<Vec<String>>,
}

pub struct ServerHandshake {
    state: State,
    last: At,
    pending: Option<Pending>,
    transcript: Transcript,
    random: [u8; 32],
    client_random: [u8; 32],
    client_version: u16,
    session_id: Vec<u8>,
    /// Tickets accepted or issued on this connection.
    tickets: Vec<Vec<u8>>,
    client_schemes: Vec<SignatureScheme>,
    peer_share: Vec<u8>,
    retry_suite: Option<&'static CipherSuite>,
    cookie: Option<Vec<u8>>,
    psk: Option<Zeroizing<Vec<u8>>>,
    share: Option<EcdhKeyPair>,
    requested_cert: bool,
    negotiated: Negotiated,
    peer_key: Option<PublicKey>,
    master: Zeroizing<Vec<u8>>,
    key_block: Option<KeyBlock>,
    schedule: Option<KeySchedule>,
    client_hs: Zeroizing<Vec<u8>>,
    server_hs: Zeroizing<Vec<u8>>,
    app: Option<AppSecrets>,
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHandshake {
    pub fn new() -> Self {
        Self {
            state: State::ClientHello,
            last: At::Start,
            pending: None,
            transcript: Transcript::new(),
            random: [0; 32],
            client_random: [0; 32],
            client_version: 0,
            session_id: Vec::new(),
            tickets: Vec::new(),
            client_schemes: Vec::new(),
            peer_share: Vec::new(),
            retry_suite: None,
            cookie: None,
            psk: None,
            share: None,
            requested_cert: false,
            negotiated: Negotiated::default(),
            peer_key: None,
            master: Zeroizing::new(Vec::new()),
            key_block: None,
            schedule: None,
            client_hs: Zeroizing::new(Vec::new()),
            server_hs: Zeroizing::new(Vec::new()),
            app: None,
        }
    }

    fn suite(&self) -> Result<&'static CipherSuite, TlsError> {
        self.negotiated.suite.ok_or(TlsError::InvalidState("no cipher suite negotiated"))
    }

    fn version(&self) -> Result<ProtocolVersion, TlsError> {
        self.negotiated.version.ok_or(TlsError::InvalidState("no version negotiated"))
    }

    fn on_client_hello(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let hello = ClientHello::decode(msg.body())?;
        let s = io.settings;

        let offered = offered_versions(&hello)?;
        let version = offered
            .iter()
            .copied()
            .filter(|v| *v >= s.min_version && *v <= s.max_version)
            .max()
            .ok_or(if offered.iter().all(|v| *v < s.min_version) {
                TlsError::VersionTooLow
            } else {
                TlsError::VersionTooHigh
            })?;
        if self.retry_suite.is_some() && version != ProtocolVersion::Tls13 {
            return Err(protocol(AlertDescription::IllegalParameter, "version changed after HelloRetryRequest"));
        }
        if !hello.compression.contains(&0) {
            return Err(protocol(AlertDescription::IllegalParameter, "null compression not offered"));
        }

        if let Some(data) = ext::find(&hello.extensions, ExtensionType::SERVER_NAME) {
            self.negotiated.server_name = ext::parse_server_name(data)?;
        }
        if let Some(data) = ext::find(&hello.extensions, ExtensionType::RENEGOTIATION_INFO) {
            ext::parse_renegotiation_info(data)?;
        }
        let offer = HelloOffer {
            groups: ext::find(&hello.extensions, ExtensionType::SUPPORTED_GROUPS)
                .map(|d| ext::parse_u16_list(d, "supported_groups"))
                .transpose()?,
            schemes: ext::find(&hello.extensions, ExtensionType::SIGNATURE_ALGORITHMS)
                .map(ext::parse_signature_algorithms)
                .transpose()?
                .unwrap_or_default(),
            alpn: ext::find(&hello.extensions, ExtensionType::ALPN)
                .map(ext::parse_alpn)
                .transpose()?,
        };
        if version == ProtocolVersion::Tls13 && offer.schemes.is_empty() {
            return Err(protocol(AlertDescription::MissingExtension, "signature_algorithms required"));
        }
        if let (Some(client), false) = (&offer.alpn, s.alpn.is_empty()) {
            let chosen = s
                .alpn
                .iter()
                .find(|p| client.contains(p))
                .ok_or_else(|| protocol(AlertDescription::NoApplicationProtocol, "no common ALPN protocol"))?;
            debug!("ALPN: selected {chosen}");
            self.negotiated.alpn = Some(chosen.clone());
        }

        if self.retry_suite.is_none() {
            self.random = random_array::<32>()?;
            let sentinel = match (s.max_version, version) {
                (ProtocolVersion::Tls13, ProtocolVersion::Tls12) => Some(DOWNGRADE_TLS12),
                (max, v) if max >= ProtocolVersion::Tls12 && v <= ProtocolVersion::Tls11 => Some(DOWNGRADE_TLS11),
                _ => None,
            };
            if let Some(sentinel) = sentinel {
                self.random[24..].copy_from_slice(&sentinel);
            }
        }
        self.client_random = hello.random;
        self.client_version = hello.legacy_version;
        self.client_schemes = offer.schemes.clone();
        self.negotiated.version = Some(version);
        io.record.set_version(version);

        if version == ProtocolVersion::Tls13 {
            self.on_client_hello13(hello, &offer, msg, io)
        } else {
            self.on_client_hello12(hello, version, &offer, msg, io)
        }
    }

    /// First suite in client order we can serve, and the curve it would use.
    fn select_suite(
        &self,
        hello: &ClientHello,
        version: ProtocolVersion,
        offer: &HelloOffer,
        io: &Io<'_>,
    ) -> Result<(&'static CipherSuite, Option<&'static NamedCurve>), TlsError> {
        let key = server_key(io.config)?;
        let curve = NamedCurve::enabled(io.settings.curves).find(|c| match &offer.groups {
            Some(groups) => groups.contains(&c.id),
            None => version < ProtocolVersion::Tls13,
        });
        let mut wanted_curve = false;
        let suite = hello
            .cipher_suites
            .iter()
            .filter_map(|id| CipherSuite::by_id(*id))
            .find(|c| {
                if c.mask() & io.settings.ciphers == 0 || !c.usable_at(version) {
                    return false;
                }
                if c.kx.cert_key().is_some_and(|alg| alg != key.alg()) {
                    return false;
                }
                if c.kx != KeyExchange::Rsa && curve.is_none() {
                    wanted_curve = true;
                    return false;
                }
                true
            });
        match suite {
            Some(suite) => Ok((suite, curve.filter(|_| suite.kx != KeyExchange::Rsa))),
            None if wanted_curve => Err(TlsError::NoSharedCurve),
            None => Err(TlsError::NoSharedCipherSuite),
        }
    }

    fn on_client_hello13(
        &mut self,
        hello: ClientHello,
        offer: &HelloOffer,
        msg: &HandshakeMessage,
        io: &mut Io<'_>,
    ) -> Result<Next, TlsError> {
        let (suite, curve) = self.select_suite(&hello, ProtocolVersion::Tls13, offer, io)?;
        let preferred = curve.ok_or(TlsError::NoSharedCurve)?;
        if self.retry_suite.is_some_and(|r| r.id != suite.id) {
            return Err(protocol(
                AlertDescription::IllegalParameter,
                "cipher suite changed after HelloRetryRequest",
            ));
        }
        let shares = ext::find(&hello.extensions, ExtensionType::KEY_SHARE)
            .map(ext::parse_key_share_client)
            .transpose()?
            .ok_or_else(|| protocol(AlertDescription::MissingExtension, "key_share required"))?;
        // A usable share the client already sent beats our own preference.
        // After a retry the group we asked for is the only option.
        let offered = offer.groups.as_deref().unwrap_or_default();
        let curve = match self.retry_suite {
            Some(_) => preferred,
            None => shares
                .iter()
                .find_map(|(group, _)| {
                    NamedCurve::enabled(io.settings.curves).find(|c| c.id == *group && offered.contains(group))
                })
                .unwrap_or(preferred),
        };
        self.negotiated.suite = Some(suite);
        self.negotiated.curve = Some(curve);
        self.session_id = hello.session_id.clone();

        let Some((_, public)) = shares.into_iter().find(|(group, _)| *group == curve.id) else {
            if self.retry_suite.is_some() {
                return Err(protocol(
                    AlertDescription::IllegalParameter,
                    "no key share for the requested group",
                ));
            }
            return self.send_retry(&hello, suite, curve, msg, io);
        };
        if self.retry_suite.is_some() {
            let cookie = ext::find(&hello.extensions, ExtensionType::COOKIE)
                .map(ext::parse_cookie)
                .transpose()?;
            if cookie != self.cookie {
                return Err(protocol(AlertDescription::IllegalParameter, "cookie mismatch"));
            }
        }
        self.peer_share = public;

        if let Some(data) = ext::find(&hello.extensions, ExtensionType::PRE_SHARED_KEY) {
            if hello.extensions.last().map(|e| e.typ) != Some(ExtensionType::PRE_SHARED_KEY) {
                return Err(protocol(AlertDescription::IllegalParameter, "pre_shared_key is not last"));
            }
            let modes = ext::find(&hello.extensions, ExtensionType::PSK_KEY_EXCHANGE_MODES)
                .map(ext::parse_psk_key_exchange_modes)
                .transpose()?
                .unwrap_or_default();
            if io.settings.resumption && modes.contains(&PSK_DHE_KE) {
                let (identities, binders) = ext::parse_pre_shared_key_client(data)?;
                self.accept_ticket(&identities, &binders, suite, msg, io)?;
            }
        }
        self.transcript.update(&msg.raw);
        debug!(
            "ClientHello: TLS1.3 {} {} psk {}",
            suite.name,
            curve.name,
            self.psk.is_some()
        );
        self.pending = Some(Pending::HelloShare);
        Ok(Next::Run(AsyncOp::Keygen(EcdhKeyPair::begin_generate(curve.curve)?)))
    }

    fn send_retry(
        &mut self,
        hello: &ClientHello,
        suite: &'static CipherSuite,
        curve: &'static NamedCurve,
        msg: &HandshakeMessage,
        io: &mut Io<'_>,
    ) -> Result<Next, TlsError> {
        debug!("no usable key share, asking for {}", curve.name);
        let cookie = random_vec(16)?;
        self.transcript.update(&msg.raw);
        self.transcript.restart_with_message_hash(suite.hash);
        let retry = ServerHello {
            legacy_version: ProtocolVersion::Tls12.wire(),
            random: HRR_RANDOM,
            session_id: hello.session_id.clone(),
            cipher_suite: suite.id,
            extensions: vec![
                ext::supported_versions_server(ProtocolVersion::Tls13),
                ext::key_share_retry(curve.id),
                ext::cookie(&cookie),
            ],
        };
        io.send(&mut self.transcript, &retry.encode())?;
        self.cookie = Some(cookie);
        self.retry_suite = Some(suite);
        Ok(Next::Continue)
    }

    /// Check the first offered identity against our ticket key and verify
    /// its binder. Unknown or expired tickets fall back to a full handshake.
    fn accept_ticket(
        &mut self,
        identities: &[PskIdentity],
        binders: &[Vec<u8>],
        suite: &'static CipherSuite,
        msg: &HandshakeMessage,
        io: &Io<'_>,
    ) -> Result<(), TlsError> {
        let (Some(identity), Some(binder)) = (identities.first(), binders.first()) else {
            return Ok(());
        };
        if io.context.is_revoked(&identity.identity) {
            debug!("ticket revoked");
            return Ok(());
        }
        let key = io.context.ticket_key()?;
        let Some(ticket) = open_ticket(&*key, &identity.identity) else {
            debug!("ticket not recognised");
            return Ok(());
        };
        let now = io.context.clock().wall_secs();
        if now >= ticket.created.saturating_add(i64::from(ticket.lifetime)) {
            debug!("ticket expired");
            return Ok(());
        }
        match CipherSuite::by_id(ticket.suite) {
            Some(c) if c.hash == suite.hash => {}
            _ => return Ok(()),
        }
        let lens: Vec<usize> = binders.iter().map(Vec::len).collect();
        let truncated = &msg.raw[..msg.raw.len().saturating_sub(ext::binders_len(&lens))];
        let expected = compute_binder(suite.hash, &ticket.psk, &self.transcript.hash_with(suite.hash, truncated))?;
        check_verify_data(&expected, binder, "PSK binder")?;
        self.psk = Some(ticket.psk);
        self.negotiated.resumed = true;
        self.tickets.push(identity.identity.clone());
        Ok(())
    }

    fn send_flight13(&mut self, public: &[u8], shared: &[u8], io: &mut Io<'_>) -> Result<Next, TlsError> {
        let suite = self.suite()?;
        let curve = self.negotiated.curve.ok_or(TlsError::InvalidState("no curve"))?;
        let mut extensions = vec![
            ext::supported_versions_server(ProtocolVersion::Tls13),
            ext::key_share_server(curve.id, public),
        ];
        if self.psk.is_some() {
            extensions.push(ext::pre_shared_key_server(0));
        }
        let hello = ServerHello {
            legacy_version: ProtocolVersion::Tls12.wire(),
            random: self.random,
            session_id: self.session_id.clone(),
            cipher_suite: suite.id,
            extensions,
        };
        io.send(&mut self.transcript, &hello.encode())?;

        let mut schedule = KeySchedule::new(suite.hash);
        schedule.derive_early_secret(self.psk.as_ref().map(|p| p.as_slice()))?;
        schedule.derive_handshake_secret(shared)?;
        let (client, server) = schedule.handshake_traffic_secrets(&self.transcript.hash(suite.hash))?;
        io.record
            .set_write_cipher(tls13_cipher(suite, &server)?, ProtocolVersion::Tls13, false);
        io.record.set_read_cipher(tls13_cipher(suite, &client)?);
        self.client_hs = client;
        self.server_hs = server;
        self.schedule = Some(schedule);

        let mut encrypted: Vec<Extension> = Vec::new();
        if let Some(alpn) = &self.negotiated.alpn {
            encrypted.push(ext::alpn(std::slice::from_ref(alpn)));
        }
        io.send(&mut self.transcript, &encode_encrypted_extensions(&encrypted))?;
        if self.negotiated.resumed {
            self.send_finished13(io)?;
            return Ok(Next::Continue);
        }

        if io.settings.client_cert != ClientCertPolicy::None {
            let request = CertificateRequest {
                context: Vec::new(),
                schemes: SignatureScheme::PREFERENCE.to_vec(),
            };
            io.send(&mut self.transcript, &request.encode(ProtocolVersion::Tls13))?;
            self.requested_cert = true;
        }
        let config = io.config;
        let cert = CertificateMsg {
            context: Vec::new(),
            chain: own_chain(config),
        };
        io.send(&mut self.transcript, &cert.encode(true))?;
        let key = server_key(config)?;
        let scheme = signing::select_scheme(key, &self.client_schemes, ProtocolVersion::Tls13)?;
        let content = signing::tls13_signed_content(&self.transcript.hash(suite.hash), true);
        let op = signing::begin_sign_content(key, scheme, &content)?;
        self.negotiated.scheme = scheme;
        self.pending = Some(Pending::ServerSignature { scheme });
        Ok(Next::Run(AsyncOp::Sign(op)))
    }

    fn send_finished13(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let verify = finished_verify_data(suite.hash, &self.server_hs, &self.transcript.hash(suite.hash))?;
        io.send(&mut self.transcript, &wrap(HandshakeType::Finished, &verify))?;
        let schedule = self.schedule.as_mut().ok_or(TlsError::InvalidState("no key schedule"))?;
        schedule.derive_master_secret()?;
        let (client, server) = schedule.application_traffic_secrets(&self.transcript.hash(suite.hash))?;
        let app = AppSecrets::new(suite, server, client);
        app.install_write(io.record)?;
        self.app = Some(app);
        self.state = if self.requested_cert {
            State::Certificate13
        } else {
            State::Finished13
        };
        Ok(())
    }

    fn on_client_certificate(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let tls13 = self.version()? == ProtocolVersion::Tls13;
        let cert = CertificateMsg::decode(msg.body(), tls13)?;
        self.transcript.update(&msg.raw);
        if cert.chain.is_empty() {
            if io.settings.client_cert == ClientCertPolicy::Required {
                return Err(TlsError::CertRejected {
                    cause: CertFailure::Missing,
                    subject: String::new(),
                    issuer: String::new(),
                });
            }
            debug!("client sent no certificate");
            self.state = if tls13 {
                State::Finished13
            } else {
                State::ClientKeyExchange
            };
            return Ok(Next::Continue);
        }
        let chain = parse_chain(&cert.chain)?;
        let leaf = &chain[0];
        debug!("client certificate: {}", leaf.subject);
        self.peer_key = Some(leaf.public_key.clone());
        self.negotiated.peer_chain = chain.clone();
        self.state = if tls13 {
            State::CertificateVerify13
        } else {
            State::ClientKeyExchange
        };
        if !io.config.verify_peer {
            return Ok(Next::Continue);
        }
        self.pending = Some(Pending::PeerChain);
        let check = ChainCheck::new(
            io.context.clone(),
            chain,
            None,
            io.settings.port,
            io.config.ca_fetcher.clone(),
        );
        Ok(Next::Run(AsyncOp::Chain(Box::new(check))))
    }

    fn on_client_verify(&mut self, msg: &HandshakeMessage) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let key = self.peer_key.as_ref().ok_or(TlsError::InvalidState("no client key"))?;
        let cv = CertificateVerify::decode(msg.body(), version >= ProtocolVersion::Tls12)?;
        if let Some(scheme) = cv.scheme {
            signing::check_peer_scheme(scheme, key, &SignatureScheme::PREFERENCE, version)?;
        }
        let op = if version == ProtocolVersion::Tls13 {
            let content = signing::tls13_signed_content(&self.transcript.hash(suite.hash), false);
            signing::begin_verify_content(key, cv.scheme, &content, &cv.signature)?
        } else {
            let alg = signing::algorithm_for(cv.scheme, key.alg());
            signing::begin_verify_digest(key, cv.scheme, &self.transcript.hash(alg.hash), &cv.signature)?
        };
        self.transcript.update(&msg.raw);
        self.state = if version == ProtocolVersion::Tls13 {
            State::Finished13
        } else {
            State::ChangeCipherSpec
        };
        self.pending = Some(Pending::ClientSignature);
        Ok(Next::Run(AsyncOp::Verify(op)))
    }

    fn on_client_finished13(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let suite = self.suite()?;
        let received = decode_finished(msg.body(), suite.hash.output_len())?;
        let expected = finished_verify_data(suite.hash, &self.client_hs, &self.transcript.hash(suite.hash))?;
        check_verify_data(&expected, received, "client Finished")?;
        self.transcript.update(&msg.raw);
        let app = self.app.as_ref().ok_or(TlsError::InvalidState("no traffic secrets"))?;
        app.install_read(io.record)?;
        self.state = State::Complete;
        if io.settings.resumption {
            let schedule = self.schedule.as_ref().ok_or(TlsError::InvalidState("no key schedule"))?;
            let resumption_master = schedule.resumption_master_secret(&self.transcript.hash(suite.hash))?;
            self.send_ticket(&resumption_master, io)?;
        }
        Ok(Next::Continue)
    }

    fn send_ticket(&mut self, resumption_master: &[u8], io: &mut Io<'_>) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let nonce = random_vec(8)?;
        let age_add = u32::from_be_bytes(random_array::<4>()?);
        let psk = ticket_psk(suite.hash, resumption_master, &nonce)?;
        let key = io.context.ticket_key()?;
        let ticket = seal_ticket(
            &*key,
            suite.id,
            io.context.clock().wall_secs(),
            TICKET_LIFETIME_SECS,
            age_add,
            &psk,
        )?;
        self.tickets.push(ticket.clone());
        let msg = NewSessionTicket {
            lifetime: TICKET_LIFETIME_SECS,
            age_add,
            nonce,
            ticket,
        };
        io.send_unrecorded(&msg.encode())?;
        debug!("sent session ticket");
        Ok(())
    }

    fn on_client_hello12(
        &mut self,
        hello: ClientHello,
        version: ProtocolVersion,
        offer: &HelloOffer,
        msg: &HandshakeMessage,
        io: &mut Io<'_>,
    ) -> Result<Next, TlsError> {
        self.transcript.update(&msg.raw);
        if let Some((suite, master)) = self.find_session(&hello, version, io) {
            debug!("resuming session by id with {}", suite.name);
            self.negotiated.suite = Some(suite);
            self.negotiated.resumed = true;
            self.session_id = hello.session_id;
            self.master = master;
            self.key_block = Some(key_block(version, suite, &self.master, &self.client_random, &self.random)?);
            self.send_server_hello12(io)?;
            self.send_finished12(io)?;
            self.state = State::ChangeCipherSpec;
            return Ok(Next::Continue);
        }

        let (suite, curve) = self.select_suite(&hello, version, offer, io)?;
        debug!("ClientHello: {} {}", version.name(), suite.name);
        self.negotiated.suite = Some(suite);
        self.negotiated.curve = curve;
        self.session_id = if io.settings.resumption {
            random_vec(32)?
        } else {
            Vec::new()
        };
        self.send_server_hello12(io)?;
        let cert = CertificateMsg {
            context: Vec::new(),
            chain: own_chain(io.config),
        };
        io.send(&mut self.transcript, &cert.encode(false))?;
        match curve {
            Some(curve) => {
                self.pending = Some(Pending::SkeShare);
                Ok(Next::Run(AsyncOp::Keygen(EcdhKeyPair::begin_generate(curve.curve)?)))
            }
            None => {
                self.send_hello_done(io)?;
                Ok(Next::Continue)
            }
        }
    }

    /// A cached session the client asked to resume, if still valid here.
    fn find_session(
        &self,
        hello: &ClientHello,
        version: ProtocolVersion,
        io: &Io<'_>,
    ) -> Option<(&'static CipherSuite, Zeroizing<Vec<u8>>)> {
        if !io.settings.resumption || hello.session_id.is_empty() {
            return None;
        }
        let Some(SessionPayload::Classic {
            master_secret,
            suite,
            version: cached_version,
            ..
        }) = io.context.lookup_session(&HistoryKey::SessionId(hello.session_id.clone()))
        else {
            return None;
        };
        let suite = CipherSuite::by_id(suite)?;
        let usable = cached_version == version
            && hello.cipher_suites.contains(&suite.id)
            && suite.mask() & io.settings.ciphers != 0;
        usable.then_some((suite, master_secret))
    }

    fn send_server_hello12(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let mut extensions = vec![ext::renegotiation_info()];
        if suite.kx.is_ecdhe() {
            extensions.push(ext::ec_point_formats());
        }
        if let Some(alpn) = &self.negotiated.alpn {
            extensions.push(ext::alpn(std::slice::from_ref(alpn)));
        }
        let hello = ServerHello {
            legacy_version: version.wire(),
            random: self.random,
            session_id: self.session_id.clone(),
            cipher_suite: suite.id,
            extensions,
        };
        io.send(&mut self.transcript, &hello.encode())
    }

    fn send_hello_done(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let version = self.version()?;
        if io.settings.client_cert != ClientCertPolicy::None {
            let request = CertificateRequest {
                context: Vec::new(),
                schemes: SignatureScheme::PREFERENCE.to_vec(),
            };
            io.send(&mut self.transcript, &request.encode(version))?;
            self.requested_cert = true;
        }
        io.send(&mut self.transcript, &wrap(HandshakeType::ServerHelloDone, &[]))?;
        self.state = if self.requested_cert {
            State::Certificate12
        } else {
            State::ClientKeyExchange
        };
        Ok(())
    }

    fn on_client_key_exchange(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let suite = self.suite()?;
        let payload = decode_client_key_exchange(msg.body(), suite.kx)?;
        self.transcript.update(&msg.raw);
        if suite.kx != KeyExchange::Rsa {
            let pair = self.share.take().ok_or(TlsError::InvalidState("no server key share"))?;
            let op = pair
                .begin_agree(&payload)
                .map_err(|_| protocol(AlertDescription::IllegalParameter, "client key share"))?;
            self.pending = Some(Pending::LegacyAgree);
            return Ok(Next::Run(AsyncOp::Agree(op)));
        }
        // Any RSA failure continues with a random premaster.
        let mut fallback = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        fallback[..2].copy_from_slice(&self.client_version.to_be_bytes());
        fill_random(&mut fallback[2..])?;
        let Some(PrivateKey::Rsa(key)) = &io.config.private_key else {
            return Err(TlsError::InvalidState("RSA key exchange without an RSA key"));
        };
        match key.begin_private(&payload) {
            Ok(op) => {
                self.pending = Some(Pending::RsaDecrypt { fallback });
                Ok(Next::Run(AsyncOp::Rsa(op)))
            }
            Err(_) => self.after_key_exchange(&fallback),
        }
    }

    fn rsa_premaster(em: &[u8], fallback: Zeroizing<Vec<u8>>) -> Zeroizing<Vec<u8>> {
        let Ok((secret, valid)) = rsaes_pkcs1_check(em, MASTER_SECRET_LEN) else {
            return fallback;
        };
        let good = valid & secret[..2].ct_eq(&fallback[..2]);
        let mut premaster = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        for (i, byte) in premaster.iter_mut().enumerate() {
            *byte = u8::conditional_select(&fallback[i], &secret[i], good);
        }
        premaster
    }

    fn after_key_exchange(&mut self, premaster: &[u8]) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        self.master = master_secret(version, suite, premaster, &self.client_random, &self.random)?;
        self.key_block = Some(key_block(version, suite, &self.master, &self.client_random, &self.random)?);
        self.state = if self.peer_key.is_some() {
            State::CertificateVerify12
        } else {
            State::ChangeCipherSpec
        };
        Ok(Next::Continue)
    }

    fn send_finished12(&mut self, io: &mut Io<'_>) -> Result<(), TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let keys = self.key_block.as_ref().ok_or(TlsError::InvalidState("no key block"))?;
        io.send_ccs()?;
        io.record
            .set_write_cipher(legacy_cipher(version, suite, keys, false)?, version, is_cbc(suite));
        let hash = legacy_transcript_hash(version, suite, &self.transcript);
        let verify = verify_data(version, suite, &self.master, false, &hash)?;
        io.send(&mut self.transcript, &wrap(HandshakeType::Finished, &verify))
    }

    fn on_client_finished12(&mut self, msg: &HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        let version = self.version()?;
        let suite = self.suite()?;
        let received = decode_finished(msg.body(), VERIFY_DATA_LEN)?;
        let hash = legacy_transcript_hash(version, suite, &self.transcript);
        let expected = verify_data(version, suite, &self.master, true, &hash)?;
        check_verify_data(&expected, received, "client Finished")?;
        self.transcript.update(&msg.raw);
        self.state = State::Complete;
        if self.negotiated.resumed {
            return Ok(Next::Continue);
        }
        self.send_finished12(io)?;
        if io.settings.resumption && !self.session_id.is_empty() {
            io.context.store_classic(
                HistoryKey::SessionId(self.session_id.clone()),
                SessionPayload::Classic {
                    session_id: self.session_id.clone(),
                    master_secret: self.master.clone(),
                    suite: suite.id,
                    version,
                },
            );
        }
        Ok(Next::Continue)
    }
}

impl Handshaker for ServerHandshake {
    fn start(&mut self, _io: &mut Io<'_>) -> Result<Next, TlsError> {
        Ok(Next::Continue)
    }

    fn on_message(&mut self, msg: HandshakeMessage, io: &mut Io<'_>) -> Result<Next, TlsError> {
        use HandshakeType as T;
        let tls13 = self.negotiated.version == Some(ProtocolVersion::Tls13);
        if msg.typ == T::ClientHello && self.state == State::Complete && !tls13 {
            io.send_alert(Alert::warning(AlertDescription::NoRenegotiation))?;
            return Ok(Next::Continue);
        }
        transitions::check(Role::Server, tls13, self.last, msg.typ)?;
        self.last = At::After(msg.typ);
        match (self.state, msg.typ) {
            (State::ClientHello, T::ClientHello) => self.on_client_hello(&msg, io),
            (State::Certificate13 | State::Certificate12, T::Certificate) => self.on_client_certificate(&msg, io),
            (State::CertificateVerify13 | State::CertificateVerify12, T::CertificateVerify) => {
                self.on_client_verify(&msg)
            }
            (State::Finished13, T::Finished) => self.on_client_finished13(&msg, io),
            (State::Complete, T::KeyUpdate) if tls13 => {
                let app = self.app.as_mut().ok_or(TlsError::InvalidState("no traffic secrets"))?;
                app.on_key_update(&msg, io)?;
                Ok(Next::Continue)
            }
            (State::ClientKeyExchange, T::ClientKeyExchange) => self.on_client_key_exchange(&msg, io),
            (State::Finished12, T::Finished) => self.on_client_finished12(&msg, io),
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
                let op = pair
                    .begin_agree(&self.peer_share)
                    .map_err(|_| protocol(AlertDescription::IllegalParameter, "client key share"))?;
                self.pending = Some(Pending::HandshakeAgree {
                    public: pair.public_key().to_vec(),
                });
                Ok(Next::Run(AsyncOp::Agree(op)))
            }
            (Pending::HandshakeAgree { public }, OpOutput::Shared(secret)) => self.send_flight13(&public, &secret, io),
            (Pending::ServerSignature { scheme }, OpOutput::Signature(signature)) => {
                io.send(&mut self.transcript, &CertificateVerify { scheme, signature }.encode())?;
                self.send_finished13(io)?;
                Ok(Next::Continue)
            }
            (Pending::SkeShare, OpOutput::KeyPair(pair)) => {
                let version = self.version()?;
                let curve = self.negotiated.curve.ok_or(TlsError::InvalidState("no curve"))?;
                let key = server_key(io.config)?;
                let scheme = signing::select_scheme(key, &self.client_schemes, version)?;
                let params = ServerKeyExchange::params(curve.id, pair.public_key());
                let content = signing::ske_signed_content(&self.client_random, &self.random, &params);
                let op = signing::begin_sign_content(key, scheme, &content)?;
                self.negotiated.scheme = scheme;
                self.share = Some(pair);
                self.pending = Some(Pending::SkeSignature { scheme });
                Ok(Next::Run(AsyncOp::Sign(op)))
            }
            (Pending::SkeSignature { scheme }, OpOutput::Signature(signature)) => {
                let curve = self.negotiated.curve.ok_or(TlsError::InvalidState("no curve"))?;
                let public = self
                    .share
                    .as_ref()
                    .ok_or(TlsError::InvalidState("no server key share"))?
                    .public_key()
                    .to_vec();
                let ske = ServerKeyExchange {
                    curve: curve.id,
                    public,
                    scheme,
                    signature,
                };
                io.send(&mut self.transcript, &ske.encode())?;
                self.send_hello_done(io)?;
                Ok(Next::Continue)
            }
            (Pending::PeerChain, OpOutput::ChainValid) | (Pending::ClientSignature, OpOutput::Verified) => {
                Ok(Next::Continue)
            }
            (Pending::RsaDecrypt { fallback }, OpOutput::Rsa(em)) => {
                let premaster = Self::rsa_premaster(&em, fallback);
                self.after_key_exchange(&premaster)
            }
            (Pending::LegacyAgree, OpOutput::Shared(secret)) => self.after_key_exchange(&secret),
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
        io.record.set_read_cipher(legacy_cipher(version, suite, keys, true)?);
        self.state = State::Finished12;
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

    fn forget_session(&self, context: &SslContext) {
        let tls13 = self.negotiated.version == Some(ProtocolVersion::Tls13);
        if !tls13 && !self.session_id.is_empty() {
            context.remove_session(&HistoryKey::SessionId(self.session_id.clone()));
        }
        for ticket in &self.tickets {
            context.revoke_ticket(ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_seal_and_open() {
        let key = [7u8; 32];
        let ticket = seal_ticket(&key, 0x1301, 1_900_000_000, 7200, 99, &[5u8; 32]).unwrap();
        let opened = open_ticket(&key, &ticket).unwrap();
        assert_eq!(opened.suite, 0x1301);
        assert_eq!(opened.created, 1_900_000_000);
        assert_eq!(opened.lifetime, 7200);
        assert_eq!(*opened.psk, vec![5u8; 32]);

        assert!(open_ticket(&[8u8; 32], &ticket).is_none());
        let mut tampered = ticket.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(open_ticket(&key, &tampered).is_none());
        assert!(open_ticket(&key, &ticket[..5]).is_none());
    }

    #[test]
    fn test_offered_versions_from_legacy_field() {
        let hello = ClientHello {
            legacy_version: 0x0302,
            random: [0; 32],
            session_id: Vec::new(),
            cipher_suites: vec![0x002F],
            compression: vec![0],
            extensions: Vec::new(),
        };
        assert_eq!(
            offered_versions(&hello).unwrap(),
            vec![ProtocolVersion::Tls10, ProtocolVersion::Tls11]
        );
        let modern = ClientHello {
            legacy_version: 0x0303,
            extensions: vec![ext::supported_versions_client(
                ProtocolVersion::Tls12,
                ProtocolVersion::Tls13,
            )],
            ..hello
        };
        let versions = offered_versions(&modern).unwrap();
        assert!(versions.contains(&ProtocolVersion::Tls13));
        assert!(versions.contains(&ProtocolVersion::Tls12));
        assert!(!versions.contains(&ProtocolVersion::Tls11));
    }

    #[test]
    fn test_rsa_premaster_falls_back_on_bad_padding() {
        let mut fallback = Zeroizing::new(vec![0x03, 0x03]);
        fallback.extend_from_slice(&[0xAA; 46]);
        let mut em = vec![0x00, 0x02];
        em.extend_from_slice(&[0x11; 77]);
        em.push(0x00);
        em.extend_from_slice(&[0x03, 0x03]);
        em.extend_from_slice(&[0x55; 46]);
        let good = ServerHandshake::rsa_premaster(&em, fallback.clone());
        assert_eq!(&good[..2], &[0x03, 0x03]);
        assert_eq!(&good[2..], &[0x55; 46][..]);

        let mut wrong_version = em.clone();
        wrong_version[80] = 0x01;
        assert_eq!(*ServerHandshake::rsa_premaster(&wrong_version, fallback.clone()), *fallback);
        let mut bad_header = em;
        bad_header[1] = 0x01;
        assert_eq!(*ServerHandshake::rsa_premaster(&bad_header, fallback.clone()), *fallback);
    }
}
