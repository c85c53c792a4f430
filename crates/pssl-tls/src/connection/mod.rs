//! A TLS connection driven by a cooperative `update` tick over a
//! non-blocking [`Transport`].
//!
//! Each tick flushes pending output, advances any in-flight public-key
//! operation by one bounded step, and processes whatever records the
//! transport has delivered. `send` and `recv` tick implicitly.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use crate::alert::{alert_for, protocol, Alert, AlertDescription, AlertLevel};
use crate::config::{ClientCertPolicy, SslConfig};
use crate::context::SslContext;
use crate::handshake::client::ClientHandshake;
use crate::handshake::codec::HandshakeDeframer;
use crate::handshake::ops::AsyncOp;
use crate::handshake::server::ServerHandshake;
use crate::handshake::{Handshaker, Io, Negotiated, Next, Settings};
use crate::record::{ContentType, RecordLayer, MAX_PLAINTEXT};
use crate::store::HistoryKey;
use crate::suite::{CipherSuite, NamedCurve, ALL_CIPHERS, ALL_CURVES};
use crate::transport::{ConnectError, Transport};
use crate::{ProtocolVersion, Role};
use log::{debug, info, trace, warn};
use pssl_crypto::step::Progress;
use pssl_types::{CertFailure, TlsError};

/// Why a connection ended up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The peer name did not resolve.
    Dns,
    /// The transport could not connect.
    Connect,
    /// The peer only speaks versions below our minimum.
    MinVersion,
    /// The peer only speaks versions above our maximum.
    MaxVersion,
    NoCipher,
    NoCurve,
    Cert(CertFailure),
    /// Any other failure before the connection became secure.
    Setup,
    /// A failure after the connection became secure.
    Secure,
}

impl FailReason {
    /// Numeric failure code reported by the `fail` status.
    pub fn code(self) -> i32 {
        match self {
            FailReason::Dns => -1,
            FailReason::Connect => -10,
            FailReason::MinVersion => -13,
            FailReason::MaxVersion => -14,
            FailReason::NoCipher => -15,
            FailReason::NoCurve => -16,
            FailReason::Cert(CertFailure::Invalid) => -20,
            FailReason::Cert(CertFailure::Host) => -21,
            FailReason::Cert(CertFailure::NoTrust) => -22,
            FailReason::Cert(CertFailure::Missing) => -23,
            FailReason::Cert(CertFailure::BadDate) => -24,
            FailReason::Cert(CertFailure::Request) => -25,
            FailReason::Setup => -30,
            FailReason::Secure => -31,
        }
    }

    pub fn from_error(err: &TlsError, secure: bool) -> Self {
        match err {
            TlsError::VersionTooLow => FailReason::MinVersion,
            TlsError::VersionTooHigh => FailReason::MaxVersion,
            TlsError::NoSharedCipherSuite => FailReason::NoCipher,
            TlsError::NoSharedCurve => FailReason::NoCurve,
            TlsError::CertRejected { cause, .. } => FailReason::Cert(*cause),
            _ if secure => FailReason::Secure,
            _ => FailReason::Setup,
        }
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the transport to connect.
    Connecting,
    Handshaking,
    Secure,
    Closed,
    Failed(FailReason),
}

impl ConnState {
    pub fn name(self) -> &'static str {
        match self {
            ConnState::Connecting => "connecting",
            ConnState::Handshaking => "handshaking",
            ConnState::Secure => "secure",
            ConnState::Closed => "closed",
            ConnState::Failed(_) => "failed",
        }
    }
}

/// Readable connection properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Negotiated ALPN protocol.
    Alpn,
    /// Last alert sent or received.
    Alert,
    /// Subject of the peer's leaf certificate.
    Cert,
    Cipher,
    Curve,
    /// Failure code, 0 while not failed.
    Fail,
    Host,
    Resumed,
    Secure,
    SigAlg,
    State,
    Version,
    MinVersion,
    MaxVersion,
    /// Milliseconds the handshake took.
    HandshakeTime,
}

const STATUS_TAGS: [(&str, Status); 15] = [
    ("alpn", Status::Alpn),
    ("alrt", Status::Alert),
    ("cert", Status::Cert),
    ("ciph", Status::Cipher),
    ("crve", Status::Curve),
    ("fail", Status::Fail),
    ("host", Status::Host),
    ("resu", Status::Resumed),
    ("secu", Status::Secure),
    ("salg", Status::SigAlg),
    ("stat", Status::State),
    ("vers", Status::Version),
    ("vmin", Status::MinVersion),
    ("vmax", Status::MaxVersion),
    ("htim", Status::HandshakeTime),
];

impl Status {
    pub fn from_tag(tag: &str) -> Option<Self> {
        STATUS_TAGS.iter().find(|(t, _)| *t == tag).map(|(_, s)| *s)
    }

    pub fn tag(self) -> &'static str {
        STATUS_TAGS
            .iter()
            .find(|(_, s)| *s == self)
            .map(|(t, _)| *t)
            .unwrap_or("")
    }
}

/// Value of a [`Status`] query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusValue {
    /// Not known yet, or not applicable.
    None,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl StatusValue {
    fn text(value: Option<impl Into<String>>) -> Self {
        value.map_or(StatusValue::None, |v| StatusValue::Text(v.into()))
    }
}

/// Behaviour changes applied through [`SslConnection::control`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Ciphers(u32),
    Curves(u32),
    ClientCert(ClientCertPolicy),
    Resumption(bool),
    Alpn(Vec<String>),
    MinVersion(ProtocolVersion),
    MaxVersion(ProtocolVersion),
    /// Record trace verbosity, 0-3.
    Verbosity(u8),
    Host(String),
}

fn parse_number(value: &str) -> Option<u32> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn parse_version(value: &str) -> Option<ProtocolVersion> {
    let value = value.trim_start_matches("TLS").trim_start_matches("tls");
    [
        ProtocolVersion::Tls10,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls12,
        ProtocolVersion::Tls13,
    ]
    .into_iter()
    .find(|v| v.name().trim_start_matches("TLS") == value)
}

impl Control {
    /// Parse a control from its four-character tag and a text value.
    ///
    /// Masks take a number (`0x` for hex) or a comma-separated name list;
    /// versions take `TLS1.2` or `1.2`.
    pub fn parse(tag: &str, value: &str) -> Result<Self, TlsError> {
        let bad = || TlsError::Config(format!("bad value {value:?} for control {tag:?}"));
        let names = || value.split(',').map(str::trim).filter(|s| !s.is_empty());
        match tag {
            "ciph" => parse_number(value)
                .or_else(|| {
                    names()
                        .map(|n| CipherSuite::by_name(n).map(|s| s.mask()))
                        .sum::<Option<u32>>()
                })
                .map(Control::Ciphers)
                .ok_or_else(bad),
            "crvs" => parse_number(value)
                .or_else(|| {
                    names()
                        .map(|n| NamedCurve::enabled(ALL_CURVES).find(|c| c.name == n).map(|c| c.mask()))
                        .sum::<Option<u32>>()
                })
                .map(Control::Curves)
                .ok_or_else(bad),
            "ccrt" => match value {
                "0" | "none" => Ok(Control::ClientCert(ClientCertPolicy::None)),
                "1" | "optional" => Ok(Control::ClientCert(ClientCertPolicy::Optional)),
                "2" | "required" => Ok(Control::ClientCert(ClientCertPolicy::Required)),
                _ => Err(bad()),
            },
            "resu" => match value {
                "0" | "off" | "false" => Ok(Control::Resumption(false)),
                "1" | "on" | "true" => Ok(Control::Resumption(true)),
                _ => Err(bad()),
            },
            "alpn" => Ok(Control::Alpn(names().map(str::to_string).collect())),
            "vmin" => parse_version(value).map(Control::MinVersion).ok_or_else(bad),
            "vmax" => parse_version(value).map(Control::MaxVersion).ok_or_else(bad),
            "spam" => match value.parse::<u8>() {
                Ok(level) if level <= 3 => Ok(Control::Verbosity(level)),
                _ => Err(bad()),
            },
            "host" if !value.is_empty() => Ok(Control::Host(value.to_string())),
            _ => Err(bad()),
        }
    }
}

/// One TLS connection over a transport.
pub struct SslConnection<T: Transport> {
    role: Role,
    transport: T,
    context: Arc<SslContext>,
    config: Arc<SslConfig>,
    settings: Settings,
    record: RecordLayer,
    deframer: HandshakeDeframer,
    handshake: Box<dyn Handshaker>,
    op: Option<AsyncOp>,
    outbound: Vec<u8>,
    plaintext: VecDeque<u8>,
    state: ConnState,
    started: bool,
    last_alert: Option<AlertDescription>,
    started_ms: u64,
    handshake_ms: Option<u64>,
    peer_closed: bool,
}

impl<T: Transport> std::fmt::Debug for SslConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslConnection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SslConnection<T> {
    pub fn client(context: Arc<SslContext>, config: Arc<SslConfig>, transport: T) -> Self {
        Self::new(Role::Client, Box::new(ClientHandshake::new()), context, config, transport)
    }

    pub fn server(context: Arc<SslContext>, config: Arc<SslConfig>, transport: T) -> Self {
        Self::new(Role::Server, Box::new(ServerHandshake::new()), context, config, transport)
    }

    fn new(
        role: Role,
        handshake: Box<dyn Handshaker>,
        context: Arc<SslContext>,
        config: Arc<SslConfig>,
        transport: T,
    ) -> Self {
        let mut record = RecordLayer::new();
        record.verbosity = config.verbosity;
        Self {
            role,
            transport,
            settings: Settings::from_config(&config),
            context,
            config,
            record,
            deframer: HandshakeDeframer::default(),
            handshake,
            op: None,
            outbound: Vec::new(),
            plaintext: VecDeque::new(),
            state: ConnState::Connecting,
            started: false,
            last_alert: None,
            started_ms: 0,
            handshake_ms: None,
            peer_closed: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_secure(&self) -> bool {
        self.state == ConnState::Secure
    }

    /// What the handshake has agreed on so far.
    pub fn negotiated(&self) -> &Negotiated {
        self.handshake.negotiated()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Advance the connection as far as it can go without blocking.
    ///
    /// Returns the error that failed the connection on the tick it
    /// happens; later ticks on a failed or closed connection do nothing.
    pub fn update(&mut self) -> Result<(), TlsError> {
        match self.state {
            ConnState::Failed(_) | ConnState::Closed => return Ok(()),
            ConnState::Connecting => match self.transport.poll_connect() {
                Ok(true) => {
                    debug!("{:?}: transport connected", self.role);
                    self.state = ConnState::Handshaking;
                }
                Ok(false) => return Ok(()),
                Err(e) => {
                    let (reason, err) = match e {
                        ConnectError::Resolve(err) => (FailReason::Dns, err),
                        ConnectError::Connect(err) => (FailReason::Connect, err),
                    };
                    warn!("{:?}: transport failed: {err}", self.role);
                    self.state = ConnState::Failed(reason);
                    return Err(TlsError::IoError(err));
                }
            },
            ConnState::Handshaking | ConnState::Secure => {}
        }
        self.tick().map_err(|e| self.fail(e))
    }

    fn tick(&mut self) -> Result<(), TlsError> {
        if !self.started {
            self.started = true;
            self.started_ms = self.context.now_ms();
            self.step(|hs, io| hs.start(io))?;
        }
        loop {
            self.flush()?;
            if let Some(op) = self.op.as_mut() {
                match op.poll()? {
                    Progress::Pending => break,
                    Progress::Done(output) => {
                        trace!("{:?}: {} operation finished", self.role, op.name());
                        self.op = None;
                        self.step(|hs, io| hs.on_op(output, io))?;
                    }
                }
                continue;
            }
            if let Some(msg) = self.deframer.next_message()? {
                trace!("{:?}: received {:?}", self.role, msg.typ);
                self.step(|hs, io| hs.on_message(msg, io))?;
                continue;
            }
            if let Some((ty, payload)) = self.record.next_record()? {
                self.on_record(ty, payload)?;
                continue;
            }
            if !self.read_transport()? {
                break;
            }
        }
        self.flush()
    }

    /// Run one handshake step with access to the record layer.
    fn step(
        &mut self,
        f: impl FnOnce(&mut dyn Handshaker, &mut Io<'_>) -> Result<Next, TlsError>,
    ) -> Result<(), TlsError> {
        let mut io = Io {
            settings: &self.settings,
            config: &*self.config,
            context: &self.context,
            record: &mut self.record,
            outbound: &mut self.outbound,
        };
        if let Next::Run(op) = f(self.handshake.as_mut(), &mut io)? {
            trace!("{:?}: starting {} operation", self.role, op.name());
            self.op = Some(op);
        }
        if self.state == ConnState::Handshaking && self.handshake.is_complete() {
            self.on_complete();
        }
        Ok(())
    }

    fn on_complete(&mut self) {
        self.state = ConnState::Secure;
        let elapsed = self.context.now_ms().saturating_sub(self.started_ms);
        self.handshake_ms = Some(elapsed);
        let n = self.handshake.negotiated();
        info!(
            "{:?} handshake complete: {} {}{} in {elapsed} ms",
            self.role,
            n.version.map_or("?", |v| v.name()),
            n.suite.map_or("?", |s| s.name),
            if n.resumed { " (resumed)" } else { "" },
        );
    }

    fn on_record(&mut self, ty: ContentType, payload: Vec<u8>) -> Result<(), TlsError> {
        match ty {
            ContentType::Alert => self.on_alert(&payload),
            ContentType::ChangeCipherSpec => {
                if payload != [1] {
                    return Err(protocol(AlertDescription::DecodeError, "malformed change_cipher_spec"));
                }
                let tls13 = self.handshake.negotiated().version == Some(ProtocolVersion::Tls13);
                if tls13 && self.state == ConnState::Handshaking {
                    trace!("{:?}: ignoring compatibility change_cipher_spec", self.role);
                    return Ok(());
                }
                if tls13 || !self.deframer.is_empty() || self.state != ConnState::Handshaking {
                    return Err(protocol(
                        AlertDescription::UnexpectedMessage,
                        "change_cipher_spec out of place",
                    ));
                }
                let mut io = Io {
                    settings: &self.settings,
                    config: &*self.config,
                    context: &self.context,
                    record: &mut self.record,
                    outbound: &mut self.outbound,
                };
                self.handshake.on_ccs(&mut io)
            }
            ContentType::Handshake => {
                if payload.is_empty() {
                    return Err(protocol(AlertDescription::UnexpectedMessage, "empty handshake record"));
                }
                self.deframer.push(&payload);
                Ok(())
            }
            ContentType::ApplicationData => {
                if self.state != ConnState::Secure {
                    return Err(protocol(
                        AlertDescription::UnexpectedMessage,
                        "application data before the handshake completed",
                    ));
                }
                self.plaintext.extend(payload);
                Ok(())
            }
        }
    }

    fn on_alert(&mut self, payload: &[u8]) -> Result<(), TlsError> {
        let alert = Alert::decode(payload)?;
        self.last_alert = Some(alert.description);
        if alert.description == AlertDescription::CloseNotify {
            debug!("{:?}: peer sent close_notify", self.role);
            self.peer_closed = true;
            if self.state == ConnState::Handshaking {
                return Err(TlsError::ConnectionClosed);
            }
            return Ok(());
        }
        let tls13 = self.handshake.negotiated().version == Some(ProtocolVersion::Tls13);
        match alert.level {
            AlertLevel::Fatal => Err(TlsError::AlertReceived(alert.description.name().to_string())),
            // TLS 1.3 has no warnings besides closure alerts.
            AlertLevel::Warning if tls13 && alert.description != AlertDescription::UserCanceled => {
                Err(TlsError::AlertReceived(alert.description.name().to_string()))
            }
            AlertLevel::Warning => {
                warn!("{:?}: peer warned {}", self.role, alert.description.name());
                Ok(())
            }
        }
    }

    /// Read what the transport has. `false` when nothing more is available.
    fn read_transport(&mut self) -> Result<bool, TlsError> {
        let mut buf = [0u8; 8192];
        match self.transport.read(&mut buf) {
            Ok(0) => {
                self.peer_closed = true;
                if self.state == ConnState::Handshaking {
                    return Err(TlsError::ConnectionClosed);
                }
                Ok(false)
            }
            Ok(n) => {
                self.record.feed(&buf[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> Result<(), TlsError> {
        while !self.outbound.is_empty() {
            match self.transport.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn forget_session(&self) {
        self.handshake.forget_session(&self.context);
        if self.role != Role::Client {
            return;
        }
        if let Some(host) = &self.settings.host {
            self.context.remove_session(&HistoryKey::Peer {
                host: host.clone(),
                port: self.settings.port,
            });
        }
    }

    /// Move to the failed state, telling the peer when an alert applies.
    fn fail(&mut self, err: TlsError) -> TlsError {
        if let Some(desc) = alert_for(&err, self.handshake.negotiated().version) {
            if let Ok(record) = self.record.seal(ContentType::Alert, &Alert::fatal(desc).encode()) {
                self.outbound.extend_from_slice(&record);
                if let Err(e) = self.flush() {
                    debug!("{:?}: could not deliver {}: {e}", self.role, desc.name());
                }
            }
            self.last_alert = Some(desc);
        }
        self.forget_session();
        let reason = FailReason::from_error(&err, self.state == ConnState::Secure);
        warn!("{:?} connection failed ({}): {err}", self.role, reason.code());
        self.state = ConnState::Failed(reason);
        self.op = None;
        err
    }

    /// Send application data. The connection must be secure.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        if self.state != ConnState::Secure {
            return Err(TlsError::InvalidState("connection is not secure"));
        }
        for chunk in data.chunks(MAX_PLAINTEXT) {
            let record = self
                .record
                .seal(ContentType::ApplicationData, chunk)
                .map_err(|e| self.fail(e))?;
            self.outbound.extend_from_slice(&record);
        }
        self.update()?;
        Ok(data.len())
    }

    /// Receive application data. `Ok(0)` means nothing is available yet;
    /// after the peer closes and the data is drained, `ConnectionClosed`.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        if self.plaintext.is_empty() {
            self.update()?;
        }
        if self.plaintext.is_empty() {
            if self.peer_closed {
                return Err(TlsError::ConnectionClosed);
            }
            if let ConnState::Failed(_) = self.state {
                return Err(TlsError::InvalidState("connection failed"));
            }
            return Ok(0);
        }
        let n = buf.len().min(self.plaintext.len());
        for (dst, src) in buf.iter_mut().zip(self.plaintext.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    /// Send close_notify and release the transport.
    pub fn close(&mut self) {
        if matches!(self.state, ConnState::Handshaking | ConnState::Secure) {
            let alert = Alert::warning(AlertDescription::CloseNotify);
            if let Ok(record) = self.record.seal(ContentType::Alert, &alert.encode()) {
                self.outbound.extend_from_slice(&record);
                if let Err(e) = self.flush() {
                    debug!("{:?}: could not deliver close_notify: {e}", self.role);
                }
            }
        }
        self.transport.close();
        self.state = ConnState::Closed;
        self.op = None;
    }

    /// Rotate our TLS 1.3 sending keys, optionally asking the peer to
    /// rotate its own.
    pub fn key_update(&mut self, request_peer: bool) -> Result<(), TlsError> {
        if self.state != ConnState::Secure {
            return Err(TlsError::InvalidState("connection is not secure"));
        }
        let mut io = Io {
            settings: &self.settings,
            config: &*self.config,
            context: &self.context,
            record: &mut self.record,
            outbound: &mut self.outbound,
        };
        self.handshake.key_update(request_peer, &mut io)?;
        self.flush()
    }

    pub fn status(&self, status: Status) -> StatusValue {
        let n = self.handshake.negotiated();
        match status {
            Status::Alpn => StatusValue::text(n.alpn.clone()),
            Status::Alert => StatusValue::text(self.last_alert.map(|a| a.name())),
            Status::Cert => StatusValue::text(n.peer_chain.first().map(|c| c.subject.to_string())),
            Status::Cipher => StatusValue::text(n.suite.map(|s| s.name)),
            Status::Curve => StatusValue::text(n.curve.map(|c| c.name)),
            Status::Fail => StatusValue::Int(match self.state {
                ConnState::Failed(reason) => i64::from(reason.code()),
                _ => 0,
            }),
            Status::Host => match self.role {
                Role::Client => StatusValue::text(self.settings.host.clone()),
                Role::Server => StatusValue::text(n.server_name.clone()),
            },
            Status::Resumed => StatusValue::Bool(n.resumed),
            Status::Secure => StatusValue::Bool(self.is_secure()),
            Status::SigAlg => StatusValue::text(n.scheme.map(|s| s.name())),
            Status::State => StatusValue::Text(self.state.name().to_string()),
            Status::Version => StatusValue::text(n.version.map(|v| v.name())),
            Status::MinVersion => StatusValue::Text(self.settings.min_version.name().to_string()),
            Status::MaxVersion => StatusValue::Text(self.settings.max_version.name().to_string()),
            Status::HandshakeTime => self.handshake_ms.map_or(StatusValue::None, |ms| StatusValue::Int(ms as i64)),
        }
    }

    /// Apply a control. Only verbosity may change once the handshake has
    /// started.
    pub fn control(&mut self, control: Control) -> Result<(), TlsError> {
        if let Control::Verbosity(level) = control {
            self.record.verbosity = level.min(3);
            return Ok(());
        }
        if self.started {
            return Err(TlsError::InvalidState("controls apply before the handshake starts"));
        }
        let s = &mut self.settings;
        match control {
            Control::Ciphers(mask) => {
                let mask = mask & ALL_CIPHERS;
                if CipherSuite::enabled(mask, s.min_version, s.max_version).next().is_none() {
                    return Err(TlsError::Config("no cipher suite usable in the version range".into()));
                }
                s.ciphers = mask;
            }
            Control::Curves(mask) => {
                if mask & ALL_CURVES == 0 {
                    return Err(TlsError::Config("no curve enabled".into()));
                }
                s.curves = mask & ALL_CURVES;
            }
            Control::ClientCert(policy) => s.client_cert = policy,
            Control::Resumption(on) => s.resumption = on,
            Control::Alpn(protocols) => {
                if protocols.iter().any(|p| p.is_empty() || p.len() > 255) {
                    return Err(TlsError::Config("ALPN protocol names must be 1-255 bytes".into()));
                }
                s.alpn = protocols;
            }
            Control::MinVersion(v) if v <= s.max_version => s.min_version = v,
            Control::MaxVersion(v) if v >= s.min_version => s.max_version = v,
            Control::MinVersion(_) | Control::MaxVersion(_) => {
                return Err(TlsError::Config("min_version above max_version".into()));
            }
            Control::Host(host) => s.host = Some(host),
            Control::Verbosity(_) => {}
        }
        debug!("{:?}: control applied", self.role);
        Ok(())
    }
}
