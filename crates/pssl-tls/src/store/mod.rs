//! Process-wide trust and resumption state: CA anchors, session history
//! and the certificate validation cache.

pub mod ca;
pub mod cache;
pub mod validate;

use crate::ProtocolVersion;
use pssl_crypto::step::Progress;
use pssl_pki::CertIdent;
use pssl_types::TlsError;
use zeroize::Zeroizing;

pub use ca::{CaEntry, CaFlags, CaHandle, CaStore};
pub use cache::{TickCache, CACHE_SLOTS};
pub use validate::ChainCheck;

/// Lifetime of a session-id resumption entry.
pub const CLASSIC_TTL_SECS: u64 = 3600;
/// Lifetime of a validated-chain entry.
pub const VALIDATION_TTL_SECS: u64 = 2 * 3600;
/// Lifetime advertised in TLS 1.3 tickets.
pub const TICKET_LIFETIME_SECS: u32 = 7200;

/// What a history entry is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HistoryKey {
    /// A client's view: the server it connected to.
    Peer { host: String, port: u16 },
    /// A server's view: the session id it issued.
    SessionId(Vec<u8>),
}

/// Resumption state kept between connections.
#[derive(Debug, Clone)]
pub enum SessionPayload {
    /// TLS 1.0-1.2 session-id resumption.
    Classic {
        session_id: Vec<u8>,
        master_secret: Zeroizing<Vec<u8>>,
        suite: u16,
        version: ProtocolVersion,
    },
    /// A TLS 1.3 ticket and the PSK derived for it.
    Ticket {
        ticket: Vec<u8>,
        psk: Zeroizing<Vec<u8>>,
        suite: u16,
        age_add: u32,
        /// Clock tick when the ticket arrived.
        received_ms: u64,
    },
}

impl SessionPayload {
    pub fn suite(&self) -> u16 {
        match self {
            SessionPayload::Classic { suite, .. } | SessionPayload::Ticket { suite, .. } => *suite,
        }
    }
}

/// Validated chains, by leaf fingerprint and total chain size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationKey {
    pub fingerprint: Vec<u8>,
    pub size: usize,
}

pub type SessionHistory = TickCache<HistoryKey, SessionPayload>;
pub type ValidationCache = TickCache<ValidationKey, u64>;

/// External source of CA certificates, consulted when no local anchor
/// matches a chain.
pub trait CaFetcher: Send + Sync {
    /// Start looking up the CA named `issuer` for a connection to
    /// `host:port`.
    fn begin(&self, issuer: &CertIdent, host: &str, port: u16) -> Box<dyn CaFetch>;
}

/// A CA lookup in progress. Yields PEM or DER certificate bytes.
pub trait CaFetch: Send {
    fn poll(&mut self) -> Result<Progress<Vec<u8>>, TlsError>;
}
