//! The process-wide context shared by connections: clock, trust anchors,
//! session history, validation cache and the ticket key.

use crate::store::{
    CaFlags, CaStore, HistoryKey, SessionHistory, SessionPayload, TickCache, ValidationCache, CACHE_SLOTS,
    CLASSIC_TTL_SECS, TICKET_LIFETIME_SECS,
};
use log::{debug, info};
use pssl_crypto::rand::random_array;
use pssl_pki::Certificate;
use pssl_types::TlsError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// Time source for cache expiry and certificate dates.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds.
    fn now_ms(&self) -> u64;
    /// Seconds since the Unix epoch.
    fn wall_secs(&self) -> i64;
}

/// The operating system clock.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn wall_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    ms: AtomicU64,
    wall_base: i64,
}

impl ManualClock {
    /// Start at tick 0 and the given wall time.
    pub fn new(wall_secs: i64) -> Self {
        Self {
            ms: AtomicU64::new(0),
            wall_base: wall_secs,
        }
    }

    /// Move both the tick counter and the wall clock forward.
    pub fn advance_ms(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs.saturating_mul(1000));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }

    fn wall_secs(&self) -> i64 {
        self.wall_base + (self.now_ms() / 1000) as i64
    }
}

/// State behind the context lock.
pub(crate) struct Shared {
    pub cas: CaStore,
    pub history: SessionHistory,
    pub validations: ValidationCache,
    /// Tickets from connections that ended in a fatal alert.
    pub revoked: TickCache<Vec<u8>, ()>,
}

/// Shared CA store, session history and validation cache.
///
/// All three lists sit behind one lock. Connections hold an `Arc` to the
/// context they were created with.
pub struct SslContext {
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
    ticket_key: Mutex<Option<Zeroizing<[u8; 32]>>>,
}

static GLOBAL: OnceLock<Arc<SslContext>> = OnceLock::new();

impl SslContext {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            shared: Mutex::new(Shared {
                cas: CaStore::new(),
                history: SessionHistory::new(CACHE_SLOTS),
                validations: ValidationCache::new(CACHE_SLOTS),
                revoked: TickCache::new(CACHE_SLOTS),
            }),
            ticket_key: Mutex::new(None),
        })
    }

    /// The process-wide context, created on first use with the system clock.
    pub fn global() -> Arc<Self> {
        GLOBAL
            .get_or_init(|| Self::new(Arc::new(SystemClock::new())))
            .clone()
    }

    /// Drop every anchor, session and cached validation, and forget the
    /// ticket key.
    pub fn shutdown(&self) {
        let mut shared = self.lock();
        shared.cas.clear();
        shared.history.clear();
        shared.validations.clear();
        shared.revoked.clear();
        drop(shared);
        *self.ticket_key.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!("ssl context shut down");
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add every certificate in a PEM bundle or DER blob as a trust anchor.
    /// Returns how many were new; duplicates are skipped.
    pub fn add_ca(&self, data: &[u8]) -> Result<usize, TlsError> {
        self.add_ca_with(data, CaFlags { internal: true, provider: false }, false)
    }

    /// Like [`SslContext::add_ca`], but each anchor's self-signature is
    /// checked only when it first anchors a chain.
    pub fn add_ca_deferred(&self, data: &[u8]) -> Result<usize, TlsError> {
        self.add_ca_with(data, CaFlags { internal: true, provider: false }, true)
    }

    pub(crate) fn add_ca_with(&self, data: &[u8], flags: CaFlags, deferred: bool) -> Result<usize, TlsError> {
        let certs = Certificate::parse_all(data)?;
        let mut shared = self.lock();
        let mut added = 0;
        for cert in certs {
            match shared.cas.add(cert, flags, deferred) {
                Ok(_) => added += 1,
                Err(e) => debug!("ca store: {e}"),
            }
        }
        Ok(added)
    }

    /// Verify every deferred anchor now instead of on first use.
    /// Returns how many failed and were dropped.
    pub fn validate_all_ca(&self) -> usize {
        let failed = self.lock().cas.validate_all();
        if failed > 0 {
            info!("ca store: {failed} deferred anchor(s) failed validation");
        }
        failed
    }

    pub fn clear_cas(&self) {
        self.lock().cas.clear();
    }

    pub fn ca_count(&self) -> usize {
        self.lock().cas.len()
    }

    /// Number of live resumption entries.
    pub fn session_count(&self) -> usize {
        self.lock().history.len()
    }

    pub(crate) fn store_session(&self, key: HistoryKey, payload: SessionPayload, ttl_secs: u64) {
        let now = self.now_ms();
        debug!("session history: storing {key:?}");
        self.lock().history.insert(key, payload, now, ttl_secs.saturating_mul(1000));
    }

    pub(crate) fn store_classic(&self, key: HistoryKey, payload: SessionPayload) {
        self.store_session(key, payload, CLASSIC_TTL_SECS);
    }

    pub(crate) fn lookup_session(&self, key: &HistoryKey) -> Option<SessionPayload> {
        let now = self.now_ms();
        let found = self.lock().history.get(key, now).cloned();
        debug!(
            "session history: {} for {key:?}",
            if found.is_some() { "hit" } else { "miss" }
        );
        found
    }

    pub(crate) fn remove_session(&self, key: &HistoryKey) {
        if self.lock().history.remove(key).is_some() {
            debug!("session history: removed {key:?}");
        }
    }

    /// Refuse `ticket` for the rest of its lifetime.
    pub(crate) fn revoke_ticket(&self, ticket: &[u8]) {
        let now = self.now_ms();
        debug!("session history: revoking a {}-byte ticket", ticket.len());
        self.lock()
            .revoked
            .insert(ticket.to_vec(), (), now, u64::from(TICKET_LIFETIME_SECS) * 1000);
    }

    pub(crate) fn is_revoked(&self, ticket: &[u8]) -> bool {
        let now = self.now_ms();
        self.lock().revoked.get(&ticket.to_vec(), now).is_some()
    }

    /// The key sealing TLS 1.3 tickets, generated on first use.
    pub(crate) fn ticket_key(&self) -> Result<Zeroizing<[u8; 32]>, TlsError> {
        let mut slot = self.ticket_key.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }
        let key = Zeroizing::new(random_array::<32>()?);
        *slot = Some(key.clone());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA: &str = include_str!("../tests/data/ca.pem");
    const LEAF: &str = include_str!("../tests/data/rsa_server.pem");

    fn classic(id: u8) -> SessionPayload {
        SessionPayload::Classic {
            session_id: vec![id; 32],
            master_secret: Zeroizing::new(vec![id; 48]),
            suite: 0x002F,
            version: crate::ProtocolVersion::Tls12,
        }
    }

    #[test]
    fn test_manual_clock_moves_both_scales() {
        let clock = ManualClock::new(1_900_000_000);
        clock.advance_ms(1_500);
        assert_eq!(clock.now_ms(), 1_500);
        assert_eq!(clock.wall_secs(), 1_900_000_001);
        clock.advance_secs(10);
        assert_eq!(clock.wall_secs(), 1_900_000_011);
    }

    #[test]
    fn test_ca_bundle_ingestion_skips_duplicates() {
        let ctx = SslContext::new(Arc::new(ManualClock::new(0)));
        let bundle = format!("{CA}{LEAF}");
        assert_eq!(ctx.add_ca(bundle.as_bytes()).unwrap(), 2);
        assert_eq!(ctx.add_ca(CA.as_bytes()).unwrap(), 0);
        assert_eq!(ctx.ca_count(), 2);
        assert!(ctx.add_ca(b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n").is_err());
        ctx.shutdown();
        assert_eq!(ctx.ca_count(), 0);
    }

    #[test]
    fn test_classic_sessions_expire_after_an_hour() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = SslContext::new(clock.clone());
        let key = HistoryKey::Peer {
            host: "example.com".into(),
            port: 443,
        };
        ctx.store_classic(key.clone(), classic(1));
        clock.advance_secs(CLASSIC_TTL_SECS - 1);
        assert!(ctx.lookup_session(&key).is_some());
        clock.advance_secs(1);
        assert!(ctx.lookup_session(&key).is_none());
        assert_eq!(ctx.session_count(), 0);
    }

    #[test]
    fn test_validate_all_ca_reports_failures() {
        let ctx = SslContext::new(Arc::new(ManualClock::new(0)));
        let bundle = format!("{CA}{LEAF}");
        assert_eq!(ctx.add_ca_deferred(bundle.as_bytes()).unwrap(), 2);
        assert_eq!(ctx.validate_all_ca(), 1);
        assert_eq!(ctx.ca_count(), 1);
        assert_eq!(ctx.validate_all_ca(), 0);
    }

    #[test]
    fn test_revoked_tickets_lapse_with_their_lifetime() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = SslContext::new(clock.clone());
        ctx.revoke_ticket(b"ticket");
        assert!(ctx.is_revoked(b"ticket"));
        assert!(!ctx.is_revoked(b"other"));
        clock.advance_secs(u64::from(TICKET_LIFETIME_SECS));
        assert!(!ctx.is_revoked(b"ticket"));
    }

    #[test]
    fn test_ticket_key_is_stable_until_shutdown() {
        let ctx = SslContext::new(Arc::new(ManualClock::new(0)));
        let a = ctx.ticket_key().unwrap();
        assert_eq!(*a, *ctx.ticket_key().unwrap());
        ctx.shutdown();
        assert_ne!(*a, *ctx.ticket_key().unwrap());
    }
}
