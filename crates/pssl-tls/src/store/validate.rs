//! Peer chain validation as a resumable step.
//!
//! Dates and the host name are checked up front. The signature walk then
//! goes leaf first, one verification poll per call, until it reaches a
//! certificate that is an anchor or is signed by one. A chain that hits
//! the validation cache skips the walk.

use super::{CaEntry, CaFetch, CaFetcher, CaFlags, ValidationKey, VALIDATION_TTL_SECS};
use crate::context::SslContext;
use log::{debug, warn};
use pssl_crypto::step::{Progress, StepOp};
use pssl_pki::x509::{matches_host, VerifyOp};
use pssl_pki::Certificate;
use pssl_types::{CertFailure, TlsError};
use std::sync::Arc;

enum State {
    Start,
    /// `chain[index]` against the next certificate in the chain.
    Link { index: usize, op: VerifyOp },
    /// A deferred anchor's own signature, before it is used.
    AnchorSelf { index: usize, anchor: CaEntry, op: VerifyOp },
    /// `chain[index]` against an anchor key.
    Anchor { index: usize, anchor: CaEntry, op: VerifyOp },
    Fetch { index: usize, fetch: Box<dyn CaFetch> },
    Finished,
}

/// Validation of a peer chain (leaf first).
pub struct ChainCheck {
    context: Arc<SslContext>,
    chain: Vec<Certificate>,
    host: Option<String>,
    port: u16,
    fetcher: Option<Arc<dyn CaFetcher>>,
    fetched: bool,
    /// Anchors for the current issuer not tried yet.
    candidates: Vec<CaEntry>,
    state: State,
}

impl ChainCheck {
    /// `host` is checked against the leaf when given (client side).
    pub fn new(
        context: Arc<SslContext>,
        chain: Vec<Certificate>,
        host: Option<String>,
        port: u16,
        fetcher: Option<Arc<dyn CaFetcher>>,
    ) -> Self {
        Self {
            context,
            chain,
            host,
            port,
            fetcher,
            fetched: false,
            candidates: Vec::new(),
            state: State::Start,
        }
    }

    fn reject(&self, cause: CertFailure, cert: Option<&Certificate>) -> TlsError {
        let (subject, issuer) = cert
            .map(|c| (c.subject.to_string(), c.issuer.to_string()))
            .unwrap_or_default();
        warn!("certificate rejected ({cause:?}): subject \"{subject}\" issuer \"{issuer}\"");
        TlsError::CertRejected { cause, subject, issuer }
    }

    fn cache_key(&self) -> Option<ValidationKey> {
        let leaf = self.chain.first()?;
        Some(ValidationKey {
            fingerprint: leaf.fingerprint(),
            size: self.chain.iter().map(|c| c.raw.len()).sum(),
        })
    }

    fn start(&mut self) -> Result<State, TlsError> {
        let Some(leaf) = self.chain.first() else {
            return Err(self.reject(CertFailure::Missing, None));
        };
        let now = self.context.clock().wall_secs();
        if let Some(expired) = self.chain.iter().find(|c| !c.valid_at(now)) {
            return Err(self.reject(CertFailure::BadDate, Some(expired)));
        }
        if let Some(host) = &self.host {
            if !matches_host(leaf, host) {
                return Err(self.reject(CertFailure::Host, Some(leaf)));
            }
        }
        if let Some(key) = self.cache_key() {
            let tick = self.context.now_ms();
            if self.context.lock().validations.get(&key, tick).is_some() {
                debug!("validation cache: hit for \"{}\"", leaf.subject);
                return Ok(State::Finished);
            }
            debug!("validation cache: miss for \"{}\"", leaf.subject);
        }
        self.link(0)
    }

    /// Next step for `chain[index]`.
    fn link(&mut self, index: usize) -> Result<State, TlsError> {
        let cert = &self.chain[index];
        let (in_store, anchors) = {
            let shared = self.context.lock();
            let anchors: Vec<CaEntry> = shared
                .cas
                .find_issuer(&cert.issuer)
                .into_iter()
                .filter_map(|h| shared.cas.get(h).cloned())
                .collect();
            (shared.cas.contains(cert), anchors)
        };
        if in_store {
            return Ok(State::Finished);
        }
        if let Some(parent) = self.chain.get(index + 1).filter(|p| p.subject == cert.issuer) {
            if !parent.is_ca {
                return Err(self.reject(CertFailure::Invalid, Some(parent)));
            }
            if parent.path_len.is_some_and(|n| index > n as usize) {
                return Err(self.reject(CertFailure::Invalid, Some(parent)));
            }
            let op = cert
                .begin_verify_signature(&parent.public_key)
                .map_err(|_| self.reject(CertFailure::Invalid, Some(cert)))?;
            return Ok(State::Link { index, op });
        }
        if anchors.is_empty() {
            return self.fetch_or_fail(index);
        }
        self.candidates = anchors;
        self.next_anchor(index)
    }

    fn next_anchor(&mut self, index: usize) -> Result<State, TlsError> {
        let cert = &self.chain[index];
        let Some(anchor) = self.candidates.pop() else {
            return Err(self.reject(CertFailure::Invalid, Some(cert)));
        };
        if let Some(pending) = &anchor.pending {
            let op = pending
                .begin_verify_signature(&anchor.key)
                .map_err(|_| self.reject(CertFailure::NoTrust, Some(cert)))?;
            return Ok(State::AnchorSelf { index, anchor, op });
        }
        match cert.begin_verify_signature(&anchor.key) {
            Ok(op) => Ok(State::Anchor { index, anchor, op }),
            Err(_) => self.next_anchor(index),
        }
    }

    fn fetch_or_fail(&mut self, index: usize) -> Result<State, TlsError> {
        let cert = &self.chain[index];
        match &self.fetcher {
            Some(fetcher) if !self.fetched => {
                let host = self.host.as_deref().unwrap_or("");
                debug!("ca fetch: requesting \"{}\" for {host}:{}", cert.issuer, self.port);
                let fetch = fetcher.begin(&cert.issuer, host, self.port);
                Ok(State::Fetch { index, fetch })
            }
            _ => Err(self.reject(CertFailure::NoTrust, Some(cert))),
        }
    }

    fn success(&mut self) -> State {
        if let Some(key) = self.cache_key() {
            let tick = self.context.now_ms();
            self.context
                .lock()
                .validations
                .insert(key, tick, tick, VALIDATION_TTL_SECS * 1000);
        }
        State::Finished
    }

    fn advance(&mut self, state: State) -> Result<(State, bool), TlsError> {
        let next = match state {
            State::Start => self.start()?,
            State::Link { index, mut op } => match op.poll() {
                Ok(Progress::Pending) => State::Link { index, op },
                Ok(Progress::Done(())) => self.link(index + 1)?,
                Err(_) => return Err(self.reject(CertFailure::Invalid, Some(&self.chain[index]))),
            },
            State::AnchorSelf { index, anchor, mut op } => match op.poll() {
                Ok(Progress::Pending) => State::AnchorSelf { index, anchor, op },
                Ok(Progress::Done(())) => {
                    self.context.lock().cas.mark_verified(&anchor.subject, &anchor.key);
                    let verified = CaEntry { pending: None, ..anchor };
                    self.candidates.push(verified);
                    self.next_anchor(index)?
                }
                Err(_) => {
                    warn!("ca store: dropping \"{}\", self-signature invalid", anchor.subject);
                    self.context.lock().cas.remove(&anchor.subject, &anchor.key);
                    self.next_anchor(index)?
                }
            },
            State::Anchor { index, anchor, mut op } => match op.poll() {
                Ok(Progress::Pending) => State::Anchor { index, anchor, op },
                Ok(Progress::Done(())) => {
                    debug!("chain anchored at \"{}\"", anchor.subject);
                    self.success()
                }
                Err(_) => self.next_anchor(index)?,
            },
            State::Fetch { index, mut fetch } => match fetch.poll() {
                Ok(Progress::Pending) => State::Fetch { index, fetch },
                Ok(Progress::Done(bytes)) => {
                    self.fetched = true;
                    let flags = CaFlags {
                        internal: false,
                        provider: true,
                    };
                    match self.context.add_ca_with(&bytes, flags, false) {
                        Ok(added) => debug!("ca fetch: {added} anchor(s) added, retrying"),
                        Err(e) => warn!("ca fetch: unusable certificate data: {e}"),
                    }
                    self.link(index)?
                }
                Err(e) => {
                    debug!("ca fetch failed: {e}");
                    return Err(self.reject(CertFailure::Request, Some(&self.chain[index])));
                }
            },
            State::Finished => return Ok((State::Finished, true)),
        };
        let done = matches!(next, State::Finished);
        Ok((next, done))
    }
}

impl ChainCheck {
    /// Perform one bounded unit of validation.
    pub fn poll(&mut self) -> Result<Progress<()>, TlsError> {
        let state = std::mem::replace(&mut self.state, State::Finished);
        let (next, done) = self.advance(state)?;
        self.state = next;
        Ok(if done { Progress::Done(()) } else { Progress::Pending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use std::sync::Mutex;

    const CA: &str = include_str!("../../tests/data/ca.pem");
    const RSA_SERVER: &str = include_str!("../../tests/data/rsa_server.pem");
    const EC_CLIENT: &str = include_str!("../../tests/data/ec_client.pem");

    const NOW: i64 = 1_900_000_000;

    fn chain(pem: &str) -> Vec<Certificate> {
        Certificate::parse_all(pem.as_bytes()).unwrap()
    }

    fn context() -> Arc<SslContext> {
        SslContext::new(Arc::new(ManualClock::new(NOW)))
    }

    fn run(mut check: ChainCheck) -> Result<usize, TlsError> {
        let mut polls = 0;
        loop {
            polls += 1;
            if let Progress::Done(()) = check.poll()? {
                return Ok(polls);
            }
        }
    }

    fn cause(res: Result<usize, TlsError>) -> CertFailure {
        match res {
            Err(TlsError::CertRejected { cause, .. }) => cause,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_anchored_chain_validates_and_is_cached() {
        let ctx = context();
        ctx.add_ca(CA.as_bytes()).unwrap();
        let first = run(ChainCheck::new(ctx.clone(), chain(RSA_SERVER), Some("example.com".into()), 443, None)).unwrap();
        assert!(first >= 2);
        let second = run(ChainCheck::new(ctx.clone(), chain(RSA_SERVER), Some("www.example.com".into()), 443, None)).unwrap();
        assert_eq!(second, 1);
    }

    #[test]
    fn test_host_date_and_trust_failures() {
        let ctx = context();
        let check = |host: &str| ChainCheck::new(ctx.clone(), chain(RSA_SERVER), Some(host.into()), 443, None);
        assert_eq!(cause(run(check("example.com"))), CertFailure::NoTrust);
        ctx.add_ca(CA.as_bytes()).unwrap();
        assert_eq!(cause(run(check("other.com"))), CertFailure::Host);

        let early = SslContext::new(Arc::new(ManualClock::new(1_000_000_000)));
        early.add_ca(CA.as_bytes()).unwrap();
        let res = run(ChainCheck::new(early, chain(RSA_SERVER), None, 443, None));
        assert_eq!(cause(res), CertFailure::BadDate);

        let empty = run(ChainCheck::new(ctx.clone(), Vec::new(), None, 443, None));
        assert_eq!(cause(empty), CertFailure::Missing);
    }

    #[test]
    fn test_chain_with_ca_included_and_client_cert_without_host() {
        let ctx = context();
        ctx.add_ca(CA.as_bytes()).unwrap();
        let mut full = chain(RSA_SERVER);
        full.extend(chain(CA));
        run(ChainCheck::new(ctx.clone(), full, Some("example.com".into()), 443, None)).unwrap();
        run(ChainCheck::new(ctx, chain(EC_CLIENT), None, 0, None)).unwrap();
    }

    #[test]
    fn test_deferred_anchor_is_verified_on_first_use() {
        let ctx = context();
        ctx.add_ca_deferred(CA.as_bytes()).unwrap();
        {
            let shared = ctx.lock();
            let h = shared.cas.find_issuer(&chain(CA)[0].subject)[0];
            assert!(!shared.cas.get(h).unwrap().is_verified());
        }
        run(ChainCheck::new(ctx.clone(), chain(RSA_SERVER), None, 443, None)).unwrap();
        assert!(ctx.lock().cas.contains(&chain(CA)[0]));
    }

    struct Fetcher {
        answer: Option<&'static str>,
        calls: Mutex<Vec<(String, String, u16)>>,
    }

    struct Fetch(Option<&'static str>, u8);

    impl CaFetch for Fetch {
        fn poll(&mut self) -> Result<Progress<Vec<u8>>, TlsError> {
            if self.1 > 0 {
                self.1 -= 1;
                return Ok(Progress::Pending);
            }
            match self.0 {
                Some(pem) => Ok(Progress::Done(pem.as_bytes().to_vec())),
                None => Err(TlsError::Config("no such CA".into())),
            }
        }
    }

    impl CaFetcher for Fetcher {
        fn begin(&self, issuer: &pssl_pki::CertIdent, host: &str, port: u16) -> Box<dyn CaFetch> {
            self.calls
                .lock()
                .unwrap()
                .push((issuer.common_name.clone(), host.to_string(), port));
            Box::new(Fetch(self.answer, 2))
        }
    }

    #[test]
    fn test_ca_fetch_retries_once() {
        let ctx = context();
        let fetcher = Arc::new(Fetcher {
            answer: Some(CA),
            calls: Mutex::new(Vec::new()),
        });
        let check = ChainCheck::new(ctx.clone(), chain(RSA_SERVER), Some("example.com".into()), 8443, Some(fetcher.clone()));
        run(check).unwrap();
        assert_eq!(ctx.ca_count(), 1);
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("protossl test CA".to_string(), "example.com".to_string(), 8443)]);
    }

    #[test]
    fn test_failed_or_useless_fetch() {
        let ctx = context();
        let failing = Arc::new(Fetcher {
            answer: None,
            calls: Mutex::new(Vec::new()),
        });
        let res = run(ChainCheck::new(ctx.clone(), chain(RSA_SERVER), None, 443, Some(failing)));
        assert_eq!(cause(res), CertFailure::Request);

        // A fetch that delivers an unrelated certificate is retried only once.
        let useless = Arc::new(Fetcher {
            answer: Some(EC_CLIENT),
            calls: Mutex::new(Vec::new()),
        });
        let res = run(ChainCheck::new(ctx, chain(RSA_SERVER), None, 443, Some(useless.clone())));
        assert_eq!(cause(res), CertFailure::NoTrust);
        assert_eq!(useless.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unparsable_fetch_falls_through_to_no_trust() {
        let ctx = context();
        let garbage = Arc::new(Fetcher {
            answer: Some("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"),
            calls: Mutex::new(Vec::new()),
        });
        let res = run(ChainCheck::new(ctx.clone(), chain(RSA_SERVER), None, 443, Some(garbage.clone())));
        assert_eq!(cause(res), CertFailure::NoTrust);
        assert_eq!(garbage.calls.lock().unwrap().len(), 1);
        assert_eq!(ctx.ca_count(), 0);
    }
}
