//! Trust anchors.

use log::{debug, warn};
use pssl_crypto::step::StepOp;
use pssl_pki::{CertIdent, Certificate, PublicKey};
use pssl_types::TlsError;

/// Index of an anchor in a [`CaStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaHandle(usize);

/// How an anchor entered the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaFlags {
    /// Added by the embedding application at start-up.
    pub internal: bool,
    /// Delivered by a [`CaFetcher`](super::CaFetcher).
    pub provider: bool,
}

/// One trust anchor. Only the identity and key take part in path
/// building; the certificate is kept when verification was deferred.
#[derive(Debug, Clone)]
pub struct CaEntry {
    pub subject: CertIdent,
    pub key: PublicKey,
    pub flags: CaFlags,
    /// Embedded certificate whose self-signature has not been checked yet.
    pub pending: Option<Certificate>,
}

impl CaEntry {
    pub fn is_verified(&self) -> bool {
        self.pending.is_none()
    }
}

/// Arena of trust anchors. Handles are invalidated by `remove` and `clear`.
#[derive(Debug, Default)]
pub struct CaStore {
    entries: Vec<CaEntry>,
}

impl CaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `cert` as an anchor. With `deferred` its self-signature is
    /// checked the first time it anchors a chain.
    ///
    /// Two anchors with the same subject and key are rejected.
    pub fn add(&mut self, cert: Certificate, flags: CaFlags, deferred: bool) -> Result<CaHandle, TlsError> {
        if self
            .entries
            .iter()
            .any(|e| e.subject == cert.subject && e.key == cert.public_key)
        {
            return Err(TlsError::Config(format!("duplicate CA \"{}\"", cert.subject)));
        }
        debug!("ca store: adding \"{}\" (deferred={deferred})", cert.subject);
        self.entries.push(CaEntry {
            subject: cert.subject.clone(),
            key: cert.public_key.clone(),
            flags,
            pending: deferred.then_some(cert),
        });
        Ok(CaHandle(self.entries.len() - 1))
    }

    pub fn get(&self, handle: CaHandle) -> Option<&CaEntry> {
        self.entries.get(handle.0)
    }

    /// Anchors whose subject is `issuer`.
    pub fn find_issuer(&self, issuer: &CertIdent) -> Vec<CaHandle> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.subject == *issuer)
            .map(|(i, _)| CaHandle(i))
            .collect()
    }

    /// Whether `cert` is itself one of the anchors.
    pub fn contains(&self, cert: &Certificate) -> bool {
        self.entries
            .iter()
            .any(|e| e.subject == cert.subject && e.key == cert.public_key && e.is_verified())
    }

    /// Record that a deferred anchor's self-signature checked out.
    pub fn mark_verified(&mut self, subject: &CertIdent, key: &PublicKey) {
        for e in self.entries.iter_mut().filter(|e| e.subject == *subject && e.key == *key) {
            e.pending = None;
        }
    }

    /// Drop an anchor whose deferred check failed. Later handles shift.
    pub fn remove(&mut self, subject: &CertIdent, key: &PublicKey) {
        self.entries.retain(|e| !(e.subject == *subject && e.key == *key));
    }

    /// Check every deferred anchor's self-signature now. Anchors that fail
    /// are dropped; returns how many were.
    pub fn validate_all(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|e| {
            let Some(cert) = &e.pending else {
                return true;
            };
            let verified = cert
                .begin_verify_signature(&e.key)
                .map_err(|err| err.to_string())
                .and_then(|op| op.run().map_err(|err| err.to_string()));
            match verified {
                Ok(()) => {
                    e.pending = None;
                    true
                }
                Err(err) => {
                    warn!("ca store: dropping \"{}\": {err}", e.subject);
                    false
                }
            }
        });
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
