//! Running handshake transcript.
//!
//! The hash is not known until the cipher suite is chosen, so five digests
//! run side by side from the first ClientHello on.

use pssl_crypto::hash::HashCtx;
use pssl_types::HashAlgId;

/// Handshake type of the synthetic `message_hash` message (RFC 8446 §4.4.1).
const MESSAGE_HASH: u8 = 254;

#[derive(Clone)]
pub struct Transcript {
    md5: HashCtx,
    sha1: HashCtx,
    sha256: HashCtx,
    sha384: HashCtx,
    sha512: HashCtx,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            md5: HashCtx::new(HashAlgId::Md5),
            sha1: HashCtx::new(HashAlgId::Sha1),
            sha256: HashCtx::new(HashAlgId::Sha256),
            sha384: HashCtx::new(HashAlgId::Sha384),
            sha512: HashCtx::new(HashAlgId::Sha512),
        }
    }

    /// Absorb one complete handshake message, header included.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha384.update(data);
        self.sha512.update(data);
    }

    fn ctx(&self, alg: HashAlgId) -> Option<&HashCtx> {
        match alg {
            HashAlgId::Md5 => Some(&self.md5),
            HashAlgId::Sha1 => Some(&self.sha1),
            HashAlgId::Sha256 => Some(&self.sha256),
            HashAlgId::Sha384 => Some(&self.sha384),
            HashAlgId::Sha512 => Some(&self.sha512),
            HashAlgId::Md5Sha1 => None,
        }
    }

    /// Transcript hash so far. `Md5Sha1` yields MD5 followed by SHA-1.
    pub fn hash(&self, alg: HashAlgId) -> Vec<u8> {
        match self.ctx(alg) {
            Some(ctx) => ctx.snapshot(),
            None => {
                let mut out = self.md5.snapshot();
                out.extend_from_slice(&self.sha1.snapshot());
                out
            }
        }
    }

    /// Hash of the transcript with `extra` appended, without absorbing it.
    pub fn hash_with(&self, alg: HashAlgId, extra: &[u8]) -> Vec<u8> {
        let mut copy = self.clone();
        copy.update(extra);
        copy.hash(alg)
    }

    /// Replace ClientHello1 with its `message_hash` stand-in after a
    /// HelloRetryRequest.
    pub fn restart_with_message_hash(&mut self, alg: HashAlgId) {
        let ch1 = self.hash(alg);
        let mut synthetic = vec![MESSAGE_HASH, 0, 0, ch1.len() as u8];
        synthetic.extend_from_slice(&ch1);
        *self = Self::new();
        self.update(&synthetic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pssl_crypto::hash::digest;

    #[test]
    fn test_parallel_digests_agree_with_one_shot() {
        let mut t = Transcript::new();
        t.update(b"client hello");
        t.update(b"server hello");
        for alg in [HashAlgId::Md5, HashAlgId::Sha1, HashAlgId::Sha256, HashAlgId::Sha384, HashAlgId::Sha512] {
            assert_eq!(t.hash(alg), digest(alg, b"client helloserver hello"));
        }
        assert_eq!(
            t.hash(HashAlgId::Md5Sha1),
            digest(HashAlgId::Md5Sha1, b"client helloserver hello")
        );
    }

    #[test]
    fn test_hash_with_does_not_absorb() {
        let mut t = Transcript::new();
        t.update(b"abc");
        let peek = t.hash_with(HashAlgId::Sha256, b"def");
        assert_eq!(peek, digest(HashAlgId::Sha256, b"abcdef"));
        assert_eq!(t.hash(HashAlgId::Sha256), digest(HashAlgId::Sha256, b"abc"));
    }

    #[test]
    fn test_message_hash_restart() {
        let mut t = Transcript::new();
        t.update(b"ch1");
        t.restart_with_message_hash(HashAlgId::Sha384);
        let mut expect = vec![254, 0, 0, 48];
        expect.extend_from_slice(&digest(HashAlgId::Sha384, b"ch1"));
        assert_eq!(t.hash(HashAlgId::Sha384), digest(HashAlgId::Sha384, &expect));
    }
}
