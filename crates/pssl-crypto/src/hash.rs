//! Message digests over the RustCrypto hash crates.

use md5::Md5;
use pssl_types::HashAlgId;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// A running digest of any supported algorithm.
///
/// Cloning snapshots the state, which is how transcript hashes are read
/// mid-handshake.
#[derive(Clone)]
pub enum HashCtx {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    /// MD5 and SHA-1 side by side, finishing to their 36-byte concatenation.
    Md5Sha1(Md5, Sha1),
}

impl HashCtx {
    pub fn new(alg: HashAlgId) -> Self {
        match alg {
            HashAlgId::Md5 => HashCtx::Md5(Md5::new()),
            HashAlgId::Sha1 => HashCtx::Sha1(Sha1::new()),
            HashAlgId::Sha256 => HashCtx::Sha256(Sha256::new()),
            HashAlgId::Sha384 => HashCtx::Sha384(Sha384::new()),
            HashAlgId::Sha512 => HashCtx::Sha512(Sha512::new()),
            HashAlgId::Md5Sha1 => HashCtx::Md5Sha1(Md5::new(), Sha1::new()),
        }
    }

    pub fn alg(&self) -> HashAlgId {
        match self {
            HashCtx::Md5(_) => HashAlgId::Md5,
            HashCtx::Sha1(_) => HashAlgId::Sha1,
            HashCtx::Sha256(_) => HashAlgId::Sha256,
            HashCtx::Sha384(_) => HashAlgId::Sha384,
            HashCtx::Sha512(_) => HashAlgId::Sha512,
            HashCtx::Md5Sha1(..) => HashAlgId::Md5Sha1,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashCtx::Md5(h) => h.update(data),
            HashCtx::Sha1(h) => h.update(data),
            HashCtx::Sha256(h) => h.update(data),
            HashCtx::Sha384(h) => h.update(data),
            HashCtx::Sha512(h) => h.update(data),
            HashCtx::Md5Sha1(m, s) => {
                m.update(data);
                s.update(data);
            }
        }
    }

    pub fn finish(self) -> Vec<u8> {
        match self {
            HashCtx::Md5(h) => h.finalize().to_vec(),
            HashCtx::Sha1(h) => h.finalize().to_vec(),
            HashCtx::Sha256(h) => h.finalize().to_vec(),
            HashCtx::Sha384(h) => h.finalize().to_vec(),
            HashCtx::Sha512(h) => h.finalize().to_vec(),
            HashCtx::Md5Sha1(m, s) => {
                let mut out = m.finalize().to_vec();
                out.extend_from_slice(&s.finalize());
                out
            }
        }
    }

    /// Digest of everything absorbed so far, leaving the context running.
    pub fn snapshot(&self) -> Vec<u8> {
        self.clone().finish()
    }
}

/// One-shot digest.
pub fn digest(alg: HashAlgId, data: &[u8]) -> Vec<u8> {
    let mut ctx = HashCtx::new(alg);
    ctx.update(data);
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_known_digests_of_abc() {
        assert_eq!(digest(HashAlgId::Md5, b"abc"), hex("900150983cd24fb0d6963f7d28e17f72"));
        assert_eq!(
            digest(HashAlgId::Sha1, b"abc"),
            hex("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            digest(HashAlgId::Sha256, b"abc"),
            hex("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_md5sha1_is_concatenation() {
        let both = digest(HashAlgId::Md5Sha1, b"abc");
        assert_eq!(both.len(), HashAlgId::Md5Sha1.output_len());
        assert_eq!(&both[..16], digest(HashAlgId::Md5, b"abc").as_slice());
        assert_eq!(&both[16..], digest(HashAlgId::Sha1, b"abc").as_slice());
    }

    #[test]
    fn test_snapshot_leaves_context_running() {
        let mut ctx = HashCtx::new(HashAlgId::Sha384);
        ctx.update(b"ab");
        let mid = ctx.snapshot();
        assert_eq!(mid, digest(HashAlgId::Sha384, b"ab"));
        ctx.update(b"c");
        assert_eq!(ctx.finish(), digest(HashAlgId::Sha384, b"abc"));
    }
}
