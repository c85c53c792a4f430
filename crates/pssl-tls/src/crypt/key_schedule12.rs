//! Key derivation for TLS 1.0-1.2 (RFC 5246 §6.3, §8.1).

use super::prf::prf;
use crate::suite::CipherSuite;
use crate::ProtocolVersion;
use pssl_types::TlsError;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;

/// Per-direction keys sliced from the key block.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyBlock {
    pub client_mac: Vec<u8>,
    pub server_mac: Vec<u8>,
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
}

/// ```text
/// master_secret = PRF(pre_master_secret, "master secret",
///                     ClientHello.random + ServerHello.random)[0..47]
/// ```
pub fn master_secret(
    version: ProtocolVersion,
    suite: &CipherSuite,
    pre_master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    prf(version, suite.hash, pre_master, "master secret", &seed, MASTER_SECRET_LEN)
}

/// Expand the master secret into MAC keys, cipher keys and IVs, in that
/// order, client before server.
pub fn key_block(
    version: ProtocolVersion,
    suite: &CipherSuite,
    master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<KeyBlock, TlsError> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mac_len = suite.mac_key_len();
    let key_len = suite.key_len();
    let iv_len = suite.fixed_iv_len(version);
    let total = 2 * (mac_len + key_len + iv_len);
    let block = prf(version, suite.hash, master, "key expansion", &seed, total)?;

    let mut rest = &block[..];
    let mut take = |n: usize| {
        let (head, tail) = rest.split_at(n);
        rest = tail;
        head.to_vec()
    };
    Ok(KeyBlock {
        client_mac: take(mac_len),
        server_mac: take(mac_len),
        client_key: take(key_len),
        server_key: take(key_len),
        client_iv: take(iv_len),
        server_iv: take(iv_len),
    })
}

/// Finished `verify_data`; `transcript_hash` is MD5‖SHA-1 below TLS 1.2.
pub fn verify_data(
    version: ProtocolVersion,
    suite: &CipherSuite,
    master: &[u8],
    client: bool,
    transcript_hash: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let label = if client { "client finished" } else { "server finished" };
    let out = prf(version, suite.hash, master, label, transcript_hash, VERIFY_DATA_LEN)?;
    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::hex;

    #[test]
    fn test_key_block_layout_for_cbc_and_gcm() {
        let cbc = CipherSuite::by_id(0x003C).unwrap();
        let kb = key_block(ProtocolVersion::Tls12, cbc, &[7u8; 48], &[1; 32], &[2; 32]).unwrap();
        assert_eq!(kb.client_mac.len(), 32);
        assert_eq!(kb.server_key.len(), 16);
        assert_eq!(kb.client_iv.len(), 16);
        assert_ne!(kb.client_mac, kb.server_mac);

        let gcm = CipherSuite::by_id(0xC030).unwrap();
        let kb = key_block(ProtocolVersion::Tls12, gcm, &[7u8; 48], &[1; 32], &[2; 32]).unwrap();
        assert!(kb.client_mac.is_empty());
        assert_eq!(kb.client_key.len(), 32);
        assert_eq!(kb.server_iv.len(), 4);
    }

    #[test]
    fn test_master_secret_uses_legacy_prf_below_tls12() {
        // Same inputs as the split-secret PRF vector.
        let pre: Vec<u8> = (0..48).collect();
        let mut client = [0u8; 32];
        let mut server = [0u8; 32];
        for i in 0..32 {
            client[i] = i as u8;
            server[i] = 32 + i as u8;
        }
        let suite = CipherSuite::by_id(0x002F).unwrap();
        let ms = master_secret(ProtocolVersion::Tls10, suite, &pre, &client, &server).unwrap();
        assert_eq!(
            *ms,
            hex("539391828d1d131678646180c5bda5c9a2eb62382c8cfb9440545cae85c8c205\
                 b93e0d22161e06be1189235aefca7570")
        );
    }

    #[test]
    fn test_verify_data_differs_by_side() {
        let suite = CipherSuite::by_id(0xC02F).unwrap();
        let c = verify_data(ProtocolVersion::Tls12, suite, &[3; 48], true, &[9; 32]).unwrap();
        let s = verify_data(ProtocolVersion::Tls12, suite, &[3; 48], false, &[9; 32]).unwrap();
        assert_eq!(c.len(), VERIFY_DATA_LEN);
        assert_ne!(c, s);
    }
}
