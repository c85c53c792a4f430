//! Record protection: CBC with HMAC (MAC-then-encrypt) and AEAD.
//!
//! ```text
//! CBC, TLS 1.1+:  IV(16) || E(plaintext || MAC || padding)
//! CBC, TLS 1.0:           E(plaintext || MAC || padding), IV chained
//! GCM, TLS 1.2:   explicit_nonce(8) || ciphertext || tag(16)
//! ChaCha20, 1.2:  ciphertext || tag(16)
//! TLS 1.3:        AEAD(plaintext || type || zeros)
//! ```

use super::{ContentType, MAX_PLAINTEXT, TLS12_WIRE};
use crate::alert::{protocol, AlertDescription};
use crate::suite::{BulkCipher, CipherSuite};
use crate::ProtocolVersion;
use pssl_crypto::aead::{AeadAlg, AeadCipher, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use pssl_crypto::cbc::{AesCbc, AES_BLOCK_SIZE};
use pssl_crypto::hmac::hmac;
use pssl_crypto::rand::random_array;
use pssl_types::{HashAlgId, TlsError};
use subtle::{Choice, ConstantTimeEq, ConstantTimeLess};
use zeroize::Zeroizing;

/// Bytes of explicit nonce before a TLS 1.2 GCM ciphertext.
const GCM_EXPLICIT_LEN: usize = 8;
/// Largest CBC padding (including the length byte).
const MAX_PAD: usize = 256;

enum Kind {
    Cbc {
        cipher: AesCbc,
        mac: HashAlgId,
        mac_key: Zeroizing<Vec<u8>>,
        /// Next IV for TLS 1.0; `None` when IVs are explicit.
        chained_iv: Option<[u8; AES_BLOCK_SIZE]>,
    },
    Aead {
        cipher: AeadCipher,
        /// 4-byte salt for TLS 1.2 GCM, otherwise the 12-byte static IV.
        iv: Zeroizing<Vec<u8>>,
        explicit_nonce: bool,
    },
}

/// Protection state for one direction of a connection.
pub struct RecordCipher {
    version: ProtocolVersion,
    kind: Kind,
    seq: u64,
}

impl RecordCipher {
    /// Build a cipher from the key material of one direction. `mac_key` is
    /// ignored for AEAD suites.
    pub fn new(
        version: ProtocolVersion,
        suite: &CipherSuite,
        key: &[u8],
        mac_key: &[u8],
        iv: &[u8],
    ) -> Result<Self, TlsError> {
        let kind = match suite.bulk {
            BulkCipher::AesCbc { .. } => {
                let chained_iv = if version == ProtocolVersion::Tls10 {
                    let iv: [u8; AES_BLOCK_SIZE] = iv
                        .try_into()
                        .map_err(|_| TlsError::InvalidState("cbc iv length"))?;
                    Some(iv)
                } else {
                    None
                };
                Kind::Cbc {
                    cipher: AesCbc::new(key)?,
                    mac: suite.mac,
                    mac_key: Zeroizing::new(mac_key.to_vec()),
                    chained_iv,
                }
            }
            BulkCipher::Aead(alg) => {
                let explicit_nonce = version < ProtocolVersion::Tls13 && alg != AeadAlg::ChaCha20Poly1305;
                let expect = if explicit_nonce { 4 } else { AEAD_NONCE_LEN };
                if iv.len() != expect {
                    return Err(TlsError::InvalidState("aead iv length"));
                }
                Kind::Aead {
                    cipher: AeadCipher::new(alg, key)?,
                    iv: Zeroizing::new(iv.to_vec()),
                    explicit_nonce,
                }
            }
        };
        Ok(Self { version, kind, seq: 0 })
    }

    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Largest fragment this cipher accepts from the wire.
    pub fn max_ciphertext(&self) -> usize {
        if self.version == ProtocolVersion::Tls13 {
            MAX_PLAINTEXT + 256
        } else {
            MAX_PLAINTEXT + 2048
        }
    }

    fn next_seq(&mut self) -> Result<u64, TlsError> {
        let seq = self.seq;
        self.seq = seq
            .checked_add(1)
            .ok_or_else(|| TlsError::RecordError("sequence number exhausted".into()))?;
        Ok(seq)
    }

    fn nonce(iv: &[u8], seq: u64) -> [u8; AEAD_NONCE_LEN] {
        let mut nonce = [0u8; AEAD_NONCE_LEN];
        nonce.copy_from_slice(iv);
        for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
            *n ^= s;
        }
        nonce
    }

    /// Protect one plaintext fragment. Returns the outer content type and
    /// the fragment body.
    pub fn seal(&mut self, ty: ContentType, plaintext: &[u8]) -> Result<(ContentType, Vec<u8>), TlsError> {
        if plaintext.len() > MAX_PLAINTEXT {
            return Err(TlsError::InvalidState("fragment too large"));
        }
        let seq = self.next_seq()?;
        let version = self.version;
        let wire = version.wire().min(TLS12_WIRE);
        match &mut self.kind {
            Kind::Cbc {
                cipher,
                mac,
                mac_key,
                chained_iv,
            } => {
                let tag = record_mac(*mac, mac_key, seq, ty, wire, plaintext)?;
                let body_len = plaintext.len() + tag.len();
                let pad = AES_BLOCK_SIZE - body_len % AES_BLOCK_SIZE;
                let mut data = Vec::with_capacity(AES_BLOCK_SIZE + body_len + pad);
                let iv = match chained_iv {
                    Some(iv) => *iv,
                    None => {
                        let iv = random_array::<AES_BLOCK_SIZE>()?;
                        data.extend_from_slice(&iv);
                        iv
                    }
                };
                let start = data.len();
                data.extend_from_slice(plaintext);
                data.extend_from_slice(&tag);
                data.resize(data.len() + pad, (pad - 1) as u8);
                let last = cipher.encrypt(&iv, &mut data[start..])?;
                if let Some(next) = chained_iv {
                    *next = last;
                }
                Ok((ty, data))
            }
            Kind::Aead { cipher, iv, .. } if version == ProtocolVersion::Tls13 => {
                let mut inner = Vec::with_capacity(plaintext.len() + 1);
                inner.extend_from_slice(plaintext);
                inner.push(ty as u8);
                let len = (inner.len() + AEAD_TAG_LEN) as u16;
                let mut aad = [0u8; 5];
                aad[0] = ContentType::ApplicationData as u8;
                aad[1..3].copy_from_slice(&TLS12_WIRE.to_be_bytes());
                aad[3..].copy_from_slice(&len.to_be_bytes());
                let sealed = cipher.seal(&Self::nonce(iv, seq), &aad, &inner)?;
                Ok((ContentType::ApplicationData, sealed))
            }
            Kind::Aead {
                cipher,
                iv,
                explicit_nonce,
            } => {
                let aad = legacy_aad(seq, ty, wire, plaintext.len());
                if *explicit_nonce {
                    let mut nonce = [0u8; AEAD_NONCE_LEN];
                    nonce[..4].copy_from_slice(iv);
                    nonce[4..].copy_from_slice(&seq.to_be_bytes());
                    let sealed = cipher.seal(&nonce, &aad, plaintext)?;
                    let mut out = Vec::with_capacity(GCM_EXPLICIT_LEN + sealed.len());
                    out.extend_from_slice(&nonce[4..]);
                    out.extend_from_slice(&sealed);
                    Ok((ty, out))
                } else {
                    let sealed = cipher.seal(&Self::nonce(iv, seq), &aad, plaintext)?;
                    Ok((ty, sealed))
                }
            }
        }
    }

    /// Remove protection from one fragment. Returns the true content type
    /// and the plaintext.
    pub fn open(&mut self, outer: ContentType, fragment: &[u8]) -> Result<(ContentType, Vec<u8>), TlsError> {
        if fragment.len() > self.max_ciphertext() {
            return Err(protocol(AlertDescription::RecordOverflow, "ciphertext too long"));
        }
        let seq = self.next_seq()?;
        let version = self.version;
        let wire = version.wire().min(TLS12_WIRE);
        let bad_mac = || protocol(AlertDescription::BadRecordMac, "record authentication failed");
        match &mut self.kind {
            Kind::Cbc {
                cipher,
                mac,
                mac_key,
                chained_iv,
            } => {
                let (iv, body) = match chained_iv {
                    Some(iv) => (*iv, fragment),
                    None => {
                        if fragment.len() < AES_BLOCK_SIZE {
                            return Err(bad_mac());
                        }
                        let (iv, body) = fragment.split_at(AES_BLOCK_SIZE);
                        let mut arr = [0u8; AES_BLOCK_SIZE];
                        arr.copy_from_slice(iv);
                        (arr, body)
                    }
                };
                let mac_len = mac.output_len();
                if body.is_empty() || body.len() % AES_BLOCK_SIZE != 0 || body.len() < mac_len + 1 {
                    return Err(bad_mac());
                }
                let mut data = body.to_vec();
                let last = cipher.decrypt(&iv, &mut data)?;
                if let Some(next) = chained_iv {
                    *next = last;
                }
                let (content_len, pad_ok) = check_padding(&data, mac_len);
                let expected = record_mac(*mac, mac_key, seq, outer, wire, &data[..content_len])?;
                let mac_ok = data[content_len..content_len + mac_len].ct_eq(&expected);
                if !bool::from(pad_ok & mac_ok) {
                    return Err(bad_mac());
                }
                data.truncate(content_len);
                if data.len() > MAX_PLAINTEXT {
                    return Err(protocol(AlertDescription::RecordOverflow, "plaintext too long"));
                }
                Ok((outer, data))
            }
            Kind::Aead { cipher, iv, .. } if version == ProtocolVersion::Tls13 => {
                if outer != ContentType::ApplicationData {
                    return Err(protocol(AlertDescription::UnexpectedMessage, "unprotected record"));
                }
                if fragment.len() < AEAD_TAG_LEN {
                    return Err(bad_mac());
                }
                let mut aad = [0u8; 5];
                aad[0] = outer as u8;
                aad[1..3].copy_from_slice(&TLS12_WIRE.to_be_bytes());
                aad[3..].copy_from_slice(&(fragment.len() as u16).to_be_bytes());
                let mut inner = cipher
                    .open(&Self::nonce(iv, seq), &aad, fragment)
                    .map_err(|_| bad_mac())?;
                if inner.len() > MAX_PLAINTEXT + 1 {
                    return Err(protocol(AlertDescription::RecordOverflow, "inner plaintext too long"));
                }
                let ty = loop {
                    match inner.pop() {
                        Some(0) => continue,
                        Some(t) => break t,
                        None => {
                            return Err(protocol(AlertDescription::UnexpectedMessage, "record is all padding"))
                        }
                    }
                };
                let ty = ContentType::from_u8(ty)
                    .ok_or_else(|| protocol(AlertDescription::UnexpectedMessage, "inner content type"))?;
                Ok((ty, inner))
            }
            Kind::Aead {
                cipher,
                iv,
                explicit_nonce,
            } => {
                let (nonce, body) = if *explicit_nonce {
                    if fragment.len() < GCM_EXPLICIT_LEN + AEAD_TAG_LEN {
                        return Err(bad_mac());
                    }
                    let mut nonce = [0u8; AEAD_NONCE_LEN];
                    nonce[..4].copy_from_slice(iv);
                    nonce[4..].copy_from_slice(&fragment[..GCM_EXPLICIT_LEN]);
                    (nonce, &fragment[GCM_EXPLICIT_LEN..])
                } else {
                    if fragment.len() < AEAD_TAG_LEN {
                        return Err(bad_mac());
                    }
                    (Self::nonce(iv, seq), fragment)
                };
                let aad = legacy_aad(seq, outer, wire, body.len() - AEAD_TAG_LEN);
                let plaintext = cipher.open(&nonce, &aad, body).map_err(|_| bad_mac())?;
                if plaintext.len() > MAX_PLAINTEXT {
                    return Err(protocol(AlertDescription::RecordOverflow, "plaintext too long"));
                }
                Ok((outer, plaintext))
            }
        }
    }
}

fn legacy_aad(seq: u64, ty: ContentType, wire: u16, len: usize) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = ty as u8;
    aad[9..11].copy_from_slice(&wire.to_be_bytes());
    aad[11..].copy_from_slice(&(len as u16).to_be_bytes());
    aad
}

/// `HMAC(seq || type || version || length || fragment)`.
fn record_mac(
    alg: HashAlgId,
    key: &[u8],
    seq: u64,
    ty: ContentType,
    wire: u16,
    fragment: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let header = legacy_aad(seq, ty, wire, fragment.len());
    Ok(hmac(alg, key, &[&header, fragment])?)
}

/// Inspect the padding of a decrypted CBC body without branching on its
/// contents. Returns the content length (zero when the padding is
/// malformed, so the MAC check still runs) and whether the padding held.
fn check_padding(data: &[u8], mac_len: usize) -> (usize, Choice) {
    let len = data.len();
    let pad = data[len - 1];
    let pad_total = pad as usize + 1;
    let fits = !(len as u64).ct_lt(&((pad_total + mac_len) as u64));

    let mut ok = fits;
    let scan = len.min(MAX_PAD);
    for i in 0..scan {
        let byte = data[len - 1 - i];
        let in_pad = (i as u64).ct_lt(&(pad_total as u64));
        ok &= !in_pad | byte.ct_eq(&pad);
    }

    // Both branches compute a MAC over a prefix of the same length class.
    let content_len = if bool::from(fits) {
        len - pad_total - mac_len
    } else {
        len - mac_len
    };
    (content_len, ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(version: ProtocolVersion, id: u16) -> (RecordCipher, RecordCipher) {
        let suite = CipherSuite::by_id(id).unwrap();
        let key = vec![0x42; suite.key_len()];
        let mac_key = vec![0x17; suite.mac_key_len()];
        let iv = vec![0x99; suite.fixed_iv_len(version)];
        (
            RecordCipher::new(version, suite, &key, &mac_key, &iv).unwrap(),
            RecordCipher::new(version, suite, &key, &mac_key, &iv).unwrap(),
        )
    }

    #[test]
    fn test_every_family_round_trips() {
        let cases = [
            (ProtocolVersion::Tls10, 0x002F),
            (ProtocolVersion::Tls11, 0xC014),
            (ProtocolVersion::Tls12, 0x003D),
            (ProtocolVersion::Tls12, 0xC028),
            (ProtocolVersion::Tls12, 0x009C),
            (ProtocolVersion::Tls12, 0xCCA8),
            (ProtocolVersion::Tls13, 0x1302),
            (ProtocolVersion::Tls13, 0x1303),
        ];
        for (version, id) in cases {
            let (mut tx, mut rx) = pair(version, id);
            for msg in [&b"hello"[..], &[], &[0xAB; 1000]] {
                let (outer, frag) = tx.seal(ContentType::ApplicationData, msg).unwrap();
                let (ty, pt) = rx.open(outer, &frag).unwrap();
                assert_eq!(ty, ContentType::ApplicationData, "{id:04x}");
                assert_eq!(pt, msg, "{id:04x}");
            }
            assert_eq!(tx.sequence(), 3);
            assert_eq!(rx.sequence(), 3);
        }
    }

    #[test]
    fn test_tls13_hides_content_type() {
        let (mut tx, mut rx) = pair(ProtocolVersion::Tls13, 0x1301);
        let (outer, frag) = tx.seal(ContentType::Handshake, b"finished").unwrap();
        assert_eq!(outer, ContentType::ApplicationData);
        assert_eq!(frag.len(), 8 + 1 + AEAD_TAG_LEN);
        let (ty, pt) = rx.open(outer, &frag).unwrap();
        assert_eq!(ty, ContentType::Handshake);
        assert_eq!(pt, b"finished");
    }

    #[test]
    fn test_tls13_all_padding_is_unexpected_message() {
        let suite = CipherSuite::by_id(0x1301).unwrap();
        let key = [0x42; 16];
        let iv = [0x99; 12];
        let mut rx = RecordCipher::new(ProtocolVersion::Tls13, suite, &key, &[], &iv).unwrap();
        let aead = AeadCipher::new(AeadAlg::Aes128Gcm, &key).unwrap();
        let aad = [23, 3, 3, 0, 4 + AEAD_TAG_LEN as u8];
        let frag = aead.seal(&iv, &aad, &[0, 0, 0, 0]).unwrap();
        match rx.open(ContentType::ApplicationData, &frag) {
            Err(TlsError::Protocol { alert, .. }) => {
                assert_eq!(alert, AlertDescription::UnexpectedMessage as u8)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gcm_tls12_carries_sequence_as_explicit_nonce() {
        let (mut tx, _) = pair(ProtocolVersion::Tls12, 0xC02F);
        let (_, first) = tx.seal(ContentType::ApplicationData, b"a").unwrap();
        let (_, second) = tx.seal(ContentType::ApplicationData, b"a").unwrap();
        assert_eq!(&first[..8], &0u64.to_be_bytes());
        assert_eq!(&second[..8], &1u64.to_be_bytes());
        assert_eq!(first.len(), 8 + 1 + AEAD_TAG_LEN);
    }

    #[test]
    fn test_tampering_is_bad_record_mac() {
        for (version, id) in [
            (ProtocolVersion::Tls10, 0x0035),
            (ProtocolVersion::Tls12, 0x003C),
            (ProtocolVersion::Tls12, 0xC030),
            (ProtocolVersion::Tls13, 0x1301),
        ] {
            let (mut tx, mut rx) = pair(version, id);
            let (outer, mut frag) = tx.seal(ContentType::ApplicationData, b"attack at dawn").unwrap();
            let last = frag.len() - 1;
            frag[last] ^= 0x01;
            match rx.open(outer, &frag) {
                Err(TlsError::Protocol { alert, .. }) => {
                    assert_eq!(alert, AlertDescription::BadRecordMac as u8, "{id:04x}")
                }
                other => panic!("{id:04x}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_bad_padding_and_bad_mac_look_the_same() {
        let suite = CipherSuite::by_id(0x003C).unwrap();
        let key = [0x42; 16];
        let mac_key = [0x17; 32];
        let cbc = AesCbc::new(&key).unwrap();
        let iv = [0x55; AES_BLOCK_SIZE];

        let mac = record_mac(HashAlgId::Sha256, &mac_key, 0, ContentType::ApplicationData, TLS12_WIRE, b"hi")
            .unwrap();
        // Valid MAC, padding byte says 3 but the pad bytes disagree.
        let mut body = b"hi".to_vec();
        body.extend_from_slice(&mac);
        body.extend_from_slice(&[9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 3]);
        assert_eq!(body.len() % 16, 0);
        cbc.encrypt(&iv, &mut body).unwrap();
        let mut frag = iv.to_vec();
        frag.extend_from_slice(&body);

        let mut rx = RecordCipher::new(ProtocolVersion::Tls12, suite, &key, &mac_key, &[0; 16]).unwrap();
        let err = rx.open(ContentType::ApplicationData, &frag).unwrap_err();
        let (mut tx, mut rx2) = pair(ProtocolVersion::Tls12, 0x003C);
        let (_, mut good) = tx.seal(ContentType::ApplicationData, b"hi").unwrap();
        good[20] ^= 0x80;
        let err2 = rx2.open(ContentType::ApplicationData, &good).unwrap_err();
        assert_eq!(err.to_string(), err2.to_string());
    }

    #[test]
    fn test_padding_check_shapes() {
        let mut data = vec![0u8; 48];
        // 20-byte MAC, 3 bytes of content, 25 bytes of padding valued 24.
        for b in &mut data[23..] {
            *b = 24;
        }
        let (len, ok) = check_padding(&data, 20);
        assert!(bool::from(ok));
        assert_eq!(len, 3);

        data[30] = 7;
        let (_, ok) = check_padding(&data, 20);
        assert!(!bool::from(ok));

        // Padding length larger than the record leaves room for the MAC only.
        let mut short = vec![0u8; 32];
        short[31] = 200;
        let (len, ok) = check_padding(&short, 20);
        assert!(!bool::from(ok));
        assert_eq!(len, 12);
    }

    #[test]
    fn test_tls10_uses_chained_iv() {
        let (mut tx, mut rx) = pair(ProtocolVersion::Tls10, 0x002F);
        let (_, a) = tx.seal(ContentType::ApplicationData, b"").unwrap();
        let (_, b) = tx.seal(ContentType::ApplicationData, b"data").unwrap();
        // No explicit IV: MAC(20) + padding fits two blocks.
        assert_eq!(a.len(), 32);
        assert_eq!(rx.open(ContentType::ApplicationData, &a).unwrap().1, b"");
        assert_eq!(rx.open(ContentType::ApplicationData, &b).unwrap().1, b"data");
    }

    #[test]
    fn test_oversized_ciphertext_is_record_overflow() {
        let (_, mut rx) = pair(ProtocolVersion::Tls13, 0x1301);
        let big = vec![0u8; MAX_PLAINTEXT + 257];
        match rx.open(ContentType::ApplicationData, &big) {
            Err(TlsError::Protocol { alert, .. }) => {
                assert_eq!(alert, AlertDescription::RecordOverflow as u8)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
