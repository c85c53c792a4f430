//! Record layer: framing, fragmentation and per-direction protection.

pub mod protection;

use crate::alert::{protocol, AlertDescription};
use crate::ProtocolVersion;
use log::trace;
use protection::RecordCipher;
use pssl_types::TlsError;

/// Largest plaintext fragment (2^14).
pub const MAX_PLAINTEXT: usize = 1 << 14;
pub const HEADER_LEN: usize = 5;
/// Legacy record version frozen for TLS 1.3.
pub const TLS12_WIRE: u16 = 0x0303;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// Record framing state for one connection.
///
/// Bytes from the transport are appended with [`RecordLayer::feed`];
/// [`RecordLayer::next_record`] yields whole records once they have arrived.
pub struct RecordLayer {
    read: Option<RecordCipher>,
    write: Option<RecordCipher>,
    /// Version field written on outgoing records.
    write_version: u16,
    /// TLS 1.0 CBC: split application data with an empty record first.
    split_app_data: bool,
    inbound: Vec<u8>,
    /// Trace-level dumps of every record at 3 and above.
    pub verbosity: u8,
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLayer {
    pub fn new() -> Self {
        Self {
            read: None,
            write: None,
            write_version: ProtocolVersion::Tls10.wire(),
            split_app_data: false,
            inbound: Vec::new(),
            verbosity: 0,
        }
    }

    /// Set the version field for outgoing records. TLS 1.3 writes 0x0303.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.write_version = version.wire().min(TLS12_WIRE);
    }

    pub fn is_reading_protected(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_writing_protected(&self) -> bool {
        self.write.is_some()
    }

    /// Install protection for outgoing records, resetting the sequence number.
    pub fn set_write_cipher(&mut self, cipher: RecordCipher, version: ProtocolVersion, cbc: bool) {
        self.split_app_data = cbc && version == ProtocolVersion::Tls10;
        self.write = Some(cipher);
    }

    /// Install protection for incoming records, resetting the sequence number.
    pub fn set_read_cipher(&mut self, cipher: RecordCipher) {
        self.read = Some(cipher);
    }

    /// Frame (and protect) `payload`, fragmenting at 2^14 bytes.
    pub fn seal(&mut self, ty: ContentType, payload: &[u8]) -> Result<Vec<u8>, TlsError> {
        let mut out = Vec::with_capacity(payload.len() + HEADER_LEN + 64);
        let mut chunks: Vec<&[u8]> = payload.chunks(MAX_PLAINTEXT).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        for chunk in chunks {
            if ty == ContentType::ApplicationData && self.split_app_data && !chunk.is_empty() {
                self.seal_one(ty, &[], &mut out)?;
            }
            self.seal_one(ty, chunk, &mut out)?;
        }
        Ok(out)
    }

    fn seal_one(&mut self, ty: ContentType, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), TlsError> {
        let (outer, body) = match &mut self.write {
            Some(cipher) => cipher.seal(ty, chunk)?,
            None => (ty, chunk.to_vec()),
        };
        if self.verbosity >= 3 {
            trace!("record out: type={:?} len={} plain={}", outer, body.len(), chunk.len());
        }
        out.push(outer as u8);
        out.extend_from_slice(&self.write_version.to_be_bytes());
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(&body);
        Ok(())
    }

    /// Append bytes received from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.inbound.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed as records.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    /// Take the next complete record, removing protection. Returns
    /// `Ok(None)` while the record is still incomplete.
    ///
    /// Empty application-data records (sent by TLS 1.0 CBC peers before
    /// each real one) are absorbed here. A change_cipher_spec record is
    /// always passed through unprotected.
    pub fn next_record(&mut self) -> Result<Option<(ContentType, Vec<u8>)>, TlsError> {
        loop {
            if self.inbound.len() < HEADER_LEN {
                return Ok(None);
            }
            let ty = ContentType::from_u8(self.inbound[0])
                .ok_or_else(|| protocol(AlertDescription::UnexpectedMessage, "unknown record type"))?;
            if self.inbound[1] != 3 {
                return Err(protocol(AlertDescription::ProtocolVersion, "record version"));
            }
            let len = u16::from_be_bytes([self.inbound[3], self.inbound[4]]) as usize;
            let limit = match &self.read {
                Some(cipher) if ty != ContentType::ChangeCipherSpec => cipher.max_ciphertext(),
                _ => MAX_PLAINTEXT,
            };
            if len > limit {
                return Err(protocol(AlertDescription::RecordOverflow, "record too long"));
            }
            if self.inbound.len() < HEADER_LEN + len {
                return Ok(None);
            }
            let fragment: Vec<u8> = self.inbound.drain(..HEADER_LEN + len).skip(HEADER_LEN).collect();

            let (ty, plain) = match &mut self.read {
                Some(cipher) if ty != ContentType::ChangeCipherSpec => cipher.open(ty, &fragment)?,
                _ => (ty, fragment),
            };
            if self.verbosity >= 3 {
                trace!("record in: type={:?} len={}", ty, plain.len());
            }
            if ty == ContentType::ApplicationData && plain.is_empty() {
                continue;
            }
            return Ok(Some((ty, plain)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::CipherSuite;

    fn ciphers(version: ProtocolVersion, id: u16) -> (RecordCipher, RecordCipher) {
        let suite = CipherSuite::by_id(id).unwrap();
        let key = vec![1u8; suite.key_len()];
        let mac = vec![2u8; suite.mac_key_len()];
        let iv = vec![3u8; suite.fixed_iv_len(version)];
        (
            RecordCipher::new(version, suite, &key, &mac, &iv).unwrap(),
            RecordCipher::new(version, suite, &key, &mac, &iv).unwrap(),
        )
    }

    #[test]
    fn test_plaintext_framing_and_partial_delivery() {
        let mut tx = RecordLayer::new();
        tx.set_version(ProtocolVersion::Tls12);
        let wire = tx.seal(ContentType::Handshake, b"hello").unwrap();
        assert_eq!(&wire[..5], &[22, 3, 3, 0, 5]);

        let mut rx = RecordLayer::new();
        rx.feed(&wire[..3]);
        assert!(rx.next_record().unwrap().is_none());
        rx.feed(&wire[3..]);
        let (ty, body) = rx.next_record().unwrap().unwrap();
        assert_eq!(ty, ContentType::Handshake);
        assert_eq!(body, b"hello");
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn test_large_payload_is_fragmented() {
        let mut tx = RecordLayer::new();
        let (w, r) = ciphers(ProtocolVersion::Tls13, 0x1301);
        tx.set_write_cipher(w, ProtocolVersion::Tls13, false);
        tx.set_version(ProtocolVersion::Tls13);
        let payload = vec![0x5a; MAX_PLAINTEXT * 2 + 10];
        let wire = tx.seal(ContentType::ApplicationData, &payload).unwrap();

        let mut rx = RecordLayer::new();
        rx.set_read_cipher(r);
        rx.feed(&wire);
        let mut got = Vec::new();
        while let Some((ty, body)) = rx.next_record().unwrap() {
            assert_eq!(ty, ContentType::ApplicationData);
            assert!(body.len() <= MAX_PLAINTEXT);
            got.extend_from_slice(&body);
        }
        assert_eq!(got, payload);
    }

    #[test]
    fn test_tls10_empty_record_split_is_absorbed() {
        let mut tx = RecordLayer::new();
        let (w, r) = ciphers(ProtocolVersion::Tls10, 0x002F);
        tx.set_write_cipher(w, ProtocolVersion::Tls10, true);
        let wire = tx.seal(ContentType::ApplicationData, b"GET /").unwrap();

        let mut rx = RecordLayer::new();
        rx.set_read_cipher(r);
        rx.feed(&wire);
        let (ty, body) = rx.next_record().unwrap().unwrap();
        assert_eq!(ty, ContentType::ApplicationData);
        assert_eq!(body, b"GET /");
        assert!(rx.next_record().unwrap().is_none());
    }

    #[test]
    fn test_change_cipher_spec_bypasses_protection() {
        let mut rx = RecordLayer::new();
        let (_, r) = ciphers(ProtocolVersion::Tls13, 0x1303);
        rx.set_read_cipher(r);
        rx.feed(&[20, 3, 3, 0, 1, 1]);
        let (ty, body) = rx.next_record().unwrap().unwrap();
        assert_eq!(ty, ContentType::ChangeCipherSpec);
        assert_eq!(body, [1u8]);
    }

    #[test]
    fn test_header_violations() {
        let mut rx = RecordLayer::new();
        rx.feed(&[99, 3, 3, 0, 0]);
        assert!(rx.next_record().is_err());

        let mut rx = RecordLayer::new();
        rx.feed(&[22, 3, 3, 0x40, 0x01]);
        match rx.next_record() {
            Err(TlsError::Protocol { alert, .. }) => {
                assert_eq!(alert, AlertDescription::RecordOverflow as u8)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
