//! Handshake message framing and body codecs (RFC 5246 §7.4, RFC 8446 §4).
//!
//! Decoders take the body after the 4-byte header, read every field through
//! a [`ByteReader`] and check its overrun flag once; a short or overlong
//! body is a `decode_error`.

use super::extensions::{decode_extensions, encode_extensions, Extension};
use super::HandshakeType;
use crate::alert::{protocol, AlertDescription};
use crate::suite::{KeyExchange, SignatureScheme};
use crate::ProtocolVersion;
use pssl_types::TlsError;
use pssl_utils::reader::ByteReader;

/// Largest handshake message accepted (certificate chains included).
pub const MAX_HANDSHAKE_LEN: usize = 1 << 17;

/// ServerHello.random of a HelloRetryRequest (SHA-256 of "HelloRetryRequest").
pub const HRR_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

/// Trailing ServerHello.random bytes of a TLS 1.3 server negotiating 1.2.
pub const DOWNGRADE_TLS12: [u8; 8] = *b"DOWNGRD\x01";
/// Trailing ServerHello.random bytes of a TLS 1.2+ server negotiating 1.1 or below.
pub const DOWNGRADE_TLS11: [u8; 8] = *b"DOWNGRD\x00";

pub fn decode_error(what: &str) -> TlsError {
    protocol(AlertDescription::DecodeError, format!("malformed {what}"))
}

/// Fail if the reader overran or left bytes behind.
pub fn expect_end(r: &ByteReader<'_>, what: &str) -> Result<(), TlsError> {
    if r.overrun() || !r.is_empty() {
        return Err(decode_error(what));
    }
    Ok(())
}

pub fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u24(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&(v as u32).to_be_bytes()[1..]);
}

pub fn put_vec8(out: &mut Vec<u8>, data: &[u8]) {
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

pub fn put_vec16(out: &mut Vec<u8>, data: &[u8]) {
    put_u16(out, data.len() as u16);
    out.extend_from_slice(data);
}

pub fn put_vec24(out: &mut Vec<u8>, data: &[u8]) {
    put_u24(out, data.len());
    out.extend_from_slice(data);
}

/// Prefix a body with its handshake header.
pub fn wrap(ty: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.push(ty as u8);
    put_vec24(&mut out, body);
    out
}

/// A complete handshake message as received, header included.
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    pub typ: HandshakeType,
    pub raw: Vec<u8>,
}

impl HandshakeMessage {
    pub fn body(&self) -> &[u8] {
        &self.raw[4..]
    }
}

/// Reassembles handshake messages that span records.
#[derive(Default)]
pub struct HandshakeDeframer {
    buf: Vec<u8>,
}

impl HandshakeDeframer {
    pub fn push(&mut self, fragment: &[u8]) {
        self.buf.extend_from_slice(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The next whole message, if one has arrived.
    pub fn next_message(&mut self) -> Result<Option<HandshakeMessage>, TlsError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([0, self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_HANDSHAKE_LEN {
            return Err(protocol(AlertDescription::DecodeError, "handshake message too long"));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let typ = HandshakeType::from_u8(self.buf[0])
            .ok_or_else(|| protocol(AlertDescription::UnexpectedMessage, "unknown handshake type"))?;
        let raw: Vec<u8> = self.buf.drain(..4 + len).collect();
        Ok(Some(HandshakeMessage { typ, raw }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub compression: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(512);
        put_u16(&mut body, self.legacy_version);
        body.extend_from_slice(&self.random);
        put_vec8(&mut body, &self.session_id);
        let mut suites = Vec::with_capacity(self.cipher_suites.len() * 2);
        for s in &self.cipher_suites {
            put_u16(&mut suites, *s);
        }
        put_vec16(&mut body, &suites);
        put_vec8(&mut body, &self.compression);
        encode_extensions(&self.extensions, &mut body);
        wrap(HandshakeType::ClientHello, &body)
    }

    pub fn decode(body: &[u8]) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        let legacy_version = r.read_u16();
        let random = r.read_array::<32>();
        let session_id = r.read_vec8().to_vec();
        let suites = r.read_vec16();
        let compression = r.read_vec8().to_vec();
        if r.overrun() || session_id.len() > 32 || suites.is_empty() || suites.len() % 2 != 0 {
            return Err(decode_error("ClientHello"));
        }
        let cipher_suites = suites
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        let extensions = decode_extensions(&mut r)?;
        expect_end(&r, "ClientHello")?;
        Ok(Self {
            legacy_version,
            random,
            session_id,
            cipher_suites,
            compression,
            extensions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(128);
        put_u16(&mut body, self.legacy_version);
        body.extend_from_slice(&self.random);
        put_vec8(&mut body, &self.session_id);
        put_u16(&mut body, self.cipher_suite);
        body.push(0);
        encode_extensions(&self.extensions, &mut body);
        wrap(HandshakeType::ServerHello, &body)
    }

    pub fn decode(body: &[u8]) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        let legacy_version = r.read_u16();
        let random = r.read_array::<32>();
        let session_id = r.read_vec8().to_vec();
        let cipher_suite = r.read_u16();
        let compression = r.read_u8();
        if r.overrun() || session_id.len() > 32 {
            return Err(decode_error("ServerHello"));
        }
        if compression != 0 {
            return Err(protocol(AlertDescription::IllegalParameter, "compression selected"));
        }
        let extensions = decode_extensions(&mut r)?;
        expect_end(&r, "ServerHello")?;
        Ok(Self {
            legacy_version,
            random,
            session_id,
            cipher_suite,
            extensions,
        })
    }

    pub fn is_retry_request(&self) -> bool {
        self.random == HRR_RANDOM
    }
}

pub fn encode_encrypted_extensions(exts: &[Extension]) -> Vec<u8> {
    let mut body = Vec::new();
    encode_extensions(exts, &mut body);
    if body.is_empty() {
        body.extend_from_slice(&[0, 0]);
    }
    wrap(HandshakeType::EncryptedExtensions, &body)
}

pub fn decode_encrypted_extensions(body: &[u8]) -> Result<Vec<Extension>, TlsError> {
    let mut r = ByteReader::new(body);
    let exts = decode_extensions(&mut r)?;
    expect_end(&r, "EncryptedExtensions")?;
    Ok(exts)
}

/// Certificate message. `context` and per-entry extensions exist in TLS 1.3
/// only; entry extensions are written empty and skipped on read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateMsg {
    pub context: Vec<u8>,
    pub chain: Vec<Vec<u8>>,
}

impl CertificateMsg {
    pub fn encode(&self, tls13: bool) -> Vec<u8> {
        let mut list = Vec::new();
        for cert in &self.chain {
            put_vec24(&mut list, cert);
            if tls13 {
                put_u16(&mut list, 0);
            }
        }
        let mut body = Vec::with_capacity(list.len() + 8);
        if tls13 {
            put_vec8(&mut body, &self.context);
        }
        put_vec24(&mut body, &list);
        wrap(HandshakeType::Certificate, &body)
    }

    pub fn decode(body: &[u8], tls13: bool) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        let context = if tls13 { r.read_vec8().to_vec() } else { Vec::new() };
        let mut list = ByteReader::new(r.read_vec24());
        expect_end(&r, "Certificate")?;
        let mut chain = Vec::new();
        while !list.is_empty() {
            let cert = list.read_vec24();
            if tls13 {
                list.read_vec16();
            }
            if list.overrun() || cert.is_empty() {
                return Err(decode_error("certificate entry"));
            }
            chain.push(cert.to_vec());
        }
        Ok(Self { context, chain })
    }
}

/// ECDHE ServerKeyExchange: named-curve parameters and their signature.
/// The signature scheme is present from TLS 1.2 on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub curve: u16,
    pub public: Vec<u8>,
    pub scheme: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

/// `ECCurveType.named_curve`.
const NAMED_CURVE: u8 = 3;

impl ServerKeyExchange {
    /// `ServerECDHParams`, the part covered by the signature.
    pub fn params(curve: u16, public: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + public.len());
        out.push(NAMED_CURVE);
        put_u16(&mut out, curve);
        put_vec8(&mut out, public);
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Self::params(self.curve, &self.public);
        if let Some(scheme) = self.scheme {
            put_u16(&mut body, scheme.0);
        }
        put_vec16(&mut body, &self.signature);
        wrap(HandshakeType::ServerKeyExchange, &body)
    }

    pub fn decode(body: &[u8], with_scheme: bool) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        let curve_type = r.read_u8();
        let curve = r.read_u16();
        let public = r.read_vec8().to_vec();
        let scheme = with_scheme.then(|| SignatureScheme(r.read_u16()));
        let signature = r.read_vec16().to_vec();
        expect_end(&r, "ServerKeyExchange")?;
        if curve_type != NAMED_CURVE {
            return Err(protocol(AlertDescription::IllegalParameter, "explicit curve parameters"));
        }
        if public.is_empty() || signature.is_empty() {
            return Err(decode_error("ServerKeyExchange"));
        }
        Ok(Self {
            curve,
            public,
            scheme,
            signature,
        })
    }
}

/// CertificateRequest in its three shapes: certificate types only (TLS
/// 1.0/1.1), types plus signature schemes (1.2), or a context plus a
/// signature_algorithms extension (1.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub context: Vec<u8>,
    pub schemes: Vec<SignatureScheme>,
}

/// `rsa_sign` and `ecdsa_sign` client certificate types.
const CERT_TYPES: [u8; 2] = [1, 64];

impl CertificateRequest {
    pub fn encode(&self, version: ProtocolVersion) -> Vec<u8> {
        let mut body = Vec::new();
        if version == ProtocolVersion::Tls13 {
            put_vec8(&mut body, &self.context);
            let ext = super::extensions::signature_algorithms(&self.schemes);
            encode_extensions(&[ext], &mut body);
        } else {
            put_vec8(&mut body, &CERT_TYPES);
            if version == ProtocolVersion::Tls12 {
                let mut list = Vec::new();
                for s in &self.schemes {
                    put_u16(&mut list, s.0);
                }
                put_vec16(&mut body, &list);
            }
            // No certificate_authorities restriction.
            put_u16(&mut body, 0);
        }
        wrap(HandshakeType::CertificateRequest, &body)
    }

    pub fn decode(body: &[u8], version: ProtocolVersion) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        if version == ProtocolVersion::Tls13 {
            let context = r.read_vec8().to_vec();
            let exts = decode_extensions(&mut r)?;
            expect_end(&r, "CertificateRequest")?;
            let schemes = match super::extensions::find(&exts, super::extensions::ExtensionType::SIGNATURE_ALGORITHMS) {
                Some(data) => super::extensions::parse_signature_algorithms(data)?,
                None => {
                    return Err(protocol(
                        AlertDescription::MissingExtension,
                        "CertificateRequest without signature_algorithms",
                    ))
                }
            };
            return Ok(Self { context, schemes });
        }
        let types = r.read_vec8();
        let schemes = if version == ProtocolVersion::Tls12 {
            let list = r.read_vec16();
            if list.len() % 2 != 0 {
                return Err(decode_error("CertificateRequest"));
            }
            list.chunks_exact(2)
                .map(|c| SignatureScheme(u16::from_be_bytes([c[0], c[1]])))
                .collect()
        } else {
            Vec::new()
        };
        r.read_vec16();
        expect_end(&r, "CertificateRequest")?;
        if types.is_empty() {
            return Err(decode_error("CertificateRequest"));
        }
        Ok(Self {
            context: Vec::new(),
            schemes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub scheme: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.signature.len() + 4);
        if let Some(scheme) = self.scheme {
            put_u16(&mut body, scheme.0);
        }
        put_vec16(&mut body, &self.signature);
        wrap(HandshakeType::CertificateVerify, &body)
    }

    pub fn decode(body: &[u8], with_scheme: bool) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        let scheme = with_scheme.then(|| SignatureScheme(r.read_u16()));
        let signature = r.read_vec16().to_vec();
        expect_end(&r, "CertificateVerify")?;
        if signature.is_empty() {
            return Err(decode_error("CertificateVerify"));
        }
        Ok(Self { scheme, signature })
    }
}

/// ClientKeyExchange: the RSA-encrypted pre-master secret (16-bit length)
/// or the client's ECDH point (8-bit length).
pub fn encode_client_key_exchange(kx: KeyExchange, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 2);
    if kx == KeyExchange::Rsa {
        put_vec16(&mut body, payload);
    } else {
        put_vec8(&mut body, payload);
    }
    wrap(HandshakeType::ClientKeyExchange, &body)
}

pub fn decode_client_key_exchange(body: &[u8], kx: KeyExchange) -> Result<Vec<u8>, TlsError> {
    let mut r = ByteReader::new(body);
    let payload = if kx == KeyExchange::Rsa {
        r.read_vec16()
    } else {
        r.read_vec8()
    };
    expect_end(&r, "ClientKeyExchange")?;
    if payload.is_empty() {
        return Err(decode_error("ClientKeyExchange"));
    }
    Ok(payload.to_vec())
}

pub fn decode_finished(body: &[u8], expected_len: usize) -> Result<&[u8], TlsError> {
    if body.len() != expected_len {
        return Err(decode_error("Finished"));
    }
    Ok(body)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    pub lifetime: u32,
    pub age_add: u32,
    pub nonce: Vec<u8>,
    pub ticket: Vec<u8>,
}

impl NewSessionTicket {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.ticket.len() + 32);
        body.extend_from_slice(&self.lifetime.to_be_bytes());
        body.extend_from_slice(&self.age_add.to_be_bytes());
        put_vec8(&mut body, &self.nonce);
        put_vec16(&mut body, &self.ticket);
        put_u16(&mut body, 0);
        wrap(HandshakeType::NewSessionTicket, &body)
    }

    /// Ticket extensions (early_data limits) are read and ignored.
    pub fn decode(body: &[u8]) -> Result<Self, TlsError> {
        let mut r = ByteReader::new(body);
        let lifetime = r.read_u32();
        let age_add = r.read_u32();
        let nonce = r.read_vec8().to_vec();
        let ticket = r.read_vec16().to_vec();
        r.read_vec16();
        expect_end(&r, "NewSessionTicket")?;
        if ticket.is_empty() {
            return Err(decode_error("NewSessionTicket"));
        }
        Ok(Self {
            lifetime,
            age_add,
            nonce,
            ticket,
        })
    }
}

pub fn encode_key_update(update_requested: bool) -> Vec<u8> {
    wrap(HandshakeType::KeyUpdate, &[update_requested as u8])
}

/// Returns whether the peer asked for an update in return.
pub fn decode_key_update(body: &[u8]) -> Result<bool, TlsError> {
    match body {
        [0] => Ok(false),
        [1] => Ok(true),
        [_] => Err(protocol(AlertDescription::IllegalParameter, "key update request value")),
        _ => Err(decode_error("KeyUpdate")),
    }
}
