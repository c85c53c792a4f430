//! Hello extensions: the raw list codec plus typed builders and parsers.

use super::codec::{decode_error, expect_end, put_u16, put_vec16, put_vec8};
use crate::suite::SignatureScheme;
use crate::ProtocolVersion;
use pssl_utils::reader::ByteReader;
use pssl_types::TlsError;

/// Extension type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    pub const SERVER_NAME: Self = Self(0);
    pub const SUPPORTED_GROUPS: Self = Self(10);
    pub const EC_POINT_FORMATS: Self = Self(11);
    pub const SIGNATURE_ALGORITHMS: Self = Self(13);
    pub const ALPN: Self = Self(16);
    pub const PRE_SHARED_KEY: Self = Self(41);
    pub const SUPPORTED_VERSIONS: Self = Self(43);
    pub const COOKIE: Self = Self(44);
    pub const PSK_KEY_EXCHANGE_MODES: Self = Self(45);
    pub const KEY_SHARE: Self = Self(51);
    pub const RENEGOTIATION_INFO: Self = Self(0xFF01);
}

/// `psk_dhe_ke`, the only PSK mode offered or accepted.
pub const PSK_DHE_KE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub typ: ExtensionType,
    pub data: Vec<u8>,
}

impl Extension {
    pub fn new(typ: ExtensionType, data: Vec<u8>) -> Self {
        Self { typ, data }
    }
}

/// Encode an extension list with its 16-bit length prefix. An empty list is
/// omitted entirely.
pub fn encode_extensions(exts: &[Extension], out: &mut Vec<u8>) {
    if exts.is_empty() {
        return;
    }
    let mut body = Vec::new();
    for ext in exts {
        put_u16(&mut body, ext.typ.0);
        put_vec16(&mut body, &ext.data);
    }
    put_vec16(out, &body);
}

/// Decode the extension list at the end of a hello. A missing list is
/// empty; repeated types are rejected.
pub fn decode_extensions(r: &mut ByteReader<'_>) -> Result<Vec<Extension>, TlsError> {
    let mut exts: Vec<Extension> = Vec::new();
    if r.is_empty() {
        return Ok(exts);
    }
    let mut list = ByteReader::new(r.read_vec16());
    while !list.is_empty() {
        let typ = ExtensionType(list.read_u16());
        let data = list.read_vec16().to_vec();
        if list.overrun() {
            return Err(decode_error("extension list"));
        }
        if exts.iter().any(|e| e.typ == typ) {
            return Err(decode_error("duplicate extension"));
        }
        exts.push(Extension { typ, data });
    }
    if r.overrun() {
        return Err(decode_error("extensions"));
    }
    Ok(exts)
}

pub fn find(exts: &[Extension], typ: ExtensionType) -> Option<&[u8]> {
    exts.iter().find(|e| e.typ == typ).map(|e| e.data.as_slice())
}

pub fn server_name(host: &str) -> Extension {
    let mut entry = vec![0u8];
    put_vec16(&mut entry, host.as_bytes());
    let mut data = Vec::new();
    put_vec16(&mut data, &entry);
    Extension::new(ExtensionType::SERVER_NAME, data)
}

/// The `host_name` entry, if any. An empty extension (server echo) is `None`.
pub fn parse_server_name(data: &[u8]) -> Result<Option<String>, TlsError> {
    if data.is_empty() {
        return Ok(None);
    }
    let mut r = ByteReader::new(data);
    let mut list = ByteReader::new(r.read_vec16());
    expect_end(&r, "server_name")?;
    let mut host = None;
    while !list.is_empty() {
        let kind = list.read_u8();
        let name = list.read_vec16();
        if list.overrun() {
            return Err(decode_error("server_name entry"));
        }
        if kind == 0 && host.is_none() {
            let name = std::str::from_utf8(name).map_err(|_| decode_error("server_name utf8"))?;
            host = Some(name.to_string());
        }
    }
    Ok(host)
}

pub fn supported_groups(groups: &[u16]) -> Extension {
    Extension::new(ExtensionType::SUPPORTED_GROUPS, u16_list(groups))
}

fn u16_list(items: &[u16]) -> Vec<u8> {
    let mut body = Vec::with_capacity(items.len() * 2);
    for v in items {
        put_u16(&mut body, *v);
    }
    let mut data = Vec::new();
    put_vec16(&mut data, &body);
    data
}

pub fn parse_u16_list(data: &[u8], what: &'static str) -> Result<Vec<u16>, TlsError> {
    let mut r = ByteReader::new(data);
    let body = r.read_vec16();
    expect_end(&r, what)?;
    if body.len() % 2 != 0 {
        return Err(decode_error(what));
    }
    Ok(body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

/// Uncompressed points only.
pub fn ec_point_formats() -> Extension {
    Extension::new(ExtensionType::EC_POINT_FORMATS, vec![1, 0])
}

pub fn parse_ec_point_formats(data: &[u8]) -> Result<bool, TlsError> {
    let mut r = ByteReader::new(data);
    let formats = r.read_vec8();
    expect_end(&r, "ec_point_formats")?;
    Ok(formats.contains(&0))
}

pub fn signature_algorithms(schemes: &[SignatureScheme]) -> Extension {
    let ids: Vec<u16> = schemes.iter().map(|s| s.0).collect();
    Extension::new(ExtensionType::SIGNATURE_ALGORITHMS, u16_list(&ids))
}

pub fn parse_signature_algorithms(data: &[u8]) -> Result<Vec<SignatureScheme>, TlsError> {
    Ok(parse_u16_list(data, "signature_algorithms")?
        .into_iter()
        .map(SignatureScheme)
        .collect())
}

pub fn alpn(protocols: &[String]) -> Extension {
    let mut body = Vec::new();
    for p in protocols {
        put_vec8(&mut body, p.as_bytes());
    }
    let mut data = Vec::new();
    put_vec16(&mut data, &body);
    Extension::new(ExtensionType::ALPN, data)
}

pub fn parse_alpn(data: &[u8]) -> Result<Vec<String>, TlsError> {
    let mut r = ByteReader::new(data);
    let mut list = ByteReader::new(r.read_vec16());
    expect_end(&r, "alpn")?;
    let mut out = Vec::new();
    while !list.is_empty() {
        let name = list.read_vec8();
        if list.overrun() || name.is_empty() {
            return Err(decode_error("alpn entry"));
        }
        out.push(String::from_utf8_lossy(name).into_owned());
    }
    if out.is_empty() {
        return Err(decode_error("empty alpn list"));
    }
    Ok(out)
}

/// ClientHello form: every version in `[min, max]`, newest first.
pub fn supported_versions_client(min: ProtocolVersion, max: ProtocolVersion) -> Extension {
    let mut body = Vec::new();
    for v in [
        ProtocolVersion::Tls13,
        ProtocolVersion::Tls12,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls10,
    ] {
        if v >= min && v <= max {
            put_u16(&mut body, v.wire());
        }
    }
    let mut data = Vec::new();
    put_vec8(&mut data, &body);
    Extension::new(ExtensionType::SUPPORTED_VERSIONS, data)
}

pub fn parse_supported_versions_client(data: &[u8]) -> Result<Vec<u16>, TlsError> {
    let mut r = ByteReader::new(data);
    let body = r.read_vec8();
    expect_end(&r, "supported_versions")?;
    if body.is_empty() || body.len() % 2 != 0 {
        return Err(decode_error("supported_versions"));
    }
    Ok(body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

pub fn supported_versions_server(version: ProtocolVersion) -> Extension {
    Extension::new(ExtensionType::SUPPORTED_VERSIONS, version.wire().to_be_bytes().to_vec())
}

pub fn parse_u16(data: &[u8], what: &'static str) -> Result<u16, TlsError> {
    let mut r = ByteReader::new(data);
    let v = r.read_u16();
    expect_end(&r, what)?;
    Ok(v)
}

pub fn key_share_client(shares: &[(u16, Vec<u8>)]) -> Extension {
    let mut body = Vec::new();
    for (group, key) in shares {
        put_u16(&mut body, *group);
        put_vec16(&mut body, key);
    }
    let mut data = Vec::new();
    put_vec16(&mut data, &body);
    Extension::new(ExtensionType::KEY_SHARE, data)
}

pub fn parse_key_share_client(data: &[u8]) -> Result<Vec<(u16, Vec<u8>)>, TlsError> {
    let mut r = ByteReader::new(data);
    let mut list = ByteReader::new(r.read_vec16());
    expect_end(&r, "key_share")?;
    let mut out: Vec<(u16, Vec<u8>)> = Vec::new();
    while !list.is_empty() {
        let group = list.read_u16();
        let key = list.read_vec16();
        if list.overrun() || key.is_empty() {
            return Err(decode_error("key_share entry"));
        }
        if out.iter().any(|(g, _)| *g == group) {
            return Err(crate::alert::protocol(
                crate::alert::AlertDescription::IllegalParameter,
                "duplicate key_share group",
            ));
        }
        out.push((group, key.to_vec()));
    }
    Ok(out)
}

pub fn key_share_server(group: u16, key: &[u8]) -> Extension {
    let mut data = Vec::new();
    put_u16(&mut data, group);
    put_vec16(&mut data, key);
    Extension::new(ExtensionType::KEY_SHARE, data)
}

pub fn parse_key_share_server(data: &[u8]) -> Result<(u16, Vec<u8>), TlsError> {
    let mut r = ByteReader::new(data);
    let group = r.read_u16();
    let key = r.read_vec16().to_vec();
    expect_end(&r, "key_share")?;
    Ok((group, key))
}

/// HelloRetryRequest form: just the selected group.
pub fn key_share_retry(group: u16) -> Extension {
    Extension::new(ExtensionType::KEY_SHARE, group.to_be_bytes().to_vec())
}

pub fn cookie(value: &[u8]) -> Extension {
    let mut data = Vec::new();
    put_vec16(&mut data, value);
    Extension::new(ExtensionType::COOKIE, data)
}

pub fn parse_cookie(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut r = ByteReader::new(data);
    let value = r.read_vec16().to_vec();
    expect_end(&r, "cookie")?;
    if value.is_empty() {
        return Err(decode_error("empty cookie"));
    }
    Ok(value)
}

pub fn psk_key_exchange_modes() -> Extension {
    Extension::new(ExtensionType::PSK_KEY_EXCHANGE_MODES, vec![1, PSK_DHE_KE])
}

pub fn parse_psk_key_exchange_modes(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut r = ByteReader::new(data);
    let modes = r.read_vec8().to_vec();
    expect_end(&r, "psk_key_exchange_modes")?;
    Ok(modes)
}

/// An offered PSK identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskIdentity {
    pub identity: Vec<u8>,
    pub obfuscated_age: u32,
}

/// ClientHello `pre_shared_key`; must be the last extension.
pub fn pre_shared_key_client(identities: &[PskIdentity], binders: &[Vec<u8>]) -> Extension {
    let mut ids = Vec::new();
    for id in identities {
        put_vec16(&mut ids, &id.identity);
        ids.extend_from_slice(&id.obfuscated_age.to_be_bytes());
    }
    let mut bs = Vec::new();
    for b in binders {
        put_vec8(&mut bs, b);
    }
    let mut data = Vec::new();
    put_vec16(&mut data, &ids);
    put_vec16(&mut data, &bs);
    Extension::new(ExtensionType::PRE_SHARED_KEY, data)
}

/// Length of the binders list as encoded (with its 2-byte prefix), which is
/// what is cut from the ClientHello before hashing for the binder.
pub fn binders_len(binder_lens: &[usize]) -> usize {
    2 + binder_lens.iter().map(|l| 1 + l).sum::<usize>()
}

pub fn parse_pre_shared_key_client(data: &[u8]) -> Result<(Vec<PskIdentity>, Vec<Vec<u8>>), TlsError> {
    let mut r = ByteReader::new(data);
    let mut ids = ByteReader::new(r.read_vec16());
    let mut bs = ByteReader::new(r.read_vec16());
    expect_end(&r, "pre_shared_key")?;

    let mut identities = Vec::new();
    while !ids.is_empty() {
        let identity = ids.read_vec16().to_vec();
        let obfuscated_age = ids.read_u32();
        if ids.overrun() || identity.is_empty() {
            return Err(decode_error("psk identity"));
        }
        identities.push(PskIdentity {
            identity,
            obfuscated_age,
        });
    }
    let mut binders = Vec::new();
    while !bs.is_empty() {
        let b = bs.read_vec8();
        if bs.overrun() || b.len() < 32 {
            return Err(decode_error("psk binder"));
        }
        binders.push(b.to_vec());
    }
    if identities.is_empty() || identities.len() != binders.len() {
        return Err(decode_error("psk identity and binder counts"));
    }
    Ok((identities, binders))
}

pub fn pre_shared_key_server(selected: u16) -> Extension {
    Extension::new(ExtensionType::PRE_SHARED_KEY, selected.to_be_bytes().to_vec())
}

/// Initial-handshake form: an empty `renegotiated_connection`.
pub fn renegotiation_info() -> Extension {
    Extension::new(ExtensionType::RENEGOTIATION_INFO, vec![0])
}

pub fn parse_renegotiation_info(data: &[u8]) -> Result<(), TlsError> {
    if data != [0] {
        return Err(crate::alert::protocol(
            crate::alert::AlertDescription::HandshakeFailure,
            "renegotiation_info not empty",
        ));
    }
    Ok(())
}
