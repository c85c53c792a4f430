//! ASN.1 DER encoding and decoding.

mod decoder;
mod encoder;
mod tag;
mod time;

pub use decoder::{strip_leading_zeros, Decoder};
pub use encoder::Encoder;
pub use time::{datetime_to_unix, unix_to_datetime};

use pssl_types::CryptoError;

/// ASN.1 tag constants (full identifier octets).
pub mod tags {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const UTF8_STRING: u8 = 0x0C;
    pub const PRINTABLE_STRING: u8 = 0x13;
    pub const T61_STRING: u8 = 0x14;
    pub const IA5_STRING: u8 = 0x16;
    pub const UTC_TIME: u8 = 0x17;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const BMP_STRING: u8 = 0x1E;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
    pub const CONTEXT_SPECIFIC: u8 = 0x80;
    pub const CONSTRUCTED: u8 = 0x20;
}

/// Represents a parsed ASN.1 tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

/// ASN.1 tag class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// A borrowed ASN.1 TLV element.
#[derive(Debug, Clone)]
pub struct Tlv<'a> {
    pub tag: Tag,
    pub value: &'a [u8],
    /// The complete encoding (identifier, length and value octets).
    pub raw: &'a [u8],
}

/// Parse one TLV header from the front of `input`.
///
/// Returns the element and the bytes following it. Length fields wider
/// than a machine word, indefinite lengths, and lengths that run past the
/// end of `input` are rejected.
pub fn parse_header(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), CryptoError> {
    let (tag, tag_len) = Tag::from_bytes(input)?;
    let mut pos = tag_len;

    let first = *input.get(pos).ok_or(CryptoError::DecodeAsn1Fail)?;
    pos += 1;

    let length = if first < 0x80 {
        first as usize
    } else if first == 0x80 {
        // Indefinite length is not DER.
        return Err(CryptoError::DecodeAsn1Fail);
    } else {
        let num_bytes = (first & 0x7F) as usize;
        if num_bytes > core::mem::size_of::<usize>() || num_bytes > input.len() - pos {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let mut length: usize = 0;
        for &b in &input[pos..pos + num_bytes] {
            length = (length << 8) | b as usize;
        }
        pos += num_bytes;
        length
    };

    if length > input.len() - pos {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let end = pos + length;
    Ok((
        Tlv {
            tag,
            value: &input[pos..end],
            raw: &input[..end],
        },
        &input[end..],
    ))
}
