//! ASN.1 DER decoder.

use super::time::{parse_generalized_time, parse_utc_time};
use super::{parse_header, tags, Tag, TagClass, Tlv};
use pssl_types::CryptoError;

/// A streaming ASN.1 DER decoder over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Create a new decoder over the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the remaining undecoded bytes.
    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parse the next TLV element.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, CryptoError> {
        let (tlv, rest) = parse_header(self.data)?;
        self.data = rest;
        Ok(tlv)
    }

    /// Parse the next TLV and require a specific universal identifier octet.
    pub fn read_expected(&mut self, tag_byte: u8) -> Result<Tlv<'a>, CryptoError> {
        let tlv = self.read_tlv()?;
        if tlv.tag.to_byte() != Some(tag_byte) {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv)
    }

    /// Skip the next element whatever its type.
    pub fn skip(&mut self) -> Result<(), CryptoError> {
        self.read_tlv().map(|_| ())
    }

    /// Read an INTEGER and return its content bytes (big-endian, may carry a
    /// leading zero).
    pub fn read_integer(&mut self) -> Result<&'a [u8], CryptoError> {
        let tlv = self.read_expected(tags::INTEGER)?;
        if tlv.value.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv.value)
    }

    /// Read a small non-negative INTEGER.
    pub fn read_small_integer(&mut self) -> Result<u32, CryptoError> {
        let bytes = self.read_integer()?;
        if bytes[0] & 0x80 != 0 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let bytes = strip_leading_zeros(bytes);
        if bytes.len() > 4 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_expected(tags::OCTET_STRING)?.value)
    }

    /// Read a BIT STRING and return (unused_bits, data).
    pub fn read_bit_string(&mut self) -> Result<(u8, &'a [u8]), CryptoError> {
        let tlv = self.read_expected(tags::BIT_STRING)?;
        match tlv.value.split_first() {
            Some((&unused, rest)) if unused < 8 => Ok((unused, rest)),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read an OID and return the raw content bytes.
    pub fn read_oid(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_expected(tags::OID)?.value)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<(), CryptoError> {
        let tlv = self.read_expected(tags::NULL)?;
        if !tlv.value.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(())
    }

    /// Read a SEQUENCE, returning a sub-decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder<'a>, CryptoError> {
        Ok(Decoder::new(self.read_expected(tags::SEQUENCE)?.value))
    }

    /// Read a SEQUENCE and also return its complete encoding.
    pub fn read_sequence_raw(&mut self) -> Result<(Decoder<'a>, &'a [u8]), CryptoError> {
        let tlv = self.read_expected(tags::SEQUENCE)?;
        Ok((Decoder::new(tlv.value), tlv.raw))
    }

    /// Read a SET, returning a sub-decoder over its contents.
    pub fn read_set(&mut self) -> Result<Decoder<'a>, CryptoError> {
        Ok(Decoder::new(self.read_expected(tags::SET)?.value))
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, CryptoError> {
        Tag::from_bytes(self.data).map(|(tag, _)| tag)
    }

    /// Read a BOOLEAN value.
    pub fn read_boolean(&mut self) -> Result<bool, CryptoError> {
        let tlv = self.read_expected(tags::BOOLEAN)?;
        match tlv.value {
            [b] => Ok(*b != 0x00),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read a context-specific tagged value with the expected tag number.
    pub fn read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Tlv<'a>, CryptoError> {
        let tlv = self.read_tlv()?;
        if !is_context(&tlv.tag, tag_num, constructed) {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv)
    }

    /// Read a context-specific element if the next tag matches; otherwise
    /// consume nothing and return `None`.
    pub fn try_read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Option<Tlv<'a>>, CryptoError> {
        if self.is_empty() {
            return Ok(None);
        }
        if is_context(&self.peek_tag()?, tag_num, constructed) {
            Ok(Some(self.read_tlv()?))
        } else {
            Ok(None)
        }
    }

    /// Read a directory string and return it as text.
    ///
    /// UTF8String, PrintableString, IA5String, T61String (as Latin-1) and
    /// BMPString (UTF-16BE) are accepted.
    pub fn read_string(&mut self) -> Result<String, CryptoError> {
        let tlv = self.read_tlv()?;
        match tlv.tag.to_byte() {
            Some(tags::UTF8_STRING | tags::PRINTABLE_STRING | tags::IA5_STRING) => {
                String::from_utf8(tlv.value.to_vec()).map_err(|_| CryptoError::DecodeAsn1Fail)
            }
            Some(tags::T61_STRING) => Ok(tlv.value.iter().map(|&b| b as char).collect()),
            Some(tags::BMP_STRING) => {
                if tlv.value.len() % 2 != 0 {
                    return Err(CryptoError::DecodeAsn1Fail);
                }
                let units: Vec<u16> = tlv
                    .value
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| CryptoError::DecodeAsn1Fail)
            }
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read a Time value (UTCTime or GeneralizedTime) as a UNIX timestamp.
    pub fn read_time(&mut self) -> Result<i64, CryptoError> {
        let tlv = self.read_tlv()?;
        match tlv.tag.to_byte() {
            Some(tags::UTC_TIME) => parse_utc_time(tlv.value),
            Some(tags::GENERALIZED_TIME) => parse_generalized_time(tlv.value),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }
}

fn is_context(tag: &Tag, number: u32, constructed: bool) -> bool {
    tag.class == TagClass::ContextSpecific && tag.number == number && tag.constructed == constructed
}

/// Strip the sign-padding zeros from an unsigned INTEGER body.
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::datetime_to_unix;

    #[test]
    fn test_read_set_and_integer() {
        let data = [0x31, 0x03, 0x02, 0x01, 0x2A];
        let mut dec = Decoder::new(&data);
        let mut set = dec.read_set().unwrap();
        assert_eq!(set.read_integer().unwrap(), &[0x2A]);
        assert!(set.is_empty());
        assert!(dec.is_empty());
    }

    #[test]
    fn test_read_small_integer() {
        let data = [0x02, 0x02, 0x00, 0x80, 0x02, 0x01, 0xFF];
        let mut dec = Decoder::new(&data);
        assert_eq!(dec.read_small_integer().unwrap(), 128);
        // Negative
        assert!(dec.read_small_integer().is_err());
    }

    #[test]
    fn test_wrong_tag_is_rejected() {
        let data = [0x04, 0x01, 0x00];
        let mut dec = Decoder::new(&data);
        assert!(dec.read_integer().is_err());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let data = [0x02, 0x01, 0x05];
        let dec = Decoder::new(&data);
        assert_eq!(dec.peek_tag().unwrap().number, 0x02);
        assert!(!dec.is_empty());
    }

    #[test]
    fn test_try_read_context_specific() {
        // [0] { INTEGER 2 } INTEGER 1
        let data = [0xA0, 0x03, 0x02, 0x01, 0x02, 0x02, 0x01, 0x01];
        let mut dec = Decoder::new(&data);
        assert!(dec.try_read_context_specific(0, true).unwrap().is_some());
        assert!(dec.try_read_context_specific(1, true).unwrap().is_none());
        assert_eq!(dec.read_integer().unwrap(), &[0x01]);
    }

    #[test]
    fn test_read_string_variants() {
        let data = [
            0x0C, 0x02, b'h', b'i', // UTF8String
            0x13, 0x02, b'C', b'N', // PrintableString
            0x14, 0x01, 0xE9, // T61String é
            0x1E, 0x02, 0x00, b'A', // BMPString
        ];
        let mut dec = Decoder::new(&data);
        assert_eq!(dec.read_string().unwrap(), "hi");
        assert_eq!(dec.read_string().unwrap(), "CN");
        assert_eq!(dec.read_string().unwrap(), "é");
        assert_eq!(dec.read_string().unwrap(), "A");
    }

    #[test]
    fn test_read_time_utc_and_generalized() {
        let mut data = vec![0x17, 13];
        data.extend_from_slice(b"260207131915Z");
        data.extend_from_slice(&[0x18, 15]);
        data.extend_from_slice(b"21260114131915Z");
        let mut dec = Decoder::new(&data);
        assert_eq!(
            dec.read_time().unwrap(),
            datetime_to_unix(2026, 2, 7, 13, 19, 15).unwrap()
        );
        assert!(dec.read_time().unwrap() > 4_900_000_000);
    }

    #[test]
    fn test_bit_string_rejects_bad_unused_count() {
        let mut dec = Decoder::new(&[0x03, 0x02, 0x09, 0xFF]);
        assert!(dec.read_bit_string().is_err());
        let mut dec = Decoder::new(&[0x03, 0x00]);
        assert!(dec.read_bit_string().is_err());
    }

    #[test]
    fn test_sequence_raw_covers_header() {
        let data = [0x30, 0x03, 0x02, 0x01, 0x07];
        let mut dec = Decoder::new(&data);
        let (mut inner, raw) = dec.read_sequence_raw().unwrap();
        assert_eq!(raw, &data);
        assert_eq!(inner.read_small_integer().unwrap(), 7);
    }
}
