//! ASN.1 DER encoder.

use super::tags;
use super::time::unix_to_datetime;

/// A builder for constructing DER-encoded ASN.1 data.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the encoder and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Write a raw TLV with the given identifier octet and value.
    pub fn write_tlv(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        self.buf.push(tag);
        self.write_length(value.len());
        self.buf.extend_from_slice(value);
        self
    }

    fn write_length(&mut self, length: usize) {
        if length < 0x80 {
            self.buf.push(length as u8);
            return;
        }
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        self.buf.push(0x80 | (bytes.len() - skip) as u8);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    /// Write a constructed element whose contents are produced by `f`.
    pub fn write_nested(&mut self, tag: u8, f: impl FnOnce(&mut Encoder)) -> &mut Self {
        let mut inner = Encoder::new();
        f(&mut inner);
        self.write_tlv(tag, &inner.buf)
    }

    /// Write a SEQUENCE whose contents are produced by `f`.
    pub fn write_sequence_with(&mut self, f: impl FnOnce(&mut Encoder)) -> &mut Self {
        self.write_nested(tags::SEQUENCE, f)
    }

    /// Write an unsigned big-endian INTEGER in minimal form.
    pub fn write_integer(&mut self, value: &[u8]) -> &mut Self {
        let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
        let value = &value[start..];
        if value.is_empty() {
            return self.write_tlv(tags::INTEGER, &[0]);
        }
        if value[0] & 0x80 != 0 {
            let mut padded = Vec::with_capacity(value.len() + 1);
            padded.push(0);
            padded.extend_from_slice(value);
            self.write_tlv(tags::INTEGER, &padded)
        } else {
            self.write_tlv(tags::INTEGER, value)
        }
    }

    /// Write a small non-negative INTEGER.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.write_integer(&value.to_be_bytes())
    }

    /// Write an OCTET STRING.
    pub fn write_octet_string(&mut self, value: &[u8]) -> &mut Self {
        self.write_tlv(tags::OCTET_STRING, value)
    }

    /// Write a BIT STRING with the given unused-bits count.
    pub fn write_bit_string(&mut self, unused_bits: u8, value: &[u8]) -> &mut Self {
        let mut content = Vec::with_capacity(value.len() + 1);
        content.push(unused_bits);
        content.extend_from_slice(value);
        self.write_tlv(tags::BIT_STRING, &content)
    }

    /// Write an OID from its encoded content bytes.
    pub fn write_oid(&mut self, oid_bytes: &[u8]) -> &mut Self {
        self.write_tlv(tags::OID, oid_bytes)
    }

    /// Write a NULL.
    pub fn write_null(&mut self) -> &mut Self {
        self.write_tlv(tags::NULL, &[])
    }

    /// Write a SEQUENCE wrapping already-encoded contents.
    pub fn write_sequence(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(tags::SEQUENCE, contents)
    }

    /// Write a SET wrapping already-encoded contents.
    pub fn write_set(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(tags::SET, contents)
    }

    /// Append pre-encoded DER.
    pub fn write_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn write_utf8_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(tags::UTF8_STRING, s.as_bytes())
    }

    pub fn write_printable_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(tags::PRINTABLE_STRING, s.as_bytes())
    }

    pub fn write_ia5_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(tags::IA5_STRING, s.as_bytes())
    }

    pub fn write_boolean(&mut self, val: bool) -> &mut Self {
        self.write_tlv(tags::BOOLEAN, &[if val { 0xFF } else { 0x00 }])
    }

    /// Write a context-specific tagged value.
    pub fn write_context_specific(
        &mut self,
        tag_num: u8,
        constructed: bool,
        content: &[u8],
    ) -> &mut Self {
        let constructed_bit = if constructed { tags::CONSTRUCTED } else { 0 };
        self.write_tlv(
            tags::CONTEXT_SPECIFIC | constructed_bit | (tag_num & 0x1F),
            content,
        )
    }

    /// Write a Time: UTCTime for 1950..2050, GeneralizedTime otherwise.
    pub fn write_time(&mut self, timestamp: i64) -> &mut Self {
        let (year, month, day, hour, min, sec) = unix_to_datetime(timestamp);
        if (1950..2050).contains(&year) {
            let s = format!(
                "{:02}{month:02}{day:02}{hour:02}{min:02}{sec:02}Z",
                year % 100
            );
            self.write_tlv(tags::UTC_TIME, s.as_bytes())
        } else {
            let s = format!("{year:04}{month:02}{day:02}{hour:02}{min:02}{sec:02}Z");
            self.write_tlv(tags::GENERALIZED_TIME, s.as_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::Decoder;

    #[test]
    fn test_long_length_form() {
        let mut enc = Encoder::new();
        enc.write_octet_string(&[0u8; 300]);
        let out = enc.finish();
        assert_eq!(&out[..4], &[0x04, 0x82, 0x01, 0x2C]);
        assert_eq!(out.len(), 304);
    }

    #[test]
    fn test_integer_is_minimal_and_positive() {
        let mut enc = Encoder::new();
        enc.write_integer(&[0x00, 0x00, 0x80]).write_integer(&[]).write_u32(1);
        assert_eq!(
            enc.finish(),
            vec![0x02, 0x02, 0x00, 0x80, 0x02, 0x01, 0x00, 0x02, 0x01, 0x01]
        );
    }

    #[test]
    fn test_nested_sequence_decodes() {
        let mut enc = Encoder::new();
        enc.write_sequence_with(|e| {
            e.write_context_specific(0, true, &[0x02, 0x01, 0x02]);
            e.write_boolean(true);
            e.write_null();
        });
        let der = enc.finish();
        let mut dec = Decoder::new(&der);
        let mut seq = dec.read_sequence().unwrap();
        let ver = seq.read_context_specific(0, true).unwrap();
        assert_eq!(Decoder::new(ver.value).read_small_integer().unwrap(), 2);
        assert!(seq.read_boolean().unwrap());
        seq.read_null().unwrap();
        assert!(seq.is_empty());
    }

    #[test]
    fn test_time_selects_encoding_by_year() {
        let mut enc = Encoder::new();
        enc.write_time(946684800); // 2000-01-01
        enc.write_time(2_556_144_000); // 2051-01-01
        let der = enc.finish();
        assert_eq!(der[0], tags::UTC_TIME);
        assert_eq!(&der[2..15], b"000101000000Z");
        assert_eq!(der[15], tags::GENERALIZED_TIME);

        let mut dec = Decoder::new(&der);
        assert_eq!(dec.read_time().unwrap(), 946684800);
        assert_eq!(dec.read_time().unwrap(), 2_556_144_000);
    }
}
