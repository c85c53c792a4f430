//! ASN.1 tag parsing and encoding.

use super::{Tag, TagClass};
use pssl_types::CryptoError;

impl Tag {
    /// Parse a tag from the first bytes of `input`.
    /// Returns the tag and number of bytes consumed.
    pub fn from_bytes(input: &[u8]) -> Result<(Self, usize), CryptoError> {
        let first = *input.first().ok_or(CryptoError::DecodeAsn1Fail)?;
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = (first & 0x20) != 0;

        let low_bits = first & 0x1F;
        if low_bits < 0x1F {
            return Ok((
                Tag {
                    class,
                    constructed,
                    number: low_bits as u32,
                },
                1,
            ));
        }

        // High tag number form
        let mut number: u32 = 0;
        let mut i = 1;
        loop {
            let byte = *input.get(i).ok_or(CryptoError::DecodeAsn1Fail)?;
            number = number
                .checked_shl(7)
                .filter(|n| n >> 25 == 0)
                .ok_or(CryptoError::DecodeAsn1Fail)?
                | (byte & 0x7F) as u32;
            i += 1;
            if (byte & 0x80) == 0 {
                break;
            }
        }
        Ok((
            Tag {
                class,
                constructed,
                number,
            },
            i,
        ))
    }

    /// The single identifier octet for low tag numbers.
    pub fn to_byte(&self) -> Option<u8> {
        if self.number >= 0x1F {
            return None;
        }
        let class_bits = match self.class {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        };
        let constructed_bit = if self.constructed { 0x20 } else { 0x00 };
        Some(class_bits | constructed_bit | self.number as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        let (tag, len) = Tag::from_bytes(&[0x30]).unwrap();
        assert_eq!(len, 1);
        assert_eq!(tag.class, TagClass::Universal);
        assert!(tag.constructed);
        assert_eq!(tag.number, 0x10);
        assert_eq!(tag.to_byte(), Some(0x30));
    }

    #[test]
    fn test_context_specific() {
        let (tag, _) = Tag::from_bytes(&[0xA3]).unwrap();
        assert_eq!(tag.class, TagClass::ContextSpecific);
        assert!(tag.constructed);
        assert_eq!(tag.number, 3);
    }

    #[test]
    fn test_long_form_truncated() {
        assert!(Tag::from_bytes(&[0x1F, 0x81]).is_err());
        let (tag, len) = Tag::from_bytes(&[0x1F, 0x81, 0x00]).unwrap();
        assert_eq!(tag.number, 0x80);
        assert_eq!(len, 3);
    }
}
