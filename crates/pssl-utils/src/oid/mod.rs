//! Object identifiers known to the certificate and key parsers.

use pssl_types::CryptoError;

macro_rules! oid_table {
    ($( $(#[$m:meta])* $name:ident = [$($b:literal),+] ),+ $(,)?) => {
        /// Identifiers recognised by the parsers, with their encoded content bytes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OidId {
            $( $(#[$m])* $name, )+
        }

        const TABLE: &[(OidId, &[u8])] = &[
            $( (OidId::$name, &[$($b),+]), )+
        ];
    };
}

oid_table! {
    RsaEncryption = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01],
    Md5WithRsa = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x04],
    Sha1WithRsa = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x05],
    Mgf1 = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x08],
    /// RSASSA-PSS (RFC 4055).
    RsaPss = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0a],
    Sha256WithRsa = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b],
    Sha384WithRsa = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0c],
    Sha512WithRsa = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0d],
    EcPublicKey = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01],
    EcdsaWithSha1 = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x01],
    EcdsaWithSha256 = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02],
    EcdsaWithSha384 = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x03],
    EcdsaWithSha512 = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x04],
    /// prime256v1
    Secp256r1 = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07],
    Secp384r1 = [0x2b, 0x81, 0x04, 0x00, 0x22],
    Md5 = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05],
    Sha1 = [0x2b, 0x0e, 0x03, 0x02, 0x1a],
    Sha256 = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
    Sha384 = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
    Sha512 = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
    CountryName = [0x55, 0x04, 0x06],
    StateName = [0x55, 0x04, 0x08],
    LocalityName = [0x55, 0x04, 0x07],
    OrganizationName = [0x55, 0x04, 0x0a],
    OrganizationalUnitName = [0x55, 0x04, 0x0b],
    CommonName = [0x55, 0x04, 0x03],
    KeyUsage = [0x55, 0x1d, 0x0f],
    SubjectAltName = [0x55, 0x1d, 0x11],
    BasicConstraints = [0x55, 0x1d, 0x13],
}

impl OidId {
    /// Look up encoded OID content bytes.
    pub fn from_der(content: &[u8]) -> Option<Self> {
        TABLE
            .iter()
            .find(|(_, der)| *der == content)
            .map(|(id, _)| *id)
    }

    /// Encoded content bytes (no tag or length).
    pub fn der(self) -> &'static [u8] {
        TABLE
            .iter()
            .find(|(id, _)| *id == self)
            .map(|(_, der)| *der)
            .unwrap_or(&[])
    }
}

/// An OID as a sequence of arc values, used for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u64>,
}

impl Oid {
    pub fn new(arcs: &[u64]) -> Self {
        Self {
            arcs: arcs.to_vec(),
        }
    }

    pub fn arcs(&self) -> &[u64] {
        &self.arcs
    }

    /// Decode OID content bytes.
    pub fn from_der_value(data: &[u8]) -> Result<Self, CryptoError> {
        let mut arcs = Vec::new();
        let mut value: u64 = 0;
        let mut pending = false;
        for &byte in data {
            if value >> 57 != 0 {
                return Err(CryptoError::DecodeAsn1Fail);
            }
            value = (value << 7) | (byte & 0x7F) as u64;
            pending = byte & 0x80 != 0;
            if !pending {
                if arcs.is_empty() {
                    let first = (value / 40).min(2);
                    arcs.push(first);
                    arcs.push(value - first * 40);
                } else {
                    arcs.push(value);
                }
                value = 0;
            }
        }
        if pending || arcs.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(Self { arcs })
    }

    /// Encode to content bytes.
    pub fn to_der_value(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if self.arcs.len() < 2 {
            return buf;
        }
        encode_arc(&mut buf, self.arcs[0] * 40 + self.arcs[1]);
        for &arc in &self.arcs[2..] {
            encode_arc(&mut buf, arc);
        }
        buf
    }
}

fn encode_arc(buf: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        buf.push(groups[i] | if i > 0 { 0x80 } else { 0 });
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup_both_ways() {
        let der = OidId::Sha256WithRsa.der();
        assert_eq!(OidId::from_der(der), Some(OidId::Sha256WithRsa));
        assert_eq!(OidId::from_der(&[0x2a, 0x03]), None);
        for (id, der) in TABLE {
            assert_eq!(OidId::from_der(der), Some(*id));
        }
    }

    #[test]
    fn test_table_agrees_with_arc_encoding() {
        let rsa = Oid::new(&[1, 2, 840, 113549, 1, 1, 1]);
        assert_eq!(rsa.to_der_value(), OidId::RsaEncryption.der());
        let p384 = Oid::new(&[1, 3, 132, 0, 34]);
        assert_eq!(p384.to_der_value(), OidId::Secp384r1.der());
    }

    #[test]
    fn test_display() {
        let oid = Oid::from_der_value(OidId::EcPublicKey.der()).unwrap();
        assert_eq!(oid.to_string(), "1.2.840.10045.2.1");
        let cn = Oid::from_der_value(OidId::CommonName.der()).unwrap();
        assert_eq!(cn.to_string(), "2.5.4.3");
    }

    #[test]
    fn test_truncated_arc_rejected() {
        assert!(Oid::from_der_value(&[0x2a, 0x86]).is_err());
        assert!(Oid::from_der_value(&[]).is_err());
    }
}
