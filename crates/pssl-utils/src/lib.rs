#![forbid(unsafe_code)]
#![doc = "Utility functions for protossl-rs: safe byte reader, ASN.1, PEM, OID."]

#[cfg(feature = "reader")]
pub mod reader;

#[cfg(feature = "asn1")]
pub mod asn1;

#[cfg(feature = "pem")]
pub mod pem;

#[cfg(feature = "oid")]
pub mod oid;
