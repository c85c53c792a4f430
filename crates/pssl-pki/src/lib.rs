#![forbid(unsafe_code)]
#![doc = "X.509 certificates, private keys and hostname checks for protossl-rs."]

pub mod pkcs8;
pub mod x509;

pub use pkcs8::PrivateKey;
pub use x509::{CertIdent, Certificate, PublicKey, SignatureAlgorithm};
