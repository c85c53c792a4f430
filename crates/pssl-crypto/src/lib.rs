#![forbid(unsafe_code)]
#![doc = "Cryptographic primitives for protossl-rs.\n\nSymmetric algorithms wrap the RustCrypto crates; public-key algorithms are\nimplemented over `pssl-bignum` and exposed as resumable step operations."]

pub mod aead;
pub mod cbc;
mod ecc;
pub mod ecdh;
pub mod ecdsa;
pub mod hash;
pub mod hmac;
pub mod rand;
pub mod rsa;
pub mod step;

pub use step::{Progress, StepOp};
