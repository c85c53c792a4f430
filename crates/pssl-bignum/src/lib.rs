#![forbid(unsafe_code)]
#![doc = "Big number arithmetic for protossl-rs public-key operations."]

mod bignum;
mod ct;
mod modexp;
mod montgomery;
mod ops;
mod rand;

pub use bignum::{BigNum, DoubleLimb, Limb, LIMB_BITS};
pub use modexp::{ModExp, WINDOW_BITS};
pub use montgomery::MontgomeryCtx;
