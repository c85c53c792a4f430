//! Key derivation and transcript hashing.

pub mod hkdf;
pub mod key_schedule;
pub mod key_schedule12;
pub mod prf;
pub mod transcript;

#[cfg(test)]
pub(crate) fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}
