//! Allowed handshake message orderings per role and protocol family.
//!
//! Each table lists `(last received, next received)` pairs. Anything not
//! listed is an `unexpected_message`.

use super::HandshakeType;
use super::HandshakeType::*;
use crate::alert::{protocol, AlertDescription};
use crate::Role;
use pssl_types::TlsError;

/// Position in the inbound message sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum At {
    Start,
    After(HandshakeType),
}

impl At {
    const fn code(self) -> u16 {
        match self {
            At::Start => 0x100,
            At::After(t) => t as u16,
        }
    }
}

use At::{After, Start};

type Table = [(At, HandshakeType)];

const CLIENT_LEGACY: &Table = &[
    (Start, ServerHello),
    (After(ServerHello), Certificate),
    (After(ServerHello), Finished),
    (After(Certificate), ServerKeyExchange),
    (After(Certificate), CertificateRequest),
    (After(Certificate), ServerHelloDone),
    (After(ServerKeyExchange), CertificateRequest),
    (After(ServerKeyExchange), ServerHelloDone),
    (After(CertificateRequest), ServerHelloDone),
    (After(ServerHelloDone), Finished),
];

const CLIENT_TLS13: &Table = &[
    (Start, ServerHello),
    (After(ServerHello), ServerHello),
    (After(ServerHello), EncryptedExtensions),
    (After(EncryptedExtensions), CertificateRequest),
    (After(EncryptedExtensions), Certificate),
    (After(EncryptedExtensions), Finished),
    (After(CertificateRequest), Certificate),
    (After(Certificate), CertificateVerify),
    (After(CertificateVerify), Finished),
    (After(Finished), NewSessionTicket),
    (After(Finished), KeyUpdate),
    (After(NewSessionTicket), NewSessionTicket),
    (After(NewSessionTicket), KeyUpdate),
    (After(KeyUpdate), KeyUpdate),
    (After(KeyUpdate), NewSessionTicket),
];

const SERVER_LEGACY: &Table = &[
    (Start, ClientHello),
    (After(ClientHello), Certificate),
    (After(ClientHello), ClientKeyExchange),
    (After(ClientHello), Finished),
    (After(Certificate), ClientKeyExchange),
    (After(ClientKeyExchange), CertificateVerify),
    (After(ClientKeyExchange), Finished),
    (After(CertificateVerify), Finished),
];

const SERVER_TLS13: &Table = &[
    (Start, ClientHello),
    (After(ClientHello), ClientHello),
    (After(ClientHello), Certificate),
    (After(ClientHello), Finished),
    (After(Certificate), CertificateVerify),
    (After(Certificate), Finished),
    (After(CertificateVerify), Finished),
    (After(Finished), KeyUpdate),
    (After(KeyUpdate), KeyUpdate),
];

const fn has_duplicates(table: &Table) -> bool {
    let mut i = 0;
    while i < table.len() {
        let mut j = i + 1;
        while j < table.len() {
            if table[i].0.code() == table[j].0.code() && table[i].1 as u8 == table[j].1 as u8 {
                return true;
            }
            j += 1;
        }
        i += 1;
    }
    false
}

const _: () = assert!(!has_duplicates(CLIENT_LEGACY));
const _: () = assert!(!has_duplicates(CLIENT_TLS13));
const _: () = assert!(!has_duplicates(SERVER_LEGACY));
const _: () = assert!(!has_duplicates(SERVER_TLS13));

fn table(role: Role, tls13: bool) -> &'static Table {
    match (role, tls13) {
        (Role::Client, false) => CLIENT_LEGACY,
        (Role::Client, true) => CLIENT_TLS13,
        (Role::Server, false) => SERVER_LEGACY,
        (Role::Server, true) => SERVER_TLS13,
    }
}

/// Whether `next` may follow `last`.
pub fn allowed(role: Role, tls13: bool, last: At, next: HandshakeType) -> bool {
    table(role, tls13).iter().any(|(from, to)| *from == last && *to == next)
}

pub fn check(role: Role, tls13: bool, last: At, next: HandshakeType) -> Result<(), TlsError> {
    if allowed(role, tls13, last, next) {
        Ok(())
    } else {
        Err(protocol(
            AlertDescription::UnexpectedMessage,
            format!("{next:?} after {last:?}"),
        ))
    }
}
