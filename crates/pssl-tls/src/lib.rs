#![forbid(unsafe_code)]
#![doc = "TLS 1.0-1.3 client and server engine for protossl-rs.\n\nConnections are driven by a cooperative `update` tick; public-key work is\nsplit into bounded steps so no single call stalls the caller."]

pub mod alert;
pub mod config;
pub mod connection;
pub mod context;
pub mod crypt;
pub mod handshake;
pub mod pkcs1;
pub mod record;
pub mod store;
pub mod suite;
pub mod transport;

pub use config::{ClientCertPolicy, SslConfig, SslConfigBuilder};
pub use connection::{ConnState, Control, FailReason, SslConnection, Status, StatusValue};
pub use context::{Clock, ManualClock, SslContext, SystemClock};
pub use pkcs1::{Pkcs1Signer, Pkcs1Verifier};
pub use store::{CaFetch, CaFetcher};
pub use transport::{ConnectError, LoopbackTransport, TcpTransport, Transport};

/// Protocol versions, ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl ProtocolVersion {
    pub const fn wire(self) -> u16 {
        match self {
            ProtocolVersion::Tls10 => 0x0301,
            ProtocolVersion::Tls11 => 0x0302,
            ProtocolVersion::Tls12 => 0x0303,
            ProtocolVersion::Tls13 => 0x0304,
        }
    }

    pub const fn from_wire(v: u16) -> Option<Self> {
        match v {
            0x0301 => Some(ProtocolVersion::Tls10),
            0x0302 => Some(ProtocolVersion::Tls11),
            0x0303 => Some(ProtocolVersion::Tls12),
            0x0304 => Some(ProtocolVersion::Tls13),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ProtocolVersion::Tls10 => "TLS1.0",
            ProtocolVersion::Tls11 => "TLS1.1",
            ProtocolVersion::Tls12 => "TLS1.2",
            ProtocolVersion::Tls13 => "TLS1.3",
        }
    }
}

/// Which end of the connection this engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}
