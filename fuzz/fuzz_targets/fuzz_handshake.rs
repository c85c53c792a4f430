#![no_main]
use libfuzzer_sys::fuzz_target;
use pssl_tls::handshake::codec::{
    decode_encrypted_extensions, CertificateMsg, ClientHello, HandshakeDeframer, NewSessionTicket, ServerHello,
};
use pssl_tls::handshake::HandshakeType;

fuzz_target!(|data: &[u8]| {
    let mut deframer = HandshakeDeframer::default();
    deframer.push(data);
    while let Ok(Some(msg)) = deframer.next_message() {
        let body = msg.body();
        let _ = match msg.typ {
            HandshakeType::ClientHello => ClientHello::decode(body).map(drop),
            HandshakeType::ServerHello => ServerHello::decode(body).map(drop),
            HandshakeType::EncryptedExtensions => decode_encrypted_extensions(body).map(drop),
            HandshakeType::Certificate => CertificateMsg::decode(body, true)
                .and_then(|_| CertificateMsg::decode(body, false))
                .map(drop),
            HandshakeType::NewSessionTicket => NewSessionTicket::decode(body).map(drop),
            _ => Ok(()),
        };
    }
});
