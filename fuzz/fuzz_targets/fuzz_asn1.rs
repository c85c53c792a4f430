#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = pssl_utils::asn1::Decoder::new(data);
    while !decoder.is_empty() {
        match decoder.read_sequence() {
            Ok(mut inner) => {
                while !inner.is_empty() && inner.read_tlv().is_ok() {}
            }
            Err(_) => {
                if decoder.read_tlv().is_err() {
                    break;
                }
            }
        }
    }
});
