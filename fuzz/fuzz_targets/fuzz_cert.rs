#![no_main]
use libfuzzer_sys::fuzz_target;
use pssl_pki::Certificate;

fuzz_target!(|data: &[u8]| {
    if let Ok(cert) = Certificate::from_der(data) {
        let _ = cert.subject.to_string();
        let _ = cert.issuer.to_string();
    }
    let _ = Certificate::parse_all(data);
});
