#![no_main]
use libfuzzer_sys::fuzz_target;
use pssl_tls::record::RecordLayer;

fuzz_target!(|data: &[u8]| {
    let mut layer = RecordLayer::new();
    // Split the input at an arbitrary point to exercise partial delivery.
    let cut = data.first().map_or(0, |b| usize::from(*b) % (data.len() + 1));
    layer.feed(&data[..cut]);
    let _ = layer.next_record();
    layer.feed(&data[cut..]);
    while let Ok(Some(_)) = layer.next_record() {}
});
