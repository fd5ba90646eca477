#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::vcdiff::{DecoderOptions, decode_all};

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic, only return errors.
    let limits = DecoderOptions {
        max_target_file_size: 1 << 24,
        max_target_window_size: 1 << 24,
        ..Default::default()
    };
    let _ = decode_all(&[], data, limits.clone());

    // Also fuzz with a non-empty dictionary.
    if data.len() >= 2 {
        let split = data.len() / 2;
        let (dictionary, delta) = data.split_at(split);
        let _ = decode_all(dictionary, delta, limits);
    }
});
