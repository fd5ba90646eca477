#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::vcdiff::{DecoderOptions, EncoderOptions, FormatFlags, decode_all, encode_all};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let format = FormatFlags::from_bits_truncate(data[0]);
    let target_matching = data[0] & 0x80 == 0;
    let split = 2 + (data[1] as usize % (data.len() - 2));
    let dictionary = &data[2..split];
    let target = &data[split..];

    let opts = EncoderOptions {
        format,
        target_matching,
        ..Default::default()
    };
    let delta = encode_all(dictionary, target, opts).unwrap();
    let decoded = decode_all(dictionary, &delta, DecoderOptions::default()).unwrap();
    assert_eq!(decoded, target);
});
