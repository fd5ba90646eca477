#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::engine::HashedDictionary;
use vcdelta::vcdiff::{
    DecoderOptions, EncoderOptions, FormatFlags, StreamingDecoder, StreamingEncoder,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // First two bytes are control: format bits, window size and feed chunk.
    let flags = data[0];
    let window = 1 + data[1] as usize * 16;
    let chunk = 1 + (flags >> 4) as usize;
    let payload = &data[2..];

    let split = payload.len() / 2;
    let (dictionary, target) = if flags & 0x08 != 0 {
        payload.split_at(split)
    } else {
        (&[] as &[u8], payload)
    };

    let hashed = HashedDictionary::new(dictionary).unwrap();
    let opts = EncoderOptions {
        format: FormatFlags::from_bits_truncate(flags),
        target_matching: flags & 0x04 == 0,
        max_window_size: window,
    };
    let mut encoder = StreamingEncoder::new(&hashed, opts).unwrap();
    let mut delta = Vec::new();
    encoder.start(&mut delta).unwrap();
    for piece in target.chunks(window * 3) {
        encoder.feed(piece, &mut delta).unwrap();
    }
    encoder.finish(&mut delta).unwrap();

    let mut decoder = StreamingDecoder::new(DecoderOptions::default());
    decoder.start(dictionary);
    let mut out = Vec::new();
    for piece in delta.chunks(chunk) {
        decoder.feed(piece, &mut out).unwrap();
    }
    decoder.finish().unwrap();
    assert_eq!(out, target);
});
