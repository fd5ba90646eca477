use proptest::prelude::*;
use vcdelta::engine::HashedDictionary;
use vcdelta::vcdiff::varint::{append_i32, append_i64, read_i32, read_i64};
use vcdelta::vcdiff::{
    DecoderOptions, EncoderOptions, FormatFlags, StreamingDecoder, StreamingEncoder, decode_all,
    encode_all,
};

fn format_from(bits: u8) -> FormatFlags {
    FormatFlags::from_bits_truncate(bits)
}

fn encode(dictionary: &[u8], target: &[u8], format: FormatFlags, target_matching: bool) -> Vec<u8> {
    let opts = EncoderOptions {
        format,
        target_matching,
        ..Default::default()
    };
    encode_all(dictionary, target, opts).unwrap()
}

proptest! {
    #[test]
    fn prop_encode_decode_roundtrip(
        dictionary in proptest::collection::vec(any::<u8>(), 0..4096),
        target in proptest::collection::vec(any::<u8>(), 0..4096),
        format in 0u8..4,
        target_matching in any::<bool>()
    ) {
        let delta = encode(&dictionary, &target, format_from(format), target_matching);
        let decoded = decode_all(&dictionary, &delta, DecoderOptions::default()).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_identical_data_is_highly_compressible(
        dictionary in proptest::collection::vec(any::<u8>(), 64..8192)
    ) {
        let delta = encode(&dictionary, &dictionary, FormatFlags::empty(), true);
        prop_assert!(delta.len() < 32, "delta={} target={}", delta.len(), dictionary.len());
    }

    #[test]
    fn prop_small_mutation_keeps_delta_bounded(
        dictionary in proptest::collection::vec(any::<u8>(), 256..8192)
    ) {
        let mut target = dictionary.clone();
        let len = target.len();
        for i in (0..len).step_by((len / 32).max(1)) {
            target[i] = target[i].wrapping_add(1);
        }
        let delta = encode(&dictionary, &target, FormatFlags::empty(), true);
        prop_assert!(
            delta.len() <= target.len() + 512,
            "delta={} target={}",
            delta.len(),
            target.len()
        );
        let decoded = decode_all(&dictionary, &delta, DecoderOptions::default()).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_chunked_decode_matches_whole(
        dictionary in proptest::collection::vec(any::<u8>(), 0..2048),
        target in proptest::collection::vec(any::<u8>(), 0..2048),
        format in 0u8..4,
        chunk in 1usize..64
    ) {
        let delta = encode(&dictionary, &target, format_from(format), true);
        let mut decoder = StreamingDecoder::new(DecoderOptions::default());
        decoder.start(&dictionary);
        let mut out = Vec::new();
        for piece in delta.chunks(chunk) {
            decoder.feed(piece, &mut out).unwrap();
        }
        decoder.finish().unwrap();
        prop_assert_eq!(out, target);
    }

    #[test]
    fn prop_window_split_roundtrip(
        dictionary in proptest::collection::vec(any::<u8>(), 0..1024),
        target in proptest::collection::vec(any::<u8>(), 1..4096),
        window in 1usize..1024
    ) {
        let hashed = HashedDictionary::new(&dictionary).unwrap();
        let opts = EncoderOptions { max_window_size: window, ..Default::default() };
        let mut encoder = StreamingEncoder::new(&hashed, opts).unwrap();
        let mut delta = Vec::new();
        encoder.start(&mut delta).unwrap();
        encoder.feed(&target, &mut delta).unwrap();
        encoder.finish(&mut delta).unwrap();
        prop_assert_eq!(encoder.windows_encoded() as usize, target.len().div_ceil(window));
        let decoded = decode_all(&dictionary, &delta, DecoderOptions::default()).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_decoder_never_panics(
        dictionary in proptest::collection::vec(any::<u8>(), 0..256),
        body in proptest::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut delta = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
        delta.extend_from_slice(&body);
        let limits = DecoderOptions {
            max_target_file_size: 1 << 20,
            max_target_window_size: 1 << 20,
            ..Default::default()
        };
        let _ = decode_all(&dictionary, &delta, limits);
    }

    #[test]
    fn prop_varint32_roundtrip(value in 0..=i32::MAX) {
        let mut out = Vec::new();
        append_i32(&mut out, value).unwrap();
        prop_assert!(out.len() <= 5);
        prop_assert_eq!(read_i32(&out).unwrap(), (value, out.len()));
    }

    #[test]
    fn prop_varint64_roundtrip(value in 0..=i64::MAX) {
        let mut out = Vec::new();
        append_i64(&mut out, value).unwrap();
        prop_assert!(out.len() <= 10);
        prop_assert_eq!(read_i64(&out).unwrap(), (value, out.len()));
    }
}

#[test]
#[ignore = "performance properties are workload and machine dependent"]
fn perf_property_decode_not_pathological() {
    use std::time::Instant;
    let make = |n: usize| -> Vec<u8> { (0..n).map(|i| (i % 251) as u8).collect() };
    let dictionary = make(4 * 1024 * 1024);
    let mut target = dictionary.clone();
    for i in (0..target.len()).step_by(4096) {
        target[i] = target[i].wrapping_add(3);
    }

    let delta = encode(&dictionary, &target, FormatFlags::empty(), true);
    let t0 = Instant::now();
    let decoded = decode_all(&dictionary, &delta, DecoderOptions::default()).unwrap();
    let dt = t0.elapsed();
    assert_eq!(decoded, target);
    assert!(dt.as_secs_f64() < 20.0, "decode took {:?}", dt);
}
