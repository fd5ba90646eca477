use vcdelta::engine::HashedDictionary;
use vcdelta::vcdiff::{
    DecoderOptions, EncoderOptions, FormatFlags, StreamingDecoder, StreamingEncoder,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dictionary = HashedDictionary::new(b"ABCD-ABCD-ABCD-ABCD")?;
    let pieces: [&[u8]; 3] = [b"ABCD-XXXX-", b"ABCD-YYYY-", b"ABCD-ABCD-ABCD-ZZZZ"];

    let mut delta = Vec::new();
    let mut enc = StreamingEncoder::new(
        &dictionary,
        EncoderOptions {
            format: FormatFlags::INTERLEAVED | FormatFlags::CHECKSUM,
            max_window_size: 1024,
            ..Default::default()
        },
    )?;
    enc.start(&mut delta)?;
    for piece in pieces {
        enc.feed(piece, &mut delta)?;
    }
    enc.finish(&mut delta)?;

    // Interleaved windows yield output before the whole window arrives.
    let mut dec = StreamingDecoder::new(DecoderOptions::default());
    dec.start(dictionary.as_bytes());
    let mut out = Vec::new();
    for chunk in delta.chunks(5) {
        dec.feed(chunk, &mut out)?;
    }
    dec.finish()?;

    assert_eq!(out, pieces.concat());
    println!(
        "windows encoded: {}, windows decoded: {}, delta {} bytes",
        enc.windows_encoded(),
        dec.windows_decoded(),
        delta.len()
    );
    Ok(())
}
