use vcdelta::vcdiff::{DecoderOptions, EncoderOptions, FormatFlags, decode_all, encode_all};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dictionary = b"Hello from the shared dictionary";
    let target = b"Hello from the updated shared dictionary";

    let options = EncoderOptions {
        format: FormatFlags::CHECKSUM,
        ..Default::default()
    };
    let delta = encode_all(dictionary, target, options)?;

    let restored = decode_all(dictionary, &delta, DecoderOptions::default())?;
    assert_eq!(restored, target);

    println!(
        "encoded {} bytes -> delta {} bytes -> restored {} bytes",
        target.len(),
        delta.len(),
        restored.len()
    );

    Ok(())
}
