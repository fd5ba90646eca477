//! vcdelta: VCDIFF (RFC 3284) delta encoding/decoding in Rust.
//!
//! The crate provides:
//! - The block-hash match engine (`engine`, `hash`)
//! - The VCDIFF wire format with streaming encoder and decoder (`vcdiff`),
//!   including the SDCH `'S'` extensions (interleaved sections, Adler-32
//!   window checksums)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use vcdelta::vcdiff::{DecoderOptions, EncoderOptions, decode_all, encode_all};
//!
//! let dictionary = b"The quick brown fox jumps over the lazy dog";
//! let target = b"The quick brown fox jumps over the lazy dog, twice";
//!
//! let delta = encode_all(dictionary, target, EncoderOptions::default()).unwrap();
//! let decoded = decode_all(dictionary, &delta, DecoderOptions::default()).unwrap();
//! assert_eq!(decoded, target);
//! ```
//!
//! # Streaming
//!
//! [`vcdiff::StreamingDecoder`] accepts the delta in arbitrary chunks and
//! emits target bytes as soon as they are known.  A session is
//! `start` / `feed`* / `finish`; any error ends it.
//!
//! ```
//! use vcdelta::engine::HashedDictionary;
//! use vcdelta::vcdiff::{DecoderOptions, EncoderOptions, StreamingDecoder, StreamingEncoder};
//!
//! let dictionary = HashedDictionary::new(b"shared dictionary bytes").unwrap();
//! let mut encoder = StreamingEncoder::new(&dictionary, EncoderOptions::default()).unwrap();
//! let mut delta = Vec::new();
//! encoder.start(&mut delta).unwrap();
//! encoder.feed(b"first window, shared dictionary bytes", &mut delta).unwrap();
//! encoder.feed(b"second window", &mut delta).unwrap();
//! encoder.finish(&mut delta).unwrap();
//!
//! let mut decoder = StreamingDecoder::new(DecoderOptions::default());
//! decoder.start(dictionary.as_bytes());
//! let mut target = Vec::new();
//! for chunk in delta.chunks(3) {
//!     decoder.feed(chunk, &mut target).unwrap();
//! }
//! decoder.finish().unwrap();
//! assert_eq!(target, b"first window, shared dictionary bytessecond window");
//! ```

pub mod engine;
pub mod error;
pub mod hash;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, Result};
