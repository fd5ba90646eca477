// VCDIFF format implementation (RFC 3284 plus the "S" extensions for
// interleaved sections and window checksums).
//
// # Modules
//
// - `varint`:        Variable-length integers (base-128, big-endian)
// - `address_cache`: SELF/HERE/NEAR/SAME compression of COPY addresses
// - `code_table`:    The 256-opcode instruction table and its validator
// - `header`:        File header, indicator bits, window header writer
// - `reader`:        Instruction stream decoding with one-step push-back
// - `writer`:        Instruction encoding and window emission
// - `checksum`:      Zero-seeded Adler-32 for window checksums
// - `window`:        Resumable per-window decode state machine
// - `encoder`:       Streaming encoder driver
// - `decoder`:       Streaming decoder driver

pub mod address_cache;
pub mod checksum;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod reader;
pub mod varint;
pub mod window;
pub mod writer;

// Re-export key types for convenience.
pub use address_cache::AddressCache;
pub use code_table::{CodeTableData, CodeTableEntry, Instruction};
pub use decoder::{DecoderOptions, StreamingDecoder, decode_all, list_instructions};
pub use encoder::{EncoderOptions, StreamingEncoder, encode_all};
pub use header::{FileHeader, FormatFlags, VCDIFF_MAGIC};
pub use reader::CodeTableReader;
pub use writer::CodeTableWriter;
