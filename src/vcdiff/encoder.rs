// Streaming VCDIFF encoder.
//
// StreamingEncoder turns target chunks into delta windows against a shared
// HashedDictionary:
//   - start(out) writes the file header
//   - feed(chunk, out) emits one window per chunk, or several when the
//     chunk exceeds `max_window_size`
//   - finish(out) closes the session
//
// Every window uses the whole dictionary as its source segment; target
// matching only looks inside the current window.

use log::debug;

use super::code_table::CodeTableData;
use super::header::FormatFlags;
use super::writer::CodeTableWriter;
use crate::engine::HashedDictionary;
use crate::error::{Error, Result};

/// Default upper bound on the target bytes per window.
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 64 << 20;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for delta encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Extensions to use; any flag selects the `'S'` header.
    pub format: FormatFlags,
    /// Also look for matches in earlier target bytes of the same window.
    pub target_matching: bool,
    /// Chunks larger than this are split into several windows.
    pub max_window_size: usize,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            format: FormatFlags::empty(),
            target_matching: true,
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingEncoder
// ---------------------------------------------------------------------------

/// Push-style encoder: feed target chunks, receive delta bytes.
#[derive(Debug)]
pub struct StreamingEncoder<'d> {
    dictionary: &'d HashedDictionary,
    options: EncoderOptions,
    writer: CodeTableWriter,
    /// Effective window limit: never lets dictionary + window exceed the
    /// 31-bit address space.
    window_limit: usize,
    started: bool,
    windows_encoded: u64,
    bytes_encoded: u64,
}

impl<'d> StreamingEncoder<'d> {
    /// Encoder over the standard code table.
    pub fn new(dictionary: &'d HashedDictionary, options: EncoderOptions) -> Result<Self> {
        let interleaved = options.format.contains(FormatFlags::INTERLEAVED);
        Self::with_writer(dictionary, options, CodeTableWriter::new(interleaved))
    }

    /// Encoder over a custom code table and address cache sizes.  The
    /// decoder must be configured with the same table.
    pub fn with_code_table(
        dictionary: &'d HashedDictionary,
        options: EncoderOptions,
        table: &CodeTableData,
        near: usize,
        same: usize,
    ) -> Result<Self> {
        let interleaved = options.format.contains(FormatFlags::INTERLEAVED);
        let writer = CodeTableWriter::with_table(table, near, same, interleaved)?;
        Self::with_writer(dictionary, options, writer)
    }

    fn with_writer(
        dictionary: &'d HashedDictionary,
        options: EncoderOptions,
        writer: CodeTableWriter,
    ) -> Result<Self> {
        if options.max_window_size == 0 {
            return Err(Error::invalid_argument("max_window_size must be non-zero"));
        }
        let address_space = i32::MAX as usize - dictionary.len();
        if address_space == 0 {
            return Err(Error::invalid_argument(
                "dictionary leaves no room for target data in a window",
            ));
        }
        Ok(Self {
            dictionary,
            window_limit: options.max_window_size.min(address_space),
            options,
            writer,
            started: false,
            windows_encoded: 0,
            bytes_encoded: 0,
        })
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Windows emitted in the session.
    pub fn windows_encoded(&self) -> u64 {
        self.windows_encoded
    }

    /// Target bytes consumed in the session.
    pub fn bytes_encoded(&self) -> u64 {
        self.bytes_encoded
    }

    /// Begin a session by writing the file header.
    pub fn start(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.writer.write_header(self.options.format, out);
        self.started = true;
        self.windows_encoded = 0;
        self.bytes_encoded = 0;
        debug!(
            "encoding session started: dictionary={} bytes format={:?} target_matching={}",
            self.dictionary.len(),
            self.options.format,
            self.options.target_matching
        );
        Ok(())
    }

    /// Encode `chunk` as one or more windows appended to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if !self.started {
            return Err(Error::invalid_argument("feed called before start"));
        }
        let checksum = self.options.format.contains(FormatFlags::CHECKSUM);
        if chunk.is_empty() {
            return self.dictionary.encode_window(
                chunk,
                self.options.target_matching,
                checksum,
                &mut self.writer,
                out,
            );
        }
        for window in chunk.chunks(self.window_limit) {
            self.dictionary.encode_window(
                window,
                self.options.target_matching,
                checksum,
                &mut self.writer,
                out,
            )?;
            self.windows_encoded += 1;
            self.bytes_encoded += window.len() as u64;
        }
        Ok(())
    }

    /// End the session.  Nothing is buffered between calls, so this only
    /// checks the call order.
    pub fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        if !self.started {
            return Err(Error::invalid_argument("finish called before start"));
        }
        self.started = false;
        debug!(
            "encoding session finished: {} windows, {} target bytes",
            self.windows_encoded, self.bytes_encoded
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Encode `target` against `dictionary` in one call.
pub fn encode_all(dictionary: &[u8], target: &[u8], options: EncoderOptions) -> Result<Vec<u8>> {
    let hashed = HashedDictionary::new(dictionary)?;
    let mut encoder = StreamingEncoder::new(&hashed, options)?;
    let mut out = Vec::with_capacity(target.len() / 4 + 64);
    encoder.start(&mut out)?;
    encoder.feed(target, &mut out)?;
    encoder.finish(&mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
