// VCDIFF file header and per-window header layout (RFC 3284, Section 4).
//
// The file header is 4 magic bytes followed by the header indicator.  The
// fourth magic byte is 0x00 for plain RFC 3284 and 'S' when the stream uses
// the interleaved layout or window checksums.

use bitflags::bitflags;

use super::varint::{self, VarIntError};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// VCDIFF magic and version
// ---------------------------------------------------------------------------

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];
pub const VERSION_STANDARD: u8 = 0x00;
pub const VERSION_EXTENDED: u8 = b'S';

/// Magic + header indicator.
pub const FILE_HEADER_LEN: usize = 5;

bitflags! {
    /// Header indicator byte (Hdr_Indicator).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderIndicator: u8 {
        const DECOMPRESS = 0x01;
        const CODETABLE = 0x02;
    }
}

bitflags! {
    /// Window indicator byte (Win_Indicator).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WinIndicator: u8 {
        const SOURCE = 0x01;
        const TARGET = 0x02;
        const CHECKSUM = 0x04;
    }
}

bitflags! {
    /// Delta indicator byte (Delta_Indicator): secondary compression per section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 0x01;
        const INSTCOMP = 0x02;
        const ADDRCOMP = 0x04;
    }
}

bitflags! {
    /// Encoder output format extensions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct FormatFlags: u8 {
        /// One combined section per window; lets a decoder emit output
        /// before the whole window has arrived.
        const INTERLEAVED = 0x01;
        /// Adler-32 of each target window in the window header.
        const CHECKSUM = 0x02;
    }
}

impl FormatFlags {
    /// Whether the file must carry the extended ('S') magic.
    #[inline]
    pub fn is_extended(self) -> bool {
        !self.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Byte cursor
// ---------------------------------------------------------------------------

/// A cursor over partially received input.  Running off the end yields
/// `Error::EndOfData`; the caller decides whether that is recoverable.
#[derive(Debug)]
pub struct ParseableChunk<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ParseableChunk<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn unparsed(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    pub fn unparsed_len(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.unparsed_len());
        self.pos += n;
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(Error::EndOfData)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a 32-bit varint; a malformed value is reported as `what`.
    pub fn read_i32(&mut self, what: &str) -> Result<usize> {
        match varint::read_usize(self.unparsed()) {
            Ok((v, len)) => {
                self.pos += len;
                Ok(v)
            }
            Err(VarIntError::EndOfBuffer) => Err(Error::EndOfData),
            Err(_) => Err(Error::protocol(format!("invalid {what} (varint overflow)"))),
        }
    }

    /// Read a 64-bit varint; a malformed value is reported as `what`.
    pub fn read_i64(&mut self, what: &str) -> Result<i64> {
        match varint::read_i64(self.unparsed()) {
            Ok((v, len)) => {
                self.pos += len;
                Ok(v)
            }
            Err(VarIntError::EndOfBuffer) => Err(Error::EndOfData),
            Err(_) => Err(Error::protocol(format!("invalid {what} (varint overflow)"))),
        }
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Fourth magic byte: `VERSION_STANDARD` or `VERSION_EXTENDED`.
    pub version: u8,
}

impl FileHeader {
    pub fn for_format(format: FormatFlags) -> Self {
        let version = if format.is_extended() {
            VERSION_EXTENDED
        } else {
            VERSION_STANDARD
        };
        Self { version }
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        self.version == VERSION_EXTENDED
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&VCDIFF_MAGIC);
        out.push(self.version);
        out.push(0); // header indicator
    }

    /// Parse the file header.  Fails with `EndOfData` if fewer than five
    /// bytes are available and every available byte is still plausible.
    pub fn parse(chunk: &mut ParseableChunk<'_>) -> Result<Self> {
        for (i, &expected) in VCDIFF_MAGIC.iter().enumerate() {
            let b = chunk.read_byte()?;
            if b != expected {
                return Err(Error::protocol(format!(
                    "invalid VCDIFF magic: byte {i} is {b:#04X}, expected {expected:#04X}"
                )));
            }
        }

        let version = chunk.read_byte()?;
        if version != VERSION_STANDARD && version != VERSION_EXTENDED {
            return Err(Error::protocol(format!(
                "unsupported VCDIFF version {version:#04X}"
            )));
        }

        let hdr_ind = chunk.read_byte()?;
        let known = HeaderIndicator::from_bits_truncate(hdr_ind);
        if known.contains(HeaderIndicator::DECOMPRESS) {
            return Err(Error::protocol(
                "secondary compression is not supported",
            ));
        }
        if known.contains(HeaderIndicator::CODETABLE) {
            return Err(Error::protocol(
                "custom code tables in the delta file are not supported",
            ));
        }
        if hdr_ind != 0 {
            return Err(Error::protocol(format!(
                "invalid header indicator bits: {hdr_ind:#04X}"
            )));
        }

        Ok(Self { version })
    }
}

// ---------------------------------------------------------------------------
// Per-window header (writer side)
// ---------------------------------------------------------------------------

/// Fields of a window header as emitted by the encoder.  The decoder
/// validates the same fields incrementally in `window`.
#[derive(Debug, Clone, Default)]
pub struct WindowHeader {
    pub win_ind: u8,
    /// Source segment `(length, position)` when SOURCE or TARGET is set.
    pub source_segment: Option<(usize, usize)>,
    pub target_window_len: usize,
    pub data_len: usize,
    pub inst_len: usize,
    pub addr_len: usize,
    pub checksum: Option<u32>,
}

impl WindowHeader {
    /// Length of the delta encoding: everything after the DeltaLen field.
    pub fn delta_encoding_len(&self) -> usize {
        let mut len = varint::sizeof_i64(self.target_window_len as i64);
        len += 1; // delta indicator
        len += varint::sizeof_i64(self.data_len as i64);
        len += varint::sizeof_i64(self.inst_len as i64);
        len += varint::sizeof_i64(self.addr_len as i64);
        if let Some(c) = self.checksum {
            len += varint::sizeof_i64(i64::from(c));
        }
        len + self.data_len + self.inst_len + self.addr_len
    }

    /// Append the header fields up to and including the checksum.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(self.win_ind);
        if let Some((len, pos)) = self.source_segment {
            varint::append_i32(out, to_i32(len, "source segment length")?)?;
            varint::append_i32(out, to_i32(pos, "source segment position")?)?;
        }
        varint::append_i32(out, to_i32(self.delta_encoding_len(), "delta encoding length")?)?;
        varint::append_i32(out, to_i32(self.target_window_len, "target window length")?)?;
        out.push(0); // delta indicator
        varint::append_i32(out, to_i32(self.data_len, "data section length")?)?;
        varint::append_i32(out, to_i32(self.inst_len, "instructions section length")?)?;
        varint::append_i32(out, to_i32(self.addr_len, "addresses section length")?)?;
        if let Some(c) = self.checksum {
            varint::append_i64(out, i64::from(c))?;
        }
        Ok(())
    }
}

/// Narrow a size to the 32-bit varint range.
pub(crate) fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        Error::invalid_argument(format!("{what} {value} exceeds the VCDIFF 2^31-1 limit"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
