// Per-window decode state machine.
//
// A window is parsed in two phases.  The header (indicator, source segment,
// lengths, optional checksum) is parsed atomically: if it is incomplete
// nothing is consumed and it is re-parsed on the next call.  The body is
// then executed against the cumulative target.  Split-section windows must
// be fully buffered before the body runs; interleaved windows execute as
// many whole instructions as have arrived and resume later.

use std::ops::Range;

use log::{debug, trace};

use super::address_cache::AddressCache;
use super::checksum::adler32;
use super::code_table::Instruction;
use super::header::{DeltaIndicator, ParseableChunk, WinIndicator};
use super::reader::CodeTableReader;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Cumulative target
// ---------------------------------------------------------------------------

/// Decoded target for a whole session, addressed by absolute offset.
///
/// Bytes before `base` have been released and can no longer be referenced.
#[derive(Debug, Default)]
pub struct TargetBuffer {
    data: Vec<u8>,
    base: usize,
}

impl TargetBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes decoded in the session, released or not.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.base + self.data.len()
    }

    /// Absolute offset of the first retained byte.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Retained bytes from absolute offset `from` to the end.
    pub fn since(&self, from: usize) -> &[u8] {
        &self.data[from.saturating_sub(self.base).min(self.data.len())..]
    }

    /// Drop retained bytes before absolute offset `upto`.
    pub fn release_before(&mut self, upto: usize) {
        let n = upto.saturating_sub(self.base).min(self.data.len());
        if n > 0 {
            self.data.drain(..n);
            self.base += n;
        }
    }

    #[inline]
    fn index(&self, absolute: usize) -> usize {
        absolute - self.base
    }

    /// Append `len` bytes starting at absolute offset `from`, which may
    /// overlap the bytes being appended.
    fn copy_within(&mut self, from: usize, mut len: usize) {
        let mut idx = self.index(from);
        while len > 0 {
            let n = len.min(self.data.len() - idx);
            self.data.extend_from_within(idx..idx + n);
            idx += n;
            len -= n;
        }
    }
}

// ---------------------------------------------------------------------------
// Window configuration
// ---------------------------------------------------------------------------

/// Limits and permissions a window is decoded under, fixed for a session.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub allow_vcd_target: bool,
    pub allow_interleaved: bool,
    pub allow_checksum: bool,
    pub max_target_window_size: usize,
    pub max_target_file_size: usize,
    pub planned_target_file_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// Window state
// ---------------------------------------------------------------------------

/// Where a window is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    AwaitingHeader,
    HeaderParsed,
    DecodingBody,
    Complete,
}

/// Result of one `decode` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowProgress {
    /// The window finished; `consumed` bytes of input belong to it.
    Complete { consumed: usize },
    /// More input is needed; `consumed` bytes were used and must not be
    /// offered again.
    NeedMoreData { consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceOrigin {
    None,
    Dictionary,
    Target,
}

#[derive(Debug, Clone, Copy)]
struct SourceSegment {
    origin: SourceOrigin,
    position: usize,
    length: usize,
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    /// Remaining bytes of the single combined section.
    Interleaved { remaining: usize },
    Split {
        data_len: usize,
        inst_len: usize,
        addr_len: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct WindowHeaderFields {
    source: SourceSegment,
    target_len: usize,
    checksum: Option<u32>,
    layout: Layout,
}

/// Decoder for one delta window at a time.
#[derive(Debug)]
pub struct DeltaFileWindow {
    state: WindowState,
    reader: CodeTableReader,
    cache: AddressCache,
    header: Option<WindowHeaderFields>,
    /// Absolute target offset where the current window starts.
    window_start: usize,
    /// Executed instructions, when recording is enabled.
    recorded: Option<Vec<Instruction>>,
}

impl DeltaFileWindow {
    pub fn new(reader: CodeTableReader, cache: AddressCache) -> Self {
        Self {
            state: WindowState::AwaitingHeader,
            reader,
            cache,
            header: None,
            window_start: 0,
            recorded: None,
        }
    }

    /// Keep a log of every executed instruction.
    pub fn record_instructions(&mut self) {
        self.recorded.get_or_insert_with(Vec::new);
    }

    /// Instructions executed so far, if recording.
    pub fn recorded_instructions(&self) -> &[Instruction] {
        self.recorded.as_deref().unwrap_or(&[])
    }

    #[inline]
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Whether a window has been started but not finished.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.state != WindowState::AwaitingHeader && self.state != WindowState::Complete
    }

    /// Prepare for a new session: no window in progress, target at 0.
    pub fn restart(&mut self) {
        self.reset();
        self.window_start = 0;
        if let Some(log) = self.recorded.as_mut() {
            log.clear();
        }
    }

    fn reset(&mut self) {
        self.state = WindowState::AwaitingHeader;
        self.header = None;
        self.reader.reset();
        self.cache.init();
    }

    /// Decode as much of the current window as `input` allows.
    pub fn decode(
        &mut self,
        input: &[u8],
        dictionary: &[u8],
        target: &mut TargetBuffer,
        cfg: &WindowConfig,
    ) -> Result<WindowProgress> {
        if self.state == WindowState::Complete {
            self.reset();
        }

        let mut chunk = ParseableChunk::new(input);
        if self.state == WindowState::AwaitingHeader {
            match self.read_header(&mut chunk, dictionary, target, cfg) {
                Ok(()) => {}
                Err(Error::EndOfData) => {
                    trace!("window header incomplete ({} bytes available)", input.len());
                    return Ok(WindowProgress::NeedMoreData { consumed: 0 });
                }
                Err(e) => return Err(e),
            }
        }

        self.state = WindowState::DecodingBody;
        let Some(mut header) = self.header else {
            return Err(Error::protocol("window body without a parsed header"));
        };

        match header.layout {
            Layout::Split {
                data_len,
                inst_len,
                addr_len,
            } => {
                let body = chunk.unparsed();
                let data_end = data_len;
                let inst_end = data_end + inst_len;
                let addr_end = inst_end + addr_len;
                let mut sections = Sections::split(
                    &body[..data_end],
                    &body[data_end..inst_end],
                    &body[inst_end..addr_end],
                );
                match self.decode_body(&mut sections, &header, dictionary, target) {
                    Ok(()) => {}
                    Err(Error::EndOfData) => {
                        return Err(Error::protocol(format!(
                            "end of data reached while decoding window body \
                             (decoded {} of {} target bytes)",
                            target.total_len() - self.window_start,
                            header.target_len
                        )));
                    }
                    Err(e) => return Err(e),
                }
                sections.check_leftovers()?;
                chunk.advance(addr_end);
            }
            Layout::Interleaved { remaining } => {
                let available = chunk.unparsed_len().min(remaining);
                let body = &chunk.unparsed()[..available];
                let mut sections = Sections::interleaved(body);
                let result = self.decode_body(&mut sections, &header, dictionary, target);
                let used = sections.inst_pos;
                chunk.advance(used);
                let remaining = remaining - used;
                header.layout = Layout::Interleaved { remaining };
                self.header = Some(header);
                match result {
                    Ok(()) => {}
                    Err(Error::EndOfData) if remaining > 0 => {
                        trace!(
                            "interleaved window suspended: {} of {} target bytes, {remaining} body bytes pending",
                            target.total_len() - self.window_start,
                            header.target_len
                        );
                        return Ok(WindowProgress::NeedMoreData {
                            consumed: chunk.position(),
                        });
                    }
                    Err(Error::EndOfData) => {
                        return Err(Error::protocol(format!(
                            "end of data reached while decoding interleaved window \
                             (decoded {} of {} target bytes)",
                            target.total_len() - self.window_start,
                            header.target_len
                        )));
                    }
                    Err(e) => return Err(e),
                }
                if remaining > 0 {
                    return Err(Error::protocol(format!(
                        "excess interleaved data: {remaining} bytes left after target window"
                    )));
                }
            }
        }

        self.finish_window(&header, target)?;
        self.state = WindowState::Complete;
        Ok(WindowProgress::Complete {
            consumed: chunk.position(),
        })
    }

    // -----------------------------------------------------------------------
    // Header
    // -----------------------------------------------------------------------

    fn read_header(
        &mut self,
        chunk: &mut ParseableChunk<'_>,
        dictionary: &[u8],
        target: &TargetBuffer,
        cfg: &WindowConfig,
    ) -> Result<()> {
        let win_ind = chunk.read_byte()?;
        let indicator = WinIndicator::from_bits(win_ind).ok_or_else(|| {
            Error::protocol(format!("invalid window indicator bits: {win_ind:#04X}"))
        })?;

        let origin = match (
            indicator.contains(WinIndicator::SOURCE),
            indicator.contains(WinIndicator::TARGET),
        ) {
            (true, true) => {
                return Err(Error::protocol(
                    "window indicator has both VCD_SOURCE and VCD_TARGET set",
                ));
            }
            (true, false) => SourceOrigin::Dictionary,
            (false, true) => {
                if !cfg.allow_vcd_target {
                    return Err(Error::protocol(
                        "VCD_TARGET window found but VCD_TARGET is not allowed",
                    ));
                }
                SourceOrigin::Target
            }
            (false, false) => SourceOrigin::None,
        };

        let source = if origin == SourceOrigin::None {
            SourceSegment {
                origin,
                position: 0,
                length: 0,
            }
        } else {
            let length = chunk.read_i32("source segment length")?;
            let position = chunk.read_i32("source segment position")?;
            let (from_size, from_name) = match origin {
                SourceOrigin::Dictionary => (dictionary.len(), "dictionary"),
                _ => (target.total_len(), "decoded target"),
            };
            if position >= from_size && length > 0 {
                return Err(Error::protocol(format!(
                    "source segment position {position} is past the end of the {from_name} ({from_size} bytes)"
                )));
            }
            if position.checked_add(length).is_none_or(|end| end > from_size) {
                return Err(Error::protocol(format!(
                    "source segment (position {position}, length {length}) exceeds the {from_name} ({from_size} bytes)"
                )));
            }
            if origin == SourceOrigin::Target && length > 0 && position < target.base() {
                return Err(Error::protocol(format!(
                    "source segment position {position} refers to released target data"
                )));
            }
            SourceSegment {
                origin,
                position,
                length,
            }
        };

        let delta_len = chunk.read_i32("length of the delta encoding")?;
        let delta_start = chunk.position();

        let target_len = chunk.read_i32("target window length")?;
        if target_len > cfg.max_target_window_size {
            return Err(Error::resource_limit(format!(
                "target window size {target_len} exceeds limit of {} bytes",
                cfg.max_target_window_size
            )));
        }
        let decoded = target.total_len();
        let new_total = decoded.saturating_add(target_len);
        if new_total > cfg.max_target_file_size {
            return Err(Error::resource_limit(format!(
                "decoded target size {new_total} would exceed limit of {} bytes",
                cfg.max_target_file_size
            )));
        }
        if let Some(planned) = cfg.planned_target_file_size
            && new_total > planned
        {
            return Err(Error::resource_limit(format!(
                "target window of {target_len} bytes at offset {decoded} \
                 exceeds planned target file size {planned}"
            )));
        }

        let delta_ind = chunk.read_byte()?;
        if delta_ind != 0 {
            let known = DeltaIndicator::from_bits_truncate(delta_ind);
            return Err(if known.is_empty() {
                Error::protocol(format!("invalid delta indicator bits: {delta_ind:#04X}"))
            } else {
                Error::protocol(format!(
                    "secondary compression of delta sections is not supported ({delta_ind:#04X})"
                ))
            });
        }

        let data_len = chunk.read_i32("length of the ADD/RUN data section")?;
        let inst_len = chunk.read_i32("length of the instructions section")?;
        let addr_len = chunk.read_i32("length of the addresses section")?;

        let has_checksum = indicator.contains(WinIndicator::CHECKSUM);
        if has_checksum && !cfg.allow_checksum {
            debug!("window checksum bit set but checksums are not enabled; not parsed");
        }
        let checksum = if has_checksum && cfg.allow_checksum {
            let value = chunk.read_i64("checksum")?;
            Some(u32::try_from(value).map_err(|_| {
                Error::protocol(format!("checksum {value:#X} exceeds 32 bits"))
            })?)
        } else {
            None
        };

        let header_len = chunk.position() - delta_start;
        let layout = if cfg.allow_interleaved && data_len == 0 && addr_len == 0 {
            if header_len + inst_len != delta_len {
                return Err(Error::protocol(format!(
                    "interleaved section length {inst_len} does not match delta encoding length {delta_len}"
                )));
            }
            Layout::Interleaved {
                remaining: inst_len,
            }
        } else {
            let total = data_len
                .checked_add(inst_len)
                .and_then(|t| t.checked_add(addr_len))
                .and_then(|t| t.checked_add(header_len));
            if total != Some(delta_len) {
                return Err(Error::protocol(format!(
                    "section lengths (data {data_len}, instructions {inst_len}, \
                     addresses {addr_len}) do not match delta encoding length {delta_len}"
                )));
            }
            if chunk.unparsed_len() < data_len + inst_len + addr_len {
                return Err(Error::EndOfData);
            }
            Layout::Split {
                data_len,
                inst_len,
                addr_len,
            }
        };

        debug!(
            "window header: source={:?} len={} pos={} target_len={target_len} layout={layout:?} checksum={checksum:?}",
            source.origin, source.length, source.position
        );

        self.header = Some(WindowHeaderFields {
            source,
            target_len,
            checksum,
            layout,
        });
        self.window_start = decoded;
        self.reader.reset();
        self.cache.init();
        self.state = WindowState::HeaderParsed;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Body
    // -----------------------------------------------------------------------

    fn decode_body(
        &mut self,
        sections: &mut Sections<'_>,
        header: &WindowHeaderFields,
        dictionary: &[u8],
        target: &mut TargetBuffer,
    ) -> Result<()> {
        if target.total_len() == self.window_start {
            target.data.reserve(header.target_len);
        }

        loop {
            let decoded = target.total_len() - self.window_start;
            if decoded >= header.target_len {
                return Ok(());
            }

            let inst = self.reader.next_instruction(sections.inst, &mut sections.inst_pos)?;
            let size = inst.size();
            if size > header.target_len - decoded {
                return Err(Error::protocol(format!(
                    "{} with size {size} plus {decoded} bytes already decoded exceeds \
                     target window length {}",
                    inst.name(),
                    header.target_len
                )));
            }

            let step = match inst {
                Instruction::Add { size } => sections.take_data(size).map(|bytes| {
                    target.data.extend_from_slice(bytes);
                }),
                Instruction::Run { size } => sections.take_data(1).map(|byte| {
                    target.data.resize(target.data.len() + size, byte[0]);
                }),
                Instruction::Copy { size, mode } => {
                    let here = header.source.length + decoded;
                    sections
                        .decode_address(&mut self.cache, here, mode)
                        .map(|addr| self.copy(addr, size, header, dictionary, target))
                }
            };

            match step {
                Ok(()) => {
                    if let Some(log) = self.recorded.as_mut() {
                        log.push(inst);
                    }
                }
                Err(Error::EndOfData) => {
                    self.reader.unget(&mut sections.inst_pos);
                    return Err(Error::EndOfData);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn copy(
        &self,
        addr: usize,
        size: usize,
        header: &WindowHeaderFields,
        dictionary: &[u8],
        target: &mut TargetBuffer,
    ) {
        let seg = header.source;
        let mut addr = addr;
        let mut size = size;

        if addr < seg.length {
            let n = size.min(seg.length - addr);
            let from = seg.position + addr;
            match seg.origin {
                SourceOrigin::Dictionary => {
                    target.data.extend_from_slice(&dictionary[from..from + n]);
                }
                _ => target.copy_within(from, n),
            }
            addr += n;
            size -= n;
        }

        if size > 0 {
            // Address now lies in the current target window.
            target.copy_within(self.window_start + (addr - seg.length), size);
        }
    }

    fn finish_window(&mut self, header: &WindowHeaderFields, target: &TargetBuffer) -> Result<()> {
        let decoded = target.total_len() - self.window_start;
        if decoded != header.target_len {
            return Err(Error::protocol(format!(
                "decoded target window size {decoded} does not match expected size {}",
                header.target_len
            )));
        }
        if self.reader.has_pending() {
            return Err(Error::protocol(
                "second half of a double instruction left over after target window",
            ));
        }
        if let Some(expected) = header.checksum {
            let actual = adler32(target.since(self.window_start));
            if actual != expected {
                return Err(Error::protocol(format!(
                    "target data does not match checksum ({actual:#010X} != {expected:#010X}); \
                     this could mean that the wrong dictionary was used"
                )));
            }
        }
        debug!(
            "window complete: {decoded} bytes at target offset {}",
            self.window_start
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Section cursors
// ---------------------------------------------------------------------------

/// Read positions over the three sections of a window body.  In the
/// interleaved layout all three share the instruction stream and cursor.
struct Sections<'a> {
    interleaved: bool,
    data: &'a [u8],
    inst: &'a [u8],
    addr: &'a [u8],
    data_pos: usize,
    inst_pos: usize,
    addr_pos: usize,
}

impl<'a> Sections<'a> {
    fn split(data: &'a [u8], inst: &'a [u8], addr: &'a [u8]) -> Self {
        Self {
            interleaved: false,
            data,
            inst,
            addr,
            data_pos: 0,
            inst_pos: 0,
            addr_pos: 0,
        }
    }

    fn interleaved(body: &'a [u8]) -> Self {
        Self {
            interleaved: true,
            data: &[],
            inst: body,
            addr: &[],
            data_pos: 0,
            inst_pos: 0,
            addr_pos: 0,
        }
    }

    fn take_data(&mut self, n: usize) -> Result<&'a [u8]> {
        let (buf, pos) = if self.interleaved {
            (self.inst, &mut self.inst_pos)
        } else {
            (self.data, &mut self.data_pos)
        };
        let range: Range<usize> = *pos..pos.checked_add(n).ok_or(Error::EndOfData)?;
        let bytes = buf.get(range).ok_or(Error::EndOfData)?;
        *pos += n;
        Ok(bytes)
    }

    fn decode_address(&mut self, cache: &mut AddressCache, here: usize, mode: u8) -> Result<usize> {
        let (buf, pos) = if self.interleaved {
            (self.inst, &mut self.inst_pos)
        } else {
            (self.addr, &mut self.addr_pos)
        };
        let (addr, used) = cache.decode(here, mode, &buf[*pos..])?;
        *pos += used;
        Ok(addr)
    }

    fn check_leftovers(&self) -> Result<()> {
        let excess = [
            ("instructions and sizes", self.inst.len() - self.inst_pos),
            ("ADD/RUN data", self.data.len() - self.data_pos),
            ("COPY addresses", self.addr.len() - self.addr_pos),
        ];
        for (what, n) in excess {
            if n > 0 {
                return Err(Error::protocol(format!(
                    "excess {what} left over after decoding target window ({n} bytes)"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
