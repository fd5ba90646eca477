// Streaming VCDIFF decoder.
//
// StreamingDecoder accepts the delta in arbitrary chunks and emits target
// bytes as soon as they are decoded:
//   - start(dictionary) begins a session
//   - feed(chunk, out) buffers input, parses the file header, and drives the
//     window state machine over whatever is buffered
//   - finish() checks that the delta ended on a window boundary
//
// Bytes that cannot be parsed yet stay in `unparsed` until more arrive.

use log::{debug, trace};

use super::address_cache::AddressCache;
use super::code_table::{CodeTableData, Instruction};
use super::header::{FileHeader, ParseableChunk};
use super::reader::CodeTableReader;
use super::window::{DeltaFileWindow, TargetBuffer, WindowConfig, WindowProgress};
use crate::error::{Error, Result};

/// Default limit for both the target window and the whole target file.
pub const DEFAULT_MAX_TARGET_SIZE: usize = 64 << 20;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Limits and permissions for a decoding session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Largest cumulative target the session may produce.
    pub max_target_file_size: usize,
    /// Largest target a single window may declare.
    pub max_target_window_size: usize,
    /// Accept windows whose source segment is earlier target data.
    pub allow_vcd_target: bool,
    /// Accept the interleaved layout (only with an `'S'` file header).
    pub allow_interleaved: bool,
    /// Verify window checksums (only with an `'S'` file header).
    pub allow_checksum: bool,
    /// Exact target size the caller expects, if known.
    pub planned_target_file_size: Option<usize>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_target_file_size: DEFAULT_MAX_TARGET_SIZE,
            max_target_window_size: DEFAULT_MAX_TARGET_SIZE,
            allow_vcd_target: true,
            allow_interleaved: true,
            allow_checksum: true,
            planned_target_file_size: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingDecoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Idle,
    Started,
    Failed,
}

/// Push-style decoder: feed delta chunks, receive target bytes.
#[derive(Debug)]
pub struct StreamingDecoder<'d> {
    options: DecoderOptions,
    session: Session,
    dictionary: &'d [u8],
    file_header: Option<FileHeader>,
    config: Option<WindowConfig>,
    unparsed: Vec<u8>,
    window: DeltaFileWindow,
    target: TargetBuffer,
    /// Absolute target offset up to which bytes have been handed out.
    flushed: usize,
    windows_decoded: u64,
}

impl<'d> StreamingDecoder<'d> {
    /// Decoder over the standard code table.
    pub fn new(options: DecoderOptions) -> Self {
        Self::with_parts(options, CodeTableReader::new(), AddressCache::new())
    }

    /// Decoder over a custom code table and address cache sizes.
    pub fn with_code_table(
        options: DecoderOptions,
        table: CodeTableData,
        near: usize,
        same: usize,
    ) -> Result<Self> {
        let cache = AddressCache::with_sizes(near, same)?;
        let reader = CodeTableReader::with_table(table, cache.last_mode())?;
        Ok(Self::with_parts(options, reader, cache))
    }

    fn with_parts(options: DecoderOptions, reader: CodeTableReader, cache: AddressCache) -> Self {
        Self {
            options,
            session: Session::Idle,
            dictionary: &[],
            file_header: None,
            config: None,
            unparsed: Vec::new(),
            window: DeltaFileWindow::new(reader, cache),
            target: TargetBuffer::new(),
            flushed: 0,
            windows_decoded: 0,
        }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Record every executed instruction; see [`Self::recorded_instructions`].
    pub fn record_instructions(&mut self) {
        self.window.record_instructions();
    }

    /// Instructions executed so far in the session, if recording.
    pub fn recorded_instructions(&self) -> &[Instruction] {
        self.window.recorded_instructions()
    }

    /// Total target bytes produced in the session.
    pub fn bytes_decoded(&self) -> usize {
        self.target.total_len()
    }

    /// Windows completed in the session.
    pub fn windows_decoded(&self) -> u64 {
        self.windows_decoded
    }

    /// The parsed file header, once it has arrived.
    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    /// Begin a session against `dictionary`, discarding any previous one.
    pub fn start(&mut self, dictionary: &'d [u8]) {
        self.session = Session::Started;
        self.dictionary = dictionary;
        self.file_header = None;
        self.config = None;
        self.unparsed.clear();
        self.window.restart();
        self.target = TargetBuffer::new();
        self.flushed = 0;
        self.windows_decoded = 0;
        debug!("decoding session started: dictionary={} bytes", dictionary.len());
    }

    /// Decode `chunk`, appending every target byte it completes to `out`.
    ///
    /// Incomplete trailing input is kept for the next call.  After an error
    /// the session refuses further input until `start` is called again.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self.session {
            Session::Idle => {
                return Err(Error::invalid_argument("feed called before start"));
            }
            Session::Failed => {
                return Err(Error::invalid_argument(
                    "decoder stopped after an earlier error; call start to begin a new session",
                ));
            }
            Session::Started => {}
        }

        self.unparsed.extend_from_slice(chunk);
        let result = self.decode_buffered(out);
        if result.is_err() {
            self.session = Session::Failed;
        }
        result
    }

    /// End the session.  Fails if the input stopped inside the file header
    /// or a window.
    pub fn finish(&mut self) -> Result<()> {
        match self.session {
            Session::Idle => return Err(Error::invalid_argument("finish called before start")),
            Session::Failed => {
                self.session = Session::Idle;
                return Err(Error::invalid_argument(
                    "decoder stopped after an earlier error",
                ));
            }
            Session::Started => {}
        }
        self.session = Session::Idle;

        if self.window.is_partial() {
            return Err(Error::protocol(format!(
                "unexpected end of data inside a delta window ({} target bytes decoded)",
                self.target.total_len()
            )));
        }
        if !self.unparsed.is_empty() && !self.reached_planned_size() {
            let what = if self.file_header.is_none() {
                "file header"
            } else {
                "window header"
            };
            return Err(Error::protocol(format!(
                "unexpected end of data: {} bytes of an incomplete {what}",
                self.unparsed.len()
            )));
        }
        debug!(
            "decoding session finished: {} windows, {} target bytes",
            self.windows_decoded,
            self.target.total_len()
        );
        Ok(())
    }

    fn reached_planned_size(&self) -> bool {
        self.options
            .planned_target_file_size
            .is_some_and(|planned| self.target.total_len() == planned)
    }

    fn decode_buffered(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut consumed = 0;

        if self.file_header.is_none() {
            let mut chunk = ParseableChunk::new(&self.unparsed);
            match FileHeader::parse(&mut chunk) {
                Ok(header) => {
                    consumed = chunk.position();
                    let extended = header.is_extended();
                    debug!("file header: extended={extended}");
                    self.config = Some(WindowConfig {
                        allow_vcd_target: self.options.allow_vcd_target,
                        allow_interleaved: extended && self.options.allow_interleaved,
                        allow_checksum: extended && self.options.allow_checksum,
                        max_target_window_size: self.options.max_target_window_size,
                        max_target_file_size: self.options.max_target_file_size,
                        planned_target_file_size: self.options.planned_target_file_size,
                    });
                    self.file_header = Some(header);
                }
                Err(Error::EndOfData) => {
                    trace!("file header incomplete ({} bytes)", self.unparsed.len());
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        let Some(config) = self.config.as_ref() else {
            return Err(Error::protocol("window data before the file header"));
        };

        while consumed < self.unparsed.len() {
            if !self.window.is_partial() && self.reached_planned_size() {
                return Err(Error::protocol(format!(
                    "found {} bytes of data after reaching planned target file size {}",
                    self.unparsed.len() - consumed,
                    self.target.total_len()
                )));
            }
            let progress = self.window.decode(
                &self.unparsed[consumed..],
                self.dictionary,
                &mut self.target,
                config,
            )?;
            match progress {
                WindowProgress::Complete { consumed: n } => {
                    consumed += n;
                    self.windows_decoded += 1;
                    out.extend_from_slice(self.target.since(self.flushed));
                    self.flushed = self.target.total_len();
                    if !config.allow_vcd_target {
                        self.target.release_before(self.flushed);
                    }
                }
                WindowProgress::NeedMoreData { consumed: n } => {
                    consumed += n;
                    break;
                }
            }
        }

        // Partial interleaved windows hand out what they have so far.
        out.extend_from_slice(self.target.since(self.flushed));
        self.flushed = self.target.total_len();
        self.unparsed.drain(..consumed);
        Ok(())
    }
}

impl Default for StreamingDecoder<'_> {
    fn default() -> Self {
        Self::new(DecoderOptions::default())
    }
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Decode a complete in-memory delta.
pub fn decode_all(dictionary: &[u8], delta: &[u8], options: DecoderOptions) -> Result<Vec<u8>> {
    let mut decoder = StreamingDecoder::new(options);
    let mut out = Vec::new();
    decoder.start(dictionary);
    decoder.feed(delta, &mut out)?;
    decoder.finish()?;
    Ok(out)
}

/// Decode a complete delta and return the instructions it executed.
pub fn list_instructions(dictionary: &[u8], delta: &[u8]) -> Result<Vec<Instruction>> {
    let mut decoder = StreamingDecoder::default();
    decoder.record_instructions();
    let mut out = Vec::new();
    decoder.start(dictionary);
    decoder.feed(delta, &mut out)?;
    decoder.finish()?;
    Ok(decoder.recorded_instructions().to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::header::FormatFlags;
    use crate::vcdiff::writer::CodeTableWriter;

    /// Build a delta by hand: `f` drives a writer for one window.
    fn handmade(
        format: FormatFlags,
        dictionary_size: usize,
        f: impl FnOnce(&mut CodeTableWriter),
    ) -> Vec<u8> {
        let mut w = CodeTableWriter::new(format.contains(FormatFlags::INTERLEAVED));
        let mut out = Vec::new();
        w.write_header(format, &mut out);
        w.init(dictionary_size);
        f(&mut w);
        w.output(&mut out).unwrap();
        out
    }

    #[test]
    fn decode_add_and_copy() {
        let dict = b"0123456789";
        let delta = handmade(FormatFlags::empty(), dict.len(), |w| {
            w.add(b"ab").unwrap();
            w.copy(3, 4).unwrap();
        });
        let out = decode_all(dict, &delta, DecoderOptions::default()).unwrap();
        assert_eq!(out, b"ab3456");
    }

    #[test]
    fn self_overlapping_copy_expands() {
        // "ab" then COPY from the window start, 10 bytes: ababababab.
        let delta = handmade(FormatFlags::empty(), 0, |w| {
            w.add(b"ab").unwrap();
            w.copy(0, 10).unwrap();
        });
        let out = decode_all(&[], &delta, DecoderOptions::default()).unwrap();
        assert_eq!(out, b"abababababab");
    }

    #[test]
    fn copy_spanning_dictionary_and_window() {
        let dict = b"xyz";
        let delta = handmade(FormatFlags::empty(), dict.len(), |w| {
            w.add(b"Q").unwrap();
            // Starts in the dictionary at 1 and continues into the window.
            w.copy(1, 5).unwrap();
        });
        let out = decode_all(dict, &delta, DecoderOptions::default()).unwrap();
        assert_eq!(out, b"QyzQyz");
    }

    #[test]
    fn run_instruction() {
        let delta = handmade(FormatFlags::empty(), 0, |w| {
            w.run(20, b'z').unwrap();
        });
        let out = decode_all(&[], &delta, DecoderOptions::default()).unwrap();
        assert_eq!(out, vec![b'z'; 20]);
    }

    #[test]
    fn checksum_verified_with_extended_header() {
        let target = b"checked target";
        let mut delta = handmade(FormatFlags::CHECKSUM, 0, |w| {
            w.add(target).unwrap();
            w.add_checksum(crate::vcdiff::checksum::adler32(target));
        });
        assert_eq!(decode_all(&[], &delta, DecoderOptions::default()).unwrap(), target);

        // Corrupt the last literal byte.
        let last = delta.len() - 2;
        delta[last] ^= 0xFF;
        let err = decode_all(&[], &delta, DecoderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m.contains("checksum")), "{err}");
    }

    fn mixed_script(w: &mut CodeTableWriter) {
        w.copy(4, 16).unwrap();
        w.add(b"--").unwrap();
        w.run(5, b'!').unwrap();
        w.copy(35, 8).unwrap();
        w.copy(0, 10).unwrap();
    }

    #[test]
    fn chunked_feed_matches_whole() {
        let dict = b"the quick brown fox jumps over the lazy dog";
        let plain = handmade(FormatFlags::empty(), dict.len(), mixed_script);
        let expected = decode_all(dict, &plain, DecoderOptions::default()).unwrap();
        assert_eq!(&expected[..16], b"quick brown fox ");

        let extended = handmade(FormatFlags::INTERLEAVED | FormatFlags::CHECKSUM, dict.len(), |w| {
            mixed_script(w);
            w.add_checksum(crate::vcdiff::checksum::adler32(&expected));
        });

        for delta in [&plain, &extended] {
            let mut decoder = StreamingDecoder::default();
            decoder.start(dict);
            let mut out = Vec::new();
            for byte in delta.iter() {
                decoder.feed(std::slice::from_ref(byte), &mut out).unwrap();
            }
            decoder.finish().unwrap();
            assert_eq!(out, expected);
            assert_eq!(decoder.windows_decoded(), 1);
        }
    }

    #[test]
    fn interleaved_output_arrives_before_window_ends() {
        let delta = handmade(FormatFlags::INTERLEAVED, 0, |w| {
            w.add(&[1u8; 100]).unwrap();
            w.add(&[2u8; 100]).unwrap();
        });
        let mut decoder = StreamingDecoder::default();
        decoder.start(&[]);
        let mut out = Vec::new();
        // Header (5) + window header + first ADD and part of its data.
        decoder.feed(&delta[..delta.len() - 50], &mut out).unwrap();
        assert!(out.len() >= 100, "got {} bytes", out.len());
        decoder.feed(&delta[delta.len() - 50..], &mut out).unwrap();
        decoder.finish().unwrap();
        assert_eq!(out.len(), 200);
    }

    #[test]
    fn interleaved_ignored_without_extended_header() {
        // A standard header never enables interleaving; a window laid out
        // that way is read as sections and fails.
        let mut delta = handmade(FormatFlags::INTERLEAVED, 0, |w| {
            w.add(b"abc").unwrap();
        });
        delta[3] = 0;
        assert!(decode_all(&[], &delta, DecoderOptions::default()).is_err());
    }

    #[test]
    fn truncated_delta_fails_at_finish() {
        let delta = handmade(FormatFlags::empty(), 0, |w| {
            w.add(b"hello world").unwrap();
        });
        for cut in [1, 4, 6, delta.len() - 1] {
            let mut decoder = StreamingDecoder::default();
            decoder.start(&[]);
            let mut out = Vec::new();
            decoder.feed(&delta[..cut], &mut out).unwrap();
            assert!(decoder.finish().is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn empty_delta_is_empty_target() {
        let mut decoder = StreamingDecoder::default();
        decoder.start(&[]);
        decoder.finish().unwrap();

        let header_only = [0xD6, 0xC3, 0xC4, 0x00, 0x00];
        assert!(decode_all(&[], &header_only, DecoderOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn feed_before_start_is_rejected() {
        let mut decoder = StreamingDecoder::default();
        let mut out = Vec::new();
        assert!(matches!(
            decoder.feed(b"x", &mut out),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(decoder.finish(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn session_refuses_input_after_error() {
        let mut decoder = StreamingDecoder::default();
        decoder.start(&[]);
        let mut out = Vec::new();
        assert!(matches!(
            decoder.feed(b"XYZ\0\0", &mut out),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            decoder.feed(&[], &mut out),
            Err(Error::InvalidArgument(_))
        ));
        // A new session works again.
        decoder.start(&[]);
        decoder.feed(&[0xD6, 0xC3, 0xC4, 0, 0], &mut out).unwrap();
        decoder.finish().unwrap();
    }

    #[test]
    fn window_size_limit() {
        let delta = handmade(FormatFlags::empty(), 0, |w| {
            w.run(1000, 0).unwrap();
        });
        let options = DecoderOptions {
            max_target_window_size: 999,
            ..Default::default()
        };
        let mut decoder = StreamingDecoder::new(options.clone());
        assert_eq!(decoder.options(), &options);
        decoder.start(&[]);
        let mut out = Vec::new();
        assert!(matches!(
            decoder.feed(&delta, &mut out),
            Err(Error::ResourceLimit(_))
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn file_size_limit_spans_windows() {
        let mut w = CodeTableWriter::new(false);
        let mut delta = Vec::new();
        w.write_header(FormatFlags::empty(), &mut delta);
        for _ in 0..3 {
            w.init(0);
            w.run(400, 7).unwrap();
            w.output(&mut delta).unwrap();
        }
        let options = DecoderOptions {
            max_target_file_size: 1000,
            ..Default::default()
        };
        let mut decoder = StreamingDecoder::new(options);
        decoder.start(&[]);
        let mut out = Vec::new();
        let err = decoder.feed(&delta, &mut out).unwrap_err();
        assert!(matches!(err, Error::ResourceLimit(_)));
        // The first two windows were already emitted.
        assert_eq!(out.len(), 800);
    }

    #[test]
    fn planned_size() {
        let delta = handmade(FormatFlags::empty(), 0, |w| {
            w.add(b"0123456789").unwrap();
        });

        let exact = DecoderOptions {
            planned_target_file_size: Some(10),
            ..Default::default()
        };
        assert_eq!(decode_all(&[], &delta, exact.clone()).unwrap(), b"0123456789");

        let small = DecoderOptions {
            planned_target_file_size: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            decode_all(&[], &delta, small),
            Err(Error::ResourceLimit(_))
        ));

        let mut extra = delta.clone();
        extra.push(0x00);
        assert!(matches!(
            decode_all(&[], &extra, exact),
            Err(Error::Protocol(ref m)) if m.contains("planned")
        ));
    }

    #[test]
    fn vcd_target_window() {
        // Window 1: "hello world"; window 2 takes "world" from the target.
        let mut delta = Vec::new();
        let mut w = CodeTableWriter::new(false);
        w.write_header(FormatFlags::empty(), &mut delta);
        w.init(0);
        w.add(b"hello world").unwrap();
        w.output(&mut delta).unwrap();
        // TARGET window, segment (len 5, pos 6), COPY 0..5 then ADD "!".
        delta.extend_from_slice(&[0x02, 5, 6, 9, 6, 0, 1, 2, 1, b'!', 0x15, 0x02, 0]);

        let out = decode_all(&[], &delta, DecoderOptions::default()).unwrap();
        assert_eq!(out, b"hello worldworld!");

        let options = DecoderOptions {
            allow_vcd_target: false,
            ..Default::default()
        };
        assert!(matches!(
            decode_all(&[], &delta, options),
            Err(Error::Protocol(ref m)) if m.contains("VCD_TARGET")
        ));
    }

    #[test]
    fn custom_code_table_session() {
        let table = CodeTableData::standard();
        let mut w = CodeTableWriter::with_table(&table, 4, 3, false).unwrap();
        let mut delta = Vec::new();
        w.write_header(FormatFlags::empty(), &mut delta);
        w.init(4);
        w.copy(0, 4).unwrap();
        w.output(&mut delta).unwrap();

        let mut decoder =
            StreamingDecoder::with_code_table(DecoderOptions::default(), table, 4, 3).unwrap();
        decoder.start(b"abcd");
        let mut out = Vec::new();
        decoder.feed(&delta, &mut out).unwrap();
        decoder.finish().unwrap();
        assert_eq!(out, b"abcd");
        assert!(
            StreamingDecoder::with_code_table(DecoderOptions::default(), CodeTableData::standard(), 1, 1)
                .is_err()
        );
    }

    #[test]
    fn records_instructions() {
        let delta = handmade(FormatFlags::empty(), 8, |w| {
            w.add(b"x").unwrap();
            w.copy(0, 4).unwrap();
            w.run(9, 0).unwrap();
        });
        let listing = list_instructions(b"abcdefgh", &delta).unwrap();
        assert_eq!(
            listing,
            vec![
                Instruction::Add { size: 1 },
                Instruction::Copy { size: 4, mode: 0 },
                Instruction::Run { size: 9 },
            ]
        );
    }
}
