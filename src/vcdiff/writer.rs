// Code-table writer: collects ADD / RUN / COPY instructions for one window
// and serialises them as a VCDIFF window.
//
// Opcode choice mirrors the reader: the previous single opcode is merged
// into a double opcode whenever the table has one for the pair, and sizes
// that fit a literal table entry avoid a trailing varint.

use log::{debug, warn};

use super::address_cache::AddressCache;
use super::code_table::{
    CodeTableData, InstructionMap, STANDARD_MAX_MODE, VCD_ADD, VCD_COPY, VCD_RUN,
    instruction_name,
};
use super::header::{FileHeader, FormatFlags, WinIndicator, WindowHeader, to_i32};
use super::varint;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CodeTableWriter {
    map: InstructionMap,
    cache: AddressCache,
    interleaved: bool,
    /// Size of the source segment (the dictionary) for this window.
    dictionary_size: usize,
    /// ADD/RUN data; unused in the interleaved layout.
    data: Vec<u8>,
    /// Opcodes and sizes; also data and addresses when interleaved.
    instructions: Vec<u8>,
    /// COPY addresses; unused in the interleaved layout.
    addresses: Vec<u8>,
    /// Index in `instructions` of the last single opcode, while it can
    /// still be merged with the next instruction.
    last_opcode_index: Option<usize>,
    target_length: usize,
    checksum: Option<u32>,
}

impl CodeTableWriter {
    /// Writer over the standard code table and default address cache.
    pub fn new(interleaved: bool) -> Self {
        let table = CodeTableData::standard();
        Self {
            map: InstructionMap::new(&table, STANDARD_MAX_MODE),
            cache: AddressCache::new(),
            interleaved,
            dictionary_size: 0,
            data: Vec::new(),
            instructions: Vec::new(),
            addresses: Vec::new(),
            last_opcode_index: None,
            target_length: 0,
            checksum: None,
        }
    }

    /// Writer over a custom table and cache sizes.  The table must validate
    /// against the cache's mode count.
    pub fn with_table(
        table: &CodeTableData,
        near: usize,
        same: usize,
        interleaved: bool,
    ) -> Result<Self> {
        let cache = AddressCache::with_sizes(near, same)?;
        table.validate(cache.last_mode())?;
        Ok(Self {
            map: InstructionMap::new(table, cache.last_mode()),
            cache,
            ..Self::new(interleaved)
        })
    }

    /// Start a window whose source segment is the whole dictionary.
    pub fn init(&mut self, dictionary_size: usize) {
        self.dictionary_size = dictionary_size;
        self.cache.init();
        self.data.clear();
        self.instructions.clear();
        self.addresses.clear();
        self.last_opcode_index = None;
        self.target_length = 0;
        self.checksum = None;
    }

    /// Bytes of target described by the instructions so far.
    #[inline]
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Write the file header for `format`.
    pub fn write_header(&self, format: FormatFlags, out: &mut Vec<u8>) {
        FileHeader::for_format(format).write(out);
    }

    fn data_section(&mut self) -> &mut Vec<u8> {
        if self.interleaved {
            &mut self.instructions
        } else {
            &mut self.data
        }
    }

    fn address_section(&mut self) -> &mut Vec<u8> {
        if self.interleaved {
            &mut self.instructions
        } else {
            &mut self.addresses
        }
    }

    fn encode_instruction(&mut self, inst: u8, size: usize, mode: u8) -> Result<()> {
        let size_i32 = to_i32(size, "instruction size")?;

        if let Some(idx) = self.last_opcode_index.take() {
            let last_opcode = self.instructions[idx];
            if let Some(compound) = self.map.lookup_second(last_opcode, inst, size, mode) {
                self.instructions[idx] = compound;
                return Ok(());
            }
            if let Some(compound) = self.map.lookup_second(last_opcode, inst, 0, mode) {
                self.instructions[idx] = compound;
                varint::append_i32(&mut self.instructions, size_i32)?;
                return Ok(());
            }
        }

        if let Some(opcode) = self.map.lookup_first(inst, size, mode) {
            self.instructions.push(opcode);
            self.last_opcode_index = Some(self.instructions.len() - 1);
            return Ok(());
        }

        let opcode = self.map.lookup_first(inst, 0, mode).ok_or_else(|| {
            Error::invalid_argument(format!(
                "code table has no opcode for {} mode {mode}",
                instruction_name(inst)
            ))
        })?;
        self.instructions.push(opcode);
        self.last_opcode_index = Some(self.instructions.len() - 1);
        varint::append_i32(&mut self.instructions, size_i32)?;
        Ok(())
    }

    /// Append literal bytes.
    pub fn add(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.encode_instruction(VCD_ADD, bytes.len(), 0)?;
        self.data_section().extend_from_slice(bytes);
        self.target_length += bytes.len();
        Ok(())
    }

    /// Repeat `byte` `size` times.
    pub fn run(&mut self, size: usize, byte: u8) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        self.encode_instruction(VCD_RUN, size, 0)?;
        self.data_section().push(byte);
        self.target_length += size;
        Ok(())
    }

    /// Copy `size` bytes from `offset` in the combined dictionary + target
    /// address space.
    pub fn copy(&mut self, offset: usize, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let here = self.dictionary_size + self.target_length;
        if offset >= here {
            return Err(Error::invalid_argument(format!(
                "COPY offset {offset} is not before current position {here}"
            )));
        }
        let (mode, value) = self.cache.encode(offset, here);
        self.encode_instruction(VCD_COPY, size, mode)?;
        if self.cache.is_same_mode(mode) {
            self.address_section().push(value as u8);
        } else {
            let value = to_i32(value, "COPY address")?;
            varint::append_i32(self.address_section(), value)?;
        }
        self.target_length += size;
        Ok(())
    }

    /// Attach an Adler-32 of the window's target bytes.
    pub fn add_checksum(&mut self, checksum: u32) {
        self.checksum = Some(checksum);
    }

    /// Serialise the window and reset for the next one.  Writes nothing if
    /// no instruction was added.
    pub fn output(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.instructions.is_empty() {
            warn!("empty input; no delta window produced");
            return Ok(());
        }

        let mut win_ind = WinIndicator::SOURCE;
        if self.checksum.is_some() {
            win_ind |= WinIndicator::CHECKSUM;
        }
        let header = WindowHeader {
            win_ind: win_ind.bits(),
            source_segment: Some((self.dictionary_size, 0)),
            target_window_len: self.target_length,
            data_len: self.data.len(),
            inst_len: self.instructions.len(),
            addr_len: self.addresses.len(),
            checksum: self.checksum,
        };

        debug!(
            "window: target={} data={} inst={} addr={} interleaved={}",
            header.target_window_len,
            header.data_len,
            header.inst_len,
            header.addr_len,
            self.interleaved
        );

        out.reserve(header.delta_encoding_len() + 16);
        header.write(out)?;
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.instructions);
        out.extend_from_slice(&self.addresses);

        self.init(self.dictionary_size);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
