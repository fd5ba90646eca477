// Code-table reader: turns the instruction stream back into instructions.
//
// A double opcode yields its first instruction immediately and buffers the
// second for the next call.  Sizes stored as 0 in the table are read as a
// varint right after the opcode.  The most recently returned instruction can
// be pushed back once, which is how the window decoder backs out of an
// instruction whose operands have not fully arrived.

use super::code_table::{CodeTableData, Instruction, VCD_ADD, VCD_COPY, VCD_NOOP, VCD_RUN};
use super::varint::{self, VarIntError};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CodeTableReader {
    table: CodeTableData,
    pending_second: Option<u8>,
    last_start: usize,
    last_pending: Option<u8>,
}

impl CodeTableReader {
    /// Reader over the standard code table.
    pub fn new() -> Self {
        Self {
            table: CodeTableData::standard(),
            pending_second: None,
            last_start: 0,
            last_pending: None,
        }
    }

    /// Reader over a custom table; the table must validate for `max_mode`.
    pub fn with_table(table: CodeTableData, max_mode: u8) -> Result<Self> {
        table.validate(max_mode)?;
        Ok(Self {
            table,
            ..Self::new()
        })
    }

    /// Forget any buffered second instruction (start of a window).
    pub fn reset(&mut self) {
        self.pending_second = None;
        self.last_start = 0;
        self.last_pending = None;
    }

    /// Read the next instruction from `stream`, starting at `*pos`.
    ///
    /// Returns `EndOfData` when the stream is exhausted; in that case
    /// `*pos` and the buffered state are left as they were before the call.
    pub fn next_instruction(&mut self, stream: &[u8], pos: &mut usize) -> Result<Instruction> {
        self.last_start = *pos;
        self.last_pending = self.pending_second;

        let (inst, size, mode) = loop {
            if let Some(opcode) = self.pending_second.take() {
                let e = self.table.entry(opcode);
                if e.inst2 != VCD_NOOP {
                    break (e.inst2, e.size2, e.mode2);
                }
                continue;
            }
            let Some(&opcode) = stream.get(*pos) else {
                self.unget(pos);
                return Err(Error::EndOfData);
            };
            *pos += 1;
            let e = self.table.entry(opcode);
            if e.inst2 != VCD_NOOP {
                self.pending_second = Some(opcode);
            }
            if e.inst1 != VCD_NOOP {
                break (e.inst1, e.size1, e.mode1);
            }
        };

        let size = if size == 0 {
            match varint::read_usize(&stream[*pos..]) {
                Ok((v, len)) => {
                    *pos += len;
                    v
                }
                Err(VarIntError::EndOfBuffer) => {
                    self.unget(pos);
                    return Err(Error::EndOfData);
                }
                Err(_) => {
                    return Err(Error::protocol(format!(
                        "invalid size for instruction at offset {} (varint overflow)",
                        self.last_start
                    )));
                }
            }
        } else {
            size as usize
        };

        match inst {
            VCD_ADD => Ok(Instruction::Add { size }),
            VCD_RUN => Ok(Instruction::Run { size }),
            VCD_COPY => Ok(Instruction::Copy { size, mode }),
            other => Err(Error::protocol(format!(
                "unknown instruction type {other} in code table"
            ))),
        }
    }

    /// Whether the second half of a double opcode is still buffered.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending_second
            .is_some_and(|opcode| self.table.entry(opcode).inst2 != VCD_NOOP)
    }

    /// Push back the most recently returned instruction.
    pub fn unget(&mut self, pos: &mut usize) {
        *pos = self.last_start;
        self.pending_second = self.last_pending;
    }
}

impl Default for CodeTableReader {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
