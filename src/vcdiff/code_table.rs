// VCDIFF code table (RFC 3284, Section 5.4 / 5.6).
//
// Each of the 256 opcodes expands to up to two (instruction, size, mode)
// triples.  A size of 0 in the table means the real size follows the opcode
// as a varint in the instruction stream.  Contains the standard table, the
// validator every table must pass before use, and the reverse map the
// writer uses to pick opcodes.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Instruction types as stored in the table.
pub const VCD_NOOP: u8 = 0;
pub const VCD_ADD: u8 = 1;
pub const VCD_RUN: u8 = 2;
pub const VCD_COPY: u8 = 3;
pub const VCD_LAST_INSTRUCTION_TYPE: u8 = VCD_COPY;

/// Highest COPY mode of the standard table (2 + near(4) + same(3) - 1).
pub const STANDARD_MAX_MODE: u8 = 8;

/// Human-readable instruction name for diagnostics.
pub fn instruction_name(inst: u8) -> &'static str {
    match inst {
        VCD_NOOP => "NOOP",
        VCD_ADD => "ADD",
        VCD_RUN => "RUN",
        VCD_COPY => "COPY",
        _ => "<invalid>",
    }
}

/// A single entry in the 256-element code table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub inst1: u8,
    pub size1: u8,
    pub mode1: u8,
    pub inst2: u8,
    pub size2: u8,
    pub mode2: u8,
}

impl CodeTableEntry {
    const fn single(inst: u8, size: u8, mode: u8) -> Self {
        Self {
            inst1: inst,
            size1: size,
            mode1: mode,
            inst2: VCD_NOOP,
            size2: 0,
            mode2: 0,
        }
    }

    const fn double(inst1: u8, size1: u8, mode1: u8, inst2: u8, size2: u8, mode2: u8) -> Self {
        Self {
            inst1,
            size1,
            mode1,
            inst2,
            size2,
            mode2,
        }
    }

    /// The one real instruction of this opcode, when the other half is a
    /// NOOP.
    fn as_single(&self) -> Option<(u8, u8, u8)> {
        if self.inst2 == VCD_NOOP {
            Some((self.inst1, self.size1, self.mode1))
        } else if self.inst1 == VCD_NOOP {
            Some((self.inst2, self.size2, self.mode2))
        } else {
            None
        }
    }
}

/// The complete 256-entry code table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeTableData {
    pub entries: [CodeTableEntry; 256],
}

impl CodeTableData {
    /// Build the standard RFC 3284 code table (Section 5.6).
    pub fn standard() -> Self {
        let mut tbl = [CodeTableEntry::default(); 256];
        let mut idx: usize = 0;

        const ADD_SIZES: u8 = 17;
        const NEAR_MODES: u8 = 4;
        const CPY_MODES: u8 = STANDARD_MAX_MODE + 1;
        const MIN_COPY: u8 = 4;
        const CPY_SIZES: u8 = 15;
        const ADDCOPY_ADD_MAX: u8 = 4;
        const ADDCOPY_NEAR_CPY_MAX: u8 = 6;
        const ADDCOPY_SAME_CPY_MAX: u8 = 4;

        // --- Index 0: RUN size=0 ---
        tbl[idx] = CodeTableEntry::single(VCD_RUN, 0, 0);
        idx += 1;

        // --- Index 1: ADD size=0, indices 2..18: ADD size=1..17 ---
        for size in 0..=ADD_SIZES {
            tbl[idx] = CodeTableEntry::single(VCD_ADD, size, 0);
            idx += 1;
        }

        // --- COPY: for each mode, size=0 then sizes 4..18 ---
        for mode in 0..CPY_MODES {
            tbl[idx] = CodeTableEntry::single(VCD_COPY, 0, mode);
            idx += 1;
            for size in MIN_COPY..MIN_COPY + CPY_SIZES {
                tbl[idx] = CodeTableEntry::single(VCD_COPY, size, mode);
                idx += 1;
            }
        }

        // --- ADD+COPY doubles ---
        for mode in 0..CPY_MODES {
            let cpy_max = if mode < 2 + NEAR_MODES {
                ADDCOPY_NEAR_CPY_MAX
            } else {
                ADDCOPY_SAME_CPY_MAX
            };
            for add_size in 1..=ADDCOPY_ADD_MAX {
                for cpy_size in MIN_COPY..=cpy_max {
                    tbl[idx] =
                        CodeTableEntry::double(VCD_ADD, add_size, 0, VCD_COPY, cpy_size, mode);
                    idx += 1;
                }
            }
        }

        // --- COPY+ADD doubles ---
        for mode in 0..CPY_MODES {
            tbl[idx] = CodeTableEntry::double(VCD_COPY, MIN_COPY, mode, VCD_ADD, 1, 0);
            idx += 1;
        }

        debug_assert_eq!(idx, 256, "code table must have exactly 256 entries");
        Self { entries: tbl }
    }

    #[inline]
    pub fn entry(&self, opcode: u8) -> &CodeTableEntry {
        &self.entries[opcode as usize]
    }

    /// Check that the table is usable with COPY modes `0..=max_mode`.
    ///
    /// Every half must name a known instruction; NOOP halves carry size 0
    /// and mode 0; ADD and RUN carry mode 0; COPY modes stay within
    /// `max_mode`.  Every instruction/mode pair must also be expressible by
    /// a single-instruction opcode of size 0 (either half may hold it, the
    /// other being NOOP), since that is the only way to encode an arbitrary
    /// size.
    pub fn validate(&self, max_mode: u8) -> Result<()> {
        let kinds = VCD_LAST_INSTRUCTION_TYPE as usize + max_mode as usize + 1;
        let mut has_size0 = vec![false; kinds];

        for (opcode, e) in self.entries.iter().enumerate() {
            validate_half(opcode, 1, e.inst1, e.size1, e.mode1, max_mode)?;
            validate_half(opcode, 2, e.inst2, e.size2, e.mode2, max_mode)?;
            if let Some((inst, 0, mode)) = e.as_single()
                && inst != VCD_NOOP
            {
                has_size0[inst as usize + mode as usize] = true;
            }
        }

        for (kind, present) in has_size0.iter().enumerate().skip(1) {
            if !present {
                let (inst, mode) = if kind >= VCD_COPY as usize {
                    (VCD_COPY, kind - VCD_COPY as usize)
                } else {
                    (kind as u8, 0)
                };
                return Err(Error::protocol(format!(
                    "code table has no size-0 opcode for {} mode {mode}",
                    instruction_name(inst)
                )));
            }
        }
        Ok(())
    }
}

impl Default for CodeTableData {
    fn default() -> Self {
        Self::standard()
    }
}

fn validate_half(opcode: usize, half: u8, inst: u8, size: u8, mode: u8, max_mode: u8) -> Result<()> {
    let bad = |what: &str| {
        Err(Error::protocol(format!(
            "code table opcode {opcode} instruction {half}: {what}"
        )))
    };
    if inst > VCD_LAST_INSTRUCTION_TYPE {
        return bad(&format!("unknown instruction type {inst}"));
    }
    if mode > max_mode {
        return bad(&format!("mode {mode} exceeds maximum {max_mode}"));
    }
    if inst == VCD_NOOP && (size != 0 || mode != 0) {
        return bad("NOOP must have size 0 and mode 0");
    }
    if inst != VCD_COPY && mode != 0 {
        return bad(&format!("{} must have mode 0", instruction_name(inst)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reverse lookup (writer side)
// ---------------------------------------------------------------------------

/// Maps instructions back to opcodes.
///
/// The first map finds the lowest opcode encoding a single instruction of a
/// given kind and literal size.  The second map finds a double opcode whose
/// first half equals an already chosen single opcode.
#[derive(Debug, Clone)]
pub struct InstructionMap {
    first: Vec<[Option<u8>; 256]>,
    second: HashMap<(u8, usize, u8), u8>,
}

impl InstructionMap {
    pub fn new(table: &CodeTableData, max_mode: u8) -> Self {
        let kinds = VCD_LAST_INSTRUCTION_TYPE as usize + max_mode as usize + 1;
        let mut first = vec![[None; 256]; kinds];

        for (opcode, e) in table.entries.iter().enumerate() {
            if let Some((inst, size, mode)) = e.as_single()
                && inst != VCD_NOOP
                && let Some(sizes) = first.get_mut(inst as usize + mode as usize)
            {
                sizes[size as usize].get_or_insert(opcode as u8);
            }
        }

        let mut second = HashMap::new();
        for (opcode, e) in table.entries.iter().enumerate() {
            if e.inst1 == VCD_NOOP || e.inst2 == VCD_NOOP {
                continue;
            }
            let Some(first_opcode) = first
                .get(e.inst1 as usize + e.mode1 as usize)
                .and_then(|sizes| sizes[e.size1 as usize])
            else {
                continue;
            };
            second
                .entry((first_opcode, e.inst2 as usize + e.mode2 as usize, e.size2))
                .or_insert(opcode as u8);
        }

        Self { first, second }
    }

    /// Lowest single-instruction opcode for `(inst, size, mode)`.
    pub fn lookup_first(&self, inst: u8, size: usize, mode: u8) -> Option<u8> {
        let size = u8::try_from(size).ok()?;
        self.first
            .get(inst as usize + mode as usize)
            .and_then(|sizes| sizes[size as usize])
    }

    /// Double opcode whose first half is `first_opcode` and whose second
    /// half is `(inst, size, mode)`.
    pub fn lookup_second(&self, first_opcode: u8, inst: u8, size: usize, mode: u8) -> Option<u8> {
        let size = u8::try_from(size).ok()?;
        self.second
            .get(&(first_opcode, inst as usize + mode as usize, size))
            .copied()
    }
}

// ---------------------------------------------------------------------------
// High-level instruction type
// ---------------------------------------------------------------------------

/// A decoded instruction, as returned by the code-table reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Append `size` literal bytes from the data section.
    Add { size: usize },
    /// Repeat one byte from the data section `size` times.
    Run { size: usize },
    /// Copy `size` bytes from an address decoded with `mode`.
    Copy { size: usize, mode: u8 },
}

impl Instruction {
    pub fn size(&self) -> usize {
        match *self {
            Instruction::Add { size } | Instruction::Run { size } | Instruction::Copy { size, .. } => {
                size
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Add { .. } => "ADD",
            Instruction::Run { .. } => "RUN",
            Instruction::Copy { .. } => "COPY",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> CodeTableData {
        CodeTableData::standard()
    }

    #[test]
    fn index_0_is_run() {
        assert_eq!(t().entries[0], CodeTableEntry::single(VCD_RUN, 0, 0));
    }

    #[test]
    fn indices_1_to_18_are_add() {
        let t = t();
        for (i, size) in (1..=18).zip(0..=17u8) {
            assert_eq!(t.entries[i], CodeTableEntry::single(VCD_ADD, size, 0), "index {i}");
        }
    }

    #[test]
    fn copy_blocks_per_mode() {
        let t = t();
        for mode in 0..=8u8 {
            let base = 19 + 16 * mode as usize;
            assert_eq!(t.entries[base], CodeTableEntry::single(VCD_COPY, 0, mode));
            assert_eq!(t.entries[base + 1], CodeTableEntry::single(VCD_COPY, 4, mode));
            assert_eq!(t.entries[base + 15], CodeTableEntry::single(VCD_COPY, 18, mode));
        }
    }

    #[test]
    fn double_instruction_ranges() {
        let t = t();
        // ADD(1)+COPY(4, mode 0)
        assert_eq!(t.entries[163], CodeTableEntry::double(VCD_ADD, 1, 0, VCD_COPY, 4, 0));
        // ADD(4)+COPY(6, mode 5) closes the NEAR block.
        assert_eq!(t.entries[234], CodeTableEntry::double(VCD_ADD, 4, 0, VCD_COPY, 6, 5));
        // ADD(1)+COPY(4, mode 6) opens the SAME block.
        assert_eq!(t.entries[235], CodeTableEntry::double(VCD_ADD, 1, 0, VCD_COPY, 4, 6));
        assert_eq!(t.entries[246], CodeTableEntry::double(VCD_ADD, 4, 0, VCD_COPY, 4, 8));
        // COPY(4)+ADD(1)
        assert_eq!(t.entries[247], CodeTableEntry::double(VCD_COPY, 4, 0, VCD_ADD, 1, 0));
        assert_eq!(t.entries[255], CodeTableEntry::double(VCD_COPY, 4, 8, VCD_ADD, 1, 0));
    }

    #[test]
    fn all_doubles_have_nonzero_sizes() {
        for (i, e) in t().entries.iter().enumerate() {
            if e.inst2 != VCD_NOOP {
                assert_ne!(e.size1, 0, "double at {i} has size1=0");
                assert_ne!(e.size2, 0, "double at {i} has size2=0");
            }
        }
    }

    #[test]
    fn standard_table_validates() {
        assert!(t().validate(STANDARD_MAX_MODE).is_ok());
    }

    #[test]
    fn standard_table_rejects_smaller_max_mode() {
        assert!(matches!(t().validate(5), Err(Error::Protocol(_))));
    }

    #[test]
    fn removing_any_size0_opcode_fails_validation() {
        let mut required = vec![0usize, 1];
        required.extend((0..=8).map(|mode| 19 + 16 * mode));
        for opcode in required {
            let mut table = t();
            table.entries[opcode].size1 = 1;
            let err = table.validate(STANDARD_MAX_MODE).unwrap_err();
            assert!(
                matches!(err, Error::Protocol(ref m) if m.contains("size-0")),
                "opcode {opcode}: {err}"
            );
        }
    }

    #[test]
    fn noop_first_half_counts_as_single() {
        let mut table = t();
        table.entries[0] = CodeTableEntry {
            inst1: VCD_NOOP,
            size1: 0,
            mode1: 0,
            inst2: VCD_RUN,
            size2: 0,
            mode2: 0,
        };
        assert!(table.validate(STANDARD_MAX_MODE).is_ok());
        let map = InstructionMap::new(&table, STANDARD_MAX_MODE);
        assert_eq!(map.lookup_first(VCD_RUN, 0, 0), Some(0));

        // The same opcode with a real first half no longer covers RUN.
        table.entries[0].inst1 = VCD_ADD;
        table.entries[0].size1 = 1;
        assert!(table.validate(STANDARD_MAX_MODE).is_err());
    }

    #[test]
    fn malformed_entries_fail_validation() {
        let mut table = t();
        table.entries[200].inst2 = 4;
        assert!(table.validate(STANDARD_MAX_MODE).is_err());

        let mut table = t();
        table.entries[5].mode1 = 1; // ADD with non-zero mode
        assert!(table.validate(STANDARD_MAX_MODE).is_err());

        let mut table = t();
        table.entries[5].size2 = 3; // NOOP with non-zero size
        assert!(table.validate(STANDARD_MAX_MODE).is_err());

        let mut table = t();
        table.entries[20].mode1 = 9; // COPY mode beyond the cache
        assert!(table.validate(STANDARD_MAX_MODE).is_err());
    }

    #[test]
    fn first_map_picks_literal_sizes() {
        let map = InstructionMap::new(&t(), STANDARD_MAX_MODE);
        assert_eq!(map.lookup_first(VCD_RUN, 0, 0), Some(0));
        assert_eq!(map.lookup_first(VCD_RUN, 5, 0), None);
        assert_eq!(map.lookup_first(VCD_ADD, 0, 0), Some(1));
        for size in 1..=17usize {
            assert_eq!(map.lookup_first(VCD_ADD, size, 0), Some(1 + size as u8));
        }
        assert_eq!(map.lookup_first(VCD_ADD, 18, 0), None);
        assert_eq!(map.lookup_first(VCD_COPY, 4, 0), Some(20));
        assert_eq!(map.lookup_first(VCD_COPY, 0, 1), Some(35));
        assert_eq!(map.lookup_first(VCD_COPY, 18, 8), Some(162));
        assert_eq!(map.lookup_first(VCD_COPY, 3, 0), None);
        assert_eq!(map.lookup_first(VCD_ADD, 1000, 0), None);
    }

    #[test]
    fn second_map_finds_doubles() {
        let map = InstructionMap::new(&t(), STANDARD_MAX_MODE);
        // ADD(1) is opcode 2; ADD(1)+COPY(4, mode 0) is 163.
        assert_eq!(map.lookup_second(2, VCD_COPY, 4, 0), Some(163));
        // ADD(2) is opcode 3; ADD(2)+COPY(4, mode 6) = 235 + 1.
        assert_eq!(map.lookup_second(3, VCD_COPY, 4, 6), Some(236));
        // COPY(4, mode 0) is opcode 20; COPY(4)+ADD(1) is 247.
        assert_eq!(map.lookup_second(20, VCD_ADD, 1, 0), Some(247));
        // No ADD+COPY(7) doubles in the standard table.
        assert_eq!(map.lookup_second(2, VCD_COPY, 7, 0), None);
        // No doubles start with a size-0 opcode.
        assert_eq!(map.lookup_second(1, VCD_COPY, 4, 0), None);
    }

    #[test]
    fn instruction_helpers() {
        let i = Instruction::Copy { size: 40, mode: 3 };
        assert_eq!(i.size(), 40);
        assert_eq!(i.name(), "COPY");
        assert_eq!(instruction_name(VCD_RUN), "RUN");
    }
}
