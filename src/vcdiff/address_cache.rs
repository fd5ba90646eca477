// VCDIFF address cache (RFC 3284, Section 5.3).
//
// Implements the NEAR and SAME address caches used to compactly encode
// COPY instruction addresses.  Both sides of a session drive an identical
// cache; it is reset at the start of every window.

use super::varint;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Address modes (RFC 3284 Section 5.3)
// ---------------------------------------------------------------------------

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to "here" (current position in address space).
pub const VCD_HERE: u8 = 1;
/// First NEAR mode.
pub const VCD_FIRST_NEAR: u8 = 2;

/// Default number of NEAR slots.
pub const DEFAULT_NEAR_CACHE_SIZE: usize = 4;
/// Default number of SAME groups (each 256 slots).
pub const DEFAULT_SAME_CACHE_SIZE: usize = 3;

// ---------------------------------------------------------------------------
// Address cache
// ---------------------------------------------------------------------------

/// NEAR/SAME address cache.
///
/// Default configuration (near=4, same=3) gives 9 address modes:
///   0      VCD_SELF : absolute
///   1      VCD_HERE : here - value
///   2..5   NEAR     : near\[mode-2\] + value
///   6..8   SAME     : same\[(mode-6)*256 + byte\]
#[derive(Debug, Clone)]
pub struct AddressCache {
    s_near: usize,
    s_same: usize,
    near: Vec<usize>,
    same: Vec<usize>,
    next_slot: usize,
}

impl AddressCache {
    /// Default RFC 3284 cache: near=4, same=3.
    pub fn new() -> Self {
        Self {
            s_near: DEFAULT_NEAR_CACHE_SIZE,
            s_same: DEFAULT_SAME_CACHE_SIZE,
            near: vec![0; DEFAULT_NEAR_CACHE_SIZE],
            same: vec![0; DEFAULT_SAME_CACHE_SIZE * 256],
            next_slot: 0,
        }
    }

    /// Create with custom cache sizes.
    ///
    /// Fails with `InvalidArgument` when the modes do not fit in a byte
    /// (`2 + near + same > 256`).
    pub fn with_sizes(s_near: usize, s_same: usize) -> Result<Self> {
        let modes = 2usize
            .checked_add(s_near)
            .and_then(|m| m.checked_add(s_same));
        match modes {
            Some(m) if m <= 256 => Ok(Self {
                s_near,
                s_same,
                near: vec![0; s_near],
                same: vec![0; s_same * 256],
                next_slot: 0,
            }),
            _ => Err(Error::invalid_argument(format!(
                "address cache sizes near={s_near} same={s_same} exceed 256 modes"
            ))),
        }
    }

    /// Reset cache state to initial (all zeros).
    /// Called at the start of each window.
    pub fn init(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    /// Total number of address modes (2 + near + same).
    #[inline]
    pub fn mode_count(&self) -> usize {
        2 + self.s_near + self.s_same
    }

    /// Highest valid mode number.
    #[inline]
    pub fn last_mode(&self) -> u8 {
        (self.mode_count() - 1) as u8
    }

    /// Number of NEAR cache slots.
    #[inline]
    pub fn s_near(&self) -> usize {
        self.s_near
    }

    /// Number of SAME cache groups.
    #[inline]
    pub fn s_same(&self) -> usize {
        self.s_same
    }

    /// The first SAME mode index (2 + near).
    #[inline]
    pub fn first_same_mode(&self) -> u8 {
        (2 + self.s_near) as u8
    }

    /// Whether `mode` stores its address as a single raw byte.
    #[inline]
    pub fn is_same_mode(&self, mode: u8) -> bool {
        mode >= self.first_same_mode() && (mode as usize) < self.mode_count()
    }

    // -----------------------------------------------------------------------
    // Cache update (shared by encoder and decoder)
    // -----------------------------------------------------------------------

    /// Update the cache after encoding or decoding an address.
    #[inline]
    pub fn update(&mut self, addr: usize) {
        if self.s_near > 0 {
            self.near[self.next_slot] = addr;
            self.next_slot = (self.next_slot + 1) % self.s_near;
        }
        if self.s_same > 0 {
            let idx = addr % (self.s_same * 256);
            self.same[idx] = addr;
        }
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Encode an address, selecting the mode with the smallest value.
    ///
    /// Returns `(mode, value)`.  For SAME modes `value` is the single byte
    /// to store; for every other mode it is written as a varint.
    ///
    /// Ties go to the lowest mode number.  `here` is the current position
    /// in the address space (source segment length + target bytes produced
    /// so far in this window).
    pub fn encode(&mut self, addr: usize, here: usize) -> (u8, usize) {
        debug_assert!(addr < here, "COPY address {addr} not before here {here}");

        let mut best_m = VCD_SELF;
        let mut best_v = addr;

        // VCD_HERE
        if let Some(d) = here.checked_sub(addr) {
            if d < best_v {
                best_m = VCD_HERE;
                best_v = d;
            }
        }

        // NEAR modes
        for (i, &slot) in self.near.iter().enumerate() {
            if let Some(d) = addr.checked_sub(slot) {
                if d < best_v {
                    best_m = VCD_FIRST_NEAR + i as u8;
                    best_v = d;
                }
            }
        }

        // SAME mode
        if self.s_same > 0 {
            let idx = addr % (self.s_same * 256);
            if self.same[idx] == addr {
                let byte = idx % 256;
                if byte < best_v {
                    best_m = self.first_same_mode() + (idx / 256) as u8;
                    best_v = byte;
                }
            }
        }

        self.update(addr);
        (best_m, best_v)
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Decode an address given the mode and the address stream.
    ///
    /// Returns `(address, bytes_consumed)`.  An exhausted stream yields
    /// `EndOfData`; a mode outside the cache or an address that is not
    /// strictly before `here` is a protocol error.  The cache is only
    /// updated on success.
    pub fn decode(&mut self, here: usize, mode: u8, stream: &[u8]) -> Result<(usize, usize)> {
        let m = mode as usize;
        if m >= self.mode_count() {
            return Err(Error::protocol(format!(
                "invalid address mode {mode} (cache has {} modes)",
                self.mode_count()
            )));
        }
        let same_start = self.first_same_mode() as usize;

        let (addr, consumed) = if m < same_start {
            // SELF, HERE, or NEAR: read a varint.
            let (raw, consumed) = varint::read_usize(stream)?;
            let addr = match mode {
                VCD_SELF => Some(raw),
                VCD_HERE => here.checked_sub(raw),
                _ => self.near[m - 2].checked_add(raw),
            };
            let addr = addr.ok_or_else(|| {
                Error::protocol(format!(
                    "COPY address out of range (mode {mode}, value {raw}, here {here})"
                ))
            })?;
            (addr, consumed)
        } else {
            // SAME mode: read a single raw byte.
            let Some(&byte) = stream.first() else {
                return Err(Error::EndOfData);
            };
            let slot = m - same_start;
            (self.same[slot * 256 + byte as usize], 1)
        };

        if addr >= here {
            return Err(Error::protocol(format!(
                "COPY address {addr} is not before current position {here} (mode {mode})"
            )));
        }

        self.update(addr);
        Ok((addr, consumed))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
