// Rolling hash over fixed 32-byte blocks.
//
// Polynomial hash with multiplier 257 reduced modulo 2^23.  The first hash
// of a window costs one pass over the block; each later position is
// derived in O(1) by removing the outgoing byte (via a precomputed table)
// and appending the incoming one.
//
// Also holds the scalar byte-comparison helpers the matcher uses to extend
// matches and detect runs.

/// Size of a hashed block, and the minimum match length worth a COPY.
pub const BLOCK_SIZE: usize = 32;

/// Polynomial multiplier.
pub const HASH_MULT: u32 = 257;

/// Hash values are reduced modulo 2^23.
pub const HASH_BASE_MASK: u32 = (1 << 23) - 1;

#[inline(always)]
fn mod_base(value: u32) -> u32 {
    value & HASH_BASE_MASK
}

/// Additive inverse modulo the hash base.
#[inline(always)]
fn mod_base_inverse(value: u32) -> u32 {
    mod_base(0u32.wrapping_sub(value))
}

#[inline(always)]
fn hash_step(partial: u32, next: u8) -> u32 {
    mod_base(partial.wrapping_mul(HASH_MULT).wrapping_add(u32::from(next)))
}

// ---------------------------------------------------------------------------
// RollingHash
// ---------------------------------------------------------------------------

/// Block hasher for `BLOCK_SIZE`-byte windows.
#[derive(Clone)]
pub struct RollingHash {
    /// `remove_table[b]` cancels byte `b` at the front of a window.
    remove_table: [u32; 256],
}

impl RollingHash {
    pub fn new() -> Self {
        // HASH_MULT^(BLOCK_SIZE-1): the weight of the first byte.
        let mut multiplier: u32 = 1;
        for _ in 0..BLOCK_SIZE - 1 {
            multiplier = mod_base(multiplier.wrapping_mul(HASH_MULT));
        }
        let mut remove_table = [0u32; 256];
        for (byte, slot) in remove_table.iter_mut().enumerate() {
            *slot = mod_base_inverse((byte as u32).wrapping_mul(multiplier));
        }
        Self { remove_table }
    }

    /// Hash of the first `BLOCK_SIZE` bytes of `block`.
    #[inline]
    pub fn hash(block: &[u8]) -> u32 {
        debug_assert!(block.len() >= BLOCK_SIZE);
        let mut h = u32::from(block[0]) * HASH_MULT + u32::from(block[1]);
        for &b in &block[2..BLOCK_SIZE] {
            h = hash_step(h, b);
        }
        h
    }

    /// Slide the window one byte: drop `old_first`, append `new_last`.
    #[inline(always)]
    pub fn update(&self, old_hash: u32, old_first: u8, new_last: u8) -> u32 {
        let partial = mod_base(old_hash.wrapping_add(self.remove_table[usize::from(old_first)]));
        hash_step(partial, new_last)
    }
}

impl Default for RollingHash {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RollingHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingHash")
            .field("block_size", &BLOCK_SIZE)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Byte comparison
// ---------------------------------------------------------------------------

/// Number of equal bytes at the start of `s1[..n]` and `s2[..n]`.
#[inline]
pub fn forward_match(s1: &[u8], s2: &[u8], n: usize) -> usize {
    let n = n.min(s1.len()).min(s2.len());
    let mut i = 0;

    // Eight bytes at a time.
    while i + 8 <= n {
        let a = u64::from_le_bytes(word(&s1[i..i + 8]));
        let b = u64::from_le_bytes(word(&s2[i..i + 8]));
        let xor = a ^ b;
        if xor != 0 {
            return i + (xor.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }

    while i < n && s1[i] == s2[i] {
        i += 1;
    }
    i
}

/// Number of equal bytes at the end of `s1[..n]` and `s2[..n]`.
#[inline]
pub fn backward_match(s1: &[u8], s2: &[u8], n: usize) -> usize {
    let n = n.min(s1.len()).min(s2.len());
    let mut i = n;

    while i >= 8 {
        let a = u64::from_le_bytes(word(&s1[i - 8..i]));
        let b = u64::from_le_bytes(word(&s2[i - 8..i]));
        let xor = a ^ b;
        if xor != 0 {
            return n - i + (xor.leading_zeros() / 8) as usize;
        }
        i -= 8;
    }

    while i > 0 && s1[i - 1] == s2[i - 1] {
        i -= 1;
    }
    n - i
}

/// Count consecutive bytes equal to `byte` at the start of `data[..max]`.
#[inline]
pub fn find_run_length(data: &[u8], byte: u8, max: usize) -> usize {
    data.iter()
        .take(max)
        .position(|&b| b != byte)
        .unwrap_or(max.min(data.len()))
}

#[inline(always)]
fn word(bytes: &[u8]) -> [u8; 8] {
    let mut w = [0u8; 8];
    w.copy_from_slice(bytes);
    w
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
