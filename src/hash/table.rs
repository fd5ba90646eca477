// Block hash table.
//
// One entry per BLOCK_SIZE-aligned block of a source buffer.  Buckets are
// chained in insertion order: `hash_table[bucket]` is the first block added
// with that bucket, `next_block[b]` the block added after `b` in the same
// bucket, and `last_block[first]` the tail of the chain so that appending
// is O(1).  All three store `block + HASH_CKOFFSET` so 0 means "none".
//
// The table never holds the source bytes; callers pass them in.  The same
// structure hashes the dictionary once up front and the target
// incrementally while it is being encoded.

use super::rolling::{BLOCK_SIZE, RollingHash};

/// Offset added to stored block numbers so 0 means "empty".
pub const HASH_CKOFFSET: u32 = 1;

#[derive(Debug, Clone)]
pub struct BlockHash {
    hash_table: Vec<u32>,
    next_block: Vec<u32>,
    last_block: Vec<u32>,
    mask: usize,
    source_size: usize,
    /// Added to block offsets when reporting matches.
    starting_offset: usize,
    /// Number of blocks added so far (they are always a prefix).
    blocks_added: usize,
}

/// Bucket count for `source_size` bytes: a power of two of at least one
/// slot per four bytes.
fn table_size(source_size: usize) -> usize {
    (source_size / 4 + 1).next_power_of_two()
}

impl BlockHash {
    /// Empty table for a source of `source_size` bytes whose addresses start
    /// at `starting_offset`.
    pub fn new(source_size: usize, starting_offset: usize) -> Self {
        let size = table_size(source_size);
        let blocks = source_size / BLOCK_SIZE;
        Self {
            hash_table: vec![0; size],
            next_block: vec![0; blocks],
            last_block: vec![0; blocks],
            mask: size - 1,
            source_size,
            starting_offset,
            blocks_added: 0,
        }
    }

    /// Table over a whole dictionary, every block added.
    pub fn for_dictionary(dictionary: &[u8]) -> Self {
        let mut table = Self::new(dictionary.len(), 0);
        table.add_all_blocks_through_index(dictionary, dictionary.len());
        table
    }

    /// Empty table over a target, addressed after a dictionary of
    /// `dictionary_size` bytes.  Blocks are added as encoding proceeds.
    pub fn for_target(target_size: usize, dictionary_size: usize) -> Self {
        Self::new(target_size, dictionary_size)
    }

    #[inline]
    pub fn starting_offset(&self) -> usize {
        self.starting_offset
    }

    #[inline]
    pub fn blocks_added(&self) -> usize {
        self.blocks_added
    }

    /// Source offset of the next block to be added.
    #[inline]
    pub fn next_index_to_add(&self) -> usize {
        self.blocks_added * BLOCK_SIZE
    }

    #[inline(always)]
    fn bucket(&self, hash: u32) -> usize {
        hash as usize & self.mask
    }

    fn add_block(&mut self, hash: u32) {
        let block = self.blocks_added;
        if block >= self.next_block.len() {
            return;
        }
        let stored = block as u32 + HASH_CKOFFSET;
        let bucket = self.bucket(hash);
        match self.hash_table[bucket] {
            0 => {
                self.hash_table[bucket] = stored;
                self.last_block[block] = stored;
            }
            first => {
                let first = (first - HASH_CKOFFSET) as usize;
                let tail = (self.last_block[first] - HASH_CKOFFSET) as usize;
                self.next_block[tail] = stored;
                self.last_block[first] = stored;
            }
        }
        self.blocks_added += 1;
    }

    /// Add the block at `index` if it is the next block boundary; any other
    /// index is ignored.
    pub fn add_one_index_hash(&mut self, index: usize, hash: u32) {
        if index == self.next_index_to_add() {
            self.add_block(hash);
        }
    }

    /// Add every not-yet-added block that starts before `end_index`.
    pub fn add_all_blocks_through_index(&mut self, source: &[u8], end_index: usize) {
        debug_assert_eq!(source.len(), self.source_size);
        let end_index = end_index.min(self.source_size);
        if end_index <= self.next_index_to_add() || self.source_size < BLOCK_SIZE {
            return;
        }
        let last_legal = self.source_size - BLOCK_SIZE;
        let end_limit = end_index.min(last_legal + 1);
        let mut index = self.next_index_to_add();
        while index < end_limit {
            self.add_block(RollingHash::hash(&source[index..]));
            index += BLOCK_SIZE;
        }
    }

    /// First block in the bucket for `hash`, if any.
    #[inline]
    pub fn first_block(&self, hash: u32) -> Option<usize> {
        decode_link(self.hash_table[self.bucket(hash)])
    }

    /// Block added after `block` in the same bucket, if any.
    #[inline]
    pub fn next_block(&self, block: usize) -> Option<usize> {
        decode_link(self.next_block[block])
    }
}

#[inline(always)]
fn decode_link(stored: u32) -> Option<usize> {
    stored.checked_sub(HASH_CKOFFSET).map(|b| b as usize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(table: &BlockHash, hash: u32) -> Vec<usize> {
        let mut out = Vec::new();
        let mut next = table.first_block(hash);
        while let Some(b) = next {
            out.push(b);
            next = table.next_block(b);
        }
        out
    }

    #[test]
    fn table_size_is_power_of_two() {
        assert_eq!(table_size(0), 1);
        assert_eq!(table_size(4), 2);
        assert_eq!(table_size(1000), 256);
        assert_eq!(table_size(1024), 512);
        assert!(table_size(12345).is_power_of_two());
    }

    #[test]
    fn chains_in_insertion_order() {
        // Four identical blocks share one bucket.
        let data = vec![b'a'; BLOCK_SIZE * 4];
        let table = BlockHash::for_dictionary(&data);
        assert_eq!(table.blocks_added(), 4);
        let h = RollingHash::hash(&data);
        assert_eq!(chain(&table, h), vec![0, 1, 2, 3]);
    }

    #[test]
    fn partial_trailing_block_not_added() {
        let data = vec![7u8; BLOCK_SIZE * 2 + 31];
        let table = BlockHash::for_dictionary(&data);
        assert_eq!(table.blocks_added(), 2);
    }

    #[test]
    fn short_source_has_no_blocks() {
        let table = BlockHash::for_dictionary(b"tiny");
        assert_eq!(table.blocks_added(), 0);
        assert!(table.first_block(RollingHash::hash(&[0u8; 32])).is_none());
    }

    #[test]
    fn incremental_add_only_on_boundaries() {
        let data: Vec<u8> = (0..BLOCK_SIZE * 3).map(|i| (i * 7) as u8).collect();
        let mut table = BlockHash::for_target(data.len(), 1000);
        assert_eq!(table.starting_offset(), 1000);

        let h0 = RollingHash::hash(&data);
        table.add_one_index_hash(1, h0);
        assert_eq!(table.blocks_added(), 0);
        table.add_one_index_hash(0, h0);
        assert_eq!(table.blocks_added(), 1);
        // Same index twice is ignored.
        table.add_one_index_hash(0, h0);
        assert_eq!(table.blocks_added(), 1);

        table.add_all_blocks_through_index(&data, BLOCK_SIZE + 1);
        assert_eq!(table.blocks_added(), 2);
        assert_eq!(table.next_index_to_add(), BLOCK_SIZE * 2);

        table.add_all_blocks_through_index(&data, data.len());
        assert_eq!(table.blocks_added(), 3);
        assert_eq!(chain(&table, RollingHash::hash(&data[BLOCK_SIZE * 2..])).last(), Some(&2));
    }

    #[test]
    fn add_through_index_is_idempotent() {
        let data = vec![3u8; BLOCK_SIZE * 5];
        let mut table = BlockHash::new(data.len(), 0);
        table.add_all_blocks_through_index(&data, 64);
        table.add_all_blocks_through_index(&data, 64);
        table.add_all_blocks_through_index(&data, 10);
        assert_eq!(table.blocks_added(), 2);
    }
}
