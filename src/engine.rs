// Delta engine: ties the block matcher to the code-table writer.
//
// A HashedDictionary owns the dictionary bytes and their block hash.  It is
// built once, never mutated, and can be shared by any number of encoders
// (including across threads).  Encoding one window:
//   - slide a rolling hash over the target one byte at a time
//   - at each position look for the longest dictionary match, and when
//     target matching is on, the longest match in already-seen target
//   - emit ADD for the unmatched prefix (RUN for long byte runs) then COPY
//   - rehash after each jump; flush the tail as literals

use log::trace;

use crate::error::Result;
use crate::hash::matching::Match;
use crate::hash::rolling::{self, BLOCK_SIZE, RollingHash};
use crate::hash::table::BlockHash;
use crate::vcdiff::checksum::adler32;
use crate::vcdiff::header::to_i32;
use crate::vcdiff::writer::CodeTableWriter;

/// Shortest match emitted as a COPY.
pub const MIN_MATCH_SIZE: usize = BLOCK_SIZE;

/// Shortest run of one byte emitted as a RUN instead of literals.
pub const MIN_RUN: usize = 8;

// ---------------------------------------------------------------------------
// HashedDictionary
// ---------------------------------------------------------------------------

/// Dictionary bytes plus their block hash, ready for encoding.
#[derive(Debug, Clone)]
pub struct HashedDictionary {
    data: Vec<u8>,
    hash: BlockHash,
    hasher: RollingHash,
}

impl HashedDictionary {
    /// Copy and hash `dictionary`.
    pub fn new(dictionary: &[u8]) -> Result<Self> {
        to_i32(dictionary.len(), "dictionary size")?;
        let hash = BlockHash::for_dictionary(dictionary);
        trace!(
            "hashed dictionary: {} bytes, {} blocks",
            dictionary.len(),
            hash.blocks_added()
        );
        Ok(Self {
            data: dictionary.to_vec(),
            hash,
            hasher: RollingHash::new(),
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encode `target` as one window through `writer`, appending it to
    /// `out`.  An empty target produces no window.
    pub fn encode_window(
        &self,
        target: &[u8],
        target_matching: bool,
        checksum: bool,
        writer: &mut CodeTableWriter,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        writer.init(self.data.len());
        if target.is_empty() {
            return writer.output(out);
        }
        if checksum {
            writer.add_checksum(adler32(target));
        }

        if target.len() < BLOCK_SIZE {
            writer.add(target)?;
            return writer.output(out);
        }

        let mut target_hash =
            target_matching.then(|| BlockHash::for_target(target.len(), self.data.len()));
        let last_block_start = target.len() - BLOCK_SIZE;
        let mut next_encode = 0;
        let mut candidate = 0;
        let mut hash = RollingHash::hash(target);

        loop {
            let best = self.best_match(hash, target, target_hash.as_ref(), next_encode, candidate);
            if best.size >= MIN_MATCH_SIZE {
                add_literals(writer, &target[next_encode..next_encode + best.target_offset])?;
                writer.copy(best.source_offset, best.size)?;
                next_encode += best.target_offset + best.size;
                candidate = next_encode;
                if candidate > last_block_start {
                    break;
                }
                hash = RollingHash::hash(&target[candidate..]);
                if let Some(th) = target_hash.as_mut() {
                    th.add_all_blocks_through_index(target, next_encode);
                }
            } else {
                if candidate + 1 > last_block_start {
                    break;
                }
                if let Some(th) = target_hash.as_mut() {
                    th.add_one_index_hash(candidate, hash);
                }
                hash = self
                    .hasher
                    .update(hash, target[candidate], target[candidate + BLOCK_SIZE]);
                candidate += 1;
            }
        }

        add_literals(writer, &target[next_encode..])?;
        writer.output(out)
    }

    /// Longest match for the block at `candidate`.  Dictionary matches are
    /// searched first; a target match replaces one only if strictly longer.
    fn best_match(
        &self,
        hash: u32,
        target: &[u8],
        target_hash: Option<&BlockHash>,
        next_encode: usize,
        candidate: usize,
    ) -> Match {
        let unencoded = &target[next_encode..];
        let relative = candidate - next_encode;
        let mut best = Match::default();
        self.hash
            .find_best_match(hash, &self.data, unencoded, relative, &mut best);
        if let Some(th) = target_hash {
            th.find_best_match(hash, target, unencoded, relative, &mut best);
        }
        best
    }
}

/// Emit `bytes` as ADDs, turning runs of at least `MIN_RUN` equal bytes
/// into RUNs.
fn add_literals(writer: &mut CodeTableWriter, bytes: &[u8]) -> Result<()> {
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let run = rolling::find_run_length(&bytes[i..], bytes[i], usize::MAX);
        if run >= MIN_RUN {
            writer.add(&bytes[start..i])?;
            writer.run(run, bytes[i])?;
            start = i + run;
        }
        i += run;
    }
    writer.add(&bytes[start..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
