// Best-match search over a block hash.
//
// For a candidate position in the target the matcher walks the bucket
// chain for its rolling hash, skipping blocks whose bytes differ (hash
// collisions), and extends every real hit:
//   1. backward, no further than the start of the not-yet-encoded target
//   2. forward, to the end of the source or target
// The longest extension wins.

use super::rolling::{self, BLOCK_SIZE};
use super::table::BlockHash;

/// Chain entries examined before giving up on finding matching bytes.
pub const MAX_PROBES: usize = 16;

/// Verified matches extended per candidate position.
pub const MAX_MATCHES_TO_CHECK: usize = 32;

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// A copy candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Match {
    /// Matched length in bytes.
    pub size: usize,
    /// Address of the match in the combined dictionary + target space.
    pub source_offset: usize,
    /// Start of the match relative to the unencoded target start.
    pub target_offset: usize,
}

impl Match {
    /// Take the candidate if it is strictly longer.
    #[inline]
    pub fn replace_if_better(&mut self, candidate: Match) -> bool {
        if candidate.size > self.size {
            *self = candidate;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

impl BlockHash {
    fn skip_non_matching(&self, mut block: Option<usize>, source: &[u8], candidate: &[u8]) -> Option<usize> {
        let mut probes = 0;
        while let Some(b) = block {
            let start = b * BLOCK_SIZE;
            if source[start..start + BLOCK_SIZE] == candidate[..BLOCK_SIZE] {
                return Some(b);
            }
            probes += 1;
            if probes > MAX_PROBES {
                return None;
            }
            block = self.next_block(b);
        }
        None
    }

    /// Longest match for the block at `target[candidate..]`, where
    /// `target` is the unencoded part of the target and `hash` the rolling
    /// hash of that block.
    ///
    /// `source` is the buffer this table was built over.  Among equally long
    /// matches the most recently added block wins.  The result is merged
    /// into `best` with [`Match::replace_if_better`].
    pub fn find_best_match(
        &self,
        hash: u32,
        source: &[u8],
        target: &[u8],
        candidate: usize,
        best: &mut Match,
    ) {
        debug_assert!(candidate + BLOCK_SIZE <= target.len());
        let candidate_block = &target[candidate..];
        let mut found = Match::default();
        let mut checked = 0;

        let mut block = self.skip_non_matching(self.first_block(hash), source, candidate_block);
        while let Some(b) = block {
            checked += 1;
            if checked > MAX_MATCHES_TO_CHECK {
                break;
            }

            let mut source_offset = b * BLOCK_SIZE;
            let mut target_offset = candidate;
            let mut size = BLOCK_SIZE;

            let left_limit = source_offset.min(target_offset);
            let left = rolling::backward_match(
                &source[source_offset - left_limit..source_offset],
                &target[target_offset - left_limit..target_offset],
                left_limit,
            );
            source_offset -= left;
            target_offset -= left;
            size += left;

            let source_end = b * BLOCK_SIZE + BLOCK_SIZE;
            let target_end = candidate + BLOCK_SIZE;
            size += rolling::forward_match(
                &source[source_end..],
                &target[target_end..],
                usize::MAX,
            );

            if size >= found.size {
                found = Match {
                    size,
                    source_offset: source_offset + self.starting_offset(),
                    target_offset,
                };
            }

            block = self.skip_non_matching(self.next_block(b), source, candidate_block);
        }

        if found.size > 0 {
            best.replace_if_better(found);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
