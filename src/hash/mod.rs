// Block hashing and match finding for the encoder.
//
// This module provides:
// - A 32-byte polynomial rolling hash and byte comparison helpers
// - Block hash tables chained in insertion order
// - Best-match search with backward/forward extension

pub mod matching;
pub mod rolling;
pub mod table;
