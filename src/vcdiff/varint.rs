// VCDIFF variable-length integer encoding (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first.
// Each byte has bit 7 set except the final byte.
//
// Two widths are used on the wire: a 32-bit form for sizes, lengths and
// addresses (max 2^31-1, at most 5 bytes) and a 64-bit form for the window
// checksum (max 2^63-1, at most 10 bytes).  Values are signed on the API so
// that a negative input is detectable rather than silently wrapped.

/// Maximum encoded length for a 64-bit value (ceil(63/7) = 9, but a
/// continuation run of up to 10 bytes is tolerated on decode).
pub const MAX_VARINT_LEN: usize = 10;

/// Maximum encoded length for a 32-bit value (ceil(31/7) = 5).
pub const MAX_VARINT32_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a non-negative `i64` into the tail of `buf`.
/// Returns the number of bytes written (1..=9); the encoding occupies
/// `buf[MAX_VARINT_LEN - len..]`.
#[inline]
pub fn encode_i64(num: i64, buf: &mut [u8; MAX_VARINT_LEN]) -> Result<usize, VarIntError> {
    if num < 0 {
        return Err(VarIntError::Negative);
    }
    let mut num = num as u64;
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F; // clear MSB on last byte
    Ok(MAX_VARINT_LEN - i)
}

/// Encode a non-negative `i32` into the tail of `buf`.
#[inline]
pub fn encode_i32(num: i32, buf: &mut [u8; MAX_VARINT_LEN]) -> Result<usize, VarIntError> {
    encode_i64(i64::from(num), buf)
}

/// Append a 32-bit varint to `out`.
pub fn append_i32(out: &mut Vec<u8>, num: i32) -> Result<(), VarIntError> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_i32(num, &mut buf)?;
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
    Ok(())
}

/// Append a 64-bit varint to `out`.
pub fn append_i64(out: &mut Vec<u8>, num: i64) -> Result<(), VarIntError> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_i64(num, &mut buf)?;
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

fn read_bounded(data: &[u8], max: i64, max_len: usize) -> Result<(i64, usize), VarIntError> {
    let mut val: i64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= max_len {
            return Err(VarIntError::Parse);
        }
        // val * 128 + 127 must stay within `max`.
        if val > (max >> 7) {
            return Err(VarIntError::Parse);
        }
        val = (val << 7) | i64::from(byte & 0x7F);
        if val > max {
            return Err(VarIntError::Parse);
        }
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    if data.len() >= max_len {
        return Err(VarIntError::Parse);
    }
    Err(VarIntError::EndOfBuffer)
}

/// Decode a 32-bit varint (max 2^31-1).  Returns `(value, bytes_consumed)`.
pub fn read_i32(data: &[u8]) -> Result<(i32, usize), VarIntError> {
    let (val, len) = read_bounded(data, i64::from(i32::MAX), MAX_VARINT32_LEN)?;
    Ok((val as i32, len))
}

/// Decode a 64-bit varint (max 2^63-1).  Returns `(value, bytes_consumed)`.
pub fn read_i64(data: &[u8]) -> Result<(i64, usize), VarIntError> {
    read_bounded(data, i64::MAX, MAX_VARINT_LEN)
}

/// Decode a 32-bit varint as a `usize` (always non-negative).
#[inline]
pub fn read_usize(data: &[u8]) -> Result<(usize, usize), VarIntError> {
    let (val, len) = read_i32(data)?;
    Ok((val as usize, len))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Return the encoded byte-length of a non-negative value.
#[inline]
pub fn sizeof_i64(num: i64) -> usize {
    let bits = 64 - (num.max(0) as u64).leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

/// Return the encoded byte-length of a non-negative 32-bit value.
#[inline]
pub fn sizeof_i32(num: i32) -> usize {
    sizeof_i64(i64::from(num))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Input ended before a terminating byte; more data may complete it.
    EndOfBuffer,
    /// Value overflows the target width or the byte run is too long.
    Parse,
    /// A negative value was passed to the encoder.
    Negative,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::EndOfBuffer => write!(f, "varint truncated (end of buffer)"),
            VarIntError::Parse => write!(f, "varint overflow"),
            VarIntError::Negative => write!(f, "negative value cannot be encoded as varint"),
        }
    }
}

impl std::error::Error for VarIntError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
